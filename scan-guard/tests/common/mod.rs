//! Test support: in-process ERP double and a recording notifier
#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use scan_guard::picking::{
    LineId, LocationId, LocationRef, LogEntry, LotId, LotRef, OfflineScan, OfflineSyncResponse,
    OperationKind, PickingId, ProductId, ProductRef, RpcStatus, ScanDetails, Snapshot,
    SnapshotLine, SnapshotResponse, StrictScanRequest, StrictScanResponse, Tracking,
};
use scan_guard::{
    Dialog, GuardConfig, LocalStorage, Notice, Notifier, PickingBackend, PickingGuard,
    RemoteError, RemoteResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PICKING: PickingId = 7;
pub const L1: LocationId = 100;
pub const L2: LocationId = 101;
pub const STOCK: LocationId = 900;
pub const P1: ProductId = 10;
pub const P2: ProductId = 20;
pub const LOT_A: LotId = 50;

/// What the ERP answers to `action_scan_product_strict`
#[derive(Debug, Clone)]
pub enum StrictMode {
    /// Apply the scan to the server-side line
    Accept,
    /// Answer with an error status
    Reject { code: String, message: String },
    /// Raise a server-side error (JSON-RPC `error`)
    Raise(String),
}

#[derive(Default)]
struct ServerState {
    snapshot: Option<Snapshot>,
    processed: HashSet<String>,
    strict_calls: Vec<StrictScanRequest>,
    offline_batches: Vec<Vec<OfflineScan>>,
    log_batches: Vec<Vec<LogEntry>>,
    scan_events: Vec<(String, String, String)>,
}

/// Scriptable ERP double; the snapshot it serves is the server-side truth
pub struct MockBackend {
    state: Mutex<ServerState>,
    strict_mode: Mutex<StrictMode>,
    network_down: AtomicBool,
    snapshot_unavailable: AtomicBool,
    refuse_batches: AtomicBool,
    strict_delay: Mutex<Option<Duration>>,
    reply_delay: Mutex<Option<Duration>>,
}

impl MockBackend {
    pub fn new(snapshot: Snapshot) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServerState {
                snapshot: Some(snapshot),
                ..Default::default()
            }),
            strict_mode: Mutex::new(StrictMode::Accept),
            network_down: AtomicBool::new(false),
            snapshot_unavailable: AtomicBool::new(false),
            refuse_batches: AtomicBool::new(false),
            strict_delay: Mutex::new(None),
            reply_delay: Mutex::new(None),
        })
    }

    pub fn set_network_down(&self, down: bool) {
        self.network_down.store(down, Ordering::SeqCst);
    }

    pub fn set_snapshot_unavailable(&self, unavailable: bool) {
        self.snapshot_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_refuse_batches(&self, refuse: bool) {
        self.refuse_batches.store(refuse, Ordering::SeqCst);
    }

    pub fn set_strict_mode(&self, mode: StrictMode) {
        *self.strict_mode.lock().unwrap() = mode;
    }

    pub fn set_strict_delay(&self, delay: Option<Duration>) {
        *self.strict_delay.lock().unwrap() = delay;
    }

    /// Delay the strict scan answer after the scan was applied
    pub fn set_reply_delay(&self, delay: Option<Duration>) {
        *self.reply_delay.lock().unwrap() = delay;
    }

    /// Change the server-side picking
    pub fn edit_snapshot(&self, edit: impl FnOnce(&mut Snapshot)) {
        if let Some(snapshot) = self.state.lock().unwrap().snapshot.as_mut() {
            edit(snapshot);
        }
    }

    pub fn server_qty_done(&self, line_id: LineId) -> Decimal {
        let state = self.state.lock().unwrap();
        state
            .snapshot
            .as_ref()
            .and_then(|s| s.lines.iter().find(|l| l.id == line_id))
            .map(|l| l.qty_done)
            .unwrap_or_default()
    }

    pub fn strict_calls(&self) -> Vec<StrictScanRequest> {
        self.state.lock().unwrap().strict_calls.clone()
    }

    pub fn offline_batches(&self) -> Vec<Vec<OfflineScan>> {
        self.state.lock().unwrap().offline_batches.clone()
    }

    pub fn log_batches(&self) -> Vec<Vec<LogEntry>> {
        self.state.lock().unwrap().log_batches.clone()
    }

    pub fn scan_events(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().scan_events.clone()
    }

    fn check_network(&self) -> RemoteResult<()> {
        if self.network_down.load(Ordering::SeqCst) {
            Err(RemoteError::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }

    /// Count one unit on the first matching open line, server side
    fn apply(
        state: &mut ServerState,
        barcode: &str,
        location_id: LocationId,
    ) -> Option<(LineId, Decimal)> {
        let snapshot = state.snapshot.as_mut()?;
        let (product_id, lot_id) = if let Some(lot) = snapshot.lots_by_barcode.get(barcode) {
            (lot.product_id, Some(lot.id))
        } else {
            (snapshot.products_by_barcode.get(barcode)?.id, None)
        };
        let line = snapshot.lines.iter_mut().find(|l| {
            l.product_id == product_id
                && l.source_location_id == location_id
                && (lot_id.is_none() || l.lot_id.is_none() || l.lot_id == lot_id)
                && l.qty_done < l.qty_reserved
        })?;
        line.qty_done += Decimal::ONE;
        Some((line.id, line.qty_done))
    }

    fn strict_response(
        state: &mut ServerState,
        request: &StrictScanRequest,
        mode: StrictMode,
    ) -> RemoteResult<StrictScanResponse> {
        match mode {
            // Same scan_id already counted
            StrictMode::Accept if state.processed.contains(&request.scan_id) => {
                Ok(StrictScanResponse {
                    status: RpcStatus::Success,
                    message: format!("Scanned: {}", request.barcode),
                    error_code: None,
                    details: None,
                })
            }
            StrictMode::Accept => match Self::apply(state, &request.barcode, request.location_id) {
                Some((line_id, qty_done)) => {
                    state.processed.insert(request.scan_id.clone());
                    Ok(StrictScanResponse {
                        status: RpcStatus::Success,
                        message: format!("Scanned: {}", request.barcode),
                        error_code: None,
                        details: Some(ScanDetails {
                            line_id: Some(line_id),
                            qty_done: Some(qty_done),
                            qty_remaining: None,
                        }),
                    })
                }
                None => Ok(StrictScanResponse {
                    status: RpcStatus::Error,
                    message: "Quantity exceeded".into(),
                    error_code: Some("qty_exceeded".into()),
                    details: None,
                }),
            },
            StrictMode::Reject { code, message } => Ok(StrictScanResponse {
                status: RpcStatus::Error,
                message,
                error_code: Some(code),
                details: None,
            }),
            StrictMode::Raise(message) => Err(RemoteError::Server(message)),
        }
    }
}

#[async_trait]
impl PickingBackend for MockBackend {
    async fn fetch_snapshot(&self, _picking_id: PickingId) -> RemoteResult<SnapshotResponse> {
        self.check_network()?;
        if self.snapshot_unavailable.load(Ordering::SeqCst) {
            return Ok(SnapshotResponse {
                status: RpcStatus::Error,
                message: Some("Picking not found".into()),
                data: None,
            });
        }
        let snapshot = self.state.lock().unwrap().snapshot.clone();
        Ok(SnapshotResponse {
            status: RpcStatus::Success,
            message: None,
            data: snapshot,
        })
    }

    async fn submit_strict_scan(
        &self,
        request: &StrictScanRequest,
    ) -> RemoteResult<StrictScanResponse> {
        let delay = *self.strict_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_network()?;

        let mode = self.strict_mode.lock().unwrap().clone();
        let response = {
            let mut state = self.state.lock().unwrap();
            state.strict_calls.push(request.clone());
            Self::strict_response(&mut state, request, mode)
        };

        let reply_delay = *self.reply_delay.lock().unwrap();
        if let Some(delay) = reply_delay {
            tokio::time::sleep(delay).await;
        }
        response
    }

    async fn submit_offline_scans(
        &self,
        _picking_id: PickingId,
        scans: &[OfflineScan],
    ) -> RemoteResult<OfflineSyncResponse> {
        self.check_network()?;
        let mut state = self.state.lock().unwrap();
        state.offline_batches.push(scans.to_vec());
        if self.refuse_batches.load(Ordering::SeqCst) {
            return Ok(OfflineSyncResponse {
                status: RpcStatus::Error,
                message: Some("batch refused".into()),
            });
        }
        for scan in scans {
            // scan_id makes replays harmless
            if state.processed.insert(scan.scan_id.clone()) {
                Self::apply(&mut state, &scan.barcode, scan.location_id);
            }
        }
        Ok(OfflineSyncResponse {
            status: RpcStatus::Success,
            message: None,
        })
    }

    async fn submit_offline_logs(
        &self,
        _picking_id: PickingId,
        logs: &[LogEntry],
    ) -> RemoteResult<bool> {
        self.check_network()?;
        self.state.lock().unwrap().log_batches.push(logs.to_vec());
        Ok(true)
    }

    async fn log_scan_event(&self, barcode: &str, status: &str, message: &str) -> RemoteResult<()> {
        self.check_network()?;
        self.state
            .lock()
            .unwrap()
            .scan_events
            .push((barcode.into(), status.into(), message.into()));
        Ok(())
    }
}

/// Notifier that keeps everything it was asked to show
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
    dialogs: Mutex<Vec<Dialog>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn dialogs(&self) -> Vec<Dialog> {
        self.dialogs.lock().unwrap().clone()
    }

    pub fn last_dialog(&self) -> Option<Dialog> {
        self.dialogs.lock().unwrap().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    fn alert(&self, dialog: Dialog) {
        self.dialogs.lock().unwrap().push(dialog);
    }
}

fn line(
    id: LineId,
    product_id: ProductId,
    lot_id: Option<LotId>,
    src: LocationId,
    reserved: i64,
) -> SnapshotLine {
    SnapshotLine {
        id,
        product_id,
        lot_id,
        source_location_id: src,
        dest_location_id: STOCK,
        qty_reserved: Decimal::from(reserved),
        qty_done: Decimal::ZERO,
        available_qty_at_source: Decimal::from(reserved),
    }
}

/// Outgoing picking:
/// - line 1: P1 x2 at L1
/// - line 2: P2 (lot tracked, LOT-A) x1 at L1
/// - line 3: P1 x1 at L2
pub fn picking_snapshot() -> Snapshot {
    let mut snapshot = Snapshot {
        picking_id: PICKING,
        name: "WH/OUT/00007".into(),
        operation: OperationKind::Outgoing,
        lines: vec![
            line(1, P1, None, L1, 2),
            line(2, P2, Some(LOT_A), L1, 1),
            line(3, P1, None, L2, 1),
        ],
        locations_by_barcode: HashMap::new(),
        products_by_barcode: HashMap::new(),
        lots_by_barcode: HashMap::new(),
    };
    snapshot
        .locations_by_barcode
        .insert("L1".into(), LocationRef { id: L1, name: "WH/Stock/Shelf 1".into() });
    snapshot
        .locations_by_barcode
        .insert("L2".into(), LocationRef { id: L2, name: "WH/Stock/Shelf 2".into() });
    snapshot.products_by_barcode.insert(
        "P1".into(),
        ProductRef { id: P1, name: "Product 1".into(), tracking: Tracking::None },
    );
    snapshot.products_by_barcode.insert(
        "P2".into(),
        ProductRef { id: P2, name: "Product 2".into(), tracking: Tracking::Lot },
    );
    snapshot.lots_by_barcode.insert(
        "LOT-A".into(),
        LotRef { id: LOT_A, name: "LOT-A".into(), product_id: P2 },
    );
    snapshot
}

pub fn test_config() -> GuardConfig {
    GuardConfig::new("http://erp.test")
        .with_remote_timeout_ms(1000)
        .with_sync_interval_secs(1)
}

pub struct Harness {
    pub guard: PickingGuard,
    pub backend: Arc<MockBackend>,
    pub notifier: Arc<RecordingNotifier>,
    pub storage: LocalStorage,
}

pub fn open_guard(
    storage: LocalStorage,
    backend: Arc<MockBackend>,
    config: GuardConfig,
) -> Harness {
    let notifier = Arc::new(RecordingNotifier::default());
    let guard = PickingGuard::open(
        config,
        PICKING,
        storage.clone(),
        backend.clone(),
        notifier.clone(),
    )
    .unwrap();
    Harness {
        guard,
        backend,
        notifier,
        storage,
    }
}

/// Loaded guard over an in-memory database
pub async fn loaded(snapshot: Snapshot) -> Harness {
    let storage = LocalStorage::open_in_memory().unwrap();
    let harness = open_guard(storage, MockBackend::new(snapshot), test_config());
    harness.guard.load().await.unwrap();
    harness
}

/// Let spawned fire-and-forget tasks run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
