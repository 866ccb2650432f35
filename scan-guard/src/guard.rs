//! `PickingGuard`: the entry point the host calls for every scan
//!
//! Composition of the stores, the validator and the sync engine for one
//! device + picking pair. Lock order is validator → flight gate → session.

use shared::ErrorCode;
use shared::picking::{
    LineId, LocationId, LogEntry, LogEventType, PickingId, ScanEntry, Session, StrictScanRequest,
    StrictScanResponse, SyncStatus,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::GuardConfig;
use crate::crypto::KeyManager;
use crate::error::{GuardError, GuardResult};
use crate::notify::{Dialog, Notice, NoticeLevel, Notifier, rejection_title};
use crate::remote::{JsonRpcBackend, PickingBackend, RemoteError, with_timeout};
use crate::session::{RestoreOutcome, SessionStore, SyncDetail};
use crate::snapshot::{check_preflight_stock, load_snapshot};
use crate::storage::LocalStorage;
use crate::sync::{FlightGate, SyncEngine, SyncReport, SyncWorker};
use crate::validator::{AcceptedScan, Decision, LineProgress, Rejection, ScanValidator, normalize};

/// Result of one `on_scan` call, as seen by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    LocationLocked {
        location_id: LocationId,
        name: String,
    },
    /// Accepted locally and confirmed by the server
    Confirmed { scan_id: String, line_id: LineId },
    /// Accepted locally, server unreachable; waiting for the sync engine
    Queued { scan_id: String, line_id: LineId },
    /// Accepted locally, refused by the server (quantity rolled back)
    RejectedByServer {
        scan_id: String,
        error_code: Option<String>,
        message: String,
    },
    /// Refused locally
    Rejected(Rejection),
    /// Administrative token for the host
    Command(String),
}

impl ScanOutcome {
    /// Whether the scan counts toward a line quantity
    pub fn is_counted(&self) -> bool {
        matches!(self, ScanOutcome::Confirmed { .. } | ScanOutcome::Queued { .. })
    }
}

/// Strict validation layer of one picking
pub struct PickingGuard {
    picking_id: PickingId,
    config: GuardConfig,
    backend: Arc<dyn PickingBackend>,
    notifier: Arc<dyn Notifier>,
    validator: Arc<Mutex<ScanValidator>>,
    session: Arc<Mutex<SessionStore>>,
    gate: FlightGate,
    sync: SyncEngine,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl PickingGuard {
    /// Open the guard with explicit collaborators
    ///
    /// Restores the persisted session of the picking. Encryption degrades to
    /// plaintext (with a warning) when no key can be obtained.
    pub fn open(
        config: GuardConfig,
        picking_id: PickingId,
        storage: LocalStorage,
        backend: Arc<dyn PickingBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> GuardResult<Self> {
        let key = if config.encrypt_sessions {
            match KeyManager::new(storage.clone()).get_or_create_key() {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(
                        picking_id,
                        code = %ErrorCode::EncryptionFailed,
                        "Session key unavailable: {e}"
                    );
                    None
                }
            }
        } else {
            None
        };

        let store = SessionStore::restore_or_create(storage, key, picking_id)?;
        if store.outcome() == RestoreOutcome::RecoveredCorrupt {
            tracing::warn!(picking_id, "Previous scan session was unreadable, started a fresh one");
        }

        let validator = Arc::new(Mutex::new(ScanValidator::new(&config)));
        let session = Arc::new(Mutex::new(store));
        let gate: FlightGate = Arc::new(Mutex::new(()));
        let sync = SyncEngine::new(
            picking_id,
            backend.clone(),
            session.clone(),
            validator.clone(),
            gate.clone(),
            config.remote_timeout(),
        );

        Ok(Self {
            picking_id,
            config,
            backend,
            notifier,
            validator,
            session,
            gate,
            sync,
            shutdown: CancellationToken::new(),
            worker: None,
        })
    }

    /// Open against the ERP over JSON-RPC, with the database under `config.data_dir`
    pub fn connect(
        config: GuardConfig,
        picking_id: PickingId,
        notifier: Arc<dyn Notifier>,
    ) -> GuardResult<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            GuardError::Config(format!(
                "Cannot create data dir {}: {e}",
                config.data_dir.display()
            ))
        })?;
        let storage = LocalStorage::open(config.db_path())?;
        let backend = Arc::new(JsonRpcBackend::new(&config)?);
        Self::open(config, picking_id, storage, backend, notifier)
    }

    pub fn picking_id(&self) -> PickingId {
        self.picking_id
    }

    /// Fetch the snapshot, run the pre-flight gate and arm the validator
    ///
    /// Also the "reload" transition: lock cleared, snapshot refetched. Queued
    /// scans are flushed right away. On failure no snapshot stays installed
    /// and every scan is refused until a load succeeds.
    pub async fn load(&self) -> GuardResult<()> {
        let snapshot = match load_snapshot(
            self.backend.as_ref(),
            self.picking_id,
            self.config.remote_timeout(),
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(picking_id = self.picking_id, "Picking snapshot load failed: {e}");
                self.validator.lock().await.unload();
                self.notifier.notify(
                    Notice::new(NoticeLevel::Danger, "Failed to load picking data")
                        .with_title("Error"),
                );
                self.record(
                    LogEntry::new(LogEventType::Error)
                        .with_reason(e.code())
                        .with_details(e.to_string()),
                )
                .await;
                return Err(e);
            }
        };

        if let Some(reason) = check_preflight_stock(&snapshot) {
            tracing::warn!(
                picking_id = self.picking_id,
                line_id = reason.line_id,
                code = %ErrorCode::InsufficientStock,
                "Pre-flight stock check blocked the picking"
            );
            self.validator.lock().await.unload();
            self.notifier
                .alert(Dialog::exit_only("Cannot Start Picking", reason.message.clone()));
            self.record(
                LogEntry::new(LogEventType::ValidationFail)
                    .with_reason(ErrorCode::InsufficientStock)
                    .with_details(format!("Short stock: {}", reason.message)),
            )
            .await;
            return Err(GuardError::PreflightBlocked(reason.message));
        }

        let pending = {
            let mut validator = self.validator.lock().await;
            let session = self.session.lock().await;
            validator.install(snapshot);
            validator.rebuild_overlay(session.unsynced_scans().iter().filter_map(|s| s.line_id));
            session.has_unsynced()
        };
        tracing::info!(picking_id = self.picking_id, pending, "Strict picking ready");

        if pending {
            self.sync.sync().await;
        }
        Ok(())
    }

    /// Full reload of authoritative state
    pub async fn reload(&self) -> GuardResult<()> {
        tracing::info!(picking_id = self.picking_id, "Reloading picking");
        self.validator.lock().await.unload();
        self.load().await
    }

    /// Handle one raw scanned token
    ///
    /// Scans are serialized: the next call waits until this one, remote call
    /// included, is finished.
    pub async fn on_scan(&self, raw: &str) -> ScanOutcome {
        let mut validator = self.validator.lock().await;

        match validator.evaluate(raw) {
            Decision::Lock(location) => {
                tracing::info!(
                    picking_id = self.picking_id,
                    location_id = location.id,
                    "Location locked"
                );
                self.notifier.notify(
                    Notice::new(NoticeLevel::Success, format!("Location Locked: {}", location.name))
                        .with_title("Location"),
                );
                ScanOutcome::LocationLocked {
                    location_id: location.id,
                    name: location.name,
                }
            }
            Decision::Command(token) => {
                tracing::debug!(
                    picking_id = self.picking_id,
                    %token,
                    "Command token passed through"
                );
                ScanOutcome::Command(token)
            }
            Decision::Reject(rejection) => {
                self.reject_locally(&normalize(raw), rejection).await
            }
            Decision::Accept(scan) => self.submit(&mut validator, scan).await,
        }
    }

    async fn reject_locally(&self, barcode: &str, rejection: Rejection) -> ScanOutcome {
        tracing::info!(
            picking_id = self.picking_id,
            barcode,
            code = %rejection.code,
            category = rejection.code.category().name(),
            "Scan rejected: {}",
            rejection.message
        );
        self.notifier
            .alert(Dialog::acknowledge(rejection_title(rejection.code), rejection.message.clone()));
        self.record(
            LogEntry::new(LogEventType::ValidationFail)
                .with_barcode(barcode)
                .with_reason(rejection.code)
                .with_details(rejection.message.clone()),
        )
        .await;
        self.spawn_scan_event(barcode, &rejection.message);
        ScanOutcome::Rejected(rejection)
    }

    /// Record, count optimistically, then ask the server
    async fn submit(&self, validator: &mut ScanValidator, scan: AcceptedScan) -> ScanOutcome {
        // Held until the scan is resolved so a sync cycle never sees it half-done
        let _flight = self.gate.lock().await;

        let entry = ScanEntry::new(
            &scan.barcode,
            scan.location_id,
            scan.lot_id,
            Some(scan.line_id),
        );
        let scan_id = entry.scan_id.clone();
        if let Err(e) = self.session.lock().await.append_scan(entry) {
            tracing::error!(
                picking_id = self.picking_id,
                barcode = %scan.barcode,
                "Failed to record scan: {e}"
            );
            let rejection = Rejection::new(
                GuardError::from(e).code(),
                "Scan could not be saved on this device",
            );
            self.notifier
                .alert(Dialog::acknowledge("Error", rejection.message.clone()));
            return ScanOutcome::Rejected(rejection);
        }
        validator.apply_optimistic(scan.line_id);

        let request = StrictScanRequest {
            scan_id: scan_id.clone(),
            picking_id: self.picking_id,
            barcode: scan.barcode.clone(),
            location_id: scan.location_id,
            lot_id: scan.lot_id,
        };
        let result = with_timeout(
            self.config.remote_timeout(),
            self.backend.submit_strict_scan(&request),
        )
        .await;

        match result {
            Ok(response) if response.status.is_success() => {
                self.on_confirmed(validator, &scan, scan_id, response).await
            }
            Ok(response) => {
                let StrictScanResponse {
                    error_code,
                    message,
                    ..
                } = response;
                self.on_server_rejected(validator, &scan, scan_id, error_code, message).await
            }
            Err(e) if e.is_network() => self.on_queued(&scan, scan_id, &e).await,
            Err(RemoteError::Server(message)) => {
                self.on_server_rejected(validator, &scan, scan_id, None, message).await
            }
            Err(e) => {
                self.on_server_rejected(validator, &scan, scan_id, None, e.to_string())
                    .await
            }
        }
    }

    async fn on_confirmed(
        &self,
        validator: &mut ScanValidator,
        scan: &AcceptedScan,
        scan_id: String,
        response: StrictScanResponse,
    ) -> ScanOutcome {
        self.mark(&scan_id, SyncStatus::Success, None).await;

        if let Some(details) = &response.details
            && let Some(qty_done) = details.qty_done
        {
            let line_id = details.line_id.unwrap_or(scan.line_id);
            if line_id != scan.line_id {
                // Counted by the server on another line
                validator.rollback(scan.line_id);
            }
            let queued = self
                .session
                .lock()
                .await
                .unsynced_scans()
                .iter()
                .filter(|s| s.line_id == Some(line_id))
                .count();
            validator.reconcile(line_id, qty_done, queued);
        }

        tracing::info!(
            picking_id = self.picking_id,
            barcode = %scan.barcode,
            %scan_id,
            line_id = scan.line_id,
            "Scan confirmed"
        );
        let message = if response.message.is_empty() {
            format!("Scanned: {}", scan.barcode)
        } else {
            response.message
        };
        self.notifier.notify(Notice::new(NoticeLevel::Success, message));
        self.record(
            LogEntry::new(LogEventType::Scan)
                .with_barcode(&scan.barcode)
                .with_details("success"),
        )
        .await;

        ScanOutcome::Confirmed {
            scan_id,
            line_id: scan.line_id,
        }
    }

    async fn on_server_rejected(
        &self,
        validator: &mut ScanValidator,
        scan: &AcceptedScan,
        scan_id: String,
        error_code: Option<String>,
        message: String,
    ) -> ScanOutcome {
        validator.rollback(scan.line_id);
        self.mark(
            &scan_id,
            SyncStatus::Failed,
            Some(SyncDetail {
                error_code: error_code.clone(),
                error_message: Some(message.clone()),
            }),
        )
        .await;

        tracing::warn!(
            picking_id = self.picking_id,
            barcode = %scan.barcode,
            %scan_id,
            error_code = ?error_code,
            "Scan rejected by server: {message}"
        );
        self.notifier.alert(Dialog::acknowledge(
            rejection_title(ErrorCode::RemoteRejected),
            message.clone(),
        ));
        self.record(
            LogEntry::new(LogEventType::Scan)
                .with_barcode(&scan.barcode)
                .with_reason(ErrorCode::RemoteRejected)
                .with_details(format!("failed: {message}")),
        )
        .await;
        self.spawn_scan_event(&scan.barcode, &message);

        ScanOutcome::RejectedByServer {
            scan_id,
            error_code,
            message,
        }
    }

    async fn on_queued(
        &self,
        scan: &AcceptedScan,
        scan_id: String,
        error: &RemoteError,
    ) -> ScanOutcome {
        tracing::warn!(
            picking_id = self.picking_id,
            barcode = %scan.barcode,
            %scan_id,
            code = %ErrorCode::NetworkUnavailable,
            "Server unreachable, scan queued: {error}"
        );
        self.notifier.notify(
            Notice::new(NoticeLevel::Warning, "Offline: scan saved and queued for sync")
                .with_title("Offline"),
        );
        self.record(
            LogEntry::new(LogEventType::Scan)
                .with_barcode(&scan.barcode)
                .with_reason(ErrorCode::NetworkUnavailable)
                .with_details("queued"),
        )
        .await;

        ScanOutcome::Queued {
            scan_id,
            line_id: scan.line_id,
        }
    }

    async fn mark(&self, scan_id: &str, status: SyncStatus, detail: Option<SyncDetail>) {
        if let Err(e) = self.session.lock().await.mark_synced(scan_id, status, detail) {
            tracing::error!(
                picking_id = self.picking_id,
                scan_id,
                "Failed to persist scan status: {e}"
            );
        }
    }

    /// Append an audit entry; persistence failures only reach the log
    async fn record(&self, entry: LogEntry) {
        let event_type = entry.event_type;
        if let Err(e) = self.session.lock().await.append_log(entry) {
            tracing::error!(
                picking_id = self.picking_id,
                %event_type,
                "Failed to persist audit entry: {e}"
            );
        }
    }

    /// Best-effort server-side scan log, never awaited
    fn spawn_scan_event(&self, barcode: &str, message: &str) {
        let backend = self.backend.clone();
        let timeout = self.config.remote_timeout();
        let barcode = barcode.to_string();
        let message = message.to_string();
        tokio::spawn(async move {
            let call = backend.log_scan_event(&barcode, "FAILURE", &message);
            if let Err(e) = with_timeout(timeout, call).await {
                tracing::debug!(%barcode, "Scan event not delivered: {e}");
            }
        });
    }

    /// Run one sync cycle now (refreshes the snapshot if scans were taken)
    pub async fn sync_now(&self) -> SyncReport {
        self.sync.sync().await
    }

    /// Connectivity indicator, driven by the host
    pub fn set_online(&self, online: bool) {
        self.sync.set_online(online);
    }

    pub fn is_online(&self) -> bool {
        self.sync.is_online()
    }

    /// Spawn the periodic sync task (idempotent)
    pub fn start_sync(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let worker = SyncWorker::new(
            self.sync.clone(),
            self.config.sync_interval(),
            self.shutdown.child_token(),
        );
        self.worker = Some(tokio::spawn(worker.run()));
    }

    /// Stop the periodic sync task and wait for it
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.worker.take()
            && let Err(e) = handle.await
        {
            tracing::error!(picking_id = self.picking_id, "Sync worker panicked: {e}");
        }
    }

    /// End the picking session
    ///
    /// Stops the sync task and runs a last cycle. The local session is
    /// deleted only when nothing is left unsynced; returns whether it was.
    pub async fn finish(mut self) -> GuardResult<bool> {
        self.shutdown().await;
        let report = self.sync.sync().await;

        let mut session = self.session.lock().await;
        if session.has_unsynced() {
            tracing::warn!(
                picking_id = self.picking_id,
                outcome = ?report.outcome,
                "Picking finished with unsynced entries, session kept"
            );
            return Ok(false);
        }
        session.discard()?;
        Ok(true)
    }

    pub async fn active_location(&self) -> Option<LocationId> {
        self.validator.lock().await.active_location()
    }

    pub async fn is_ready(&self) -> bool {
        self.validator.lock().await.is_ready()
    }

    pub async fn progress(&self) -> Vec<LineProgress> {
        self.validator.lock().await.progress()
    }

    /// All lines fully scanned, optimistic quantities included
    pub async fn is_complete(&self) -> bool {
        self.validator.lock().await.is_complete()
    }

    /// Copy of the current session
    pub async fn session(&self) -> Session {
        self.session.lock().await.session().clone()
    }
}

impl Drop for PickingGuard {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
