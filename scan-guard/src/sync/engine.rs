use shared::picking::{OfflineScan, PickingId, SyncStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::remote::{PickingBackend, RemoteError, with_timeout};
use crate::session::SessionStore;
use crate::snapshot::load_snapshot;
use crate::validator::ScanValidator;

/// Held by whoever talks to the ERP about scans (live scan or sync cycle)
pub type FlightGate = Arc<Mutex<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Connectivity indicator is down
    Offline,
    /// Another cycle or a live scan holds the gate
    Busy,
    /// Nothing unsynced
    Idle,
    Completed,
    /// Network failure mid-cycle, entries left for the next tick
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: CycleOutcome,
    pub scans_synced: usize,
    pub logs_synced: usize,
}

impl SyncReport {
    fn skipped(outcome: CycleOutcome) -> Self {
        Self {
            outcome,
            scans_synced: 0,
            logs_synced: 0,
        }
    }
}

#[derive(Clone)]
pub struct SyncEngine {
    picking_id: PickingId,
    backend: Arc<dyn PickingBackend>,
    session: Arc<Mutex<SessionStore>>,
    validator: Arc<Mutex<ScanValidator>>,
    gate: FlightGate,
    online: Arc<AtomicBool>,
    timeout: Duration,
}

impl SyncEngine {
    pub fn new(
        picking_id: PickingId,
        backend: Arc<dyn PickingBackend>,
        session: Arc<Mutex<SessionStore>>,
        validator: Arc<Mutex<ScanValidator>>,
        gate: FlightGate,
        timeout: Duration,
    ) -> Self {
        Self {
            picking_id,
            backend,
            session,
            validator,
            gate,
            online: Arc::new(AtomicBool::new(true)),
            timeout,
        }
    }

    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            tracing::info!(picking_id = self.picking_id, online, "Connectivity changed");
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Cycle, then refetch the snapshot if the server took any scans
    pub async fn sync(&self) -> SyncReport {
        let report = self.run_cycle().await;
        if report.scans_synced > 0 {
            self.refresh_snapshot().await;
        }
        report
    }

    /// One flush of every unsynced scan and log
    ///
    /// No-op when offline, when the gate is held, or when nothing is pending.
    pub async fn run_cycle(&self) -> SyncReport {
        if !self.is_online() {
            return SyncReport::skipped(CycleOutcome::Offline);
        }
        let Ok(_flight) = self.gate.try_lock() else {
            tracing::debug!(picking_id = self.picking_id, "Sync skipped, remote call in flight");
            return SyncReport::skipped(CycleOutcome::Busy);
        };

        let (scans, scan_ids, log_positions, logs) = {
            let session = self.session.lock().await;
            if !session.has_unsynced() {
                return SyncReport::skipped(CycleOutcome::Idle);
            }
            let pending = session.unsynced_scans();
            let scans: Vec<OfflineScan> = pending.iter().map(|s| OfflineScan::from(*s)).collect();
            let scan_ids: Vec<String> = pending.iter().map(|s| s.scan_id.clone()).collect();
            let (log_positions, logs): (Vec<usize>, Vec<_>) = session
                .unsynced_logs()
                .into_iter()
                .map(|(i, l)| (i, l.clone()))
                .unzip();
            (scans, scan_ids, log_positions, logs)
        };

        let mut report = SyncReport {
            outcome: CycleOutcome::Completed,
            scans_synced: 0,
            logs_synced: 0,
        };

        if !scans.is_empty() {
            let call = self.backend.submit_offline_scans(self.picking_id, &scans);
            match with_timeout(self.timeout, call).await {
                Ok(response) if response.status.is_success() => {
                    match self
                        .session
                        .lock()
                        .await
                        .mark_scans_synced(&scan_ids, SyncStatus::Success)
                    {
                        Ok(n) => report.scans_synced = n,
                        Err(e) => {
                            tracing::error!(
                                picking_id = self.picking_id,
                                "Failed to persist synced scans: {e}"
                            );
                        }
                    }
                }
                Ok(response) => {
                    tracing::warn!(
                        picking_id = self.picking_id,
                        count = scans.len(),
                        message = ?response.message,
                        "Offline scan batch refused, kept for retry"
                    );
                }
                Err(e) => {
                    if let Some(aborted) = self.abort_on_network(&e, report) {
                        return aborted;
                    }
                    tracing::warn!(picking_id = self.picking_id, "Offline scan batch failed: {e}");
                }
            }
        }

        if !logs.is_empty() {
            let call = self.backend.submit_offline_logs(self.picking_id, &logs);
            match with_timeout(self.timeout, call).await {
                Ok(true) => match self.session.lock().await.mark_logs_synced(&log_positions) {
                    Ok(n) => report.logs_synced = n,
                    Err(e) => {
                        tracing::error!(
                            picking_id = self.picking_id,
                            "Failed to persist synced logs: {e}"
                        );
                    }
                },
                Ok(false) => {
                    tracing::warn!(
                        picking_id = self.picking_id,
                        count = logs.len(),
                        "Log batch not acknowledged"
                    );
                }
                Err(e) => {
                    if let Some(aborted) = self.abort_on_network(&e, report) {
                        return aborted;
                    }
                    tracing::warn!(picking_id = self.picking_id, "Log batch failed: {e}");
                }
            }
        }

        tracing::info!(
            picking_id = self.picking_id,
            scans = report.scans_synced,
            logs = report.logs_synced,
            "Sync cycle completed"
        );
        report
    }

    fn abort_on_network(&self, error: &RemoteError, report: SyncReport) -> Option<SyncReport> {
        if !error.is_network() {
            return None;
        }
        tracing::warn!(picking_id = self.picking_id, "Sync cycle aborted: {error}");
        Some(SyncReport {
            outcome: CycleOutcome::Aborted,
            ..report
        })
    }

    /// Refetch the authoritative snapshot and rebuild the overlay from
    /// scans still queued
    ///
    /// Failures keep the current snapshot. The validator stays locked across
    /// the fetch so no scan lands between fetch and install.
    pub async fn refresh_snapshot(&self) {
        let mut validator = self.validator.lock().await;
        let fetched = load_snapshot(self.backend.as_ref(), self.picking_id, self.timeout).await;
        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(picking_id = self.picking_id, "Snapshot refresh failed: {e}");
                return;
            }
        };

        let session = self.session.lock().await;
        validator.refresh(snapshot);
        validator.rebuild_overlay(session.unsynced_scans().iter().filter_map(|s| s.line_id));
        tracing::debug!(picking_id = self.picking_id, "Snapshot refreshed after sync");
    }
}
