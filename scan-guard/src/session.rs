//! Session store: persisted scan queue + audit log of the current picking
//!
//! Every mutation is written through to [`LocalStorage`] before returning.
//! Restore order: encrypted envelope → plain JSON (legacy) → fresh session.

use shared::picking::{LogEntry, PickingId, ScanEntry, Session, SyncStatus};
use thiserror::Error;

use crate::crypto::{self, CipherEnvelope, CryptoError, SessionKey};
use crate::storage::{LocalStorage, StorageError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Scan {0} already recorded")]
    DuplicateScan(String),

    #[error("Scan {0} not found")]
    ScanNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// How the session was obtained on open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Decrypted from an envelope
    Restored,
    /// Parsed from a plain-text blob
    RestoredPlaintext,
    /// Nothing stored for this picking
    Created,
    /// Stored blob unreadable, replaced by a fresh session
    RecoveredCorrupt,
}

/// Server verdict recorded on a scan
#[derive(Debug, Clone, Default)]
pub struct SyncDetail {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

pub struct SessionStore {
    storage: LocalStorage,
    /// `None` = explicit plaintext persistence
    key: Option<SessionKey>,
    session: Session,
    outcome: RestoreOutcome,
}

impl SessionStore {
    /// Restore the session of `picking_id` or create a new one
    ///
    /// Only storage failures are errors; unreadable blobs are recovered.
    pub fn restore_or_create(
        storage: LocalStorage,
        key: Option<SessionKey>,
        picking_id: PickingId,
    ) -> SessionResult<Self> {
        if key.is_none() {
            tracing::warn!(picking_id, "Session encryption unavailable, persisting in plaintext");
        }

        let (session, outcome) = match storage.load_session_blob(picking_id)? {
            None => (Session::new(picking_id), RestoreOutcome::Created),
            Some(blob) => match Self::decode(&blob, key.as_ref(), picking_id) {
                Some((session, outcome)) => (session, outcome),
                None => {
                    tracing::warn!(
                        picking_id,
                        code = %shared::ErrorCode::SessionCorrupt,
                        "Stored session unreadable, discarding it"
                    );
                    (Session::new(picking_id), RestoreOutcome::RecoveredCorrupt)
                }
            },
        };

        let store = Self {
            storage,
            key,
            session,
            outcome,
        };

        if outcome != RestoreOutcome::Restored {
            // Write back so the slot holds the current format (and drops corrupt data)
            store.persist()?;
        }

        tracing::debug!(
            picking_id,
            session_id = %store.session.id,
            scans = store.session.scans.len(),
            logs = store.session.logs.len(),
            ?outcome,
            "Scan session opened"
        );
        Ok(store)
    }

    fn decode(
        blob: &[u8],
        key: Option<&SessionKey>,
        picking_id: PickingId,
    ) -> Option<(Session, RestoreOutcome)> {
        if let Some(key) = key
            && let Ok(envelope) = serde_json::from_slice::<CipherEnvelope>(blob)
            && let Some(session) = crypto::decrypt::<Session>(key, &envelope)
        {
            return (session.picking_id == picking_id)
                .then_some((session, RestoreOutcome::Restored));
        }

        serde_json::from_slice::<Session>(blob)
            .ok()
            .filter(|session| session.picking_id == picking_id)
            .map(|session| (session, RestoreOutcome::RestoredPlaintext))
    }

    /// Encrypt (when a key is present) and write the session
    pub fn persist(&self) -> SessionResult<()> {
        let blob = match &self.key {
            Some(key) => serde_json::to_vec(&crypto::encrypt(key, &self.session)?)
                .map_err(CryptoError::from)?,
            None => serde_json::to_vec(&self.session).map_err(StorageError::from)?,
        };
        self.storage
            .store_session_blob(self.session.picking_id, &blob)?;
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn outcome(&self) -> RestoreOutcome {
        self.outcome
    }

    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    /// Append a scan and persist
    ///
    /// Nothing is kept in memory when the write fails.
    pub fn append_scan(&mut self, entry: ScanEntry) -> SessionResult<()> {
        if self.session.scans.iter().any(|s| s.scan_id == entry.scan_id) {
            return Err(SessionError::DuplicateScan(entry.scan_id));
        }
        self.session.scans.push(entry);
        if let Err(e) = self.persist() {
            self.session.scans.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Append an audit entry and persist
    pub fn append_log(&mut self, entry: LogEntry) -> SessionResult<()> {
        self.session.logs.push(entry);
        if let Err(e) = self.persist() {
            self.session.logs.pop();
            return Err(e);
        }
        Ok(())
    }

    pub fn unsynced_scans(&self) -> Vec<&ScanEntry> {
        self.session.scans.iter().filter(|s| !s.synced).collect()
    }

    /// Unsynced logs with their positions (logs are append-only, positions are stable)
    pub fn unsynced_logs(&self) -> Vec<(usize, &LogEntry)> {
        self.session
            .logs
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.synced)
            .collect()
    }

    pub fn has_unsynced(&self) -> bool {
        self.session.has_unsynced()
    }

    /// Mark one scan synced and persist
    ///
    /// Returns `false` (and writes nothing) when the scan was already synced.
    pub fn mark_synced(
        &mut self,
        scan_id: &str,
        status: SyncStatus,
        detail: Option<SyncDetail>,
    ) -> SessionResult<bool> {
        let changed = self.apply_synced(scan_id, status, detail)?;
        if changed {
            self.persist()?;
        }
        Ok(changed)
    }

    /// Mark a batch of scans synced with one write
    pub fn mark_scans_synced(
        &mut self,
        scan_ids: &[String],
        status: SyncStatus,
    ) -> SessionResult<usize> {
        let mut changed = 0;
        for scan_id in scan_ids {
            if self.apply_synced(scan_id, status, None)? {
                changed += 1;
            }
        }
        if changed > 0 {
            self.persist()?;
        }
        Ok(changed)
    }

    fn apply_synced(
        &mut self,
        scan_id: &str,
        status: SyncStatus,
        detail: Option<SyncDetail>,
    ) -> SessionResult<bool> {
        let entry = self
            .session
            .scans
            .iter_mut()
            .find(|s| s.scan_id == scan_id)
            .ok_or_else(|| SessionError::ScanNotFound(scan_id.to_string()))?;

        if entry.synced {
            return Ok(false);
        }
        entry.synced = true;
        entry.last_sync_status = Some(status);
        if let Some(detail) = detail {
            entry.error_code = detail.error_code;
            entry.error_message = detail.error_message;
        }
        Ok(true)
    }

    /// Mark logs at the given positions synced with one write
    pub fn mark_logs_synced(&mut self, positions: &[usize]) -> SessionResult<usize> {
        let mut changed = 0;
        for &pos in positions {
            if let Some(log) = self.session.logs.get_mut(pos)
                && !log.synced
            {
                log.synced = true;
                changed += 1;
            }
        }
        if changed > 0 {
            self.persist()?;
        }
        Ok(changed)
    }

    /// Drop the persisted blob (picking finished or abandoned)
    pub fn discard(&mut self) -> SessionResult<()> {
        self.storage.delete_session_blob(self.session.picking_id)?;
        tracing::info!(session_id = %self.session.id, "Scan session discarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::flaky::FlakyBackend;
    use shared::picking::LogEventType;
    use std::sync::atomic::Ordering;

    fn open(storage: &LocalStorage, key: Option<SessionKey>) -> SessionStore {
        SessionStore::restore_or_create(storage.clone(), key, 7).unwrap()
    }

    #[test]
    fn test_create_then_restore_encrypted() {
        let storage = LocalStorage::open_in_memory().unwrap();
        let key = SessionKey::generate();

        let mut store = open(&storage, Some(key.clone()));
        assert_eq!(store.outcome(), RestoreOutcome::Created);
        store.append_scan(ScanEntry::new("P001", 1, None, Some(1))).unwrap();
        store
            .append_log(LogEntry::new(LogEventType::Scan).with_barcode("P001"))
            .unwrap();
        let original = store.session().clone();

        let restored = open(&storage, Some(key));
        assert_eq!(restored.outcome(), RestoreOutcome::Restored);
        assert_eq!(restored.session(), &original);
    }

    #[test]
    fn test_blob_is_not_plaintext_when_encrypted() {
        let storage = LocalStorage::open_in_memory().unwrap();
        let mut store = open(&storage, Some(SessionKey::generate()));
        store.append_scan(ScanEntry::new("SECRET-BARCODE", 1, None, None)).unwrap();

        let blob = storage.load_session_blob(7).unwrap().unwrap();
        let text = String::from_utf8(blob).unwrap();
        assert!(!text.contains("SECRET-BARCODE"));
        assert!(text.contains("\"iv\""));
    }

    #[test]
    fn test_restore_plaintext_legacy_blob() {
        let storage = LocalStorage::open_in_memory().unwrap();
        let mut legacy = Session::new(7);
        legacy.scans.push(ScanEntry::new("P001", 1, None, None));
        storage
            .store_session_blob(7, &serde_json::to_vec(&legacy).unwrap())
            .unwrap();

        let store = open(&storage, Some(SessionKey::generate()));
        assert_eq!(store.outcome(), RestoreOutcome::RestoredPlaintext);
        assert_eq!(store.session(), &legacy);

        // Rewritten in the encrypted format
        let blob = storage.load_session_blob(7).unwrap().unwrap();
        assert!(serde_json::from_slice::<CipherEnvelope>(&blob).is_ok());
    }

    #[test]
    fn test_corrupt_blob_recovered() {
        let storage = LocalStorage::open_in_memory().unwrap();
        storage.store_session_blob(7, b"{not json").unwrap();

        let store = open(&storage, Some(SessionKey::generate()));
        assert_eq!(store.outcome(), RestoreOutcome::RecoveredCorrupt);
        assert!(store.session().scans.is_empty());
    }

    #[test]
    fn test_other_key_is_corrupt() {
        let storage = LocalStorage::open_in_memory().unwrap();
        let mut store = open(&storage, Some(SessionKey::generate()));
        store.append_scan(ScanEntry::new("P001", 1, None, None)).unwrap();

        let store = open(&storage, Some(SessionKey::generate()));
        assert_eq!(store.outcome(), RestoreOutcome::RecoveredCorrupt);
    }

    #[test]
    fn test_plaintext_mode() {
        let storage = LocalStorage::open_in_memory().unwrap();
        let mut store = open(&storage, None);
        assert!(!store.is_encrypted());
        store.append_scan(ScanEntry::new("P001", 1, None, None)).unwrap();

        let blob = storage.load_session_blob(7).unwrap().unwrap();
        let session: Session = serde_json::from_slice(&blob).unwrap();
        assert_eq!(session.scans.len(), 1);
    }

    #[test]
    fn test_duplicate_scan_id_rejected() {
        let storage = LocalStorage::open_in_memory().unwrap();
        let mut store = open(&storage, None);
        let entry = ScanEntry::new("P001", 1, None, None);
        store.append_scan(entry.clone()).unwrap();
        assert!(matches!(
            store.append_scan(entry),
            Err(SessionError::DuplicateScan(_))
        ));
        assert_eq!(store.session().scans.len(), 1);
    }

    #[test]
    fn test_failed_write_keeps_no_entry() {
        let (backend, failing) = FlakyBackend::new();
        let storage = LocalStorage::open_with_backend(backend).unwrap();
        let mut store = open(&storage, None);
        store.append_scan(ScanEntry::new("P001", 1, None, Some(1))).unwrap();

        failing.store(true, Ordering::SeqCst);
        assert!(store.append_scan(ScanEntry::new("P002", 1, None, Some(1))).is_err());
        assert!(store.append_log(LogEntry::new(LogEventType::Scan)).is_err());

        assert_eq!(store.session().scans.len(), 1);
        assert_eq!(store.session().scans[0].barcode, "P001");
        assert!(store.session().logs.is_empty());
        assert_eq!(store.unsynced_scans().len(), 1);
    }

    #[test]
    fn test_mark_synced_idempotent() {
        let storage = LocalStorage::open_in_memory().unwrap();
        let mut store = open(&storage, None);
        let entry = ScanEntry::new("P001", 1, None, None);
        let id = entry.scan_id.clone();
        store.append_scan(entry).unwrap();
        assert_eq!(store.unsynced_scans().len(), 1);

        let detail = SyncDetail {
            error_code: Some("wrong_location".into()),
            error_message: Some("Invalid Location".into()),
        };
        assert!(store.mark_synced(&id, SyncStatus::Failed, Some(detail)).unwrap());
        assert!(!store.mark_synced(&id, SyncStatus::Success, None).unwrap());

        let scan = &store.session().scans[0];
        assert_eq!(scan.last_sync_status, Some(SyncStatus::Failed));
        assert_eq!(scan.error_message.as_deref(), Some("Invalid Location"));
        assert!(store.unsynced_scans().is_empty());
    }

    #[test]
    fn test_mark_logs_synced() {
        let storage = LocalStorage::open_in_memory().unwrap();
        let mut store = open(&storage, None);
        store.append_log(LogEntry::new(LogEventType::Scan)).unwrap();
        store.append_log(LogEntry::new(LogEventType::ValidationFail)).unwrap();

        let positions: Vec<usize> = store.unsynced_logs().iter().map(|(i, _)| *i).collect();
        assert_eq!(positions, vec![0, 1]);
        assert_eq!(store.mark_logs_synced(&positions).unwrap(), 2);
        assert_eq!(store.mark_logs_synced(&positions).unwrap(), 0);
        assert!(!store.has_unsynced());
    }

    #[test]
    fn test_discard() {
        let storage = LocalStorage::open_in_memory().unwrap();
        let mut store = open(&storage, None);
        store.discard().unwrap();
        assert!(storage.load_session_blob(7).unwrap().is_none());
    }
}
