//! Guard configuration
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | SCAN_GUARD_BASE_URL | http://localhost:8069 | ERP base URL |
//! | SCAN_GUARD_DATA_DIR | ./scan-guard-data | Directory of the local database |
//! | SCAN_GUARD_REMOTE_TIMEOUT_MS | 5000 | Timeout of every remote call |
//! | SCAN_GUARD_SYNC_INTERVAL_SECS | 30 | Period of the background sync |
//! | SCAN_GUARD_ENCRYPT_SESSIONS | true | Encrypt sessions at rest |
//! | SCAN_GUARD_INCOMING_SIDE | destination | Location side checked on receipts |
//! | SCAN_GUARD_OUTGOING_SIDE | source | Location side checked on deliveries |
//! | SCAN_GUARD_INTERNAL_SIDE | source | Location side checked on internal transfers |

use shared::picking::{OperationKind, SnapshotLine};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DB_FILE_NAME: &str = "scan-guard.redb";

/// Which location of a line a location scan is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSide {
    Source,
    Destination,
}

impl LocationSide {
    pub fn of(&self, line: &SnapshotLine) -> shared::picking::LocationId {
        match self {
            LocationSide::Source => line.source_location_id,
            LocationSide::Destination => line.dest_location_id,
        }
    }
}

impl FromStr for LocationSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" | "src" => Ok(LocationSide::Source),
            "destination" | "dest" => Ok(LocationSide::Destination),
            other => Err(format!("unknown location side: {other}")),
        }
    }
}

/// Location-checking policy per operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationPolicy {
    pub incoming: LocationSide,
    pub outgoing: LocationSide,
    pub internal: LocationSide,
}

impl LocationPolicy {
    pub fn side_for(&self, operation: OperationKind) -> LocationSide {
        match operation {
            OperationKind::Incoming => self.incoming,
            OperationKind::Outgoing => self.outgoing,
            OperationKind::Internal => self.internal,
        }
    }
}

impl Default for LocationPolicy {
    fn default() -> Self {
        Self {
            incoming: LocationSide::Destination,
            outgoing: LocationSide::Source,
            internal: LocationSide::Source,
        }
    }
}

/// Configuration of a [`crate::PickingGuard`]
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// ERP base URL (e.g., "http://localhost:8069")
    pub base_url: String,

    /// Directory holding the local database
    pub data_dir: PathBuf,

    /// Remote call timeout in milliseconds
    pub remote_timeout_ms: u64,

    /// Background sync period in seconds
    pub sync_interval_secs: u64,

    /// Encrypt sessions at rest
    pub encrypt_sessions: bool,

    pub location_policy: LocationPolicy,

    /// Prefixes of administrative command barcodes handed back to the host
    pub command_prefixes: Vec<String>,
}

impl GuardConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            data_dir: PathBuf::from("./scan-guard-data"),
            remote_timeout_ms: 5000,
            sync_interval_secs: 30,
            encrypt_sessions: true,
            location_policy: LocationPolicy::default(),
            command_prefixes: vec!["O-CMD.".to_string(), "O-BTN.".to_string()],
        }
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::new(
            std::env::var("SCAN_GUARD_BASE_URL").unwrap_or_else(|_| "http://localhost:8069".into()),
        );
        if let Ok(dir) = std::env::var("SCAN_GUARD_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config.remote_timeout_ms = env_parse("SCAN_GUARD_REMOTE_TIMEOUT_MS").unwrap_or(5000);
        config.sync_interval_secs = env_parse("SCAN_GUARD_SYNC_INTERVAL_SECS").unwrap_or(30);
        config.encrypt_sessions = env_parse("SCAN_GUARD_ENCRYPT_SESSIONS").unwrap_or(true);
        if let Some(side) = env_parse("SCAN_GUARD_INCOMING_SIDE") {
            config.location_policy.incoming = side;
        }
        if let Some(side) = env_parse("SCAN_GUARD_OUTGOING_SIDE") {
            config.location_policy.outgoing = side;
        }
        if let Some(side) = env_parse("SCAN_GUARD_INTERNAL_SIDE") {
            config.location_policy.internal = side;
        }
        config
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_remote_timeout_ms(mut self, ms: u64) -> Self {
        self.remote_timeout_ms = ms;
        self
    }

    pub fn with_sync_interval_secs(mut self, secs: u64) -> Self {
        self.sync_interval_secs = secs;
        self
    }

    pub fn with_encryption(mut self, enabled: bool) -> Self {
        self.encrypt_sessions = enabled;
        self
    }

    pub fn with_location_policy(mut self, policy: LocationPolicy) -> Self {
        self.location_policy = policy;
        self
    }

    pub fn with_command_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.command_prefixes = prefixes;
        self
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Sync period, never below one second
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::new("http://localhost:8069")
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
