//! Notification / dialog gateway
//!
//! The host UI implements [`Notifier`]; the guard only ever asks it to show a
//! transient notice or a blocking dialog.

use shared::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Danger,
}

/// Transient, non-blocking message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: Option<String>,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            title: None,
            message: message.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    /// Single "OK" button
    Acknowledge,
    /// Only way out is leaving the picking
    ExitOnly,
}

/// Blocking dialog the operator has to acknowledge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub kind: DialogKind,
    pub title: String,
    pub body: String,
}

impl Dialog {
    pub fn acknowledge(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: DialogKind::Acknowledge,
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn exit_only(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: DialogKind::ExitOnly,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Presentation capabilities provided by the host
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);

    fn alert(&self, dialog: Dialog);
}

/// Notifier that only writes to the log (headless hosts)
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Warning | NoticeLevel::Danger => {
                tracing::warn!(title = ?notice.title, "{}", notice.message)
            }
            _ => tracing::info!(title = ?notice.title, "{}", notice.message),
        }
    }

    fn alert(&self, dialog: Dialog) {
        tracing::warn!(kind = ?dialog.kind, title = %dialog.title, "{}", dialog.body);
    }
}

/// Dialog title shown for a rejection code
pub fn rejection_title(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::SystemNotReady => "System Not Ready",
        ErrorCode::LocationRequired => "Action Required",
        ErrorCode::WrongLocation => "Strict Location Validation",
        ErrorCode::LocationComplete => "Location Complete",
        ErrorCode::LotRequired | ErrorCode::LotMismatch => "Lot Required",
        ErrorCode::QuantityExceeded => "Quantity Exceeded",
        ErrorCode::UnauthorizedItem => "Invalid Item",
        ErrorCode::RemoteRejected => "Invalid Item",
        _ => "Error",
    }
}
