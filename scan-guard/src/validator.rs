//! Scan validator: the location → product → quantity state machine
//!
//! Pure decision engine: it never talks to storage or the network. The guard
//! feeds it raw tokens and applies the resulting [`Decision`].
//!
//! Quantities scanned locally but not yet confirmed by the server live in an
//! overlay (`line_id -> delta`) on top of the immutable snapshot.

use rust_decimal::Decimal;
use shared::ErrorCode;
use shared::picking::{
    LineId, LocationId, LocationRef, LotId, LotRef, ProductId, ProductRef, SnapshotLine,
};
use std::collections::HashMap;

use crate::config::{GuardConfig, LocationPolicy, LocationSide};
use crate::snapshot::{Classification, LoadedSnapshot, remaining};

/// Typed, operator-facing rejection of one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: ErrorCode,
    pub message: String,
}

impl Rejection {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ErrorCode> for Rejection {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, code.message())
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A product/lot scan that passed every local check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedScan {
    pub barcode: String,
    pub line_id: LineId,
    pub product_id: ProductId,
    pub lot_id: Option<LotId>,
    pub location_id: LocationId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Location locked (any previous lock replaced)
    Lock(LocationRef),
    Accept(AcceptedScan),
    /// Administrative token, handed back to the host untouched
    Command(String),
    Reject(Rejection),
}

/// Per-line progress including optimistic quantities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineProgress {
    pub line_id: LineId,
    pub product_id: ProductId,
    pub lot_id: Option<LotId>,
    pub qty_reserved: Decimal,
    pub qty_done: Decimal,
    pub qty_remaining: Decimal,
}

/// Strip control characters (NUL, CR, LF, GS...) and surrounding whitespace
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct ScanValidator {
    snapshot: Option<LoadedSnapshot>,
    active_location: Option<LocationId>,
    overlay: HashMap<LineId, Decimal>,
    policy: LocationPolicy,
    command_prefixes: Vec<String>,
}

impl ScanValidator {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            snapshot: None,
            active_location: None,
            overlay: HashMap::new(),
            policy: config.location_policy,
            command_prefixes: config.command_prefixes.clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn snapshot(&self) -> Option<&LoadedSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn active_location(&self) -> Option<LocationId> {
        self.active_location
    }

    /// Install a freshly loaded snapshot: lock and overlay are cleared
    pub fn install(&mut self, snapshot: LoadedSnapshot) {
        self.snapshot = Some(snapshot);
        self.active_location = None;
        self.overlay.clear();
    }

    /// Swap in an authoritative snapshot after a sync
    ///
    /// The overlay is cleared (the server now counts synced scans). The lock
    /// is kept while the location still belongs to the picking.
    pub fn refresh(&mut self, snapshot: LoadedSnapshot) {
        if let Some(location_id) = self.active_location {
            let side = self.policy.side_for(snapshot.snapshot().operation);
            if !snapshot.allowed_locations(side).contains(&location_id) {
                tracing::info!(location_id, "Locked location left the picking, lock cleared");
                self.active_location = None;
            }
        }
        self.snapshot = Some(snapshot);
        self.overlay.clear();
    }

    /// Drop the snapshot: every scan is `SystemNotReady` until the next install
    pub fn unload(&mut self) {
        self.snapshot = None;
        self.active_location = None;
        self.overlay.clear();
    }

    /// Rebuild the overlay from scans still waiting for the server
    pub fn rebuild_overlay<I>(&mut self, pending_lines: I)
    where
        I: IntoIterator<Item = LineId>,
    {
        self.overlay.clear();
        for line_id in pending_lines {
            self.apply_optimistic(line_id);
        }
    }

    fn side(&self, snapshot: &LoadedSnapshot) -> LocationSide {
        self.policy.side_for(snapshot.snapshot().operation)
    }

    /// Snapshot quantity plus local optimistic delta
    pub fn qty_done(&self, line_id: LineId) -> Option<Decimal> {
        let line = self.snapshot.as_ref()?.line(line_id)?;
        Some(self.effective_done(line))
    }

    fn effective_done(&self, line: &SnapshotLine) -> Decimal {
        line.qty_done + self.overlay.get(&line.id).copied().unwrap_or_default()
    }

    fn has_work(&self, line: &SnapshotLine) -> bool {
        self.effective_done(line) < line.qty_reserved
    }

    pub fn apply_optimistic(&mut self, line_id: LineId) {
        *self.overlay.entry(line_id).or_default() += Decimal::ONE;
    }

    pub fn rollback(&mut self, line_id: LineId) {
        if let Some(delta) = self.overlay.get_mut(&line_id) {
            *delta -= Decimal::ONE;
            if delta.is_zero() {
                self.overlay.remove(&line_id);
            }
        }
    }

    /// Take the server's quantity for a line as the new local truth
    ///
    /// `queued` scans of the line are still unknown to the server and stay
    /// counted on top of its quantity.
    pub fn reconcile(&mut self, line_id: LineId, qty_done: Decimal, queued: usize) {
        let Some(line) = self.snapshot.as_ref().and_then(|s| s.line(line_id)) else {
            return;
        };
        let delta = qty_done - line.qty_done + Decimal::from(queued);
        if delta.is_zero() {
            self.overlay.remove(&line_id);
        } else {
            self.overlay.insert(line_id, delta);
        }
    }

    pub fn progress(&self) -> Vec<LineProgress> {
        let Some(snapshot) = &self.snapshot else {
            return Vec::new();
        };
        snapshot
            .lines()
            .iter()
            .map(|line| {
                let qty_done = self.effective_done(line);
                LineProgress {
                    line_id: line.id,
                    product_id: line.product_id,
                    lot_id: line.lot_id,
                    qty_reserved: line.qty_reserved,
                    qty_done,
                    qty_remaining: remaining(line, qty_done),
                }
            })
            .collect()
    }

    /// Every line fully scanned (a picking without snapshot is never complete)
    pub fn is_complete(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| s.lines().iter().all(|line| !self.has_work(line)))
    }

    fn is_command(&self, token: &str) -> bool {
        self.command_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && token.starts_with(prefix.as_str()))
    }

    /// Decide what a raw scanned token means
    ///
    /// Only a successful location scan changes state (the lock). Quantities
    /// are left to the caller, see [`Self::apply_optimistic`].
    pub fn evaluate(&mut self, raw: &str) -> Decision {
        let token = normalize(raw);

        let Some(snapshot) = &self.snapshot else {
            return Decision::Reject(ErrorCode::SystemNotReady.into());
        };

        let classification = if token.is_empty() {
            Classification::Unknown
        } else {
            snapshot.classify(&token)
        };

        let decision = match classification {
            Classification::Location(location) => self.on_location(snapshot, location),
            Classification::Product(product) => {
                self.on_item(snapshot, &token, Item::Product(product))
            }
            Classification::Lot(lot) => self.on_item(snapshot, &token, Item::Lot(lot)),
            Classification::Unknown if self.is_command(&token) => Decision::Command(token),
            Classification::Unknown => Decision::Reject(Rejection::new(
                ErrorCode::UnauthorizedItem,
                format!("Barcode {token} not found"),
            )),
        };

        if let Decision::Lock(location) = &decision {
            if self.active_location != Some(location.id) {
                tracing::debug!(
                    location_id = location.id,
                    previous = ?self.active_location,
                    "Location locked"
                );
            }
            self.active_location = Some(location.id);
        }
        decision
    }

    fn on_location(&self, snapshot: &LoadedSnapshot, location: LocationRef) -> Decision {
        let side = self.side(snapshot);
        if !snapshot.allowed_locations(side).contains(&location.id) {
            return Decision::Reject(Rejection::new(
                ErrorCode::WrongLocation,
                format!("Location {} does not belong to this picking", location.name),
            ));
        }

        let pending = snapshot
            .lines()
            .iter()
            .filter(|line| side.of(line) == location.id)
            .any(|line| self.has_work(line));
        if !pending {
            return Decision::Reject(Rejection::new(
                ErrorCode::LocationComplete,
                format!("Nothing left to pick at {}", location.name),
            ));
        }

        Decision::Lock(location)
    }

    fn on_item(&self, snapshot: &LoadedSnapshot, token: &str, item: Item) -> Decision {
        let Some(location_id) = self.active_location else {
            return Decision::Reject(ErrorCode::LocationRequired.into());
        };
        let side = self.side(snapshot);
        let product_id = item.product_id();
        let product_name = snapshot.product_name(product_id);

        let at_location: Vec<&SnapshotLine> = snapshot
            .lines()
            .iter()
            .filter(|line| line.product_id == product_id && side.of(line) == location_id)
            .collect();

        let candidates: Vec<&SnapshotLine> = match &item {
            Item::Lot(lot) => at_location
                .iter()
                .copied()
                .filter(|line| line.lot_id.is_none_or(|id| id == lot.id))
                .collect(),
            Item::Product(_) => at_location.clone(),
        };

        if candidates.is_empty() {
            return Decision::Reject(match &item {
                Item::Lot(lot) if !at_location.is_empty() => Rejection::new(
                    ErrorCode::LotMismatch,
                    format!("Lot {} is not the one reserved for {product_name} here", lot.name),
                ),
                _ if snapshot.has_product(product_id) => Rejection::new(
                    ErrorCode::WrongLocation,
                    format!(
                        "{product_name} is not expected at {}",
                        snapshot.location_name(location_id)
                    ),
                ),
                _ => Rejection::new(
                    ErrorCode::UnauthorizedItem,
                    format!("{product_name} is not part of this picking"),
                ),
            });
        }

        if let Item::Product(product) = &item
            && product.tracking.requires_lot()
        {
            return Decision::Reject(Rejection::new(
                ErrorCode::LotRequired,
                format!("{product_name} is tracked, scan the lot/serial barcode"),
            ));
        }

        let Some(line) = candidates.into_iter().find(|line| self.has_work(line)) else {
            return Decision::Reject(Rejection::new(
                ErrorCode::QuantityExceeded,
                format!("Reserved quantity of {product_name} already scanned"),
            ));
        };

        Decision::Accept(AcceptedScan {
            barcode: token.to_string(),
            line_id: line.id,
            product_id,
            lot_id: item.lot_id(),
            location_id,
        })
    }
}

enum Item {
    Product(ProductRef),
    Lot(LotRef),
}

impl Item {
    fn product_id(&self) -> ProductId {
        match self {
            Item::Product(p) => p.id,
            Item::Lot(l) => l.product_id,
        }
    }

    fn lot_id(&self) -> Option<LotId> {
        match self {
            Item::Product(_) => None,
            Item::Lot(l) => Some(l.id),
        }
    }
}
