//! Snapshot store: the loaded picking snapshot and its lookup indices
//!
//! The snapshot is never mutated after load; optimistic quantities live in
//! the validator's overlay.

use rust_decimal::Decimal;
use shared::picking::{
    LineId, LocationId, LocationRef, LotRef, PickingId, ProductId, ProductRef, Snapshot,
    SnapshotLine,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::LocationSide;
use crate::error::{GuardError, GuardResult};
use crate::remote::{PickingBackend, with_timeout};

/// What a scanned token turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Location(LocationRef),
    Lot(LotRef),
    Product(ProductRef),
    Unknown,
}

/// Snapshot plus derived indices
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    snapshot: Snapshot,
    line_index: HashMap<LineId, usize>,
    products_by_id: HashMap<ProductId, ProductRef>,
    locations_by_id: HashMap<LocationId, LocationRef>,
}

impl LoadedSnapshot {
    pub fn new(snapshot: Snapshot) -> Self {
        let line_index = snapshot
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| (line.id, i))
            .collect();
        let products_by_id = snapshot
            .products_by_barcode
            .values()
            .map(|p| (p.id, p.clone()))
            .collect();
        let locations_by_id = snapshot
            .locations_by_barcode
            .values()
            .map(|l| (l.id, l.clone()))
            .collect();

        Self {
            snapshot,
            line_index,
            products_by_id,
            locations_by_id,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn picking_id(&self) -> PickingId {
        self.snapshot.picking_id
    }

    pub fn lines(&self) -> &[SnapshotLine] {
        &self.snapshot.lines
    }

    pub fn line(&self, id: LineId) -> Option<&SnapshotLine> {
        self.line_index.get(&id).map(|&i| &self.snapshot.lines[i])
    }

    pub fn product(&self, id: ProductId) -> Option<&ProductRef> {
        self.products_by_id.get(&id)
    }

    pub fn product_name(&self, id: ProductId) -> String {
        self.product(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("product #{id}"))
    }

    pub fn location_name(&self, id: LocationId) -> String {
        self.locations_by_id
            .get(&id)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| format!("location #{id}"))
    }

    /// Look the token up in location, lot, then product index; first match wins
    pub fn classify(&self, token: &str) -> Classification {
        if let Some(location) = self.snapshot.locations_by_barcode.get(token) {
            return Classification::Location(location.clone());
        }
        if let Some(lot) = self.snapshot.lots_by_barcode.get(token) {
            return Classification::Lot(lot.clone());
        }
        if let Some(product) = self.snapshot.products_by_barcode.get(token) {
            return Classification::Product(product.clone());
        }
        Classification::Unknown
    }

    /// Locations a lock may target for the given side
    pub fn allowed_locations(&self, side: LocationSide) -> HashSet<LocationId> {
        self.snapshot.lines.iter().map(|l| side.of(l)).collect()
    }

    pub fn has_product(&self, product_id: ProductId) -> bool {
        self.snapshot.lines.iter().any(|l| l.product_id == product_id)
    }
}

/// Why a picking may not start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingReason {
    pub line_id: LineId,
    pub message: String,
}

impl std::fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Fetch the snapshot of a picking
///
/// Remote failures and non-success statuses both end in `SnapshotUnavailable`.
pub async fn load_snapshot(
    backend: &dyn PickingBackend,
    picking_id: PickingId,
    timeout: Duration,
) -> GuardResult<LoadedSnapshot> {
    let response = with_timeout(timeout, backend.fetch_snapshot(picking_id))
        .await
        .map_err(|e| GuardError::SnapshotUnavailable(e.to_string()))?;

    if !response.status.is_success() {
        return Err(GuardError::SnapshotUnavailable(
            response
                .message
                .unwrap_or_else(|| format!("picking {picking_id} is not available")),
        ));
    }

    let snapshot = response.data.ok_or_else(|| {
        GuardError::SnapshotUnavailable(format!("picking {picking_id}: response without data"))
    })?;

    if snapshot.picking_id != picking_id {
        return Err(GuardError::SnapshotUnavailable(format!(
            "asked for picking {picking_id}, got {}",
            snapshot.picking_id
        )));
    }

    for line in &snapshot.lines {
        if line.qty_done > line.qty_reserved {
            tracing::warn!(
                picking_id,
                line_id = line.id,
                qty_done = %line.qty_done,
                qty_reserved = %line.qty_reserved,
                "Snapshot line already over-picked"
            );
        }
    }

    tracing::info!(picking_id, lines = snapshot.lines.len(), "Picking snapshot loaded");
    Ok(LoadedSnapshot::new(snapshot))
}

/// First line whose source stock cannot cover the reservation, if any
pub fn check_preflight_stock(snapshot: &LoadedSnapshot) -> Option<BlockingReason> {
    snapshot
        .lines()
        .iter()
        .find(|line| line.available_qty_at_source < line.qty_reserved)
        .map(|line| BlockingReason {
            line_id: line.id,
            message: format!(
                "Insufficient stock for {} at {}: available {}, required {}",
                snapshot.product_name(line.product_id),
                snapshot.location_name(line.source_location_id),
                line.available_qty_at_source.normalize(),
                line.qty_reserved.normalize(),
            ),
        })
}

/// Remaining quantity of a line given an effective done quantity
pub fn remaining(line: &SnapshotLine, qty_done: Decimal) -> Decimal {
    (line.qty_reserved - qty_done).max(Decimal::ZERO)
}
