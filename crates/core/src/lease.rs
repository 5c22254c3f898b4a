//! Grid lease coordination for the mosaic wall.
//!
//! Each participating client holds an exclusive lease on one cell of a
//! `tiles_x x tiles_y` grid and keeps it alive with heartbeats. Leases
//! that miss heartbeats for longer than the lease timeout are reclaimed
//! lazily on the next assignment. When every cell is leased and nothing
//! is stale, the least-recently-seen lease is handed to the new client,
//! so assignment always succeeds on a non-empty grid.
//!
//! The table lives in process memory only. It is rebuilt empty on
//! restart and is not shared between instances, so the service that owns
//! it must run as a single instance.

use std::collections::HashMap;

use chrono::TimeDelta;
use serde::Serialize;

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// A lease whose holder has not heartbeated within this many seconds is
/// stale and may be reclaimed.
pub const DEFAULT_LEASE_TIMEOUT_SECS: u64 = 20;

/// Grid width used until a client configures another shape.
pub const DEFAULT_TILES_X: u32 = 4;

/// Grid height used until a client configures another shape.
pub const DEFAULT_TILES_Y: u32 = 4;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Shape of the lease grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridShape {
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl GridShape {
    pub fn new(tiles_x: u32, tiles_y: u32) -> Self {
        Self { tiles_x, tiles_y }
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> u64 {
        u64::from(self.tiles_x) * u64::from(self.tiles_y)
    }
}

impl Default for GridShape {
    fn default() -> Self {
        Self::new(DEFAULT_TILES_X, DEFAULT_TILES_Y)
    }
}

/// Exclusive assignment of one grid cell to one client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileLease {
    pub tile_id: String,
    pub tile_x: u32,
    pub tile_y: u32,
    /// Grid shape at the time the cell was first leased.
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub client_id: String,
    pub assigned_at: Timestamp,
    pub last_seen: Timestamp,
}

/// Composite lease identifier, `"{tile_x}-{tile_y}"`.
pub fn tile_id(tile_x: u32, tile_y: u32) -> String {
    format!("{tile_x}-{tile_y}")
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// In-memory lease table.
///
/// Not internally synchronized: the owner wraps it in a mutex so every
/// operation runs against the table as one atomic step.
#[derive(Debug)]
pub struct LeaseCoordinator {
    grid: GridShape,
    lease_timeout: TimeDelta,
    leases: HashMap<String, TileLease>,
}

impl LeaseCoordinator {
    pub fn new(grid: GridShape, lease_timeout: std::time::Duration) -> Self {
        Self {
            grid,
            lease_timeout: TimeDelta::from_std(lease_timeout).unwrap_or(TimeDelta::MAX),
            leases: HashMap::new(),
        }
    }

    /// Current grid shape used for new assignments.
    pub fn grid(&self) -> GridShape {
        self.grid
    }

    /// Set the grid shape for future assignments.
    ///
    /// Existing leases keep the shape recorded when they were created.
    pub fn configure_grid(&mut self, tiles_x: u32, tiles_y: u32) {
        self.grid = GridShape::new(tiles_x, tiles_y);
    }

    /// Drop every lease not seen within the timeout. Returns how many were removed.
    pub fn sweep_stale(&mut self, now: Timestamp) -> usize {
        let timeout = self.lease_timeout;
        let before = self.leases.len();
        self.leases.retain(|_, lease| now - lease.last_seen <= timeout);
        before - self.leases.len()
    }

    /// Lease a cell to `client_id`.
    ///
    /// Sweeps stale leases, then returns the first free cell in raster
    /// order. If the grid is fully leased, the least-recently-seen lease is
    /// transferred to `client_id` instead. Fails only for a zero-cell grid.
    pub fn assign_tile(&mut self, client_id: &str, now: Timestamp) -> Result<TileLease, CoreError> {
        if self.grid.cell_count() == 0 {
            return Err(CoreError::Validation(
                "Lease grid has no cells to assign".to_string(),
            ));
        }

        self.sweep_stale(now);

        for y in 0..self.grid.tiles_y {
            for x in 0..self.grid.tiles_x {
                let id = tile_id(x, y);
                if self.leases.contains_key(&id) {
                    continue;
                }
                let lease = TileLease {
                    tile_id: id.clone(),
                    tile_x: x,
                    tile_y: y,
                    tiles_x: self.grid.tiles_x,
                    tiles_y: self.grid.tiles_y,
                    client_id: client_id.to_string(),
                    assigned_at: now,
                    last_seen: now,
                };
                self.leases.insert(id, lease.clone());
                return Ok(lease);
            }
        }

        // Grid is full: evict the least-recently-seen holder. Ties go to
        // the cell that comes first in raster order.
        let victim = self
            .leases
            .values_mut()
            .min_by_key(|lease| (lease.last_seen, lease.tile_y, lease.tile_x))
            .ok_or_else(|| CoreError::Internal("Full grid with an empty lease table".into()))?;

        victim.client_id = client_id.to_string();
        victim.last_seen = now;
        Ok(victim.clone())
    }

    /// Refresh a lease held by `client_id`.
    ///
    /// Returns `None` when the lease does not exist or belongs to someone
    /// else; a foreign heartbeat never touches the lease.
    pub fn heartbeat(&mut self, tile_id: &str, client_id: &str, now: Timestamp) -> Option<TileLease> {
        let lease = self.leases.get_mut(tile_id)?;
        if lease.client_id != client_id {
            return None;
        }
        lease.last_seen = now;
        Some(lease.clone())
    }

    /// Remove a lease if `client_id` owns it.
    pub fn release(&mut self, tile_id: &str, client_id: &str) -> bool {
        match self.leases.get(tile_id) {
            Some(lease) if lease.client_id == client_id => {
                self.leases.remove(tile_id);
                true
            }
            _ => false,
        }
    }

    /// Look up a lease by id.
    pub fn get(&self, tile_id: &str) -> Option<&TileLease> {
        self.leases.get(tile_id)
    }

    /// All leases in raster order.
    pub fn leases(&self) -> Vec<TileLease> {
        let mut leases: Vec<_> = self.leases.values().cloned().collect();
        leases.sort_by_key(|lease| (lease.tile_y, lease.tile_x));
        leases
    }
}

impl Default for LeaseCoordinator {
    fn default() -> Self {
        Self::new(
            GridShape::default(),
            std::time::Duration::from_secs(DEFAULT_LEASE_TIMEOUT_SECS),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    use super::*;

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn coordinator(tiles_x: u32, tiles_y: u32) -> LeaseCoordinator {
        LeaseCoordinator::new(GridShape::new(tiles_x, tiles_y), Duration::from_secs(20))
    }

    #[test]
    fn assigns_cells_in_raster_order() {
        let mut coord = coordinator(3, 2);
        let ids: Vec<_> = (0..6)
            .map(|i| coord.assign_tile(&format!("c{i}"), t(0)).unwrap().tile_id)
            .collect();
        assert_eq!(ids, ["0-0", "1-0", "2-0", "0-1", "1-1", "2-1"]);
    }

    #[test]
    fn fifth_client_on_full_grid_evicts_least_recently_seen() {
        let mut coord = coordinator(2, 2);
        let mut cells = HashSet::new();
        for i in 0..4 {
            let lease = coord.assign_tile(&format!("c{i}"), t(i)).unwrap();
            cells.insert(lease.tile_id);
        }
        assert_eq!(cells.len(), 4);

        // Keep everyone but c0 fresh, still inside the timeout.
        coord.heartbeat("1-0", "c1", t(10)).unwrap();
        coord.heartbeat("0-1", "c2", t(10)).unwrap();
        coord.heartbeat("1-1", "c3", t(10)).unwrap();

        let lease = coord.assign_tile("c4", t(12)).unwrap();
        assert_eq!(lease.tile_id, "0-0");
        assert_eq!(lease.client_id, "c4");
        assert_eq!(lease.last_seen, t(12));
        assert_eq!(coord.leases().len(), 4);
    }

    #[test]
    fn fifth_client_after_timeout_gets_swept_cell() {
        let mut coord = coordinator(2, 2);
        for i in 0..4 {
            coord.assign_tile(&format!("c{i}"), t(0)).unwrap();
        }

        let lease = coord.assign_tile("c4", t(21)).unwrap();
        assert_eq!(lease.tile_id, "0-0");
        assert_eq!(lease.client_id, "c4");
        assert_eq!(lease.assigned_at, t(21));
        // Every stale lease was swept; only the new one remains.
        assert_eq!(coord.leases().len(), 1);
    }

    #[test]
    fn never_fails_on_non_empty_grid() {
        let mut coord = coordinator(1, 1);
        for i in 0..10 {
            let lease = coord.assign_tile(&format!("c{i}"), t(i)).unwrap();
            assert_eq!(lease.tile_id, "0-0");
            assert_eq!(lease.client_id, format!("c{i}"));
        }
    }

    #[test]
    fn zero_cell_grid_fails() {
        let mut coord = coordinator(2, 2);
        coord.configure_grid(0, 3);
        assert_matches!(coord.assign_tile("c", t(0)), Err(CoreError::Validation(_)));
    }

    #[test]
    fn lease_exactly_at_timeout_is_not_stale() {
        let mut coord = coordinator(1, 1);
        coord.assign_tile("a", t(0)).unwrap();
        assert_eq!(coord.sweep_stale(t(20)), 0);
        assert_eq!(coord.sweep_stale(t(21)), 1);
    }

    #[test]
    fn heartbeat_from_owner_refreshes_last_seen() {
        let mut coord = coordinator(2, 2);
        let lease = coord.assign_tile("a", t(0)).unwrap();
        let refreshed = coord.heartbeat(&lease.tile_id, "a", t(15)).unwrap();
        assert_eq!(refreshed.last_seen, t(15));
        assert_eq!(refreshed.assigned_at, t(0));
    }

    #[test]
    fn foreign_heartbeat_is_not_found_and_leaves_lease_untouched() {
        let mut coord = coordinator(2, 2);
        let lease = coord.assign_tile("a", t(0)).unwrap();

        assert!(coord.heartbeat(&lease.tile_id, "intruder", t(5)).is_none());
        let stored = coord.get(&lease.tile_id).unwrap();
        assert_eq!(stored.last_seen, t(0));
        assert_eq!(stored.client_id, "a");

        assert!(coord.heartbeat("9-9", "a", t(5)).is_none());
    }

    #[test]
    fn evicted_client_loses_heartbeat() {
        let mut coord = coordinator(1, 1);
        coord.assign_tile("old", t(0)).unwrap();
        coord.assign_tile("new", t(1)).unwrap();
        assert!(coord.heartbeat("0-0", "old", t(2)).is_none());
        assert!(coord.heartbeat("0-0", "new", t(2)).is_some());
    }

    #[test]
    fn release_requires_owner() {
        let mut coord = coordinator(2, 1);
        coord.assign_tile("a", t(0)).unwrap();
        assert!(!coord.release("0-0", "b"));
        assert!(coord.release("0-0", "a"));
        assert!(!coord.release("0-0", "a"));

        // The freed cell is handed out again first.
        assert_eq!(coord.assign_tile("b", t(1)).unwrap().tile_id, "0-0");
    }

    #[test]
    fn reconfigure_keeps_recorded_shape_of_existing_leases() {
        let mut coord = coordinator(2, 2);
        let first = coord.assign_tile("a", t(0)).unwrap();
        coord.configure_grid(3, 3);
        let second = coord.assign_tile("b", t(0)).unwrap();

        assert_eq!((first.tiles_x, first.tiles_y), (2, 2));
        assert_eq!(coord.get("0-0").unwrap().tiles_x, 2);
        assert_eq!((second.tiles_x, second.tiles_y), (3, 3));
        assert_eq!(second.tile_id, "1-0");
    }

    #[test]
    fn independent_coordinators_do_not_share_state() {
        let mut a = coordinator(1, 1);
        let mut b = coordinator(1, 1);
        a.assign_tile("x", t(0)).unwrap();
        assert!(b.leases().is_empty());
        assert_eq!(b.assign_tile("y", t(0)).unwrap().client_id, "y");
        assert_eq!(a.get("0-0").unwrap().client_id, "x");
    }
}
