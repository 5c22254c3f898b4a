//! Domain logic for the tile farm.
//!
//! Everything in this crate is pure: no database, no network, no clock
//! reads. Callers pass timestamps in explicitly so lease expiry and
//! aggregation can be tested deterministically.

pub mod aggregation;
pub mod error;
pub mod lease;
pub mod mosaic;
pub mod task;
pub mod tiling;
pub mod types;
