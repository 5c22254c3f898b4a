//! Tilefarm render worker.
//!
//! Polls the API for tile jobs of one task, renders each tile through a
//! [`render::TileRenderer`] and posts the pixels back.

pub mod client;
pub mod config;
pub mod render;
pub mod runner;
