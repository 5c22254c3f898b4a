//! Render job engine.
//!
//! Contains the task decomposer that turns one render request into a task
//! plus its tile jobs, the dispatcher that hands jobs to polling workers
//! and records their results, and the aggregator that stitches finished
//! tiles into a preview image.

pub mod aggregator;
pub mod decomposer;
pub mod dispatcher;
pub mod signing;

