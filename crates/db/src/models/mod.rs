//! Row models and DTOs.

pub mod job;
pub mod status;
pub mod task;
