//! Row models and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` struct matching the
//! database row and, where rows are inserted, a create DTO.

pub mod barrier;
pub mod file;
pub mod job;
pub mod status;
pub mod unit;
