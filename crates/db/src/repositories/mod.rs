//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod barrier_repo;
pub mod blob_repo;
pub mod file_repo;
pub mod job_repo;
pub mod unit_repo;

pub use barrier_repo::BarrierRepo;
pub use blob_repo::{BlobRepo, FileBlob};
pub use file_repo::FileRepo;
pub use job_repo::JobRepo;
pub use unit_repo::UnitRepo;
