//! Fan-out / fan-in orchestration engine for batch document conversion.
//!
//! A submission becomes one job plus one file record per accepted upload.
//! The [`Dispatcher`](dispatcher::Dispatcher) arms a
//! [`FanInBarrier`](barrier::FanInBarrier) with the file count and enqueues
//! one [`ConversionUnit`](queue::ConversionUnit) per file. Each
//! [`ConversionWorker`](worker::ConversionWorker) converts one unit and
//! reports a typed [`UnitOutcome`](outcome::UnitOutcome); the report that
//! completes the set hands every outcome to the
//! [`ArchiveBuilder`](archive::ArchiveBuilder), which packages the
//! successful conversions and lets the
//! [`StatusTracker`](tracker::StatusTracker) seal the job.
//!
//! Storage, queue and barrier are traits with in-process and PostgreSQL
//! backends; [`Backends`](backends::Backends) wires them from
//! [`PipelineConfig`](config::PipelineConfig).

pub mod archive;
pub mod backends;
pub mod barrier;
pub mod blob;
pub mod config;
pub mod converter;
pub mod dispatcher;
pub mod error;
pub mod outcome;
pub mod pool;
pub mod queue;
pub mod store;
pub mod tracker;
pub mod worker;
