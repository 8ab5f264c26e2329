//! Fan-in barrier models.

use docconv_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `fan_in_barriers` table.
#[derive(Debug, Clone, FromRow)]
pub struct BarrierRow {
    pub expected_count: i32,
    pub released_at: Option<Timestamp>,
}

/// A row from the `fan_in_reports` table.
#[derive(Debug, Clone, FromRow)]
pub struct ReportRow {
    pub unit_key: String,
    pub succeeded: bool,
    pub failure_kind: Option<String>,
    pub detail: Option<String>,
}

/// DTO for recording one unit's report.
#[derive(Debug, Clone)]
pub struct NewReport<'a> {
    pub unit_key: &'a str,
    pub succeeded: bool,
    pub failure_kind: Option<&'a str>,
    pub detail: Option<&'a str>,
}
