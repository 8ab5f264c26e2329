//! Queued conversion unit model.

use docconv_core::types::DbId;
use sqlx::FromRow;

/// A claimed row from the `conversion_units` table.
#[derive(Debug, Clone, FromRow)]
pub struct UnitRow {
    pub id: i64,
    pub job_id: DbId,
    pub filename: String,
    /// Number of times the unit has been claimed, including this claim.
    pub attempts: i32,
}
