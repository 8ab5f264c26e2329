use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use docconv_core::error::CoreError;
use docconv_core::types::DbId;
use tokio::sync::Mutex;

use super::{FanInBarrier, Release};
use crate::error::PipelineError;
use crate::outcome::UnitOutcome;

/// How many released job ids are remembered for late-report detection.
const RELEASED_CAPACITY: usize = 4096;

struct Slot {
    expected: usize,
    outcomes: HashMap<String, UnitOutcome>,
}

#[derive(Default)]
struct Slots {
    armed: HashMap<DbId, Slot>,
    released: HashSet<DbId>,
    /// Release order, oldest first; bounds `released`.
    release_order: VecDeque<DbId>,
}

/// In-process [`FanInBarrier`] guarded by a single mutex.
///
/// A released job keeps only its id, and only the most recent releases are
/// kept; a report for an evicted job reads as [`Release::Unknown`] and is
/// ignored the same way.
pub struct MemoryBarrier {
    slots: Mutex<Slots>,
    released_capacity: usize,
}

impl MemoryBarrier {
    pub fn new() -> Self {
        Self::with_released_capacity(RELEASED_CAPACITY)
    }

    fn with_released_capacity(released_capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            released_capacity: released_capacity.max(1),
        }
    }
}

impl Default for MemoryBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Slots {
    fn mark_released(&mut self, job_id: DbId, capacity: usize) {
        self.released.insert(job_id);
        self.release_order.push_back(job_id);
        while self.release_order.len() > capacity {
            if let Some(oldest) = self.release_order.pop_front() {
                self.released.remove(&oldest);
            }
        }
    }
}

#[async_trait]
impl FanInBarrier for MemoryBarrier {
    async fn arm(&self, job_id: DbId, expected: usize) -> Result<(), PipelineError> {
        if expected == 0 {
            return Err(CoreError::Validation("Barrier must expect at least one unit".into()).into());
        }
        let mut slots = self.slots.lock().await;
        if slots.armed.contains_key(&job_id) || slots.released.contains(&job_id) {
            return Err(CoreError::Conflict(format!("Barrier already armed for job {job_id}")).into());
        }
        slots.armed.insert(
            job_id,
            Slot {
                expected,
                outcomes: HashMap::with_capacity(expected),
            },
        );
        Ok(())
    }

    async fn report(&self, job_id: DbId, outcome: UnitOutcome) -> Result<Release, PipelineError> {
        let mut slots = self.slots.lock().await;
        if slots.released.contains(&job_id) {
            return Ok(Release::AlreadyReleased);
        }
        let Some(slot) = slots.armed.get_mut(&job_id) else {
            return Ok(Release::Unknown);
        };

        slot.outcomes.insert(outcome.filename().to_string(), outcome);
        if slot.outcomes.len() < slot.expected {
            return Ok(Release::Pending {
                reported: slot.outcomes.len(),
                expected: slot.expected,
            });
        }

        let Some(slot) = slots.armed.remove(&job_id) else {
            return Ok(Release::Unknown);
        };
        slots.mark_released(job_id, self.released_capacity);

        let mut outcomes: Vec<UnitOutcome> = slot.outcomes.into_values().collect();
        outcomes.sort_by(|a, b| a.filename().cmp(b.filename()));
        Ok(Release::Released(outcomes))
    }

    async fn forget(&self, job_id: DbId) -> Result<(), PipelineError> {
        let mut slots = self.slots.lock().await;
        slots.armed.remove(&job_id);
        if slots.released.remove(&job_id) {
            slots.release_order.retain(|id| *id != job_id);
        }
        Ok(())
    }
}
