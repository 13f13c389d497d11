//! Keyed async locks for progress read-modify-write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use course_core::model::{ChapterId, StudentId};

type Key = (StudentId, ChapterId);

/// One async mutex per (student, chapter). Entries nobody holds are pruned on
/// the next acquisition.
#[derive(Debug, Default)]
pub struct ProgressLocks {
    table: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl ProgressLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, student: StudentId, chapter: ChapterId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut table = match self.table.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            table.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(table.entry((student, chapter)).or_default())
        };
        slot.lock_owned().await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().map_or(0, |table| table.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
