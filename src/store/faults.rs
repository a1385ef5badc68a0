use ahash::AHashMap;
use parking_lot::Mutex;

use crate::errors::GraphQueryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Query,
    Search,
    Count,
}

#[derive(Clone, Copy, Debug)]
struct FaultEntry {
    remaining: usize,
    code: u16,
}

/// Scripted store failures: the next `failures` calls at a point fail with `code`.
#[derive(Debug, Default)]
pub struct FaultRegistry {
    entries: Mutex<AHashMap<FaultPoint, FaultEntry>>,
}

impl FaultRegistry {
    pub fn configure(&self, point: FaultPoint, failures: usize, code: u16) {
        let mut guard = self.entries.lock();
        if failures == 0 {
            guard.remove(&point);
        } else {
            guard.insert(
                point,
                FaultEntry {
                    remaining: failures,
                    code,
                },
            );
        }
    }

    pub fn reset(&self) {
        self.entries.lock().clear();
    }

    pub fn check(&self, point: FaultPoint) -> Result<(), GraphQueryError> {
        let mut guard = self.entries.lock();
        let Some(entry) = guard.get_mut(&point) else {
            return Ok(());
        };
        entry.remaining -= 1;
        let code = entry.code;
        if entry.remaining == 0 {
            guard.remove(&point);
        }
        Err(GraphQueryError::store(
            code,
            format!("fault injected at {point:?}"),
        ))
    }
}
