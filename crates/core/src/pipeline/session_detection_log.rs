use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::pipeline::result_aggregator::FrameDetectionResult;

/// Append-only record of every frame that contained accepted faces.
///
/// Cloning yields another handle to the same log, so a UI can poll it while
/// the scan appends. Entries are never removed or reordered; a reader that
/// remembers how many entries it has seen can fetch only the new ones with
/// [`read_from`](Self::read_from).
#[derive(Clone, Debug, Default)]
pub struct SessionDetectionLog {
    entries: Arc<RwLock<Vec<FrameDetectionResult>>>,
}

impl SessionDetectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&self, result: FrameDetectionResult) {
        self.write().push(result);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Entries appended at or after `offset`.
    pub fn read_from(&self, offset: usize) -> Vec<FrameDetectionResult> {
        self.read().iter().skip(offset).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<FrameDetectionResult> {
        self.read_from(0)
    }

    /// Number of frame records each face ID appears in.
    pub fn occurrences(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.read().iter() {
            let mut seen: Vec<usize> = entry.faces_array.iter().map(|f| f.face_id).collect();
            seen.sort_unstable();
            seen.dedup();
            for face_id in seen {
                *counts.entry(face_id).or_insert(0) += 1;
            }
        }
        counts
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<FrameDetectionResult>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<FrameDetectionResult>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
