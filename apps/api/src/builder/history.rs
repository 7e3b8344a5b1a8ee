//! Bounded version history.
//!
//! Append-only from the caller's view. At capacity the oldest entry after the
//! first is evicted; index 0 is the origin baseline and is never evicted, nor
//! is an entry the caller pins while recording.
//! `current` is a pointer into the entries: restoring moves it, never truncates.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::builder::session::SessionSnapshot;
use crate::builder::step::BuilderStep;

pub const HISTORY_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionHistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub step_completed: BuilderStep,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionHistory {
    entries: VecDeque<VersionHistoryEntry>,
    current_id: Option<Uuid>,
}

impl VersionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `snapshot` unless it equals the current entry's snapshot.
    /// Returns the new entry's id when one was appended.
    pub fn record(
        &mut self,
        step_completed: BuilderStep,
        snapshot: SessionSnapshot,
        timestamp: DateTime<Utc>,
        pinned: Option<Uuid>,
    ) -> Option<Uuid> {
        if self
            .current()
            .is_some_and(|entry| entry.snapshot == snapshot)
        {
            return None;
        }

        let id = Uuid::new_v4();
        self.entries.push_back(VersionHistoryEntry {
            id,
            timestamp,
            step_completed,
            snapshot,
        });
        if self.entries.len() > HISTORY_CAPACITY {
            let evict = self
                .entries
                .iter()
                .skip(1)
                .position(|e| Some(e.id) != pinned)
                .map(|i| i + 1);
            if let Some(index) = evict {
                self.entries.remove(index);
            }
        }
        self.current_id = Some(id);
        Some(id)
    }

    /// Moves the current pointer. Returns the selected entry.
    pub fn select(&mut self, id: Uuid) -> Option<&VersionHistoryEntry> {
        let entry = self.entries.iter().find(|e| e.id == id)?;
        self.current_id = Some(id);
        Some(entry)
    }

    pub fn get(&self, id: Uuid) -> Option<&VersionHistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn current(&self) -> Option<&VersionHistoryEntry> {
        self.current_id.and_then(|id| self.get(id))
    }

    pub fn current_id(&self) -> Option<Uuid> {
        self.current_id
    }

    pub fn latest(&self) -> Option<&VersionHistoryEntry> {
        self.entries.back()
    }

    pub fn entries(&self) -> impl Iterator<Item = &VersionHistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
