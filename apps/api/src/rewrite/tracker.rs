//! Latest-request guard for background rewrite validations.
//!
//! Every rewrite of a section takes a ticket from a monotonic per-section
//! counter. A validation result is applied only when its ticket is still the
//! latest for that section; anything older is discarded.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use uuid::Uuid;

use crate::rewrite::validator::ValidationResult;

/// Identifies one in-flight validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationTicket {
    pub session_id: Uuid,
    pub section: String,
    pub request: u64,
}

#[derive(Debug, Default)]
struct SectionSlot {
    latest: u64,
    pending: bool,
    result: Option<ValidationResult>,
}

#[derive(Debug, Default)]
pub struct ValidationTracker {
    slots: Mutex<HashMap<(Uuid, String), SectionSlot>>,
}

impl ValidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new validation for the section, superseding any in flight.
    /// The previous authoritative result is cleared since it describes older text.
    pub fn begin(&self, session_id: Uuid, section: &str) -> ValidationTicket {
        let mut slots = self.lock();
        let slot = slots.entry((session_id, section.to_string())).or_default();
        slot.latest += 1;
        slot.pending = true;
        slot.result = None;
        debug!("Validation #{} started for {session_id}/{section}", slot.latest);
        ValidationTicket {
            session_id,
            section: section.to_string(),
            request: slot.latest,
        }
    }

    /// Applies `result` if `ticket` is still the latest request. Returns whether it was applied.
    pub fn complete(&self, ticket: &ValidationTicket, result: ValidationResult) -> bool {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(&(ticket.session_id, ticket.section.clone())) else {
            return false;
        };
        if slot.latest != ticket.request {
            info!(
                "Discarding stale validation #{} for {}/{} (latest is #{})",
                ticket.request, ticket.session_id, ticket.section, slot.latest
            );
            return false;
        }
        slot.pending = false;
        slot.result = Some(result);
        true
    }

    /// Supersedes any in-flight validation without starting a new one, e.g.
    /// after a manual edit that is never validated.
    pub fn cancel(&self, session_id: Uuid, section: &str) {
        let mut slots = self.lock();
        if let Some(slot) = slots.get_mut(&(session_id, section.to_string())) {
            slot.latest += 1;
            slot.pending = false;
            slot.result = None;
        }
    }

    /// The authoritative result for the section, if its latest validation has finished.
    pub fn latest(&self, session_id: Uuid, section: &str) -> Option<ValidationResult> {
        self.lock()
            .get(&(session_id, section.to_string()))
            .and_then(|slot| slot.result.clone())
    }

    /// Whether a validation for the section was started and has not reported yet.
    pub fn is_pending(&self, session_id: Uuid, section: &str) -> bool {
        self.lock()
            .get(&(session_id, section.to_string()))
            .is_some_and(|slot| slot.pending)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(Uuid, String), SectionSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
