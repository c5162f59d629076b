//! Ordered transcript log for one call session.
//!
//! Entries are kept sorted by sequence. An entry with an utterance id owns
//! a slot: later revisions of the same utterance replace the slot's content
//! while it is interim, and are refused once it is final. The slot keeps
//! the sequence of the utterance's first arrival, so revisions never move a
//! line. Every delivered `(call_id, sequence)` is remembered, which makes
//! redelivery a no-op.

use std::collections::{HashMap, HashSet};

use concierge_types::{TranscriptEvent, TranscriptLine};

/// Result of [`TranscriptLedger::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// An interim entry with the same utterance id was replaced.
    Replaced,
    /// This `(call_id, sequence)` was already delivered.
    Duplicate,
    /// The utterance is already final; the revision was dropped.
    FinalLocked,
    /// The ledger is frozen; the event was only counted.
    Frozen,
}

impl AppendOutcome {
    /// Whether the visible transcript changed.
    pub fn changed(self) -> bool {
        matches!(self, Self::Appended | Self::Replaced)
    }
}

#[derive(Debug, Default)]
pub struct TranscriptLedger {
    entries: Vec<TranscriptEvent>,
    delivered: HashSet<(String, u64)>,
    /// `(call_id, utterance_id)` to the slot's sequence.
    utterances: HashMap<(String, String), u64>,
    frozen: bool,
    late_arrivals: usize,
}

impl TranscriptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: TranscriptEvent) -> AppendOutcome {
        let key = (event.call_id.clone(), event.sequence);
        if self.delivered.contains(&key) {
            return AppendOutcome::Duplicate;
        }
        if self.frozen {
            self.late_arrivals += 1;
            tracing::debug!(
                call_id = %event.call_id,
                sequence = event.sequence,
                "transcript arrived after the ledger was frozen"
            );
            return AppendOutcome::Frozen;
        }
        self.delivered.insert(key);

        let slot_key = event
            .utterance_id
            .as_ref()
            .map(|u| (event.call_id.clone(), u.clone()));

        if let Some(slot_key) = &slot_key {
            if let Some(&slot_sequence) = self.utterances.get(slot_key) {
                if let Some(idx) = self.position(&event.call_id, slot_sequence) {
                    let existing = &mut self.entries[idx];
                    if existing.is_final {
                        return AppendOutcome::FinalLocked;
                    }
                    existing.content = event.content;
                    existing.is_final = event.is_final;
                    existing.timestamp = event.timestamp;
                    existing.role = event.role;
                    return AppendOutcome::Replaced;
                }
            }
        }

        if let Some(slot_key) = slot_key {
            self.utterances.insert(slot_key, event.sequence);
        }
        let idx = self
            .entries
            .partition_point(|e| e.sequence < event.sequence);
        self.entries.insert(idx, event);
        AppendOutcome::Appended
    }

    fn position(&self, call_id: &str, sequence: u64) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.sequence == sequence && e.call_id == call_id)
    }

    /// Oldest first.
    pub fn read_ordered(&self) -> &[TranscriptEvent] {
        &self.entries
    }

    /// Newest first, for "latest message on top" displays.
    pub fn read_reverse(&self) -> impl Iterator<Item = &TranscriptEvent> + '_ {
        self.entries.iter().rev()
    }

    pub fn lines(&self) -> Vec<TranscriptLine> {
        self.entries.iter().map(TranscriptLine::from).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_sequence(&self) -> u64 {
        self.entries.iter().map(|e| e.sequence).max().unwrap_or(0)
    }

    /// Stops accepting appends. Later events are counted in
    /// [`late_arrivals`](Self::late_arrivals) and otherwise ignored.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn late_arrivals(&self) -> usize {
        self.late_arrivals
    }

    /// Empties the ledger and reopens it for appends.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Replaces the contents with `events`, as restored from a snapshot.
    pub fn restore(&mut self, events: Vec<TranscriptEvent>) {
        self.clear();
        for event in events {
            self.append(event);
        }
    }
}
