//! Manual validation queue.
//!
//! Every result routed to manual review is submitted to a
//! [`ValidationSink`]. Reviewers may answer with [`Feedback`]; feedback is
//! recorded, never applied to the cache behind anyone's back. Applying a
//! correction is an explicit new cache write through
//! [`Orchestrator::apply_feedback`](crate::Orchestrator::apply_feedback).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use sieve_core::{CacheKey, ClassificationResult};

/// A low-confidence result awaiting review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationTicket {
    /// Cache key of the item
    pub key: CacheKey,

    /// Caller-supplied item identifier
    pub item_id: Option<String>,

    /// Original item text
    pub text: String,

    /// The result as classified
    pub result: ClassificationResult,

    /// When the ticket was queued
    pub queued_at: DateTime<Utc>,
}

/// A reviewer's verdict on a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Cache key of the reviewed item
    pub key: CacheKey,

    /// Caller-supplied item identifier
    pub item_id: Option<String>,

    /// Category the reviewer assigned
    pub corrected_category: String,

    /// Free-form reviewer note
    #[serde(default)]
    pub reviewer_note: Option<String>,

    /// When the feedback arrived
    pub received_at: DateTime<Utc>,
}

impl Feedback {
    /// Feedback for a ticket.
    pub fn for_ticket(ticket: &ValidationTicket, corrected_category: impl Into<String>) -> Self {
        Self {
            key: ticket.key.clone(),
            item_id: ticket.item_id.clone(),
            corrected_category: corrected_category.into(),
            reviewer_note: None,
            received_at: Utc::now(),
        }
    }

    /// Attach a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.reviewer_note = Some(note.into());
        self
    }
}

/// Receives results that need a human.
pub trait ValidationSink: Send + Sync {
    /// Hand off one ticket. Must not block.
    fn submit(&self, ticket: ValidationTicket);
}

impl ValidationSink for tokio::sync::mpsc::UnboundedSender<ValidationTicket> {
    fn submit(&self, ticket: ValidationTicket) {
        if self.send(ticket).is_err() {
            tracing::warn!("Validation consumer dropped, ticket discarded");
        }
    }
}

/// In-memory FIFO of tickets plus a feedback log.
#[derive(Debug, Default)]
pub struct ValidationQueue {
    tickets: Mutex<VecDeque<ValidationTicket>>,
    feedback: Mutex<Vec<Feedback>>,
}

impl ValidationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tickets waiting for review.
    pub fn pending(&self) -> usize {
        self.tickets.lock().len()
    }

    /// Take the oldest ticket.
    pub fn next(&self) -> Option<ValidationTicket> {
        self.tickets.lock().pop_front()
    }

    /// Take every waiting ticket, oldest first.
    pub fn drain(&self) -> Vec<ValidationTicket> {
        self.tickets.lock().drain(..).collect()
    }

    /// Record a reviewer's verdict.
    pub fn record_feedback(&self, feedback: Feedback) {
        tracing::info!(
            key = %feedback.key.short(),
            category = %feedback.corrected_category,
            "Validation feedback recorded"
        );
        self.feedback.lock().push(feedback);
    }

    /// All recorded feedback, in arrival order.
    pub fn feedback(&self) -> Vec<Feedback> {
        self.feedback.lock().clone()
    }
}

impl ValidationSink for ValidationQueue {
    fn submit(&self, ticket: ValidationTicket) {
        self.tickets.lock().push_back(ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(text: &str) -> ValidationTicket {
        ValidationTicket {
            key: CacheKey::for_text(text),
            item_id: Some(text.to_string()),
            text: text.to_string(),
            result: ClassificationResult::new("World", 0.4, "unclear"),
            queued_at: Utc::now(),
        }
    }

    #[test]
    fn test_queue_is_fifo() {
        let queue = ValidationQueue::new();
        queue.submit(ticket("first"));
        queue.submit(ticket("second"));

        assert_eq!(queue.pending(), 2);
        assert_eq!(queue.next().unwrap().text, "first");
        assert_eq!(queue.drain().len(), 1);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_feedback_is_recorded() {
        let queue = ValidationQueue::new();
        let t = ticket("article");
        queue.record_feedback(Feedback::for_ticket(&t, "Science").with_note("about physics"));

        let feedback = queue.feedback();
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].key, t.key);
        assert_eq!(feedback[0].corrected_category, "Science");
        assert_eq!(feedback[0].reviewer_note.as_deref(), Some("about physics"));
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.submit(ticket("via channel"));
        assert_eq!(rx.recv().await.unwrap().text, "via channel");

        // Dropped receiver does not panic
        drop(rx);
        tx.submit(ticket("discarded"));
    }
}
