//! Bounded per-session transcript
//!
//! Keeps the most recent turns for display and as conversational context for
//! the answer generator. Nothing here outlives the session record.

use crate::models::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single turn in the transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
    /// Set on assistant replies that explain a rejected turn
    pub error_code: Option<ErrorCode>,
}

impl TranscriptEntry {
    pub fn new(role: MessageRole, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp,
            role,
            content: content.into(),
            error_code: None,
        }
    }

    pub fn with_error(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Transcript {
    entries: VecDeque<TranscriptEntry>,
    limit: usize,
}

impl Transcript {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit.min(64)),
            limit,
        }
    }

    /// Append a turn, dropping the oldest once the limit is reached
    pub fn push(&mut self, entry: TranscriptEntry) {
        if self.limit == 0 {
            return;
        }
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Recent accepted turns formatted for an LLM prompt.
    ///
    /// Rejected turns and their explanations are left out so filtered input
    /// never reaches the model through the context window.
    pub fn formatted_context(&self, max_turns: usize) -> String {
        let all: Vec<&TranscriptEntry> = self.entries.iter().collect();

        // A rejected user turn is followed by an assistant entry carrying the
        // error code; drop both halves.
        let keep: Vec<&TranscriptEntry> = all
            .iter()
            .enumerate()
            .filter(|(i, entry)| {
                let answered_with_error = all.get(i + 1).is_some_and(|next| {
                    next.role == MessageRole::Assistant && next.error_code.is_some()
                });
                entry.error_code.is_none()
                    && !(entry.role == MessageRole::User && answered_with_error)
            })
            .map(|(_, entry)| *entry)
            .collect();

        let skip = keep.len().saturating_sub(max_turns);
        let mut context = String::new();
        for entry in keep.into_iter().skip(skip) {
            let role = match entry.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Analyst",
            };
            context.push_str(&format!("- {}: {}\n", role, entry.content));
        }
        context
    }
}
