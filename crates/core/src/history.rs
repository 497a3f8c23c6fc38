//! Bounded conversation history
//!
//! History items form the message list handed to the LLM on every turn. The
//! store enforces a maximum length with oldest-first eviction, with two
//! carve-outs: the pinned system item is never evicted, and a `ToolCall` is
//! never separated from its paired `ToolResult` (they evict together).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// One item of conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryItem {
    System {
        text: String,
    },
    User {
        text: String,
        language: Language,
    },
    Assistant {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    ToolResult {
        id: String,
        content: String,
    },
}

impl HistoryItem {
    pub fn user(text: impl Into<String>, language: Language) -> Self {
        HistoryItem::User {
            text: text.into(),
            language,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        HistoryItem::Assistant { text: text.into() }
    }
}

/// Bounded, eviction-safe history store
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    /// Pinned system prompt, not subject to the cap
    system: Option<String>,
    items: VecDeque<HistoryItem>,
    max_items: usize,
}

impl ConversationHistory {
    pub fn new(max_items: usize) -> Self {
        Self {
            system: None,
            items: VecDeque::new(),
            max_items: max_items.max(1),
        }
    }

    /// Set or replace the pinned system prompt.
    pub fn set_system(&mut self, text: impl Into<String>) {
        self.system = Some(text.into());
    }

    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    /// Append an item, evicting from the front until under the cap.
    pub fn push(&mut self, item: HistoryItem) {
        debug_assert!(
            !matches!(item, HistoryItem::System { .. }),
            "system prompt goes through set_system"
        );
        self.items.push_back(item);
        self.evict();
    }

    fn evict(&mut self) {
        while self.items.len() > self.max_items {
            match self.items.pop_front() {
                // A tool call never leaves without its result.
                Some(HistoryItem::ToolCall { id, .. }) => {
                    if matches!(
                        self.items.front(),
                        Some(HistoryItem::ToolResult { id: rid, .. }) if *rid == id
                    ) {
                        self.items.pop_front();
                    }
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    /// Drop trailing `ToolCall`s that never received a `ToolResult`.
    ///
    /// Called after a cancelled turn so the history ends on a `User` item or
    /// a complete Assistant/ToolCall/ToolResult sub-sequence.
    pub fn truncate_dangling(&mut self) {
        while let Some(HistoryItem::ToolCall { .. }) = self.items.back() {
            self.items.pop_back();
        }
    }

    /// Language of the most recent user item, if any.
    pub fn last_user_language(&self) -> Option<Language> {
        self.items.iter().rev().find_map(|item| match item {
            HistoryItem::User { language, .. } => Some(*language),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryItem> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
