//! Program-wide published aliases
//!
//! `<Publish> as <alias> <variable>.` copies a binding here, where every
//! feature set can read it. Writes replace the whole entry under a lock, so
//! each alias is updated atomically; there is no ordering across aliases.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::types::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedValue {
    pub value: Value,
    /// Feature set that wrote the current value
    pub publisher: String,
    pub published_at: DateTime<Utc>,
}

/// Shared, append/overwrite alias table
#[derive(Debug, Clone, Default)]
pub struct GlobalSymbolRegistry {
    entries: Arc<RwLock<HashMap<String, PublishedValue>>>,
}

impl GlobalSymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish (or re-publish) a value under `alias`
    pub fn publish(&self, alias: &str, value: Value, publisher: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = entries.get(alias) {
            if previous.value.type_name() != value.type_name() {
                tracing::warn!(
                    alias,
                    publisher,
                    previous = previous.value.type_name(),
                    current = value.type_name(),
                    "Published alias changed type"
                );
            }
        }
        tracing::debug!(alias, publisher, "Alias published");
        entries.insert(
            alias.to_string(),
            PublishedValue {
                value,
                publisher: publisher.to_string(),
                published_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, alias: &str) -> Option<Value> {
        self.entry(alias).map(|entry| entry.value)
    }

    pub fn entry(&self, alias: &str) -> Option<PublishedValue> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(alias)
            .cloned()
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(alias)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every alias and its value
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(alias, entry)| (alias.clone(), entry.value.clone()))
            .collect()
    }
}
