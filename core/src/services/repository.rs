//! In-memory repositories
//!
//! Every `<*-repository>` object name addresses a list of values. Lists are
//! created on first write; reading a repository that was never written
//! yields nothing rather than an empty list.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::executor::types::Value;

#[derive(Debug, Clone, Default)]
pub struct RepositoryStore {
    repositories: Arc<RwLock<HashMap<String, Vec<Value>>>>,
}

impl RepositoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value. Lists are stored element by element.
    pub fn store(&self, repository: &str, value: Value) -> usize {
        let mut repositories = self.repositories.write().unwrap_or_else(|e| e.into_inner());
        let entries = repositories.entry(repository.to_string()).or_default();
        match value {
            Value::List(items) => entries.extend(items),
            other => entries.push(other),
        }
        tracing::debug!(repository, size = entries.len(), "Repository updated");
        entries.len()
    }

    /// Every stored value, or `None` when the repository was never written
    pub fn retrieve(&self, repository: &str) -> Option<Vec<Value>> {
        self.repositories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(repository)
            .cloned()
    }

    pub fn len(&self, repository: &str) -> usize {
        self.repositories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(repository)
            .map_or(0, Vec::len)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .repositories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_retrieve() {
        let store = RepositoryStore::new();
        assert!(store.retrieve("user-repository").is_none());

        store.store("user-repository", Value::from("ada"));
        let size = store.store(
            "user-repository",
            Value::List(vec![Value::from("bob"), Value::from("cy")]),
        );

        assert_eq!(size, 3);
        assert_eq!(store.len("user-repository"), 3);
        assert_eq!(
            store.retrieve("user-repository").unwrap().last(),
            Some(&Value::from("cy"))
        );
        assert_eq!(store.names(), vec!["user-repository".to_string()]);
    }
}
