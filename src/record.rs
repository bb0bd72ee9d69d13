use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Write side of the cleaned-URL audit trail.
pub trait UrlRecord {
    /// Last write for a given original wins.
    fn upsert(&mut self, original: &str, cleaned: &str);
}

/// In-memory `original -> cleaned` mapping.
///
/// Keeps track of which originals changed since the last
/// [`take_pending`](Self::take_pending) so a store can flush incrementally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanedUrls {
    entries: HashMap<String, String>,
    #[serde(skip)]
    pending: Vec<String>,
}

impl CleanedUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the record from persisted entries. Nothing is pending afterwards.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            entries: entries.into_iter().collect(),
            pending: Vec::new(),
        }
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries.get(original).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries written since the previous call, in write order.
    pub fn take_pending(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .filter_map(|original| {
                let cleaned = self.entries.get(&original)?.clone();
                Some((original, cleaned))
            })
            .collect()
    }
}

impl UrlRecord for CleanedUrls {
    fn upsert(&mut self, original: &str, cleaned: &str) {
        if self.entries.get(original).map(String::as_str) == Some(cleaned) {
            return;
        }
        self.entries.insert(original.to_string(), cleaned.to_string());
        if !self.pending.iter().any(|p| p == original) {
            self.pending.push(original.to_string());
        }
    }
}

impl UrlRecord for HashMap<String, String> {
    fn upsert(&mut self, original: &str, cleaned: &str) {
        self.insert(original.to_string(), cleaned.to_string());
    }
}
