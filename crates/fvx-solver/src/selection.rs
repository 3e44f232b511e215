//! Run-time selection tables.
//!
//! Every selectable family (linear solvers, preconditioners, smoothers and
//! each scheme category) owns one table mapping a type name to a
//! constructor. Tables are built on first use behind a `OnceLock` and never
//! change afterwards.

use std::collections::BTreeMap;

use crate::error::{FvError, Result};

#[derive(Debug)]
pub struct RuntimeSelectionTable<F> {
    category: &'static str,
    entries: BTreeMap<&'static str, F>,
}

impl<F: Copy> RuntimeSelectionTable<F> {
    pub fn new(category: &'static str) -> Self {
        Self {
            category,
            entries: BTreeMap::new(),
        }
    }

    pub fn register(mut self, name: &'static str, constructor: F) -> Self {
        self.entries.insert(name, constructor);
        self
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    pub fn lookup(&self, name: &str) -> Result<F> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| FvError::UnknownSelection {
                category: self.category.to_string(),
                name: name.to_string(),
                valid: self.names().iter().map(|n| n.to_string()).collect(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }
}
