use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::Identifier;

/// Identifiers already accumulated during one fetch-all run. Grows monotonically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeenIds {
    ids: BTreeSet<Identifier>,
}

impl SeenIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the identifier had not been seen before.
    pub fn add_if_new(&mut self, id: Identifier) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<Identifier> for SeenIds {
    fn from_iter<T: IntoIterator<Item = Identifier>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
