use std::collections::HashMap;

use crate::models::{PictogramId, Placeholder};

/// Offline stand-ins for pictograms, keyed by id.
///
/// Ids without an entry get [`Placeholder::generic`].
#[derive(Debug, Clone, Default)]
pub struct PlaceholderCatalog {
    by_id: HashMap<PictogramId, Placeholder>,
}

impl PlaceholderCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `placeholder` for `id`. The first registration for an id wins.
    pub fn insert(&mut self, id: PictogramId, placeholder: Placeholder) {
        self.by_id.entry(id).or_insert(placeholder);
    }

    #[must_use]
    pub fn for_id(&self, id: &PictogramId) -> Placeholder {
        self.by_id
            .get(id)
            .cloned()
            .unwrap_or_else(Placeholder::generic)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl FromIterator<(PictogramId, Placeholder)> for PlaceholderCatalog {
    fn from_iter<T: IntoIterator<Item = (PictogramId, Placeholder)>>(iter: T) -> Self {
        let mut catalog = Self::new();
        for (id, placeholder) in iter {
            catalog.insert(id, placeholder);
        }
        catalog
    }
}
