use std::sync::Arc;

use super::sizes::SizeSettings;
use crate::constants::*;
use crate::reachability::ReachableExcludes;

/// Knobs for building and analysing a heap.
#[derive(Clone)]
pub struct HeapOptions {
    /// Number of decoded field tables kept in memory.
    pub field_cache_capacity: usize,
    /// Shallow size model; derived from the identifier size when `None`.
    pub sizes: Option<SizeSettings>,
    /// Instances of subclasses of this class hold weak references.
    pub weak_reference_class: String,
    pub referent_field: String,
    /// Fields ignored when searching for paths from the root set.
    pub excludes: Option<Arc<dyn ReachableExcludes>>,
}

impl Default for HeapOptions {
    fn default() -> Self {
        HeapOptions {
            field_cache_capacity: DEFAULT_FIELD_CACHE_CAPACITY,
            sizes: None,
            weak_reference_class: JAVA_LANG_REF_REFERENCE.to_string(),
            referent_field: REFERENT_FIELD.to_string(),
            excludes: None,
        }
    }
}

impl HeapOptions {
    pub fn with_excludes(mut self, excludes: Arc<dyn ReachableExcludes>) -> Self {
        self.excludes = Some(excludes);
        self
    }

    pub fn with_sizes(mut self, sizes: SizeSettings) -> Self {
        self.sizes = Some(sizes);
        self
    }
}
