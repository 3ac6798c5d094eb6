//! Graph metrics derived from an indexed heap: retained sizes, nearest GC
//! roots, and reference chains. Everything is computed on first use and
//! cached inside the heap.

mod dominators;
mod excludes;
mod graph;
mod nearest_root;
mod paths;

use fixedbitset::FixedBitSet;
use once_cell::sync::OnceCell;

pub use excludes::{ExcludesFile, FieldList, ReachableExcludes};
pub use graph::Slot;
pub use paths::ReferenceChain;

use dominators::Dominators;
use graph::ObjectGraph;
use nearest_root::NearestRoots;

#[derive(Default)]
pub(crate) struct Derived {
    weak_classes: OnceCell<FixedBitSet>,
    graph: OnceCell<ObjectGraph>,
    dominators: OnceCell<Dominators>,
    retained_by_class: OnceCell<Vec<u64>>,
    nearest: OnceCell<NearestRoots>,
}
