#[macro_use]
extern crate log;

mod constants;
mod error;
pub mod heap;
pub mod oql;
pub mod reachability;
pub mod reader;
#[cfg(test)]
mod testing;

pub use crate::error::{Error, Result};
pub use crate::heap::{
    ClassIndex, ClassMetadata, FieldValue, GcRoot, GcRootKind, Heap, HeapOptions, HeapSummary,
    Instance, Primitive,
};
pub use crate::oql::{ObjectVisitor, OqlEngine, Value};
pub use crate::reachability::{ExcludesFile, FieldList, ReachableExcludes, ReferenceChain};
