use std::fmt;

pub use crate::reader::GcRootKind;

/// One entry of the dump's root set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GcRoot {
    pub kind: GcRootKind,
    pub id: u64,
}

impl GcRoot {
    pub fn description(&self) -> &'static str {
        self.kind.description()
    }
}

impl fmt::Display for GcRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} root {:#x}", self.kind, self.id)
    }
}
