//! Fields to ignore when following references.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

/// Decides whether a reference held in a field should be ignored.
/// Fields are named `declaring.Class.field`.
pub trait ReachableExcludes: Send + Sync {
    fn is_excluded(&self, field: &str) -> bool;
}

fn parse_fields(text: &str) -> HashSet<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

/// A fixed set of field names.
#[derive(Clone, Debug, Default)]
pub struct FieldList {
    fields: HashSet<String>,
}

impl FieldList {
    /// Parses a comma- or whitespace-separated list of `Class.field` names.
    pub fn parse(list: &str) -> FieldList {
        FieldList {
            fields: parse_fields(list),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl ReachableExcludes for FieldList {
    fn is_excluded(&self, field: &str) -> bool {
        self.fields.contains(field)
    }
}

struct FileState {
    modified: Option<SystemTime>,
    fields: HashSet<String>,
}

/// Field names read from a file, one per line. The file is re-read whenever
/// its modification time changes.
pub struct ExcludesFile {
    path: PathBuf,
    state: RwLock<FileState>,
}

impl ExcludesFile {
    pub fn new(path: impl AsRef<Path>) -> ExcludesFile {
        let excludes = ExcludesFile {
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(FileState {
                modified: None,
                fields: HashSet::new(),
            }),
        };
        excludes.load(excludes.modified());
        excludes
    }

    fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    fn refresh(&self) {
        let modified = self.modified();
        if self.state.read().unwrap().modified != modified {
            self.load(modified);
        }
    }

    fn load(&self, modified: Option<SystemTime>) {
        let fields = match fs::read_to_string(&self.path) {
            Ok(text) => parse_fields(&text),
            Err(e) => {
                warn!("Cannot read excludes file {}: {}", self.path.display(), e);
                HashSet::new()
            }
        };
        debug!(
            "Loaded {} excluded fields from {}",
            fields.len(),
            self.path.display()
        );
        *self.state.write().unwrap() = FileState { modified, fields };
    }
}

impl ReachableExcludes for ExcludesFile {
    fn is_excluded(&self, field: &str) -> bool {
        self.refresh();
        self.state.read().unwrap().fields.contains(field)
    }
}
