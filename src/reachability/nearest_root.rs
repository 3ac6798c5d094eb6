//! Breadth-first distances from the root set.

use std::collections::VecDeque;
use std::time::Instant;

use super::graph::ObjectGraph;
use crate::heap::{GcRoot, Heap, Instance};
use crate::Result;

const UNREACHED: u32 = u32::MAX;

/// BFS parent of every object reachable from the roots over strong edges.
/// Roots are their own parent.
pub(crate) struct NearestRoots {
    parent: Vec<u32>,
}

impl NearestRoots {
    pub(crate) fn compute(graph: &ObjectGraph) -> NearestRoots {
        let start = Instant::now();
        let mut parent = vec![UNREACHED; graph.node_count()];
        let mut queue: VecDeque<u32> = VecDeque::new();
        for root in graph.roots() {
            parent[*root as usize] = *root;
            queue.push_back(*root);
        }
        while let Some(node) = queue.pop_front() {
            for child in graph.strong_referees(node) {
                if parent[child as usize] == UNREACHED {
                    parent[child as usize] = node;
                    queue.push_back(child);
                }
            }
        }
        debug!(
            "Computed nearest GC roots in {} ms",
            start.elapsed().as_millis()
        );
        NearestRoots { parent }
    }

    pub(crate) fn parent(&self, node: usize) -> Option<u32> {
        match self.parent[node] {
            UNREACHED => None,
            p => Some(p),
        }
    }
}

impl Heap {
    fn nearest_roots(&self) -> Result<&NearestRoots> {
        let graph = self.graph()?;
        Ok(self
            .derived
            .nearest
            .get_or_init(|| NearestRoots::compute(graph)))
    }

    /// Next object on a shortest path from `instance` towards the root set.
    /// GC roots return themselves; unreachable objects return `None`.
    pub fn nearest_gc_root_pointer(&self, instance: &Instance) -> Result<Option<Instance>> {
        Ok(self
            .nearest_roots()?
            .parent(instance.index())
            .map(|p| self.object_at(p as usize)))
    }

    /// Objects from `instance` to its nearest GC root, both included.
    /// Empty for unreachable objects.
    pub fn nearest_root_path(&self, instance: &Instance) -> Result<Vec<Instance>> {
        let nearest = self.nearest_roots()?;
        let mut path = vec![];
        let mut current = instance.index();
        while let Some(parent) = nearest.parent(current) {
            path.push(self.object_at(current));
            if parent as usize == current {
                break;
            }
            current = parent as usize;
        }
        Ok(path)
    }

    /// The root record that keeps `instance` alive along its shortest path.
    pub fn gc_root_for(&self, instance: &Instance) -> Result<Option<GcRoot>> {
        let path = self.nearest_root_path(instance)?;
        Ok(path
            .last()
            .and_then(|root| self.gc_roots_for(root).into_iter().next()))
    }
}
