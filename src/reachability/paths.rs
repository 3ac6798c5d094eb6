//! Reference chains from the root set, and transitive closures.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use fixedbitset::FixedBitSet;

use super::excludes::ReachableExcludes;
use crate::constants::{JAVA_LANG_REF_FINALIZER, REFERENT_FIELD};
use crate::heap::{Heap, Instance};
use crate::Result;

/// Immutable singly linked path of objects.
#[derive(Clone, Debug)]
pub struct ReferenceChain {
    obj: Instance,
    next: Option<Arc<ReferenceChain>>,
}

impl ReferenceChain {
    pub fn new(obj: Instance, next: Option<Arc<ReferenceChain>>) -> ReferenceChain {
        ReferenceChain { obj, next }
    }

    pub fn obj(&self) -> Instance {
        self.obj
    }

    pub fn next(&self) -> Option<&ReferenceChain> {
        self.next.as_deref()
    }

    /// Number of objects in the chain.
    pub fn depth(&self) -> usize {
        self.iter().count()
    }

    pub fn iter(&self) -> impl Iterator<Item = Instance> + '_ {
        std::iter::successors(Some(self), |c| c.next()).map(|c| c.obj)
    }

    pub fn last(&self) -> Instance {
        self.iter().last().unwrap_or(self.obj)
    }
}

impl fmt::Display for ReferenceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, obj) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" <- ")?;
            }
            write!(f, "{}", obj)?;
        }
        Ok(())
    }
}

impl Heap {
    /// True when every slot of `referrer` pointing at `target` is either the
    /// referent of a weak reference or a field named by the excludes.
    pub fn refers_only_weakly(&self, referrer: &Instance, target: &Instance) -> Result<bool> {
        let excludes = self.options().excludes.as_deref();
        let mut any = false;
        for (slot, id) in self.references(referrer)? {
            if id != target.id() {
                continue;
            }
            any = true;
            if self.is_weak_slot(referrer, &slot) {
                continue;
            }
            let excluded = match (excludes, slot.qualified_name()) {
                (Some(excludes), Some(name)) => excludes.is_excluded(&name),
                _ => false,
            };
            if !excluded {
                return Ok(false);
            }
        }
        Ok(any)
    }

    /// Objects referring to `instance`, leaving out those that only hold it
    /// weakly unless `include_weak` is set.
    pub fn referrers_filtered(&self, instance: &Instance, include_weak: bool) -> Result<Vec<Instance>> {
        let mut result = vec![];
        for referrer in self.referrers(instance)? {
            if include_weak || !self.refers_only_weakly(&referrer, instance)? {
                result.push(referrer);
            }
        }
        Ok(result)
    }

    /// Breadth-first search backwards from `target`. Each GC root met yields
    /// a chain starting at `target` and ending at that root; roots are not
    /// expanded further. Every object is visited at most once.
    pub fn rootset_references_to(
        &self,
        target: &Instance,
        include_weak: bool,
    ) -> Result<Vec<ReferenceChain>> {
        let graph = self.graph()?;
        let mut visited = FixedBitSet::with_capacity(graph.node_count());
        // object -> the object one step closer to the target
        let mut toward_target: HashMap<u32, u32> = HashMap::new();
        let mut queue: VecDeque<u32> = VecDeque::new();
        let mut chains = vec![];
        let start = target.index() as u32;
        visited.insert(start as usize);
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            if graph.is_root(node) {
                chains.push(self.chain_to(node, start, &toward_target));
                continue;
            }
            let current = self.object_at(node as usize);
            for referrer in graph.referrers(node) {
                if visited.contains(*referrer as usize) {
                    continue;
                }
                let referrer_object = self.object_at(*referrer as usize);
                if !include_weak && self.refers_only_weakly(&referrer_object, &current)? {
                    continue;
                }
                visited.insert(*referrer as usize);
                toward_target.insert(*referrer, node);
                queue.push_back(*referrer);
            }
        }
        debug!(
            "Found {} root paths to {:#x} after visiting {} objects",
            chains.len(),
            target.id(),
            visited.count_ones(..)
        );
        Ok(chains)
    }

    fn chain_to(&self, root: u32, target: u32, toward_target: &HashMap<u32, u32>) -> ReferenceChain {
        let mut chain = ReferenceChain::new(self.object_at(root as usize), None);
        let mut node = root;
        while node != target {
            node = toward_target[&node];
            chain = ReferenceChain::new(self.object_at(node as usize), Some(Arc::new(chain)));
        }
        chain
    }

    /// Everything transitively reachable from `start`, `start` excluded, in
    /// discovery order. References held in excluded fields are not followed.
    pub fn reachables(
        &self,
        start: &Instance,
        excludes: Option<&dyn ReachableExcludes>,
    ) -> Result<Vec<Instance>> {
        let mut marked = FixedBitSet::with_capacity(self.object_count());
        let mut mark_stack = vec![*start];
        let mut reachable = vec![];
        marked.insert(start.index());
        while let Some(o) = mark_stack.pop() {
            for (slot, id) in self.references(&o)? {
                if let (Some(excludes), Some(name)) = (excludes, slot.qualified_name()) {
                    if excludes.is_excluded(&name) {
                        continue;
                    }
                }
                let Some(child) = self.instance_by_id(id) else {
                    continue;
                };
                if !marked.put(child.index()) {
                    reachable.push(child);
                    mark_stack.push(child);
                }
            }
        }
        Ok(reachable)
    }

    /// Referents of pending `java.lang.ref.Finalizer` objects.
    pub fn finalizables(&self) -> Result<Vec<Instance>> {
        let Some(finalizer) = self.class_by_name(JAVA_LANG_REF_FINALIZER) else {
            return Ok(vec![]);
        };
        let mut result = vec![];
        for f in self.instances_including_subclasses(finalizer) {
            if let Some(id) = self
                .field_value(&f, REFERENT_FIELD)?
                .and_then(|v| v.object_id())
            {
                result.extend(self.instance_by_id(id));
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::FieldList;
    use crate::testing::*;
    use crate::HeapOptions;

    fn chain_ids(chains: &[ReferenceChain]) -> Vec<Vec<u64>> {
        let mut ids: Vec<Vec<u64>> = chains
            .iter()
            .map(|c| c.iter().map(|i| i.id()).collect())
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_strong_chains() {
        let heap = sample_heap();
        let s2 = heap.instance_by_id(S2).unwrap();
        let chains = heap.rootset_references_to(&s2, false).unwrap();
        assert_eq!(
            chain_ids(&chains),
            vec![vec![S2, N3, N2, N1], vec![S2, N3, A1, H1, HOLDER_CLASS]]
        );
        for chain in &chains {
            assert_eq!(chain.obj(), s2);
            assert!(heap.is_gc_root(&chain.last()));
            assert_eq!(chain.depth(), chain.iter().count());
        }
    }

    #[test]
    fn test_weak_chains() {
        let heap = sample_heap();
        let n2 = heap.instance_by_id(N2).unwrap();
        let strong = heap.rootset_references_to(&n2, false).unwrap();
        assert_eq!(chain_ids(&strong), vec![vec![N2, N1]]);
        let all = heap.rootset_references_to(&n2, true).unwrap();
        assert_eq!(chain_ids(&all), vec![vec![N2, N1], vec![N2, W1]]);
    }

    #[test]
    fn test_root_target_and_unreachable() {
        let heap = sample_heap();
        let n1 = heap.instance_by_id(N1).unwrap();
        let chains = heap.rootset_references_to(&n1, true).unwrap();
        assert_eq!(chain_ids(&chains), vec![vec![N1]]);
        let u1 = heap.instance_by_id(U1).unwrap();
        assert!(heap.rootset_references_to(&u1, true).unwrap().is_empty());
    }

    #[test]
    fn test_excluded_fields_cut_chains() {
        let excludes = Arc::new(FieldList::parse("com.example.Node.next"));
        let heap = crate::Heap::from_bytes(sample_dump(), HeapOptions::default().with_excludes(excludes))
            .unwrap();
        let n3 = heap.instance_by_id(N3).unwrap();
        let chains = heap.rootset_references_to(&n3, false).unwrap();
        assert_eq!(chain_ids(&chains), vec![vec![N3, A1, H1, HOLDER_CLASS]]);
        let n2 = heap.instance_by_id(N2).unwrap();
        assert!(heap.refers_only_weakly(&n2, &n3).unwrap());
        assert_eq!(heap.referrers_filtered(&n3, false).unwrap().len(), 1);
        assert_eq!(heap.referrers_filtered(&n3, true).unwrap().len(), 2);
    }

    #[test]
    fn test_reachables() {
        let heap = sample_heap();
        let n1 = heap.instance_by_id(N1).unwrap();
        let mut ids: Vec<u64> = heap
            .reachables(&n1, None)
            .unwrap()
            .iter()
            .map(Instance::id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![S1, C1, S2, C2, N2, N3]);
        let excludes = FieldList::parse("com.example.Node.next");
        let ids: Vec<u64> = heap
            .reachables(&n1, Some(&excludes))
            .unwrap()
            .iter()
            .map(Instance::id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&S1) && ids.contains(&C1));
    }

    #[test]
    fn test_chain_display() {
        let heap = sample_heap();
        let n2 = heap.instance_by_id(N2).unwrap();
        let chain = &heap.rootset_references_to(&n2, false).unwrap()[0];
        assert_eq!(chain.to_string(), "0x2010 <- 0x2000");
    }
}
