//! Dominator tree of the strong object graph and the retained sizes it implies.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

use fixedbitset::FixedBitSet;

use super::graph::ObjectGraph;
use crate::heap::{ClassMetadata, Heap, Instance, ObjectKind};
use crate::Result;

const UNDEFINED: u32 = u32::MAX;

pub(crate) struct Dominators {
    /// Immediate dominator per object; the virtual root is `idom.len()`.
    idom: Vec<u32>,
    retained: Vec<u64>,
    /// Reachable objects in reverse postorder, virtual root excluded.
    order: Vec<u32>,
}

impl Dominators {
    /// Iterative dominator computation (Cooper, Harvey and Kennedy) over a
    /// virtual root whose successors are the GC roots.
    pub(crate) fn compute(heap: &Heap, graph: &ObjectGraph) -> Dominators {
        let start = Instant::now();
        let n = graph.node_count();
        let root = n as u32;

        let mut postorder: Vec<u32> = Vec::with_capacity(n + 1);
        let mut visited = FixedBitSet::with_capacity(n + 1);
        let mut stack: Vec<(u32, usize)> = vec![(root, 0)];
        visited.insert(root as usize);
        while let Some(top) = stack.last_mut() {
            let (node, pos) = *top;
            let successors = if node == root {
                graph.roots()
            } else {
                graph.referees(node)
            };
            if pos < successors.len() {
                top.1 += 1;
                if node != root && graph.is_weak_edge(node, pos) {
                    continue;
                }
                let child = successors[pos];
                if !visited.put(child as usize) {
                    stack.push((child, 0));
                }
            } else {
                postorder.push(node);
                stack.pop();
            }
        }
        let order: Vec<u32> = postorder.into_iter().rev().collect();
        let mut rpo = vec![UNDEFINED; n + 1];
        for (i, node) in order.iter().enumerate() {
            rpo[*node as usize] = i as u32;
        }

        let mut idom = vec![UNDEFINED; n + 1];
        idom[root as usize] = root;
        let mut changed = true;
        let mut rounds = 0;
        while changed {
            changed = false;
            rounds += 1;
            for b in &order[1..] {
                let b = *b;
                let mut new_idom = if graph.is_root(b) { root } else { UNDEFINED };
                for p in graph.strong_referrers(b) {
                    if idom[p as usize] == UNDEFINED {
                        continue;
                    }
                    new_idom = if new_idom == UNDEFINED {
                        p
                    } else {
                        intersect(&idom, &rpo, p, new_idom)
                    };
                }
                if new_idom != UNDEFINED && idom[b as usize] != new_idom {
                    idom[b as usize] = new_idom;
                    changed = true;
                }
            }
        }

        let mut retained: Vec<u64> = (0..n).map(|i| heap.object_at(i).shallow_size()).collect();
        for node in order.iter().rev() {
            let d = idom[*node as usize];
            if *node != root && d != root {
                retained[d as usize] += retained[*node as usize];
            }
        }
        idom.truncate(n);
        info!(
            "Computed dominators of {} reachable objects in {} rounds, {} ms",
            order.len() - 1,
            rounds,
            start.elapsed().as_millis()
        );
        Dominators {
            idom,
            retained,
            order: order[1..].to_vec(),
        }
    }

    pub(crate) fn retained(&self, node: usize) -> u64 {
        self.retained[node]
    }

    /// `None` for objects dominated only by the root set and for unreachable objects.
    pub(crate) fn immediate_dominator(&self, node: usize) -> Option<u32> {
        match self.idom[node] {
            UNDEFINED => None,
            d if d as usize == self.idom.len() => None,
            d => Some(d),
        }
    }

    pub(crate) fn is_reachable(&self, node: usize) -> bool {
        self.idom[node] != UNDEFINED
    }

    /// Retained size per class, counting only instances that are not
    /// dominated by another instance of the same class.
    pub(crate) fn retained_by_class(&self, heap: &Heap) -> Vec<u64> {
        let n = self.idom.len();
        let mut child_count = vec![0usize; n + 2];
        for node in &self.order {
            let parent = self.idom[*node as usize] as usize;
            child_count[parent + 1] += 1;
        }
        for i in 1..child_count.len() {
            child_count[i] += child_count[i - 1];
        }
        let offsets = child_count;
        let mut fill = offsets.clone();
        let mut children = vec![0u32; self.order.len()];
        for node in &self.order {
            let parent = self.idom[*node as usize] as usize;
            children[fill[parent]] = *node;
            fill[parent] += 1;
        }

        let class_of = |node: usize| {
            let object = heap.object_at(node);
            (object.kind() != ObjectKind::Class).then(|| object.class().as_usize())
        };
        let mut totals = vec![0u64; heap.all_classes().len()];
        let mut active = vec![0u32; totals.len()];
        // (node, entered) pairs; the second visit closes the node
        let mut stack: Vec<(usize, bool)> = offsets_children(&offsets, &children, n)
            .iter()
            .map(|c| (*c as usize, false))
            .collect();
        while let Some((node, entered)) = stack.pop() {
            let class = class_of(node);
            if entered {
                if let Some(c) = class {
                    active[c] -= 1;
                }
                continue;
            }
            if let Some(c) = class {
                if active[c] == 0 {
                    totals[c] += self.retained[node];
                }
                active[c] += 1;
            }
            stack.push((node, true));
            for child in offsets_children(&offsets, &children, node) {
                stack.push((*child as usize, false));
            }
        }
        for node in 0..n {
            if !self.is_reachable(node) {
                if let Some(c) = class_of(node) {
                    totals[c] += self.retained[node];
                }
            }
        }
        totals
    }
}

fn offsets_children<'a>(offsets: &[usize], children: &'a [u32], node: usize) -> &'a [u32] {
    &children[offsets[node]..offsets[node + 1]]
}

fn intersect(idom: &[u32], rpo: &[u32], mut a: u32, mut b: u32) -> u32 {
    while a != b {
        while rpo[a as usize] > rpo[b as usize] {
            a = idom[a as usize];
        }
        while rpo[b as usize] > rpo[a as usize] {
            b = idom[b as usize];
        }
    }
    a
}

impl Heap {
    pub(crate) fn dominators(&self) -> Result<&Dominators> {
        let graph = self.graph()?;
        Ok(self
            .derived
            .dominators
            .get_or_init(|| Dominators::compute(self, graph)))
    }

    /// Bytes that would be freed if `instance` became unreachable. Equal to
    /// the shallow size for objects outside the root set's reach.
    pub fn retained_size(&self, instance: &Instance) -> Result<u64> {
        Ok(self.dominators()?.retained(instance.index()))
    }

    pub fn retained_size_by_class(&self, class: &ClassMetadata) -> Result<u64> {
        let dominators = self.dominators()?;
        let totals = self
            .derived
            .retained_by_class
            .get_or_init(|| dominators.retained_by_class(self));
        Ok(totals[class.index().as_usize()])
    }

    /// The object's immediate dominator, `None` when it is dominated only by
    /// the root set or unreachable.
    pub fn immediate_dominator(&self, instance: &Instance) -> Result<Option<Instance>> {
        Ok(self
            .dominators()?
            .immediate_dominator(instance.index())
            .map(|d| self.object_at(d as usize)))
    }

    /// The `n` objects with the largest retained sizes, largest first; ties
    /// are ordered by ascending id.
    pub fn biggest_objects_by_retained_size(&self, n: usize) -> Result<Vec<Instance>> {
        let dominators = self.dominators()?;
        if n == 0 {
            return Ok(vec![]);
        }
        let mut best = BinaryHeap::with_capacity(n + 1);
        for object in self.all_objects() {
            best.push(Reverse((
                dominators.retained(object.index()),
                Reverse(object.id()),
                object.index(),
            )));
            if best.len() > n {
                best.pop();
            }
        }
        let mut result: Vec<_> = best.into_iter().map(|Reverse(entry)| entry).collect();
        result.sort_unstable_by(|a, b| b.cmp(a));
        Ok(result
            .into_iter()
            .map(|(_, _, index)| self.object_at(index))
            .collect())
    }
}
