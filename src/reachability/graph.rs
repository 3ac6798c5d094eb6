//! Forward and reverse adjacency over dense object indices.

use std::fmt;
use std::time::Instant;

use fixedbitset::FixedBitSet;

use crate::heap::{ClassMetadata, FieldValue, Heap, Instance, ObjectKind};
use crate::Result;

/// Where a reference is stored in its holder.
#[derive(Clone, Copy)]
pub enum Slot<'a> {
    Field {
        declaring: &'a ClassMetadata,
        name: &'a str,
    },
    Static {
        class: &'a ClassMetadata,
        name: &'a str,
    },
    Element(u32),
}

impl fmt::Debug for Slot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Field { declaring, name } => write!(f, "Field({}.{})", declaring.name(), name),
            Slot::Static { class, name } => write!(f, "Static({}.{})", class.name(), name),
            Slot::Element(index) => write!(f, "Element({})", index),
        }
    }
}

impl Slot<'_> {
    /// `declaring.Class.field` for fields and statics.
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            Slot::Field { declaring, name } => Some(format!("{}.{}", declaring.name(), name)),
            Slot::Static { class, name } => Some(format!("{}.{}", class.name(), name)),
            Slot::Element(_) => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Slot::Field { name, .. } => format!("field {}", name),
            Slot::Static { name, .. } => format!("static field {}", name),
            Slot::Element(index) => format!("[{}]", index),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Slot::Field { name, .. } | Slot::Static { name, .. } => Some(name),
            Slot::Element(_) => None,
        }
    }
}

impl Heap {
    /// Non-null references held by `instance`, paired with the slot holding each.
    pub fn references(&self, instance: &Instance) -> Result<Vec<(Slot<'_>, u64)>> {
        let fields = self.fields(instance)?;
        Ok(self.slots(instance, &fields))
    }

    pub(crate) fn slots(&self, instance: &Instance, fields: &[FieldValue]) -> Vec<(Slot<'_>, u64)> {
        let class = self.class(instance.class());
        match instance.kind() {
            ObjectKind::Instance => {
                let mut result = vec![];
                let mut values = fields.iter();
                let mut current = Some(class);
                while let Some(c) = current {
                    for decl in c.fields() {
                        let Some(value) = values.next() else {
                            return result;
                        };
                        if let Some(id) = value.object_id() {
                            let slot = Slot::Field {
                                declaring: c,
                                name: &*decl.name,
                            };
                            result.push((slot, id));
                        }
                    }
                    current = self.superclass(c);
                }
                result
            }
            ObjectKind::Class => class
                .statics()
                .iter()
                .filter_map(|s| match s {
                    FieldValue::Object { name, id } if *id != 0 => {
                        Some((Slot::Static { class, name: &**name }, *id))
                    }
                    _ => None,
                })
                .collect(),
            ObjectKind::ObjectArray => fields
                .iter()
                .filter_map(|f| match f {
                    FieldValue::Element { index, id } if *id != 0 => {
                        Some((Slot::Element(*index), *id))
                    }
                    _ => None,
                })
                .collect(),
            ObjectKind::PrimitiveArray(_) => vec![],
        }
    }

    /// Classes whose instances hold their referent weakly.
    pub(crate) fn weak_reference_classes(&self) -> &FixedBitSet {
        self.derived.weak_classes.get_or_init(|| {
            let mut weak = FixedBitSet::with_capacity(self.all_classes().len());
            if let Some(reference) = self.class_by_name(&self.options().weak_reference_class) {
                for class in self.class_and_subclasses(reference) {
                    weak.insert(class.index().as_usize());
                }
            }
            weak
        })
    }

    pub(crate) fn is_weak_slot(&self, instance: &Instance, slot: &Slot) -> bool {
        matches!(slot, Slot::Field { name, .. } if *name == self.options().referent_field)
            && instance.kind() == ObjectKind::Instance
            && self
                .weak_reference_classes()
                .contains(instance.class().as_usize())
    }

    pub(crate) fn graph(&self) -> Result<&ObjectGraph> {
        self.derived.graph.get_or_try_init(|| ObjectGraph::build(self))
    }
}

/// Compressed adjacency lists of the object graph. Edges leaving through a
/// weak referent field are flagged so that strong-only traversals can skip them.
pub(crate) struct ObjectGraph {
    forward_offsets: Vec<usize>,
    forward: Vec<u32>,
    forward_weak: FixedBitSet,
    reverse_offsets: Vec<usize>,
    reverse: Vec<u32>,
    reverse_weak: FixedBitSet,
    roots: Vec<u32>,
    is_root: FixedBitSet,
}

impl ObjectGraph {
    pub(crate) fn build(heap: &Heap) -> Result<ObjectGraph> {
        let start = Instant::now();
        let n = heap.object_count();
        let mut forward_offsets = Vec::with_capacity(n + 1);
        let mut forward: Vec<u32> = vec![];
        let mut weak_edges: Vec<usize> = vec![];
        let mut dangling = 0usize;
        let mut out: Vec<(u32, bool)> = vec![];
        forward_offsets.push(0);
        for i in 0..n {
            let object = heap.object_at(i);
            if !matches!(object.kind(), ObjectKind::PrimitiveArray(_)) {
                let fields = heap.decode_fields(&object)?;
                out.clear();
                for (slot, id) in heap.slots(&object, &fields) {
                    match heap.object_ids.get(&id) {
                        Some(target) => out.push((*target, heap.is_weak_slot(&object, &slot))),
                        None => dangling += 1,
                    }
                }
                // one edge per target; strong if any slot holding it is strong
                out.sort_unstable();
                out.dedup_by(|next, kept| {
                    if next.0 == kept.0 {
                        kept.1 &= next.1;
                        true
                    } else {
                        false
                    }
                });
                for (target, weak) in &out {
                    if *weak {
                        weak_edges.push(forward.len());
                    }
                    forward.push(*target);
                }
            }
            forward_offsets.push(forward.len());
        }
        if dangling > 0 {
            warn!("Ignored {} references to objects missing from the dump", dangling);
        }
        let mut forward_weak = FixedBitSet::with_capacity(forward.len());
        for e in weak_edges {
            forward_weak.insert(e);
        }

        let mut in_degree = vec![0usize; n + 1];
        for target in &forward {
            in_degree[*target as usize + 1] += 1;
        }
        let mut reverse_offsets = in_degree;
        for i in 1..reverse_offsets.len() {
            reverse_offsets[i] += reverse_offsets[i - 1];
        }
        let mut fill = reverse_offsets.clone();
        let mut reverse = vec![0u32; forward.len()];
        let mut reverse_weak = FixedBitSet::with_capacity(forward.len());
        for source in 0..n {
            for e in forward_offsets[source]..forward_offsets[source + 1] {
                let target = forward[e] as usize;
                let slot = fill[target];
                fill[target] += 1;
                reverse[slot] = source as u32;
                if forward_weak.contains(e) {
                    reverse_weak.insert(slot);
                }
            }
        }

        let mut is_root = FixedBitSet::with_capacity(n);
        let mut roots = vec![];
        for root in heap.gc_roots() {
            if let Some(index) = heap.object_ids.get(&root.id) {
                if !is_root.put(*index as usize) {
                    roots.push(*index);
                }
            }
        }
        info!(
            "Built object graph of {} objects and {} references in {} ms",
            n,
            forward.len(),
            start.elapsed().as_millis()
        );
        Ok(ObjectGraph {
            forward_offsets,
            forward,
            forward_weak,
            reverse_offsets,
            reverse,
            reverse_weak,
            roots,
            is_root,
        })
    }

    pub(crate) fn node_count(&self) -> usize {
        self.forward_offsets.len() - 1
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.forward.len()
    }

    /// Distinct root objects in root-record order.
    pub(crate) fn roots(&self) -> &[u32] {
        &self.roots
    }

    pub(crate) fn is_root(&self, node: u32) -> bool {
        self.is_root.contains(node as usize)
    }

    pub(crate) fn referees(&self, node: u32) -> &[u32] {
        let n = node as usize;
        &self.forward[self.forward_offsets[n]..self.forward_offsets[n + 1]]
    }

    pub(crate) fn referrers(&self, node: u32) -> &[u32] {
        let n = node as usize;
        &self.reverse[self.reverse_offsets[n]..self.reverse_offsets[n + 1]]
    }

    pub(crate) fn strong_referees(&self, node: u32) -> impl Iterator<Item = u32> + '_ {
        let base = self.forward_offsets[node as usize];
        self.referees(node)
            .iter()
            .enumerate()
            .filter(move |(i, _)| !self.forward_weak.contains(base + i))
            .map(|(_, t)| *t)
    }

    pub(crate) fn strong_referrers(&self, node: u32) -> impl Iterator<Item = u32> + '_ {
        let base = self.reverse_offsets[node as usize];
        self.referrers(node)
            .iter()
            .enumerate()
            .filter(move |(i, _)| !self.reverse_weak.contains(base + i))
            .map(|(_, s)| *s)
    }

    /// Whether the `pos`-th edge leaving `node` is weak.
    pub(crate) fn is_weak_edge(&self, node: u32, pos: usize) -> bool {
        self.forward_weak
            .contains(self.forward_offsets[node as usize] + pos)
    }
}

impl Heap {
    /// Objects holding a reference to `instance`, in dump order.
    pub fn referrers(&self, instance: &Instance) -> Result<Vec<Instance>> {
        let graph = self.graph()?;
        Ok(graph
            .referrers(instance.index() as u32)
            .iter()
            .map(|i| self.object_at(*i as usize))
            .collect())
    }

    /// Distinct objects referenced by `instance`.
    pub fn referees(&self, instance: &Instance) -> Result<Vec<Instance>> {
        let graph = self.graph()?;
        Ok(graph
            .referees(instance.index() as u32)
            .iter()
            .map(|i| self.object_at(*i as usize))
            .collect())
    }

    /// How `from` refers to `to`, e.g. `field next` or `[3]`.
    pub fn describe_reference(&self, from: &Instance, to: &Instance) -> Result<Option<String>> {
        let descriptions: Vec<String> = self
            .references(from)?
            .iter()
            .filter(|(_, id)| *id == to.id())
            .map(|(slot, _)| slot.describe())
            .collect();
        Ok((!descriptions.is_empty()).then(|| descriptions.join(", ")))
    }
}
