// src/min_support.rs

use ahash::AHashMap;

use crate::taxdb::ClassificationTree;
use crate::types::{ClassId, CountTable, UNASSIGNED_ID};

/// Moves the weight of under-supported nodes up the tree.
///
/// A node keeps its reads if the weight of its whole subtree reaches
/// `min_support` and it is not disabled. Weight sitting below such a node on
/// nodes that did not make it is moved onto it. Weight that finds no such
/// ancestor goes to [`UNASSIGNED_ID`].
pub struct MinSupportFilter<'a> {
    tree: &'a ClassificationTree,
    min_support: f64,
}

impl<'a> MinSupportFilter<'a> {
    pub fn new(tree: &'a ClassificationTree, min_support: f64) -> Self {
        Self { tree, min_support }
    }

    /// Computes the old id -> new id remapping for `counts`. Ids that keep
    /// their assignment are not in the result.
    pub fn compute(&self, counts: &CountTable) -> AHashMap<ClassId, ClassId> {
        let mut remap = AHashMap::new();
        if self.min_support <= 0.0 || self.tree.is_empty() {
            return remap;
        }

        let unknown = counts
            .keys()
            .filter(|&&id| id > 0 && !self.tree.contains(id))
            .count();
        if unknown > 0 {
            log::warn!(
                "{}: {} ids are not in the tree and are left as they are",
                self.tree.name(),
                unknown
            );
        }

        // (subtree weight, orphans) for every finished node whose parent is
        // still pending
        let mut pending: AHashMap<ClassId, (f64, Vec<ClassId>)> = AHashMap::new();
        let root = self.tree.root_id();

        for id in self.tree.post_order() {
            let own = counts.get(&id).copied().unwrap_or(0.0);
            let mut sum = own;
            let mut orphans = Vec::new();
            for child in self.tree.children(id) {
                if let Some((child_sum, child_orphans)) = pending.remove(&child) {
                    sum += child_sum;
                    orphans.extend(child_orphans);
                }
            }

            if sum >= self.min_support && !self.tree.is_disabled(id) {
                for orphan in orphans.drain(..) {
                    remap.insert(orphan, id);
                }
            } else if own > 0.0 {
                orphans.push(id);
            }

            if id == root {
                for orphan in orphans.drain(..) {
                    remap.insert(orphan, UNASSIGNED_ID);
                }
            } else if sum > 0.0 {
                pending.insert(id, (sum, orphans));
            }
        }

        log::info!(
            "{}: min support {} moved {} nodes",
            self.tree.name(),
            self.min_support,
            remap.len()
        );
        remap
    }

    /// Returns `counts` with the remapping applied; weights landing on the
    /// same id are summed.
    pub fn apply(&self, counts: &CountTable) -> (CountTable, AHashMap<ClassId, ClassId>) {
        let remap = self.compute(counts);
        (remap_counts(counts, &remap), remap)
    }
}

/// Rewrites a count table through `remap`, merging weights.
pub fn remap_counts(counts: &CountTable, remap: &AHashMap<ClassId, ClassId>) -> CountTable {
    let mut result = CountTable::with_capacity(counts.len());
    for (&id, &weight) in counts {
        let target = remap.get(&id).copied().unwrap_or(id);
        *result.entry(target).or_insert(0.0) += weight;
    }
    result
}
