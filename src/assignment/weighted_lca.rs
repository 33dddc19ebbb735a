// src/assignment/weighted_lca.rs

use ahash::{AHashMap, RandomState};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::borrow::Borrow;
use std::sync::Arc;

use super::{empty_result, tree_lca, AssignmentAlgorithm};
use crate::active_matches::{compute_active_matches, ActiveMatches, MatchFilterParams};
use crate::addressing::WeightedAddressList;
use crate::error::Result;
use crate::taxdb::ClassificationTree;
use crate::types::{ClassId, Read, UNASSIGNED_ID};

const WEIGHT_BUCKETS: usize = 64;

/// Per-reference weights for the weighted LCA.
///
/// A reference earns the weight of every read that it helps to assign
/// unambiguously, i.e. whose active matches name exactly one taxon.
#[derive(Debug, Default, Clone)]
pub struct ReferenceWeights {
    weights: AHashMap<Arc<str>, f64>,
}

impl ReferenceWeights {
    /// Weight of a reference; references that never backed an unambiguous
    /// read weigh 1.
    pub fn weight(&self, reference: &str) -> u64 {
        self.weights
            .get(reference)
            .map(|&w| w.round() as u64)
            .unwrap_or(1)
            .max(1)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Pre-pass over all reads. Runs on the rayon pool; partial sums go into
    /// a fixed set of buckets keyed by a hash of the reference name. `reads`
    /// is either a slice (`par_iter`) or a bridged read stream (`par_bridge`).
    pub fn compute<P, R>(
        reads: P,
        params: &MatchFilterParams,
        tree: &ClassificationTree,
        classification: usize,
        allow_below_species: bool,
    ) -> Self
    where
        P: ParallelIterator<Item = R>,
        R: Borrow<Read> + Send,
    {
        let hasher = RandomState::new();
        let buckets: Vec<Mutex<AHashMap<Arc<str>, f64>>> =
            (0..WEIGHT_BUCKETS).map(|_| Mutex::new(AHashMap::new())).collect();

        reads.for_each_init(
            || (ActiveMatches::default(), Vec::<ClassId>::new()),
            |(active, taxa), read| {
                let read: &Read = read.borrow();
                compute_active_matches(params, read, Some(classification), tree, active);
                taxa.clear();
                for i in active.iter() {
                    let id = read.matches[i].class_id(classification);
                    if id > 0 {
                        taxa.push(collapse(tree, id, allow_below_species));
                    }
                }
                taxa.sort_unstable();
                taxa.dedup();
                if taxa.len() != 1 {
                    return;
                }
                for i in active.iter() {
                    let reference = &read.matches[i].reference;
                    let bucket = hasher.hash_one(reference.as_ref()) as usize % WEIGHT_BUCKETS;
                    *buckets[bucket]
                        .lock()
                        .entry(Arc::clone(reference))
                        .or_insert(0.0) += read.weight;
                }
            },
        );

        let mut weights = AHashMap::new();
        for bucket in buckets {
            weights.extend(bucket.into_inner());
        }
        log::info!("Computed weights for {} references", weights.len());
        Self { weights }
    }
}

fn collapse(tree: &ClassificationTree, id: ClassId, allow_below_species: bool) -> ClassId {
    if allow_below_species {
        id
    } else {
        tree.species_or_self(id)
    }
}

/// LCA where every match counts with the weight of its reference and the
/// result only has to explain `weighted_lca_percent` of the total weight.
pub struct WeightedLcaAssignment {
    classification: usize,
    tree: Arc<ClassificationTree>,
    percent_to_cover: f64,
    allow_below_species: bool,
    reference_weights: Option<Arc<ReferenceWeights>>,
    addresses: WeightedAddressList,
}

impl WeightedLcaAssignment {
    pub fn new(
        classification: usize,
        tree: Arc<ClassificationTree>,
        percent_to_cover: f64,
        allow_below_species: bool,
        reference_weights: Option<Arc<ReferenceWeights>>,
    ) -> Self {
        Self {
            classification,
            tree,
            percent_to_cover,
            allow_below_species,
            reference_weights,
            addresses: WeightedAddressList::new(),
        }
    }

    fn add_matches(&mut self, active: &ActiveMatches, read: &Read, include_disabled: bool) -> bool {
        let mut saw_disabled = false;
        for i in active.iter() {
            let m = &read.matches[i];
            let id = m.class_id(self.classification);
            if id <= 0 {
                continue;
            }
            let id = collapse(&self.tree, id, self.allow_below_species);
            if !include_disabled && self.tree.is_disabled(id) {
                saw_disabled = true;
                continue;
            }
            let Some(address) = self.tree.address(id) else {
                continue;
            };
            let weight = self
                .reference_weights
                .as_ref()
                .map_or(1, |w| w.weight(&m.reference));
            self.addresses.add(address, weight);
        }
        saw_disabled
    }
}

impl AssignmentAlgorithm for WeightedLcaAssignment {
    fn compute_id(&mut self, active: &ActiveMatches, read: &Read) -> Result<ClassId> {
        if active.is_empty() {
            return Ok(empty_result(read));
        }
        self.addresses.clear();
        let saw_disabled = self.add_matches(active, read, false);
        if self.addresses.is_empty() && saw_disabled {
            self.add_matches(active, read, true);
        }
        if self.addresses.is_empty() {
            return Ok(UNASSIGNED_ID);
        }

        let prefix = self.addresses.weighted_common_prefix(self.percent_to_cover, true);
        Ok(self.tree.address_to_id(prefix.units()).unwrap_or(UNASSIGNED_ID))
    }

    fn lca(&self, a: ClassId, b: ClassId) -> Result<ClassId> {
        tree_lca(&self.tree, a, b)
    }

    fn name(&self) -> &'static str {
        "weighted LCA"
    }
}
