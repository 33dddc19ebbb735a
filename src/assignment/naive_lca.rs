// src/assignment/naive_lca.rs

use std::sync::Arc;

use super::{collect_active_ids, empty_result, tree_lca, AssignmentAlgorithm};
use crate::active_matches::ActiveMatches;
use crate::addressing::{common_prefix, Address, WeightedAddressList};
use crate::error::Result;
use crate::taxdb::{ClassificationTree, TaxonRank};
use crate::types::{ClassId, Read, UNASSIGNED_ID};

/// Assigns a read to the lowest common ancestor of all its active matches.
///
/// With `lca_coverage_percent < 100` the LCA only has to explain that share
/// of the matches (each match weighs 1). Ancestors among the matched nodes do
/// not pull the result up.
pub struct NaiveLcaAssignment {
    classification: usize,
    tree: Arc<ClassificationTree>,
    lca_coverage_percent: f64,
    use_identity_filter: bool,
    ids: Vec<ClassId>,
    weighted: WeightedAddressList,
}

impl NaiveLcaAssignment {
    pub fn new(
        classification: usize,
        tree: Arc<ClassificationTree>,
        lca_coverage_percent: f64,
        use_identity_filter: bool,
    ) -> Self {
        Self {
            classification,
            tree,
            lca_coverage_percent,
            use_identity_filter,
            ids: Vec::new(),
            weighted: WeightedAddressList::new(),
        }
    }

    fn lca_of_ids(&mut self) -> Option<ClassId> {
        if self.ids.len() == 1 {
            return Some(self.ids[0]);
        }
        let prefix = if self.lca_coverage_percent < 100.0 {
            self.weighted.clear();
            for &id in &self.ids {
                if let Some(address) = self.tree.address(id) {
                    self.weighted.add(address, 1);
                }
            }
            self.weighted
                .weighted_common_prefix(self.lca_coverage_percent, true)
        } else {
            let addresses: Vec<&Address> = self.ids.iter().filter_map(|&id| self.tree.address(id)).collect();
            common_prefix(&addresses, true)
        };
        self.tree.address_to_id(prefix.units())
    }
}

impl AssignmentAlgorithm for NaiveLcaAssignment {
    fn compute_id(&mut self, active: &ActiveMatches, read: &Read) -> Result<ClassId> {
        if active.is_empty() {
            return Ok(empty_result(read));
        }
        collect_active_ids(&self.tree, self.classification, active, read, &mut self.ids);
        if self.ids.is_empty() {
            return Ok(UNASSIGNED_ID);
        }

        let Some(mut id) = self.lca_of_ids() else {
            log::debug!("read {}: LCA address has no node", read.name);
            return Ok(UNASSIGNED_ID);
        };

        if self.use_identity_filter {
            let best_identity = active
                .iter()
                .map(|i| read.matches[i].percent_identity)
                .fold(0f32, f32::max);
            id = adjust_by_percent_identity(&self.tree, id, best_identity);
        }
        Ok(id)
    }

    fn lca(&self, a: ClassId, b: ClassId) -> Result<ClassId> {
        tree_lca(&self.tree, a, b)
    }

    fn name(&self) -> &'static str {
        "naive LCA"
    }
}

/// Minimum percent identity that supports an assignment at `rank`; `None`
/// means no identity is good enough and the read moves up.
pub fn required_identity(rank: TaxonRank) -> Option<f32> {
    match rank {
        TaxonRank::Species | TaxonRank::Subspecies => Some(99.0),
        TaxonRank::Genus | TaxonRank::SpeciesGroup => Some(97.0),
        TaxonRank::Family => Some(95.0),
        TaxonRank::Order => Some(90.0),
        TaxonRank::Class => Some(85.0),
        TaxonRank::Phylum => Some(80.0),
        _ => None,
    }
}

/// Walks `id` up the tree until `best_identity` supports its rank. An
/// unknown identity (0) or one of at least 99% leaves the id as is; the walk
/// never goes above the root.
pub fn adjust_by_percent_identity(tree: &ClassificationTree, mut id: ClassId, best_identity: f32) -> ClassId {
    if best_identity == 0.0 || best_identity >= 99.0 || id <= 0 {
        return id;
    }
    loop {
        if let Some(required) = required_identity(tree.rank(id)) {
            if best_identity >= required {
                return id;
            }
        }
        match tree.parent(id) {
            Some(parent) => id = parent,
            None => return id,
        }
    }
}
