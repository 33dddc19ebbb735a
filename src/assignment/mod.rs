pub mod best_hit;
pub mod coverage_lca;
pub mod long_reads;
pub mod naive_lca;
pub mod weighted_lca;

use std::sync::Arc;

use crate::active_matches::ActiveMatches;
use crate::config::{BinningConfig, LcaAlgorithm};
use crate::error::{BinningError, Result};
use crate::taxdb::ClassificationTree;
use crate::types::{ClassId, Read, NOHITS_ID, TAXONOMY_INDEX, UNASSIGNED_ID};

use best_hit::{BestHitAssignment, ExternalAssignments};
use coverage_lca::CoverageLcaAssignment;
use long_reads::{LongReadLcaAssignment, MultiGeneLcaAssignment};
use naive_lca::NaiveLcaAssignment;
use weighted_lca::{ReferenceWeights, WeightedLcaAssignment};

/// Turns the active matches of one read into one class id.
///
/// Instances keep scratch buffers between calls and are owned by a single
/// worker; create one per thread through an [`AlgorithmFactory`].
pub trait AssignmentAlgorithm: Send {
    fn compute_id(&mut self, active: &ActiveMatches, read: &Read) -> Result<ClassId>;

    /// Lowest common ancestor of two ids in this algorithm's tree.
    fn lca(&self, a: ClassId, b: ClassId) -> Result<ClassId>;

    /// Extra `(id, weight)` assignments for reads that cover several genes.
    fn additional_class_ids(&mut self, _active: &ActiveMatches, _read: &Read) -> Vec<(ClassId, f64)> {
        Vec::new()
    }

    fn name(&self) -> &'static str;
}

/// The closed set of algorithms a classification can be binned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    BestHit,
    NaiveLca,
    WeightedLca,
    CoverageLca,
    LongReadLca,
    MultiGeneLca,
}

impl AlgorithmKind {
    /// Picks the algorithm for a classification from the run configuration.
    pub fn for_classification(config: &BinningConfig, classification: usize) -> Self {
        if classification == TAXONOMY_INDEX {
            match config.lca_algorithm {
                LcaAlgorithm::Naive => AlgorithmKind::NaiveLca,
                LcaAlgorithm::Weighted => AlgorithmKind::WeightedLca,
                LcaAlgorithm::Coverage => AlgorithmKind::CoverageLca,
                LcaAlgorithm::LongReads => AlgorithmKind::LongReadLca,
            }
        } else if config.lca_algorithm == LcaAlgorithm::LongReads {
            AlgorithmKind::MultiGeneLca
        } else if config.lca_for_functional {
            AlgorithmKind::NaiveLca
        } else {
            AlgorithmKind::BestHit
        }
    }
}

/// Holds the shared, read-only inputs of one classification's algorithm and
/// hands out a fresh instance per worker.
#[derive(Clone)]
pub struct AlgorithmFactory {
    kind: AlgorithmKind,
    classification: usize,
    tree: Arc<ClassificationTree>,
    config: BinningConfig,
    reference_weights: Option<Arc<ReferenceWeights>>,
    external: Option<Arc<ExternalAssignments>>,
}

impl AlgorithmFactory {
    pub fn new(
        kind: AlgorithmKind,
        classification: usize,
        tree: Arc<ClassificationTree>,
        config: &BinningConfig,
    ) -> Self {
        Self {
            kind,
            classification,
            tree,
            config: config.clone(),
            reference_weights: None,
            external: None,
        }
    }

    pub fn with_reference_weights(mut self, weights: Arc<ReferenceWeights>) -> Self {
        self.reference_weights = Some(weights);
        self
    }

    pub fn with_external_assignments(mut self, external: Arc<ExternalAssignments>) -> Self {
        self.external = Some(external);
        self
    }

    pub fn kind(&self) -> AlgorithmKind {
        self.kind
    }

    pub fn classification(&self) -> usize {
        self.classification
    }

    pub fn tree(&self) -> &Arc<ClassificationTree> {
        &self.tree
    }

    pub fn create(&self) -> Box<dyn AssignmentAlgorithm> {
        let c = self.classification;
        let tree = Arc::clone(&self.tree);
        match self.kind {
            AlgorithmKind::BestHit => Box::new(BestHitAssignment::new(c, self.external.clone())),
            AlgorithmKind::NaiveLca => Box::new(NaiveLcaAssignment::new(
                c,
                tree,
                self.config.lca_coverage_percent,
                self.config.use_identity_filter && c == TAXONOMY_INDEX,
            )),
            AlgorithmKind::WeightedLca => Box::new(WeightedLcaAssignment::new(
                c,
                tree,
                self.config.weighted_lca_percent,
                self.config.allow_weighted_lca_below_species,
                self.reference_weights.clone(),
            )),
            AlgorithmKind::CoverageLca => Box::new(CoverageLcaAssignment::new(
                c,
                tree,
                self.config.lca_coverage_percent,
                self.config.coverage_weighting,
            )),
            AlgorithmKind::LongReadLca => Box::new(LongReadLcaAssignment::new(
                c,
                tree,
                self.config.top_percent,
                self.config.min_overlap,
            )),
            AlgorithmKind::MultiGeneLca => Box::new(MultiGeneLcaAssignment::new(
                c,
                tree,
                self.config.top_percent,
                self.config.min_overlap,
            )),
        }
    }
}

/// Result for a read whose matches yield nothing usable.
#[inline]
pub(crate) fn empty_result(read: &Read) -> ClassId {
    if read.matches.is_empty() {
        NOHITS_ID
    } else {
        UNASSIGNED_ID
    }
}

/// Tree LCA where a reserved id yields the other id.
pub(crate) fn tree_lca(tree: &ClassificationTree, a: ClassId, b: ClassId) -> Result<ClassId> {
    if a <= 0 {
        return Ok(b);
    }
    if b <= 0 {
        return Ok(a);
    }
    tree.lca(a, b).ok_or_else(|| {
        BinningError::Tree(format!("{}: no common ancestor for {} and {}", tree.name(), a, b))
    })
}

/// Ids of the active matches usable in `classification`: positive, known to
/// the tree and not disabled. If every candidate is disabled, the disabled
/// ones are used instead.
pub(crate) fn collect_active_ids(
    tree: &ClassificationTree,
    classification: usize,
    active: &ActiveMatches,
    read: &Read,
    ids: &mut Vec<ClassId>,
) {
    ids.clear();
    let mut saw_disabled = false;
    for i in active.iter() {
        let id = read.matches[i].class_id(classification);
        if id <= 0 || !tree.contains(id) {
            continue;
        }
        if tree.is_disabled(id) {
            saw_disabled = true;
        } else {
            ids.push(id);
        }
    }
    if ids.is_empty() && saw_disabled {
        for i in active.iter() {
            let id = read.matches[i].class_id(classification);
            if id > 0 && tree.contains(id) {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    ids.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxdb::tests::small_tree;
    use crate::types::Match;

    #[test]
    fn test_kind_selection() {
        let mut config = BinningConfig::default();
        assert_eq!(AlgorithmKind::for_classification(&config, 0), AlgorithmKind::NaiveLca);
        assert_eq!(AlgorithmKind::for_classification(&config, 1), AlgorithmKind::BestHit);
        config.lca_for_functional = true;
        assert_eq!(AlgorithmKind::for_classification(&config, 1), AlgorithmKind::NaiveLca);
        config.lca_algorithm = LcaAlgorithm::LongReads;
        assert_eq!(AlgorithmKind::for_classification(&config, 0), AlgorithmKind::LongReadLca);
        assert_eq!(AlgorithmKind::for_classification(&config, 1), AlgorithmKind::MultiGeneLca);
    }

    #[test]
    fn test_factory_creates_independent_instances() {
        let tree = Arc::new(small_tree());
        let config = BinningConfig::default();
        for kind in [
            AlgorithmKind::NaiveLca,
            AlgorithmKind::WeightedLca,
            AlgorithmKind::CoverageLca,
            AlgorithmKind::LongReadLca,
        ] {
            let factory = AlgorithmFactory::new(kind, 0, Arc::clone(&tree), &config);
            let mut a = factory.create();
            let mut b = factory.create();
            let read = Read::new("r", 100, vec![Match::new(90.0, 1, 100, "x").with_taxon(10)]);
            let mut active = ActiveMatches::with_len(1);
            active.set(0);
            assert_eq!(a.compute_id(&active, &read).unwrap(), 10, "{}", a.name());
            assert_eq!(b.compute_id(&active, &read).unwrap(), 10, "{}", b.name());
        }
    }

    #[test]
    fn test_empty_reads_get_sentinels() {
        let tree = Arc::new(small_tree());
        let config = BinningConfig::default();
        let no_hits = Read::new("r", 100, Vec::new());
        let unusable = Read::new("r", 100, vec![Match::new(90.0, 1, 100, "x").with_taxon(10)]);
        for kind in [
            AlgorithmKind::BestHit,
            AlgorithmKind::NaiveLca,
            AlgorithmKind::WeightedLca,
            AlgorithmKind::CoverageLca,
            AlgorithmKind::LongReadLca,
            AlgorithmKind::MultiGeneLca,
        ] {
            let mut algo = AlgorithmFactory::new(kind, 0, Arc::clone(&tree), &config).create();
            assert_eq!(algo.compute_id(&ActiveMatches::default(), &no_hits).unwrap(), NOHITS_ID);
            assert_eq!(
                algo.compute_id(&ActiveMatches::with_len(1), &unusable).unwrap(),
                UNASSIGNED_ID,
                "{}",
                algo.name()
            );
        }
    }

    #[test]
    fn test_disabled_ids_used_as_fallback() {
        let mut tree = small_tree();
        tree.set_disabled(&[10]);
        let read = Read::new(
            "r",
            100,
            vec![
                Match::new(90.0, 1, 100, "x").with_taxon(100),
                Match::new(90.0, 1, 100, "y").with_taxon(10),
            ],
        );
        let mut active = ActiveMatches::with_len(2);
        active.set(0);
        active.set(1);
        let mut ids = Vec::new();
        collect_active_ids(&tree, 0, &active, &read, &mut ids);
        assert_eq!(ids, vec![10, 100]);
    }
}
