// src/binning.rs

use ahash::AHashMap;
use crossbeam_channel::bounded;
use indicatif::ProgressBar;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::borrow::Borrow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::active_matches::{compute_active_matches, ActiveMatches, MatchFilterParams};
use crate::assignment::best_hit::ExternalAssignments;
use crate::assignment::weighted_lca::ReferenceWeights;
use crate::assignment::{AlgorithmFactory, AlgorithmKind, AssignmentAlgorithm};
use crate::config::{BinningConfig, LcaAlgorithm};
use crate::contaminants::ContaminantFilter;
use crate::error::{BinningError, Result};
use crate::hits::HitSource;
use crate::interval::IntervalList;
use crate::min_support::{remap_counts, MinSupportFilter};
use crate::reference_coverage::ReferenceCoverageFilter;
use crate::taxdb::ClassificationTree;
use crate::types::{
    ClassId, CountTable, Read, ReadAssignment, CONTAMINANTS_ID, LOW_COMPLEXITY_ID, NOHITS_ID, TAXONOMY_INDEX,
    UNASSIGNED_ID,
};

/// Everything a finished binning run produces.
#[derive(Debug, Clone)]
pub struct BinningOutcome {
    pub classification_names: Vec<String>,
    /// One entry per input read, in input order.
    pub assignments: Vec<ReadAssignment>,
    /// Class id -> weight, one table per classification.
    pub count_tables: Vec<CountTable>,
    /// Reassignments made by the min-support filter on the taxonomy.
    pub min_support_remap: AHashMap<ClassId, ClassId>,
    pub min_support: f64,
}

impl BinningOutcome {
    pub fn total_reads(&self) -> usize {
        self.assignments.len()
    }

    /// Total weight of reads assigned to a real node of `classification`.
    pub fn assigned_weight(&self, classification: usize) -> f64 {
        self.count_tables
            .get(classification)
            .map(|t| t.iter().filter(|(&id, _)| id > 0).map(|(_, &w)| w).sum())
            .unwrap_or(0.0)
    }
}

/// Per-thread state: one algorithm instance per classification plus scratch.
struct Worker {
    algorithms: Vec<Box<dyn AssignmentAlgorithm>>,
    active: ActiveMatches,
    covered: IntervalList,
}

/// Runs reads through the filters and assignment algorithms of all
/// classifications on a pool of worker threads.
pub struct Binner {
    config: BinningConfig,
    factories: Vec<AlgorithmFactory>,
    reference_coverage: Option<Arc<ReferenceCoverageFilter>>,
    contaminants: Option<Arc<ContaminantFilter>>,
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressBar>,
}

impl Binner {
    /// `trees[0]` must be the taxonomy.
    pub fn new(config: BinningConfig, trees: Vec<Arc<ClassificationTree>>) -> Result<Self> {
        config.validate()?;
        if trees.is_empty() {
            return Err(BinningError::config("classifications", "the taxonomy is required"));
        }
        let factories = trees
            .into_iter()
            .enumerate()
            .map(|(c, tree)| {
                let kind = AlgorithmKind::for_classification(&config, c);
                AlgorithmFactory::new(kind, c, tree, &config)
            })
            .collect();
        Ok(Self {
            config,
            factories,
            reference_coverage: None,
            contaminants: None,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        })
    }

    pub fn config(&self) -> &BinningConfig {
        &self.config
    }

    pub fn taxonomy(&self) -> &Arc<ClassificationTree> {
        self.factories[TAXONOMY_INDEX].tree()
    }

    pub fn classification_names(&self) -> Vec<String> {
        self.factories.iter().map(|f| f.tree().name().to_string()).collect()
    }

    pub fn algorithm_kinds(&self) -> Vec<AlgorithmKind> {
        self.factories.iter().map(AlgorithmFactory::kind).collect()
    }

    /// Overrides for a best-hit classification.
    pub fn with_external_assignments(mut self, classification: usize, external: Arc<ExternalAssignments>) -> Self {
        if let Some(factory) = self.factories.get_mut(classification) {
            *factory = factory.clone().with_external_assignments(external);
        }
        self
    }

    pub fn with_contaminants(mut self, contaminants: ContaminantFilter) -> Self {
        if contaminants.is_empty() {
            log::warn!("contaminant filter is empty, ignoring it");
        } else {
            self.contaminants = Some(Arc::new(contaminants));
        }
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Flag that stops the run between reads when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Runs the whole-dataset pre-passes that the configuration asks for
    /// (reference weights for the weighted LCA, the reference-coverage
    /// filter) over reads already in memory.
    pub fn prepare(&mut self, reads: &[Read]) {
        self.prepare_with(|| reads.par_iter());
    }

    /// Same as [`Binner::prepare`], but every pre-pass streams the hit files
    /// again instead of holding the reads in memory.
    pub fn prepare_streamed(&mut self, source: &HitSource) -> Result<()> {
        let first_error: Mutex<Option<BinningError>> = Mutex::new(None);
        let slot = &first_error;
        self.prepare_with(move || {
            source
                .stream()
                .map_while(move |item| match item {
                    Ok(read) => Some(read),
                    Err(e) => {
                        slot.lock().get_or_insert(e);
                        None
                    }
                })
                .par_bridge()
        });
        match first_error.into_inner() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// `pass` yields a fresh parallel iterator over the dataset per pre-pass.
    fn prepare_with<F, P, R>(&mut self, pass: F)
    where
        F: Fn() -> P,
        P: ParallelIterator<Item = R>,
        R: Borrow<Read> + Send,
    {
        let params = self.config.match_filter();
        if self.config.lca_algorithm == LcaAlgorithm::Weighted {
            let taxonomy = Arc::clone(self.taxonomy());
            let weights = ReferenceWeights::compute(
                pass(),
                &params,
                &taxonomy,
                TAXONOMY_INDEX,
                self.config.allow_weighted_lca_below_species,
            );
            let factory = &mut self.factories[TAXONOMY_INDEX];
            *factory = factory.clone().with_reference_weights(Arc::new(weights));
        }
        if self.config.min_percent_reference_to_cover > 0.0 {
            let filter = ReferenceCoverageFilter::compute(
                pass(),
                &params,
                self.taxonomy(),
                self.config.min_percent_reference_to_cover,
            );
            self.reference_coverage = Some(Arc::new(filter));
        }
    }

    /// True if [`Binner::prepare`] has any work to do.
    pub fn needs_prepass(&self) -> bool {
        self.config.lca_algorithm == LcaAlgorithm::Weighted || self.config.min_percent_reference_to_cover > 0.0
    }

    fn new_worker(&self) -> Worker {
        Worker {
            algorithms: self.factories.iter().map(AlgorithmFactory::create).collect(),
            active: ActiveMatches::default(),
            covered: IntervalList::new(),
        }
    }

    /// Bins reads already in memory.
    pub fn run_reads(&self, reads: Vec<Read>) -> Result<BinningOutcome> {
        self.run(reads.into_iter().map(Ok::<Read, BinningError>))
    }

    /// Bins a stream of reads and builds the count tables.
    ///
    /// One thread pulls reads from `reads` into a bounded channel,
    /// `config.worker_count()` threads assign them. The first read error or
    /// assignment error stops the run and is returned. A canceled run returns
    /// [`BinningError::Canceled`].
    pub fn run<I>(&self, reads: I) -> Result<BinningOutcome>
    where
        I: IntoIterator<Item = Result<Read>>,
        I::IntoIter: Send,
    {
        let workers = self.config.worker_count();
        let (tx, rx) = bounded::<Option<(usize, Read)>>(self.config.queue_capacity);
        let results: Mutex<Vec<(usize, ReadAssignment)>> = Mutex::new(Vec::new());
        let first_error: Mutex<Option<BinningError>> = Mutex::new(None);
        let stop = AtomicBool::new(false);
        let reads = reads.into_iter();
        log::info!("Binning with {} workers", workers);

        thread::scope(|scope| {
            let cancel = &self.cancel;
            let stop = &stop;
            let results = &results;
            let first_error = &first_error;

            let reader = scope.spawn(move || {
                for (seq, item) in reads.enumerate() {
                    if cancel.load(Ordering::Relaxed) || stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let read = match item {
                        Ok(read) => read,
                        Err(e) => {
                            stop.store(true, Ordering::Relaxed);
                            first_error.lock().get_or_insert(e);
                            break;
                        }
                    };
                    if tx.send(Some((seq, read))).is_err() {
                        break;
                    }
                }
                // one poison pill per worker
                for _ in 0..workers {
                    if tx.send(None).is_err() {
                        break;
                    }
                }
            });

            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let rx = rx.clone();
                    scope.spawn(move || {
                        let mut worker = self.new_worker();
                        let mut local = Vec::new();
                        while let Ok(Some((seq, read))) = rx.recv() {
                            if cancel.load(Ordering::Relaxed) || stop.load(Ordering::Relaxed) {
                                continue;
                            }
                            match self.assign_read(&mut worker, &read) {
                                Ok(assignment) => local.push((seq, assignment)),
                                Err(e) => {
                                    stop.store(true, Ordering::Relaxed);
                                    first_error.lock().get_or_insert(e);
                                }
                            }
                            if local.len() >= 256 {
                                let n = local.len() as u64;
                                results.lock().append(&mut local);
                                if let Some(pb) = &self.progress {
                                    pb.inc(n);
                                }
                            }
                        }
                        if let Some(pb) = &self.progress {
                            pb.inc(local.len() as u64);
                        }
                        results.lock().append(&mut local);
                    })
                })
                .collect();
            drop(rx);

            if reader.join().is_err() {
                stop.store(true, Ordering::Relaxed);
                first_error
                    .lock()
                    .get_or_insert(BinningError::Worker("read stream panicked".to_string()));
            }
            for handle in handles {
                if handle.join().is_err() {
                    stop.store(true, Ordering::Relaxed);
                    first_error
                        .lock()
                        .get_or_insert(BinningError::Worker("assignment thread panicked".to_string()));
                }
            }
        });

        if let Some(e) = first_error.into_inner() {
            return Err(e);
        }
        if self.cancel.load(Ordering::Relaxed) {
            log::info!("Binning canceled");
            return Err(BinningError::Canceled);
        }

        let mut results = results.into_inner();
        results.sort_unstable_by_key(|(seq, _)| *seq);
        let mut assignments: Vec<ReadAssignment> = results.into_iter().map(|(_, a)| a).collect();
        log::info!("Assigned {} reads", assignments.len());

        if self.config.use_paired_reads {
            self.resolve_mates(&mut assignments);
        }
        Ok(self.build_outcome(assignments))
    }

    /// Assigns one read in every classification.
    fn assign_read(&self, worker: &mut Worker, read: &Read) -> Result<ReadAssignment> {
        let n = self.factories.len();
        let mut assignment = ReadAssignment {
            read_name: read.name.clone(),
            mate: read.mate.clone(),
            weight: read.weight,
            class_ids: vec![UNASSIGNED_ID; n],
            additional: vec![Vec::new(); n],
        };

        if read.matches.is_empty() {
            assignment.class_ids.fill(NOHITS_ID);
            return Ok(assignment);
        }
        if self.config.min_complexity > 0.0 && read.complexity > 0.0 && read.complexity < self.config.min_complexity {
            assignment.class_ids.fill(LOW_COMPLEXITY_ID);
            return Ok(assignment);
        }

        let params: MatchFilterParams = self.config.match_filter();
        let taxonomy = self.taxonomy();
        for c in 0..n {
            compute_active_matches(&params, read, Some(c), taxonomy, &mut worker.active);
            if let Some(filter) = &self.reference_coverage {
                filter.apply(read, &mut worker.active);
            }

            if self.config.min_percent_read_to_cover > 0.0 && read.length > 0 {
                worker.covered.clear();
                for i in worker.active.iter() {
                    let (lo, hi) = read.matches[i].query_span();
                    worker.covered.add(lo, hi);
                }
                let needed = self.config.min_percent_read_to_cover / 100.0 * read.length as f64;
                if (worker.covered.covered_length() as f64) < needed {
                    continue;
                }
            }

            if c == TAXONOMY_INDEX {
                if let Some(contaminants) = &self.contaminants {
                    let long_reads = self.config.lca_algorithm == LcaAlgorithm::LongReads;
                    if contaminants.is_contaminated(taxonomy, read, &worker.active, long_reads) {
                        assignment.class_ids[c] = CONTAMINANTS_ID;
                        continue;
                    }
                }
            }

            let algorithm = &mut worker.algorithms[c];
            assignment.class_ids[c] = match algorithm.compute_id(&worker.active, read) {
                Ok(id) => id,
                Err(BinningError::InvalidEventStream { read: name, message }) => {
                    log::warn!("read {}: {}, leaving it unassigned", name, message);
                    UNASSIGNED_ID
                }
                Err(e) => return Err(e),
            };
            if assignment.class_ids[c] > 0 {
                assignment.additional[c] = algorithm.additional_class_ids(&worker.active, read);
            }
        }
        Ok(assignment)
    }

    /// Lets the two mates of a pair agree: if one id lies below the other,
    /// both take the deeper one; an unassigned mate adopts its partner's id.
    fn resolve_mates(&self, assignments: &mut [ReadAssignment]) {
        let index: AHashMap<String, usize> = assignments
            .iter()
            .enumerate()
            .map(|(i, a)| (a.read_name.clone(), i))
            .collect();
        let mut changed = 0usize;

        for i in 0..assignments.len() {
            let Some(mate) = assignments[i].mate.as_deref() else {
                continue;
            };
            let Some(&j) = index.get(mate) else {
                log::debug!("mate {} of {} not found", mate, assignments[i].read_name);
                continue;
            };
            if j <= i {
                continue;
            }
            for (c, factory) in self.factories.iter().enumerate() {
                let tree = factory.tree();
                let a = assignments[i].class_ids[c];
                let b = assignments[j].class_ids[c];
                let resolved = if a > 0 && b > 0 {
                    if tree.is_ancestor_or_self(a, b) {
                        Some(b)
                    } else if tree.is_ancestor_or_self(b, a) {
                        Some(a)
                    } else {
                        None
                    }
                } else if a > 0 && b == UNASSIGNED_ID {
                    Some(a)
                } else if b > 0 && a == UNASSIGNED_ID {
                    Some(b)
                } else {
                    None
                };
                if let Some(id) = resolved {
                    if a != id || b != id {
                        changed += 1;
                    }
                    assignments[i].class_ids[c] = id;
                    assignments[j].class_ids[c] = id;
                }
            }
        }
        log::info!("Mate pairs changed {} assignments", changed);
    }

    fn build_outcome(&self, mut assignments: Vec<ReadAssignment>) -> BinningOutcome {
        let n = self.factories.len();
        let mut count_tables = vec![CountTable::new(); n];
        for assignment in &assignments {
            for c in 0..n {
                let table = &mut count_tables[c];
                let extra = &assignment.additional[c];
                let primary_weight = if extra.is_empty() {
                    assignment.weight
                } else {
                    assignment.weight / (extra.len() + 1) as f64
                };
                *table.entry(assignment.class_ids[c]).or_insert(0.0) += primary_weight;
                for &(id, weight) in extra {
                    *table.entry(id).or_insert(0.0) += weight;
                }
            }
        }

        let assigned: f64 = count_tables[TAXONOMY_INDEX]
            .iter()
            .filter(|(&id, _)| id > 0)
            .map(|(_, &w)| w)
            .sum();
        let min_support = self.config.resolve_min_support(assigned);
        let filter = MinSupportFilter::new(self.taxonomy(), min_support);
        let remap = filter.compute(&count_tables[TAXONOMY_INDEX]);
        if !remap.is_empty() {
            count_tables[TAXONOMY_INDEX] = remap_counts(&count_tables[TAXONOMY_INDEX], &remap);
            for assignment in &mut assignments {
                let id = &mut assignment.class_ids[TAXONOMY_INDEX];
                if let Some(&target) = remap.get(id) {
                    *id = target;
                }
            }
        }

        BinningOutcome {
            classification_names: self.classification_names(),
            assignments,
            count_tables,
            min_support_remap: remap,
            min_support,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxdb::tests::small_tree;
    use crate::types::Match;

    fn config() -> BinningConfig {
        BinningConfig {
            min_support_percent: 0.0,
            threads: 3,
            queue_capacity: 4,
            ..BinningConfig::default()
        }
    }

    fn read(name: &str, taxa: &[ClassId]) -> Read {
        let matches = taxa
            .iter()
            .map(|&t| Match::new(100.0, 1, 100, "ref").with_taxon(t))
            .collect();
        Read::new(name, 100, matches)
    }

    fn binner(config: BinningConfig) -> Binner {
        Binner::new(config, vec![Arc::new(small_tree())]).unwrap()
    }

    #[test]
    fn test_pipeline_keeps_input_order_and_counts() {
        let reads: Vec<Read> = (0..200)
            .map(|i| match i % 4 {
                0 => read(&format!("r{}", i), &[10]),
                1 => read(&format!("r{}", i), &[10, 11]),
                2 => read(&format!("r{}", i), &[]),
                _ => read(&format!("r{}", i), &[100]),
            })
            .collect();
        let outcome = binner(config()).run_reads(reads).unwrap();
        assert_eq!(outcome.total_reads(), 200);
        for (i, a) in outcome.assignments.iter().enumerate() {
            assert_eq!(a.read_name, format!("r{}", i));
        }
        assert_eq!(outcome.assignments[1].class_ids, vec![3]);
        assert_eq!(outcome.assignments[2].class_ids, vec![NOHITS_ID]);

        let table = &outcome.count_tables[0];
        assert_eq!(table.get(&10), Some(&50.0));
        assert_eq!(table.get(&3), Some(&50.0));
        assert_eq!(table.get(&100), Some(&50.0));
        assert_eq!(table.get(&NOHITS_ID), Some(&50.0));
    }

    #[test]
    fn test_low_complexity_and_min_read_cover() {
        let mut cfg = config();
        cfg.min_complexity = 0.3;
        cfg.min_percent_read_to_cover = 50.0;
        let mut low = read("low", &[10]);
        low.complexity = 0.1;
        let mut short_hit = Read::new("short", 1000, vec![Match::new(100.0, 1, 100, "ref").with_taxon(10)]);
        short_hit.complexity = 0.9;
        let outcome = binner(cfg).run_reads(vec![low, short_hit]).unwrap();
        assert_eq!(outcome.assignments[0].class_ids, vec![LOW_COMPLEXITY_ID]);
        assert_eq!(outcome.assignments[1].class_ids, vec![UNASSIGNED_ID]);
    }

    #[test]
    fn test_contaminants() {
        let binner = binner(config()).with_contaminants(ContaminantFilter::new([4]));
        let outcome = binner.run_reads(vec![read("c", &[4]), read("ok", &[10])]).unwrap();
        assert_eq!(outcome.assignments[0].class_ids, vec![CONTAMINANTS_ID]);
        assert_eq!(outcome.assignments[1].class_ids, vec![10]);
    }

    #[test]
    fn test_mate_pairs_agree() {
        let mut cfg = config();
        cfg.use_paired_reads = true;
        let reads = vec![
            read("a/1", &[10]).with_mate("a/2"),
            read("a/2", &[100]).with_mate("a/1"),
            read("b/1", &[11]).with_mate("b/2"),
            read("b/2", &[4]).with_mate("b/1"),
            read("c/1", &[11]).with_mate("c/2"),
            read("lonely/1", &[11]).with_mate("lonely/2"),
        ];
        let mut c2 = read("c/2", &[11]).with_mate("c/1");
        c2.matches[0].bit_score = 10.0;
        let mut reads = reads;
        reads.push(c2);

        let outcome = binner(cfg).run_reads(reads).unwrap();
        let ids: Vec<ClassId> = outcome.assignments.iter().map(|a| a.class_ids[0]).collect();
        // a: deeper of a pair on one lineage; b: unrelated, untouched;
        // c/2 had no usable match and adopts its mate's id
        assert_eq!(ids, vec![100, 100, 11, 4, 11, 11, 11]);
    }

    #[test]
    fn test_min_support_applied_to_taxonomy() {
        let mut cfg = config();
        cfg.min_support = 3.0;
        let mut reads = vec![read("x", &[100])];
        for i in 0..5 {
            reads.push(read(&format!("s{}", i), &[11]));
        }
        let outcome = binner(cfg).run_reads(reads).unwrap();
        assert_eq!(outcome.min_support_remap.get(&100), Some(&3));
        assert_eq!(outcome.assignments[0].class_ids, vec![3]);
        assert_eq!(outcome.count_tables[0].get(&3), Some(&1.0));
        assert_eq!(outcome.count_tables[0].get(&11), Some(&5.0));
    }

    #[test]
    fn test_cancel_before_run() {
        let binner = binner(config());
        binner.cancel_handle().store(true, Ordering::Relaxed);
        let result = binner.run_reads(vec![read("r", &[10])]);
        assert!(matches!(result, Err(BinningError::Canceled)));
    }

    #[test]
    fn test_prepare_in_memory_reference_coverage() {
        let mut cfg = config();
        cfg.min_percent_reference_to_cover = 50.0;
        let mut binner = binner(cfg);
        assert!(binner.needs_prepass());
        let hit = |reference: &str, end: u32, length: u32, taxon: ClassId| {
            Match::new(100.0, 1, 100, reference)
                .with_taxon(taxon)
                .with_reference_span(1, end, Some(length))
        };
        let reads = vec![
            Read::new("good", 100, vec![hit("well", 100, 150, 10)]),
            Read::new("thin", 100, vec![hit("sparse", 10, 1000, 11)]),
        ];
        binner.prepare(&reads);
        let outcome = binner.run_reads(reads).unwrap();
        assert_eq!(outcome.assignments[0].class_ids, vec![10]);
        assert_eq!(outcome.assignments[1].class_ids, vec![UNASSIGNED_ID]);
    }

    #[test]
    fn test_cancel_during_run() {
        let binner = binner(config());
        let cancel = binner.cancel_handle();
        let reads = (0..10_000).map(move |i| {
            if i == 50 {
                cancel.store(true, Ordering::Relaxed);
            }
            Ok(read(&format!("r{}", i), &[10]))
        });
        let result = binner.run(reads);
        assert!(matches!(result, Err(BinningError::Canceled)));
    }

    #[test]
    fn test_read_error_stops_run() {
        let binner = binner(config());
        let reads = (0..100).map(|i| {
            if i == 20 {
                Err(BinningError::Tree("truncated input".to_string()))
            } else {
                Ok(read(&format!("r{}", i), &[10]))
            }
        });
        match binner.run(reads) {
            Err(BinningError::Tree(message)) => assert_eq!(message, "truncated input"),
            other => panic!("unexpected result: {:?}", other.map(|o| o.total_reads())),
        }
    }

    #[test]
    fn test_panicking_stream_is_a_worker_error() {
        let binner = binner(config());
        let reads = (0..100).map(|i| {
            if i == 10 {
                panic!("reader blew up");
            }
            Ok(read(&format!("r{}", i), &[10]))
        });
        assert!(matches!(binner.run(reads), Err(BinningError::Worker(_))));
    }

    #[test]
    fn test_multi_gene_weight_split() {
        let mut cfg = config();
        cfg.lca_algorithm = LcaAlgorithm::LongReads;
        cfg.min_support_percent = 0.0;
        let functional = Arc::new(
            ClassificationTree::from_rows(
                "EC",
                &[(1, 1, "root", "no rank"), (5, 1, "ligase", "no rank"), (6, 1, "lyase", "no rank")],
            )
            .unwrap(),
        );
        let binner = Binner::new(cfg, vec![Arc::new(small_tree()), functional]).unwrap();
        let long = Read::new(
            "long",
            1000,
            vec![
                Match::new(100.0, 1, 300, "a").with_class_ids(vec![10, 5]),
                Match::new(100.0, 600, 900, "b").with_class_ids(vec![10, 6]),
            ],
        );
        let outcome = binner.run_reads(vec![long]).unwrap();
        assert_eq!(outcome.assignments[0].class_ids, vec![10, 5]);
        let ec = &outcome.count_tables[1];
        assert_eq!(ec.get(&5), Some(&0.5));
        assert_eq!(ec.get(&6), Some(&0.5));
    }
}
