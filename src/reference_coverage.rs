// src/reference_coverage.rs

use ahash::{AHashMap, AHashSet, RandomState};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::borrow::Borrow;
use std::sync::Arc;

use crate::active_matches::{compute_active_matches, ActiveMatches, MatchFilterParams};
use crate::interval::IntervalList;
use crate::taxdb::ClassificationTree;
use crate::types::{Match, Read};

const COVERAGE_BUCKETS: usize = 64;

/// The set of references that are covered well enough by the active
/// matches of the whole dataset.
#[derive(Debug, Default, Clone)]
pub struct ReferenceCoverageFilter {
    retained: AHashSet<Arc<str>>,
    rejected: usize,
}

impl ReferenceCoverageFilter {
    /// Unions the reference-side spans of all active matches per reference
    /// and keeps those covering at least `min_percent_to_cover` percent of
    /// the reference length.
    pub fn compute<P, R>(
        reads: P,
        params: &MatchFilterParams,
        taxonomy: &ClassificationTree,
        min_percent_to_cover: f64,
    ) -> Self
    where
        P: ParallelIterator<Item = R>,
        R: Borrow<Read> + Send,
    {
        let hasher = RandomState::new();
        let buckets: Vec<Mutex<AHashMap<Arc<str>, (u32, IntervalList)>>> =
            (0..COVERAGE_BUCKETS).map(|_| Mutex::new(AHashMap::new())).collect();

        reads.for_each_init(ActiveMatches::default, |active, read| {
            let read: &Read = read.borrow();
            compute_active_matches(params, read, None, taxonomy, active);
            for i in active.iter() {
                let m = &read.matches[i];
                let Some(length) = m.ref_length else {
                    continue;
                };
                if m.ref_start == 0 && m.ref_end == 0 {
                    continue;
                }
                let bucket = hasher.hash_one(m.reference.as_ref()) as usize % COVERAGE_BUCKETS;
                buckets[bucket]
                    .lock()
                    .entry(Arc::clone(&m.reference))
                    .or_insert_with(|| (length, IntervalList::new()))
                    .1
                    .add(m.ref_start, m.ref_end);
            }
        });

        let mut retained = AHashSet::new();
        let mut rejected = 0usize;
        for bucket in buckets {
            for (reference, (length, mut intervals)) in bucket.into_inner() {
                let needed = min_percent_to_cover / 100.0 * length as f64;
                if intervals.covered_length() as f64 >= needed {
                    retained.insert(reference);
                } else {
                    rejected += 1;
                }
            }
        }
        log::info!(
            "Reference coverage: {} references retained, {} rejected",
            retained.len(),
            rejected
        );
        Self { retained, rejected }
    }

    pub fn is_retained(&self, m: &Match) -> bool {
        m.ref_length.is_none() || self.retained.contains(m.reference.as_ref())
    }

    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    /// Clears the active matches that hit a rejected reference.
    pub fn apply(&self, read: &Read, active: &mut ActiveMatches) {
        let rejected: Vec<usize> = active
            .iter()
            .filter(|&i| !self.is_retained(&read.matches[i]))
            .collect();
        for i in rejected {
            active.clear(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxdb::tests::small_tree;

    fn hit(reference: &str, start: u32, end: u32, length: Option<u32>) -> Match {
        Match::new(100.0, 1, 100, reference)
            .with_taxon(10)
            .with_reference_span(start, end, length)
    }

    #[test]
    fn test_union_of_spans_decides() {
        let tree = small_tree();
        let reads = vec![
            Read::new("r1", 100, vec![hit("well", 1, 100, Some(200)), hit("thin", 1, 20, Some(1000))]),
            // reverse strand span on the reference
            Read::new("r2", 100, vec![hit("well", 200, 90, Some(200))]),
            Read::new("r3", 100, vec![hit("unknown", 1, 10, None)]),
        ];
        let filter = ReferenceCoverageFilter::compute(reads.par_iter(), &MatchFilterParams::default(), &tree, 50.0);
        assert_eq!(filter.retained_count(), 1);
        assert_eq!(filter.rejected_count(), 1);

        let mut active = ActiveMatches::with_len(2);
        active.set(0);
        active.set(1);
        filter.apply(&reads[0], &mut active);
        assert!(active.contains(0));
        assert!(!active.contains(1));

        // unknown length is never rejected
        let mut active = ActiveMatches::with_len(1);
        active.set(0);
        filter.apply(&reads[2], &mut active);
        assert!(active.contains(0));
    }

    #[test]
    fn test_zero_percent_keeps_everything_seen() {
        let tree = small_tree();
        let reads = vec![Read::new("r1", 100, vec![hit("thin", 1, 2, Some(100_000))])];
        let filter = ReferenceCoverageFilter::compute(reads.par_iter(), &MatchFilterParams::default(), &tree, 0.0);
        assert!(filter.is_retained(&reads[0].matches[0]));
    }
}
