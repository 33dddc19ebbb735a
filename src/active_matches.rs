// src/active_matches.rs

use crate::taxdb::ClassificationTree;
use crate::types::Read;

/// Thresholds that decide whether a match takes part in an assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchFilterParams {
    pub min_score: f32,
    /// 0 or 100 disables the top-percent filter.
    pub top_percent: f32,
    pub max_expected: f64,
    pub min_percent_identity: f32,
}

impl Default for MatchFilterParams {
    fn default() -> Self {
        Self {
            min_score: 50.0,
            top_percent: 10.0,
            max_expected: 0.01,
            min_percent_identity: 0.0,
        }
    }
}

/// Membership flags over the indices of one read's matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveMatches {
    bits: Vec<bool>,
}

impl ActiveMatches {
    pub fn with_len(len: usize) -> Self {
        Self { bits: vec![false; len] }
    }

    /// Resets to `len` cleared flags, keeping the allocation.
    pub fn reset(&mut self, len: usize) {
        self.bits.clear();
        self.bits.resize(len, false);
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        self.bits[index] = true;
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        self.bits[index] = false;
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    pub fn cardinality(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|&b| b)
    }

    /// Indices of the active matches, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().filter(|(_, &b)| b).map(|(i, _)| i)
    }
}

/// Computes the active matches of `read` for one classification
/// (`None` = any classification).
///
/// A candidate must not be ignored, its taxonomy id must not be disabled,
/// and it must pass the score, expected value and identity thresholds (an
/// identity of 0 means unknown and passes). With a classification given, it
/// must also carry a positive id in that classification. The top-percent
/// filter then runs against the best candidate score.
pub fn compute_active_matches(
    params: &MatchFilterParams,
    read: &Read,
    classification: Option<usize>,
    taxonomy: &ClassificationTree,
    active: &mut ActiveMatches,
) {
    active.reset(read.matches.len());

    for (i, m) in read.matches.iter().enumerate() {
        if m.ignored
            || taxonomy.is_disabled(m.taxon_id())
            || m.bit_score < params.min_score
            || m.expected > params.max_expected
            || (m.percent_identity != 0.0 && m.percent_identity < params.min_percent_identity)
        {
            continue;
        }
        if let Some(c) = classification {
            if m.class_id(c) <= 0 {
                continue;
            }
        }
        active.set(i);
    }

    let best_score = active
        .iter()
        .map(|i| read.matches[i].bit_score)
        .fold(0f32, f32::max);

    apply_top_percent_filter(
        params.top_percent,
        best_score,
        params.min_percent_identity,
        read,
        active,
    );
}

/// Clears every active match scoring below `(1 - top_percent/100) * best_score`.
///
/// When `best_score` is 0 it is recomputed from the active set, counting only
/// matches that meet `min_percent_identity` (when that is positive). The
/// removal itself does not look at identity; callers rely on exactly this
/// behavior, so keep the two rules as they are.
pub fn apply_top_percent_filter(
    top_percent: f32,
    mut best_score: f32,
    min_percent_identity: f32,
    read: &Read,
    active: &mut ActiveMatches,
) {
    if !(top_percent > 0.0 && top_percent < 100.0) {
        return;
    }
    if best_score == 0.0 {
        for i in active.iter() {
            let m = &read.matches[i];
            if min_percent_identity == 0.0 || m.percent_identity >= min_percent_identity {
                best_score = best_score.max(m.bit_score);
            }
        }
    }
    let threshold = (1.0 - top_percent / 100.0) * best_score;
    let to_clear: Vec<usize> = active
        .iter()
        .filter(|&i| read.matches[i].bit_score < threshold)
        .collect();
    for i in to_clear {
        active.clear(i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxdb::tests::small_tree;
    use crate::types::Match;

    fn params(top_percent: f32) -> MatchFilterParams {
        MatchFilterParams {
            min_score: 0.0,
            top_percent,
            max_expected: 10.0,
            min_percent_identity: 0.0,
        }
    }

    fn read_with_scores(scores: &[f32]) -> Read {
        let matches = scores
            .iter()
            .enumerate()
            .map(|(i, &s)| Match::new(s, 1, 100, &format!("ref{}", i)).with_taxon(10))
            .collect();
        Read::new("r1", 100, matches)
    }

    #[test]
    fn test_top_percent_drops_low_scores() {
        let tree = small_tree();
        let read = read_with_scores(&[100.0, 50.0]);
        let mut active = ActiveMatches::default();
        compute_active_matches(&params(40.0), &read, None, &tree, &mut active);
        // threshold = 0.6 * 100 = 60
        assert_eq!(active.cardinality(), 1);
        assert!(active.contains(0));
    }

    #[test]
    fn test_top_percent_disabled_at_bounds() {
        let tree = small_tree();
        let read = read_with_scores(&[100.0, 1.0]);
        let mut active = ActiveMatches::default();
        for top in [0.0, 100.0] {
            compute_active_matches(&params(top), &read, None, &tree, &mut active);
            assert_eq!(active.cardinality(), 2);
        }
    }

    #[test]
    fn test_candidate_rules() {
        let mut tree = small_tree();
        tree.set_disabled(&[4]);
        let matches = vec![
            Match::new(100.0, 1, 50, "a").with_taxon(10),
            Match::new(100.0, 1, 50, "b").with_taxon(4),
            Match::new(100.0, 1, 50, "c").with_taxon(11).with_expected(1.0),
            Match::new(100.0, 1, 50, "d").with_taxon(11).with_percent_identity(80.0),
            Match::new(100.0, 1, 50, "e").with_class_ids(vec![11, 0]),
            Match::new(10.0, 1, 50, "f").with_taxon(11),
        ];
        let read = Read::new("r", 50, matches);
        let p = MatchFilterParams {
            min_score: 20.0,
            top_percent: 0.0,
            max_expected: 0.01,
            min_percent_identity: 90.0,
        };
        let mut active = ActiveMatches::default();
        compute_active_matches(&p, &read, None, &tree, &mut active);
        assert_eq!(active.iter().collect::<Vec<_>>(), vec![0, 4]);

        // the second classification: only matches with a positive id count
        compute_active_matches(&p, &read, Some(1), &tree, &mut active);
        assert!(active.is_empty());
    }

    #[test]
    fn test_filter_is_idempotent() {
        let tree = small_tree();
        let read = read_with_scores(&[100.0, 95.0, 80.0, 20.0]);
        let p = params(10.0);
        let mut active = ActiveMatches::default();
        compute_active_matches(&p, &read, None, &tree, &mut active);
        let first = active.clone();
        apply_top_percent_filter(p.top_percent, 0.0, p.min_percent_identity, &read, &mut active);
        assert_eq!(first, active);
    }

    #[test]
    fn test_top_percent_monotone() {
        let tree = small_tree();
        let read = read_with_scores(&[100.0, 91.0, 75.0, 40.0, 5.0]);
        let mut previous = ActiveMatches::default();
        compute_active_matches(&params(1.0), &read, None, &tree, &mut previous);
        for top in [5.0, 10.0, 25.0, 50.0, 99.0] {
            let mut active = ActiveMatches::default();
            compute_active_matches(&params(top), &read, None, &tree, &mut active);
            assert!(previous.iter().all(|i| active.contains(i)), "top={}", top);
            previous = active;
        }
    }

    #[test]
    fn test_best_score_recomputed_with_identity() {
        let read = Read::new(
            "r",
            100,
            vec![
                Match::new(100.0, 1, 100, "a").with_taxon(10).with_percent_identity(0.0),
                Match::new(60.0, 1, 100, "b").with_taxon(10).with_percent_identity(95.0),
            ],
        );
        let mut active = ActiveMatches::with_len(2);
        active.set(0);
        active.set(1);
        // identity-unknown match does not set the best score here, but is not removed
        apply_top_percent_filter(10.0, 0.0, 90.0, &read, &mut active);
        assert_eq!(active.cardinality(), 2);
    }
}
