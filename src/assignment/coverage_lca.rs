// src/assignment/coverage_lca.rs

use ahash::AHashMap;
use std::sync::Arc;

use super::{empty_result, tree_lca, AssignmentAlgorithm};
use crate::active_matches::ActiveMatches;
use crate::config::CoverageWeighting;
use crate::error::{BinningError, Result};
use crate::taxdb::ClassificationTree;
use crate::types::{ClassId, Read, UNASSIGNED_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    Start,
    End,
}

/// One boundary of a match's query interval. End events sit one past the
/// last covered position so that `[start, end)` is half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SweepEvent {
    pub pos: u32,
    pub kind: EventKind,
    pub match_index: usize,
}

impl SweepEvent {
    pub fn start(pos: u32, match_index: usize) -> Self {
        Self {
            pos,
            kind: EventKind::Start,
            match_index,
        }
    }

    pub fn end(pos: u32, match_index: usize) -> Self {
        Self {
            pos,
            kind: EventKind::End,
            match_index,
        }
    }
}

/// Sorts `events` and sweeps over them, calling `on_segment(from, to, open)`
/// for every maximal half-open segment `[from, to)` covered by at least one
/// match. `open` is scratch space and is left empty on success.
///
/// Fails when an end event closes a match that is not open or when matches
/// are still open after the last event.
pub fn sweep_segments<F>(
    events: &mut [SweepEvent],
    open: &mut Vec<usize>,
    mut on_segment: F,
) -> std::result::Result<(), String>
where
    F: FnMut(u32, u32, &[usize]),
{
    events.sort_unstable();
    open.clear();
    let mut previous: Option<u32> = None;

    for event in events.iter() {
        if let Some(from) = previous {
            if event.pos > from && !open.is_empty() {
                on_segment(from, event.pos, open);
            }
        }
        match event.kind {
            EventKind::Start => open.push(event.match_index),
            EventKind::End => match open.iter().position(|&m| m == event.match_index) {
                Some(slot) => {
                    open.swap_remove(slot);
                }
                None => {
                    return Err(format!(
                        "end of match {} at {} without a start",
                        event.match_index, event.pos
                    ))
                }
            },
        }
        previous = Some(event.pos);
    }

    if !open.is_empty() {
        let unclosed = open.len();
        open.clear();
        return Err(format!("{} matches never closed", unclosed));
    }
    Ok(())
}

/// LCA over the bases of the read rather than over the matches.
///
/// Each taxon earns the query positions its matches cover; the assignment is
/// the deepest node whose subtree holds `lca_coverage_percent` of the covered
/// bases, descending only while that node is unique.
pub struct CoverageLcaAssignment {
    classification: usize,
    tree: Arc<ClassificationTree>,
    lca_coverage_percent: f64,
    weighting: CoverageWeighting,
    usable: Vec<(usize, ClassId)>,
    events: Vec<SweepEvent>,
    open: Vec<usize>,
    coverage: AHashMap<ClassId, f64>,
    clade_coverage: AHashMap<ClassId, f64>,
}

impl CoverageLcaAssignment {
    pub fn new(
        classification: usize,
        tree: Arc<ClassificationTree>,
        lca_coverage_percent: f64,
        weighting: CoverageWeighting,
    ) -> Self {
        Self {
            classification,
            tree,
            lca_coverage_percent,
            weighting,
            usable: Vec::new(),
            events: Vec::new(),
            open: Vec::new(),
            coverage: AHashMap::new(),
            clade_coverage: AHashMap::new(),
        }
    }

    fn collect_usable(&mut self, active: &ActiveMatches, read: &Read) {
        self.usable.clear();
        let mut disabled = Vec::new();
        for i in active.iter() {
            let id = read.matches[i].class_id(self.classification);
            if id <= 0 || !self.tree.contains(id) {
                continue;
            }
            if self.tree.is_disabled(id) {
                disabled.push((i, id));
            } else {
                self.usable.push((i, id));
            }
        }
        if self.usable.is_empty() {
            self.usable = disabled;
        }
    }

    /// Fills `self.coverage` with covered bases per taxon.
    fn accumulate_coverage(&mut self, read: &Read) -> std::result::Result<(), String> {
        self.events.clear();
        self.coverage.clear();
        for (slot, &(i, _)) in self.usable.iter().enumerate() {
            let (lo, hi) = read.matches[i].query_span();
            self.events.push(SweepEvent::start(lo, slot));
            self.events.push(SweepEvent::end(hi.saturating_add(1), slot));
        }

        let usable = &self.usable;
        let coverage = &mut self.coverage;
        let weighting = self.weighting;
        sweep_segments(&mut self.events, &mut self.open, |from, to, open| {
            let length = (to - from) as f64;
            match weighting {
                CoverageWeighting::SharedPerMatch => {
                    let share = length / open.len() as f64;
                    for &slot in open {
                        *coverage.entry(usable[slot].1).or_insert(0.0) += share;
                    }
                }
                CoverageWeighting::BestScorePerSegment => {
                    let best = open
                        .iter()
                        .map(|&slot| read.matches[usable[slot].0].bit_score)
                        .fold(f32::MIN, f32::max);
                    let winners = open
                        .iter()
                        .filter(|&&slot| read.matches[usable[slot].0].bit_score == best)
                        .count();
                    let share = length / winners as f64;
                    for &slot in open {
                        if read.matches[usable[slot].0].bit_score == best {
                            *coverage.entry(usable[slot].1).or_insert(0.0) += share;
                        }
                    }
                }
            }
        })
    }

    /// Adds every taxon's coverage to all of its ancestors.
    fn accumulate_clades(&mut self) {
        self.clade_coverage.clear();
        for (&id, &covered) in &self.coverage {
            let mut node = Some(id);
            while let Some(current) = node {
                *self.clade_coverage.entry(current).or_insert(0.0) += covered;
                node = self.tree.parent(current);
            }
        }
    }

    fn descend(&self) -> ClassId {
        let root = self.tree.root_id();
        let total = self.clade_coverage.get(&root).copied().unwrap_or(0.0);
        let needed = self.lca_coverage_percent / 100.0 * total - 1e-9;

        let mut node = root;
        loop {
            let mut qualifying = self
                .tree
                .children(node)
                .into_iter()
                .filter(|child| self.clade_coverage.get(child).is_some_and(|&c| c >= needed));
            match (qualifying.next(), qualifying.next()) {
                (Some(child), None) => node = child,
                _ => return node,
            }
        }
    }
}

impl AssignmentAlgorithm for CoverageLcaAssignment {
    fn compute_id(&mut self, active: &ActiveMatches, read: &Read) -> Result<ClassId> {
        if active.is_empty() {
            return Ok(empty_result(read));
        }
        self.collect_usable(active, read);
        match self.usable.as_slice() {
            [] => return Ok(UNASSIGNED_ID),
            [(_, id)] => return Ok(*id),
            _ => {}
        }

        self.accumulate_coverage(read)
            .map_err(|message| BinningError::InvalidEventStream {
                read: read.name.clone(),
                message,
            })?;
        if self.coverage.is_empty() {
            return Ok(UNASSIGNED_ID);
        }
        self.accumulate_clades();
        Ok(self.descend())
    }

    fn lca(&self, a: ClassId, b: ClassId) -> Result<ClassId> {
        tree_lca(&self.tree, a, b)
    }

    fn name(&self) -> &'static str {
        "coverage LCA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxdb::tests::small_tree;
    use crate::types::Match;

    fn all_active(read: &Read) -> ActiveMatches {
        let mut active = ActiveMatches::with_len(read.matches.len());
        for i in 0..read.matches.len() {
            active.set(i);
        }
        active
    }

    fn read(hits: &[(f32, u32, u32, ClassId)]) -> Read {
        let matches = hits
            .iter()
            .map(|&(score, qs, qe, taxon)| Match::new(score, qs, qe, "ref").with_taxon(taxon))
            .collect();
        Read::new("r", 100, matches)
    }

    #[test]
    fn test_sweep_segments() {
        let mut events = vec![
            SweepEvent::start(1, 0),
            SweepEvent::end(101, 0),
            SweepEvent::start(21, 1),
            SweepEvent::end(41, 1),
        ];
        let mut segments = Vec::new();
        sweep_segments(&mut events, &mut Vec::new(), |from, to, open| {
            segments.push((from, to, open.len()));
        })
        .unwrap();
        assert_eq!(segments, vec![(1, 21, 1), (21, 41, 2), (41, 101, 1)]);
    }

    #[test]
    fn test_touching_intervals_share_no_segment() {
        // starts sort before ends at the same position
        let mut events = vec![
            SweepEvent::end(11, 0),
            SweepEvent::start(1, 0),
            SweepEvent::start(11, 1),
            SweepEvent::end(21, 1),
        ];
        let mut segments = Vec::new();
        sweep_segments(&mut events, &mut Vec::new(), |from, to, open| {
            segments.push((from, to, open.len()));
        })
        .unwrap();
        assert_eq!(segments, vec![(1, 11, 1), (11, 21, 1)]);
    }

    #[test]
    fn test_corrupt_event_stream() {
        let mut events = vec![SweepEvent::start(1, 0), SweepEvent::end(5, 7)];
        assert!(sweep_segments(&mut events, &mut Vec::new(), |_, _, _| {}).is_err());
        let mut events = vec![SweepEvent::start(1, 0)];
        assert!(sweep_segments(&mut events, &mut Vec::new(), |_, _, _| {}).is_err());
    }

    #[test]
    fn test_shared_coverage_descent() {
        let tree = Arc::new(small_tree());
        // E. coli covers all 100 bases, Salmonella shares the first 20
        let r = read(&[(100.0, 1, 100, 10), (50.0, 20, 1, 11)]);
        let mut strict =
            CoverageLcaAssignment::new(0, Arc::clone(&tree), 100.0, CoverageWeighting::SharedPerMatch);
        assert_eq!(strict.compute_id(&all_active(&r), &r).unwrap(), 3);
        let mut relaxed =
            CoverageLcaAssignment::new(0, Arc::clone(&tree), 80.0, CoverageWeighting::SharedPerMatch);
        assert_eq!(relaxed.compute_id(&all_active(&r), &r).unwrap(), 10);
        let mut best =
            CoverageLcaAssignment::new(0, tree, 100.0, CoverageWeighting::BestScorePerSegment);
        assert_eq!(best.compute_id(&all_active(&r), &r).unwrap(), 10);
    }

    #[test]
    fn test_tie_stops_descent() {
        let tree = Arc::new(small_tree());
        let r = read(&[(100.0, 1, 50, 10), (100.0, 51, 100, 11)]);
        let mut algo = CoverageLcaAssignment::new(0, tree, 50.0, CoverageWeighting::SharedPerMatch);
        assert_eq!(algo.compute_id(&all_active(&r), &r).unwrap(), 3);
    }

    #[test]
    fn test_ancestor_with_own_coverage_stops_descent() {
        let tree = Arc::new(small_tree());
        let r = read(&[(100.0, 1, 50, 3), (100.0, 51, 100, 10)]);
        let mut algo = CoverageLcaAssignment::new(0, tree, 100.0, CoverageWeighting::SharedPerMatch);
        assert_eq!(algo.compute_id(&all_active(&r), &r).unwrap(), 3);
    }
}
