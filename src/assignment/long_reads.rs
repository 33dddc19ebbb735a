// src/assignment/long_reads.rs

use ahash::AHashMap;
use std::ops::Range;
use std::sync::Arc;

use super::{empty_result, tree_lca, AssignmentAlgorithm};
use crate::active_matches::ActiveMatches;
use crate::addressing::{common_prefix, Address};
use crate::error::Result;
use crate::taxdb::ClassificationTree;
use crate::types::{ClassId, Read, UNASSIGNED_ID};

/// Sorts `matches` (indices into `read.matches`) by query start and splits
/// them into regions: a match starting more than `min_overlap` bases past the
/// end of the current region opens a new one. Returns ranges into `matches`.
pub fn partition_regions(read: &Read, matches: &mut [usize], min_overlap: u32) -> Vec<Range<usize>> {
    matches.sort_by_key(|&i| read.matches[i].query_span());
    let mut regions = Vec::new();
    let mut region_start = 0usize;
    let mut region_end = 0u32;

    for (k, &i) in matches.iter().enumerate() {
        let (lo, hi) = read.matches[i].query_span();
        if k == 0 {
            region_end = hi;
            continue;
        }
        if lo > region_end.saturating_add(min_overlap) {
            regions.push(region_start..k);
            region_start = k;
            region_end = hi;
        } else {
            region_end = region_end.max(hi);
        }
    }
    if !matches.is_empty() {
        regions.push(region_start..matches.len());
    }
    regions
}

/// Indices of active matches whose id is usable in `classification`;
/// disabled ids are only used when nothing else is left.
fn collect_usable_matches(
    tree: &ClassificationTree,
    classification: usize,
    active: &ActiveMatches,
    read: &Read,
    out: &mut Vec<usize>,
) {
    out.clear();
    let mut disabled = Vec::new();
    for i in active.iter() {
        let id = read.matches[i].class_id(classification);
        if id <= 0 || !tree.contains(id) {
            continue;
        }
        if tree.is_disabled(id) {
            disabled.push(i);
        } else {
            out.push(i);
        }
    }
    if out.is_empty() {
        *out = disabled;
    }
}

fn score_threshold(top_percent: f32, best: f32) -> f32 {
    if top_percent > 0.0 && top_percent < 100.0 {
        (1.0 - top_percent / 100.0) * best
    } else {
        f32::MIN
    }
}

fn lca_of(tree: &ClassificationTree, ids: &[ClassId]) -> ClassId {
    if let [id] = ids {
        return *id;
    }
    let addresses: Vec<&Address> = ids.iter().filter_map(|&id| tree.address(id)).collect();
    let prefix = common_prefix(&addresses, true);
    tree.address_to_id(prefix.units()).unwrap_or(UNASSIGNED_ID)
}

/// Taxonomy assignment for long reads. Scores are summed over the regions of
/// the read, so a taxon that explains several genes outweighs one that
/// explains a single gene slightly better.
pub struct LongReadLcaAssignment {
    classification: usize,
    tree: Arc<ClassificationTree>,
    top_percent: f32,
    min_overlap: u32,
    matches: Vec<usize>,
    totals: AHashMap<ClassId, f32>,
    region_best: AHashMap<ClassId, f32>,
    ids: Vec<ClassId>,
}

impl LongReadLcaAssignment {
    pub fn new(classification: usize, tree: Arc<ClassificationTree>, top_percent: f32, min_overlap: u32) -> Self {
        Self {
            classification,
            tree,
            top_percent,
            min_overlap,
            matches: Vec::new(),
            totals: AHashMap::new(),
            region_best: AHashMap::new(),
            ids: Vec::new(),
        }
    }
}

impl AssignmentAlgorithm for LongReadLcaAssignment {
    fn compute_id(&mut self, active: &ActiveMatches, read: &Read) -> Result<ClassId> {
        if active.is_empty() {
            return Ok(empty_result(read));
        }
        collect_usable_matches(&self.tree, self.classification, active, read, &mut self.matches);
        if self.matches.is_empty() {
            return Ok(UNASSIGNED_ID);
        }

        self.totals.clear();
        for region in partition_regions(read, &mut self.matches, self.min_overlap) {
            self.region_best.clear();
            for &i in &self.matches[region] {
                let m = &read.matches[i];
                let best = self.region_best.entry(m.class_id(self.classification)).or_insert(0.0);
                *best = best.max(m.bit_score);
            }
            for (&id, &score) in &self.region_best {
                *self.totals.entry(id).or_insert(0.0) += score;
            }
        }

        let best_total = self.totals.values().copied().fold(0f32, f32::max);
        let threshold = score_threshold(self.top_percent, best_total);
        self.ids.clear();
        self.ids.extend(
            self.totals
                .iter()
                .filter(|(_, &total)| total >= threshold)
                .map(|(&id, _)| id),
        );
        self.ids.sort_unstable();
        Ok(lca_of(&self.tree, &self.ids))
    }

    fn lca(&self, a: ClassId, b: ClassId) -> Result<ClassId> {
        tree_lca(&self.tree, a, b)
    }

    fn name(&self) -> &'static str {
        "long-read LCA"
    }
}

/// Functional assignment for long reads: one id per region (gene). The first
/// region's id is the primary result, the rest are reported as additional
/// ids sharing the read weight equally.
pub struct MultiGeneLcaAssignment {
    classification: usize,
    tree: Arc<ClassificationTree>,
    top_percent: f32,
    min_overlap: u32,
    matches: Vec<usize>,
    ids: Vec<ClassId>,
    /// Region ids of `cached_read`, left by `compute_id` for
    /// `additional_class_ids`.
    regions: Vec<ClassId>,
    cached_read: Option<String>,
}

impl MultiGeneLcaAssignment {
    pub fn new(classification: usize, tree: Arc<ClassificationTree>, top_percent: f32, min_overlap: u32) -> Self {
        Self {
            classification,
            tree,
            top_percent,
            min_overlap,
            matches: Vec::new(),
            ids: Vec::new(),
            regions: Vec::new(),
            cached_read: None,
        }
    }

    /// Fills `regions` with one id per region, in query order.
    fn compute_regions(&mut self, active: &ActiveMatches, read: &Read) {
        self.regions.clear();
        collect_usable_matches(&self.tree, self.classification, active, read, &mut self.matches);
        for region in partition_regions(read, &mut self.matches, self.min_overlap) {
            let members = &self.matches[region];
            let best = members
                .iter()
                .map(|&i| read.matches[i].bit_score)
                .fold(0f32, f32::max);
            let threshold = score_threshold(self.top_percent, best);
            self.ids.clear();
            self.ids.extend(
                members
                    .iter()
                    .map(|&i| &read.matches[i])
                    .filter(|m| m.bit_score >= threshold)
                    .map(|m| m.class_id(self.classification)),
            );
            self.ids.sort_unstable();
            self.ids.dedup();
            let id = lca_of(&self.tree, &self.ids);
            if id > 0 {
                self.regions.push(id);
            }
        }
    }
}

impl AssignmentAlgorithm for MultiGeneLcaAssignment {
    fn compute_id(&mut self, active: &ActiveMatches, read: &Read) -> Result<ClassId> {
        self.cached_read = None;
        if active.is_empty() {
            return Ok(empty_result(read));
        }
        self.compute_regions(active, read);
        self.cached_read = Some(read.name.clone());
        Ok(self.regions.first().copied().unwrap_or(UNASSIGNED_ID))
    }

    fn additional_class_ids(&mut self, active: &ActiveMatches, read: &Read) -> Vec<(ClassId, f64)> {
        if active.is_empty() {
            return Vec::new();
        }
        if self.cached_read.take().as_deref() != Some(read.name.as_str()) {
            self.compute_regions(active, read);
        }
        if self.regions.len() < 2 {
            return Vec::new();
        }
        let share = read.weight / self.regions.len() as f64;
        self.regions[1..].iter().map(|&id| (id, share)).collect()
    }

    fn lca(&self, a: ClassId, b: ClassId) -> Result<ClassId> {
        tree_lca(&self.tree, a, b)
    }

    fn name(&self) -> &'static str {
        "multi-gene LCA"
    }
}
