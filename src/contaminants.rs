// src/contaminants.rs

use ahash::AHashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::active_matches::ActiveMatches;
use crate::error::Result;
use crate::interval::IntervalList;
use crate::taxdb::ClassificationTree;
use crate::types::{ClassId, Read};

/// Recognizes reads that are explained by contaminant taxa. A taxon counts as
/// contaminant when it, or one of its ancestors, is in the contaminant set.
#[derive(Debug, Clone, Default)]
pub struct ContaminantFilter {
    contaminants: AHashSet<ClassId>,
}

impl ContaminantFilter {
    pub fn new(ids: impl IntoIterator<Item = ClassId>) -> Self {
        Self {
            contaminants: ids.into_iter().filter(|&id| id > 0).collect(),
        }
    }

    /// Loads one taxon id per line; blank, `#` and malformed lines are skipped.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut ids = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let token = line.trim();
            if token.is_empty() || token.starts_with('#') {
                continue;
            }
            match token.parse::<ClassId>() {
                Ok(id) if id > 0 => ids.push(id),
                _ => log::warn!("{}:{}: bad contaminant id {:?}, skipping", path.display(), line_no + 1, token),
            }
        }
        log::info!("Loaded {} contaminant taxa from {}", ids.len(), path.display());
        Ok(Self::new(ids))
    }

    pub fn len(&self) -> usize {
        self.contaminants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contaminants.is_empty()
    }

    pub fn is_contaminant_taxon(&self, tree: &ClassificationTree, id: ClassId) -> bool {
        let mut node = Some(id).filter(|&id| id > 0);
        while let Some(current) = node {
            if self.contaminants.contains(&current) {
                return true;
            }
            node = tree.parent(current);
        }
        false
    }

    /// Short reads: every active match with a taxon hits a contaminant.
    /// Long reads: contaminant matches cover at least half of the aligned
    /// query bases.
    pub fn is_contaminated(
        &self,
        tree: &ClassificationTree,
        read: &Read,
        active: &ActiveMatches,
        long_reads: bool,
    ) -> bool {
        if self.contaminants.is_empty() {
            return false;
        }
        if long_reads {
            let mut aligned = IntervalList::new();
            let mut contaminated = IntervalList::new();
            for i in active.iter() {
                let m = &read.matches[i];
                let (lo, hi) = m.query_span();
                aligned.add(lo, hi);
                if self.is_contaminant_taxon(tree, m.taxon_id()) {
                    contaminated.add(lo, hi);
                }
            }
            let aligned = aligned.covered_length();
            aligned > 0 && 2 * contaminated.covered_length() >= aligned
        } else {
            let mut seen = false;
            for i in active.iter() {
                let taxon = read.matches[i].taxon_id();
                if taxon <= 0 {
                    continue;
                }
                if !self.is_contaminant_taxon(tree, taxon) {
                    return false;
                }
                seen = true;
            }
            seen
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxdb::tests::small_tree;
    use crate::types::Match;
    use std::io::Write;

    fn read(hits: &[(u32, u32, ClassId)]) -> (Read, ActiveMatches) {
        let matches: Vec<_> = hits
            .iter()
            .map(|&(qs, qe, t)| Match::new(100.0, qs, qe, "ref").with_taxon(t))
            .collect();
        let mut active = ActiveMatches::with_len(matches.len());
        for i in 0..matches.len() {
            active.set(i);
        }
        (Read::new("r", 1000, matches), active)
    }

    #[test]
    fn test_short_read_needs_all_matches() {
        let tree = small_tree();
        let filter = ContaminantFilter::new([10]);
        let (r, a) = read(&[(1, 100, 100), (1, 100, 10)]);
        assert!(filter.is_contaminated(&tree, &r, &a, false));
        let (r, a) = read(&[(1, 100, 100), (1, 100, 11)]);
        assert!(!filter.is_contaminated(&tree, &r, &a, false));
    }

    #[test]
    fn test_long_read_uses_covered_bases() {
        let tree = small_tree();
        let filter = ContaminantFilter::new([10]);
        let (r, a) = read(&[(1, 500, 10), (501, 1000, 11)]);
        assert!(filter.is_contaminated(&tree, &r, &a, true));
        let (r, a) = read(&[(1, 400, 10), (401, 1000, 11)]);
        assert!(!filter.is_contaminated(&tree, &r, &a, true));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# contaminants").unwrap();
        writeln!(file, "4").unwrap();
        writeln!(file, "human").unwrap();
        let filter = ContaminantFilter::from_file(file.path()).unwrap();
        assert_eq!(filter.len(), 1);
        assert!(filter.is_contaminant_taxon(&small_tree(), 4));
        assert!(!filter.is_contaminant_taxon(&small_tree(), 1));
    }
}
