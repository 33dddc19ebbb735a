// src/assignment/best_hit.rs

use ahash::AHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{empty_result, AssignmentAlgorithm};
use crate::active_matches::ActiveMatches;
use crate::error::{BinningError, Result};
use crate::types::{ClassId, Read};

/// Read name -> class id, read from a side file next to the alignments.
pub type ExternalAssignments = AHashMap<String, ClassId>;

/// Side file holding externally computed assignments for one classification:
/// the alignment file with its extension replaced by the lowercased
/// classification name, e.g. `sample.blast` -> `sample.kegg`.
pub fn external_assignment_path(alignment_file: &Path, classification_name: &str) -> PathBuf {
    alignment_file.with_extension(classification_name.to_lowercase())
}

/// Loads `readName\tclassId` lines. Malformed lines are logged and skipped.
pub fn load_external_assignments<P: AsRef<Path>>(path: P) -> Result<ExternalAssignments> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut result = ExternalAssignments::new();
    let mut skipped = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<_> = line.trim_end().split('\t').collect();
        let parsed = match parts.as_slice() {
            [name, id] => id.trim().parse::<ClassId>().ok().map(|id| (name.trim(), id)),
            _ => None,
        };
        match parsed {
            Some((name, id)) if !name.is_empty() => {
                result.insert(name.to_string(), id);
            }
            _ => {
                skipped += 1;
                log::warn!("{}:{}: malformed assignment line, skipping", path.display(), line_no + 1);
            }
        }
    }
    log::info!(
        "Loaded {} external assignments from {} ({} lines skipped)",
        result.len(),
        path.display(),
        skipped
    );
    Ok(result)
}

/// Assigns a read to the class of its first active match with a positive id.
///
/// An external assignment for the read name, when present and positive,
/// takes precedence over the matches.
pub struct BestHitAssignment {
    classification: usize,
    external: Option<Arc<ExternalAssignments>>,
}

impl BestHitAssignment {
    pub fn new(classification: usize, external: Option<Arc<ExternalAssignments>>) -> Self {
        Self {
            classification,
            external,
        }
    }
}

impl AssignmentAlgorithm for BestHitAssignment {
    fn compute_id(&mut self, active: &ActiveMatches, read: &Read) -> Result<ClassId> {
        if let Some(external) = &self.external {
            if let Some(&id) = external.get(&read.name) {
                if id > 0 {
                    return Ok(id);
                }
            }
        }
        if let Some(id) = active
            .iter()
            .map(|i| read.matches[i].class_id(self.classification))
            .find(|&id| id > 0)
        {
            return Ok(id);
        }
        Ok(empty_result(read))
    }

    fn lca(&self, _a: ClassId, _b: ClassId) -> Result<ClassId> {
        Err(BinningError::Unsupported("best-hit assignment"))
    }

    fn name(&self) -> &'static str {
        "best hit"
    }
}
