// src/lib.rs
pub mod active_matches;
pub mod addressing;
pub mod assignment;
pub mod binning;
pub mod config;
pub mod contaminants;
pub mod error;
pub mod hits;
pub mod interval;
pub mod min_support;
pub mod reference_coverage;
pub mod report;
pub mod taxdb;
pub mod types;

use indicatif::ProgressBar;
use std::fmt::Write as FmtWrite;
use std::path::PathBuf;
use std::sync::Arc;

use crate::assignment::best_hit::{external_assignment_path, load_external_assignments};
use crate::assignment::AlgorithmKind;
use crate::binning::{Binner, BinningOutcome};
use crate::config::BinningConfig;
use crate::contaminants::ContaminantFilter;
use crate::error::Result;
use crate::hits::{HitSource, ReferenceMapping};
use crate::report::{build_classification_report, format_count_table, format_parameter_header};
use crate::taxdb::ClassificationTree;
use crate::types::{ClassId, ClassificationReportRow, TAXONOMY_NAME};

/// A classification besides the taxonomy: its tree and the file that maps
/// references onto its ids.
#[derive(Debug, Clone)]
pub struct ClassificationInput {
    pub name: String,
    pub tree_path: PathBuf,
    pub mapping_path: PathBuf,
}

/// Where the inputs of a binning run live.
#[derive(Debug, Clone, Default)]
pub struct BinningInputs {
    /// taxDB file: `taxid\tparent\tname\trank`.
    pub taxdb_path: PathBuf,
    /// `reference\ttaxid` lines.
    pub taxonomy_mapping: PathBuf,
    pub functional: Vec<ClassificationInput>,
    /// BLAST tabular files, optionally gzipped.
    pub alignment_files: Vec<PathBuf>,
    pub contaminants: Option<PathBuf>,
    /// Taxa (with their subtrees) that matches may not be assigned to.
    pub disabled_taxa: Vec<ClassId>,
}

/// Binning results. Only structured data is kept; text is generated on demand.
pub struct BinningResults {
    pub config: BinningConfig,
    pub trees: Vec<Arc<ClassificationTree>>,
    pub outcome: BinningOutcome,
}

impl BinningResults {
    /// One line per read: name, then one id per classification; additional
    /// ids follow as `id:weight`.
    pub fn get_assignments_text(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "#read\t{}", self.outcome.classification_names.join("\t"));
        for assignment in &self.outcome.assignments {
            output.push_str(&assignment.read_name);
            for id in &assignment.class_ids {
                let _ = write!(output, "\t{}", id);
            }
            for extra in assignment.additional.iter().flatten() {
                let _ = write!(output, "\t{}:{}", extra.0, extra.1);
            }
            output.push('\n');
        }
        output
    }

    /// Count table of one classification, preceded by the parameter line.
    pub fn get_count_table(&self, classification: usize) -> Option<String> {
        let table = self.outcome.count_tables.get(classification)?;
        let mut output = format_parameter_header(&self.config);
        output.push_str(&format_count_table(table));
        Some(output)
    }

    pub fn get_report_rows(&self, classification: usize) -> Option<Vec<ClassificationReportRow>> {
        let tree = self.trees.get(classification)?;
        let table = self.outcome.count_tables.get(classification)?;
        Some(build_classification_report(tree, table).0)
    }

    /// Clade report of one classification, preceded by the parameter line.
    pub fn get_report(&self, classification: usize) -> Option<String> {
        let tree = self.trees.get(classification)?;
        let table = self.outcome.count_tables.get(classification)?;
        let mut output = format_parameter_header(&self.config);
        output.push_str(&build_classification_report(tree, table).1);
        Some(output)
    }
}

/// Unified function to bin the reads of one or more alignment files.
pub fn bin_alignments(
    inputs: &BinningInputs,
    config: &BinningConfig,
    progress: Option<ProgressBar>,
) -> Result<BinningResults> {
    // 1. Trees
    let mut taxonomy = ClassificationTree::from_taxdb(TAXONOMY_NAME, &inputs.taxdb_path)?;
    taxonomy.set_disabled(&inputs.disabled_taxa);
    let mut trees = vec![Arc::new(taxonomy)];
    for input in &inputs.functional {
        trees.push(Arc::new(ClassificationTree::from_taxdb(&input.name, &input.tree_path)?));
    }

    // 2. Reference mappings
    let mut mapping = ReferenceMapping::new();
    mapping.add_file(TAXONOMY_NAME, &inputs.taxonomy_mapping)?;
    for input in &inputs.functional {
        mapping.add_file(&input.name, &input.mapping_path)?;
    }
    let mapping = Arc::new(mapping);

    // 3. Hit files, streamed once per pass
    let source = HitSource::new(inputs.alignment_files.clone(), mapping);

    // 4. Binner and its side inputs
    let mut binner = Binner::new(config.clone(), trees.clone())?;
    if let Some(first) = inputs.alignment_files.first() {
        for (c, kind) in binner.algorithm_kinds().into_iter().enumerate() {
            if kind != AlgorithmKind::BestHit {
                continue;
            }
            let side_file = external_assignment_path(first, trees[c].name());
            if side_file.exists() {
                let external = load_external_assignments(&side_file)?;
                binner = binner.with_external_assignments(c, Arc::new(external));
            }
        }
    }
    if config.use_contaminant_filter {
        if let Some(path) = &inputs.contaminants {
            binner = binner.with_contaminants(ContaminantFilter::from_file(path)?);
        } else {
            log::warn!("contaminant filter requested but no contaminant file given");
        }
    }
    if let Some(pb) = progress {
        binner = binner.with_progress(pb);
    }
    if binner.needs_prepass() {
        binner.prepare_streamed(&source)?;
    }

    // 5. Bin
    let outcome = binner.run(source.stream())?;

    Ok(BinningResults {
        config: config.clone(),
        trees,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NOHITS_ID, UNASSIGNED_ID};
    use std::fs;

    const TAXDB: &str = "1\t1\troot\tno rank
2\t1\tBacteria\tsuperkingdom
3\t2\tEnterobacterales\torder
10\t3\tEscherichia coli\tspecies
11\t3\tSalmonella enterica\tspecies
";

    const HITS: &str = "\
q1\trefA\t99\t100\t1\t0\t1\t100\t1\t100\t1e-40\t150\t1000
q1\trefB\t99\t100\t1\t0\t1\t100\t1\t100\t1e-40\t148\t1000
q2\trefA\t99\t100\t1\t0\t1\t100\t101\t200\t1e-40\t150\t1000
q3\trefB\t99\t100\t1\t0\t1\t100\t1\t100\t1e-40\t20\t1000
q4\trefC\t99\t100\t1\t0\t1\t100\t1\t100\t1e-40\t150\t1000
";

    fn write_inputs(dir: &tempfile::TempDir) -> BinningInputs {
        let taxdb_path = dir.path().join("taxDB");
        let taxonomy_mapping = dir.path().join("ref2tax.tsv");
        let ec_tree = dir.path().join("ec.tree");
        let ec_mapping = dir.path().join("ref2ec.tsv");
        let hits = dir.path().join("sample.blast");
        fs::write(&taxdb_path, TAXDB).unwrap();
        fs::write(&taxonomy_mapping, "refA\t10\nrefB\t11\n").unwrap();
        fs::write(&ec_tree, "1\t1\tEC\tno rank\n5\t1\tligase\tno rank\n").unwrap();
        fs::write(&ec_mapping, "refA\t5\n").unwrap();
        fs::write(&hits, HITS).unwrap();
        // best-hit side file for the EC classification
        fs::write(dir.path().join("sample.ec"), "q2\t1\n").unwrap();

        BinningInputs {
            taxdb_path,
            taxonomy_mapping,
            functional: vec![ClassificationInput {
                name: "EC".to_string(),
                tree_path: ec_tree,
                mapping_path: ec_mapping,
            }],
            alignment_files: vec![hits],
            ..BinningInputs::default()
        }
    }

    #[test]
    fn test_bin_alignments_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(&dir);
        let config = BinningConfig {
            min_support_percent: 0.0,
            threads: 2,
            ..BinningConfig::default()
        };
        let results = bin_alignments(&inputs, &config, None).unwrap();
        let outcome = &results.outcome;
        assert_eq!(outcome.total_reads(), 4);

        let taxonomy: Vec<ClassId> = outcome.assignments.iter().map(|a| a.class_ids[0]).collect();
        // q1 hits both species, q3 scores too low, refC has no taxon
        assert_eq!(taxonomy, vec![3, 10, UNASSIGNED_ID, UNASSIGNED_ID]);
        let ec: Vec<ClassId> = outcome.assignments.iter().map(|a| a.class_ids[1]).collect();
        assert_eq!(ec, vec![5, 1, UNASSIGNED_ID, UNASSIGNED_ID]);

        let table = results.get_count_table(0).unwrap();
        assert!(table.starts_with("# parameters: minScore=50"));
        assert!(table.contains("\n3\t1\n"));
        assert!(table.contains("\n-2\t2\n"));

        let report = results.get_report(0).unwrap();
        assert!(report.contains("Escherichia coli"));
        let rows = results.get_report_rows(0).unwrap();
        assert_eq!(rows[0].name, "Not assigned");
        assert!(rows.iter().all(|r| r.class_id != NOHITS_ID));

        let text = results.get_assignments_text();
        assert!(text.starts_with("#read\tTaxonomy\tEC\n"));
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn test_weighted_and_coverage_runs() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(&dir);
        for algorithm in ["weighted", "coverage", "longReads"] {
            let config: BinningConfig = format!("lcaAlgorithm={} minSupportPercent=0 minPercentReferenceToCover=10", algorithm)
                .parse()
                .unwrap();
            let results = bin_alignments(&inputs, &config, None).unwrap();
            let taxonomy = &results.outcome.assignments;
            assert_eq!(taxonomy[1].class_ids[0], 10, "{}", algorithm);
        }
    }

    #[test]
    fn test_missing_hit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = write_inputs(&dir);
        inputs.alignment_files.push(dir.path().join("missing.blast"));
        let config: BinningConfig = "lcaAlgorithm=weighted minSupportPercent=0".parse().unwrap();
        // the weighted pre-pass reaches the missing file first
        assert!(matches!(
            bin_alignments(&inputs, &config, None),
            Err(crate::error::BinningError::Io(_))
        ));
        let config = BinningConfig {
            min_support_percent: 0.0,
            ..BinningConfig::default()
        };
        assert!(matches!(
            bin_alignments(&inputs, &config, None),
            Err(crate::error::BinningError::Io(_))
        ));
    }

    #[test]
    fn test_missing_taxdb_is_an_error() {
        let inputs = BinningInputs {
            taxdb_path: PathBuf::from("/nonexistent/taxDB"),
            ..BinningInputs::default()
        };
        assert!(bin_alignments(&inputs, &BinningConfig::default(), None).is_err());
    }
}
