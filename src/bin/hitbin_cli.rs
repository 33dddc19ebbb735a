use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use hitbin_rs::config::{BinningConfig, CoverageWeighting, LcaAlgorithm};
use hitbin_rs::error::{BinningError, Result};
use hitbin_rs::types::ClassId;
use hitbin_rs::{bin_alignments, BinningInputs, ClassificationInput};

/// Assigns BLAST tabular hits to a taxonomy (and functional classifications)
/// and writes per-read assignments, count tables and clade reports.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Options {
    /// BLAST tabular hit files (-outfmt 6, optionally with slen), .gz allowed
    #[clap(required = true, value_parser)]
    alignments: Vec<PathBuf>,

    /// taxDB file: taxid, parent, name, rank (tab-separated)
    #[clap(short, long, value_parser)]
    taxdb: PathBuf,

    /// reference -> taxid mapping
    #[clap(short = 'm', long, value_parser)]
    taxonomy_mapping: PathBuf,

    /// Extra classification as NAME:TREE_FILE:MAPPING_FILE (repeatable)
    #[clap(short = 'f', long = "functional", value_parser)]
    functional: Vec<String>,

    /// Contaminant taxids, one per line (enables the contaminant filter)
    #[clap(long, value_parser)]
    contaminants: Option<PathBuf>,

    /// Taxa whose subtrees may not receive reads
    #[clap(long = "disable", value_delimiter = ',')]
    disabled_taxa: Vec<ClassId>,

    /// Parameter string (key=value ...) applied before the flags below
    #[clap(long)]
    params: Option<String>,

    #[clap(long)]
    min_score: Option<f32>,

    #[clap(long)]
    top_percent: Option<f32>,

    #[clap(long)]
    max_expected: Option<f64>,

    #[clap(long)]
    min_percent_identity: Option<f32>,

    #[clap(long)]
    min_support: Option<f64>,

    #[clap(long)]
    min_support_percent: Option<f64>,

    /// naive, weighted, coverage or longReads
    #[clap(short = 'a', long)]
    lca_algorithm: Option<LcaAlgorithm>,

    #[clap(long)]
    lca_coverage_percent: Option<f64>,

    #[clap(long)]
    weighted_lca_percent: Option<f64>,

    /// shared or bestScore
    #[clap(long)]
    coverage_weighting: Option<CoverageWeighting>,

    #[clap(long)]
    min_percent_reference_to_cover: Option<f64>,

    #[clap(long)]
    min_percent_read_to_cover: Option<f64>,

    /// Use the percent-identity rank filter
    #[clap(long, action)]
    identity_filter: bool,

    /// Let mates of a pair support each other
    #[clap(long, action)]
    paired: bool,

    /// Worker threads (0 = all cores)
    #[clap(short = 'p', long, default_value_t = 0)]
    threads: usize,

    /// Output directory
    #[clap(short, long, default_value = ".", value_parser)]
    output_dir: PathBuf,
}

fn spinner(color: &str, message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&format!("{{spinner:.{}}} {{msg}} {{pos}}", color))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner
}

fn build_config(options: &Options) -> Result<BinningConfig> {
    let mut config = match &options.params {
        Some(params) => params.parse()?,
        None => BinningConfig::default(),
    };
    if let Some(v) = options.min_score {
        config.min_score = v;
    }
    if let Some(v) = options.top_percent {
        config.top_percent = v;
    }
    if let Some(v) = options.max_expected {
        config.max_expected = v;
    }
    if let Some(v) = options.min_percent_identity {
        config.min_percent_identity = v;
    }
    if let Some(v) = options.min_support {
        config.min_support = v;
        config.min_support_percent = 0.0;
    }
    if let Some(v) = options.min_support_percent {
        config.min_support_percent = v;
    }
    if let Some(v) = options.lca_algorithm {
        config.lca_algorithm = v;
    }
    if let Some(v) = options.lca_coverage_percent {
        config.lca_coverage_percent = v;
    }
    if let Some(v) = options.weighted_lca_percent {
        config.weighted_lca_percent = v;
    }
    if let Some(v) = options.coverage_weighting {
        config.coverage_weighting = v;
    }
    if let Some(v) = options.min_percent_reference_to_cover {
        config.min_percent_reference_to_cover = v;
    }
    if let Some(v) = options.min_percent_read_to_cover {
        config.min_percent_read_to_cover = v;
    }
    config.use_identity_filter |= options.identity_filter;
    config.use_paired_reads |= options.paired;
    config.use_contaminant_filter |= options.contaminants.is_some();
    config.threads = options.threads;
    config.validate()?;
    Ok(config)
}

fn build_inputs(options: &Options) -> Result<BinningInputs> {
    let functional = options
        .functional
        .iter()
        .map(|spec| match spec.split(':').collect::<Vec<_>>().as_slice() {
            [name, tree, mapping] => Ok(ClassificationInput {
                name: name.to_string(),
                tree_path: PathBuf::from(tree),
                mapping_path: PathBuf::from(mapping),
            }),
            _ => Err(BinningError::config("functional", format!("expected NAME:TREE:MAPPING, got {:?}", spec))),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(BinningInputs {
        taxdb_path: options.taxdb.clone(),
        taxonomy_mapping: options.taxonomy_mapping.clone(),
        functional,
        alignment_files: options.alignments.clone(),
        contaminants: options.contaminants.clone(),
        disabled_taxa: options.disabled_taxa.clone(),
    })
}

fn run(options: &Options) -> Result<()> {
    let config = build_config(options)?;
    let inputs = build_inputs(options)?;
    log::info!("Parameters: {}", config);

    // 1. Bin
    let progress = spinner("green", "Binning reads...");
    let results = bin_alignments(&inputs, &config, Some(progress.clone()))?;
    progress.finish_with_message(format!("Binned {} reads.", results.outcome.total_reads()));

    // 2. Write outputs
    let writing = spinner("yellow", "Writing output files...");
    fs::create_dir_all(&options.output_dir)?;
    fs::write(options.output_dir.join("assignments.tsv"), results.get_assignments_text())?;
    for (c, name) in results.outcome.classification_names.iter().enumerate() {
        let stem = name.to_lowercase();
        if let Some(table) = results.get_count_table(c) {
            fs::write(options.output_dir.join(format!("{}.counts.tsv", stem)), table)?;
        }
        if let Some(report) = results.get_report(c) {
            fs::write(options.output_dir.join(format!("{}.report.txt", stem)), report)?;
        }
    }
    writing.finish_with_message("Output files created.");
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let options = Options::parse();
    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
