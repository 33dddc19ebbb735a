// src/config.rs

use std::fmt;
use std::str::FromStr;

use crate::active_matches::MatchFilterParams;
use crate::error::{BinningError, Result};

/// The taxonomy assignment algorithm, chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcaAlgorithm {
    Naive,
    Weighted,
    Coverage,
    LongReads,
}

impl LcaAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            LcaAlgorithm::Naive => "naive",
            LcaAlgorithm::Weighted => "weighted",
            LcaAlgorithm::Coverage => "coverage",
            LcaAlgorithm::LongReads => "longReads",
        }
    }
}

impl FromStr for LcaAlgorithm {
    type Err = BinningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "naive" => Ok(LcaAlgorithm::Naive),
            "weighted" => Ok(LcaAlgorithm::Weighted),
            "coverage" | "interval" => Ok(LcaAlgorithm::Coverage),
            "longreads" | "long_reads" | "long-reads" => Ok(LcaAlgorithm::LongReads),
            _ => Err(BinningError::config("lcaAlgorithm", format!("unknown algorithm {:?}", s))),
        }
    }
}

/// How the coverage LCA splits a read segment between overlapping matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageWeighting {
    /// Every overlapping match gets an equal share of the segment.
    SharedPerMatch,
    /// The segment goes to the best-scoring overlapping match(es).
    BestScorePerSegment,
}

impl CoverageWeighting {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageWeighting::SharedPerMatch => "shared",
            CoverageWeighting::BestScorePerSegment => "bestScore",
        }
    }
}

impl FromStr for CoverageWeighting {
    type Err = BinningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "shared" => Ok(CoverageWeighting::SharedPerMatch),
            "bestscore" | "best_score" => Ok(CoverageWeighting::BestScorePerSegment),
            _ => Err(BinningError::config("coverageWeighting", format!("unknown weighting {:?}", s))),
        }
    }
}

/// All parameters of a binning run.
///
/// The analysis parameters round-trip through a `key=value` parameter string
/// (see the `Display` and `FromStr` impls), which is stored in report
/// headers. `threads` and `queue_capacity` are runtime settings and are not
/// part of that string.
#[derive(Debug, Clone, PartialEq)]
pub struct BinningConfig {
    pub min_score: f32,
    pub top_percent: f32,
    pub max_expected: f64,
    pub min_percent_identity: f32,
    /// Absolute minimum support; used when `min_support_percent` is 0.
    pub min_support: f64,
    pub min_support_percent: f64,
    pub lca_algorithm: LcaAlgorithm,
    pub lca_coverage_percent: f64,
    pub weighted_lca_percent: f64,
    pub allow_weighted_lca_below_species: bool,
    pub coverage_weighting: CoverageWeighting,
    /// Long reads: a match starting more than this many bases past the
    /// current region's end opens a new region.
    pub min_overlap: u32,
    pub use_identity_filter: bool,
    pub use_contaminant_filter: bool,
    pub min_percent_read_to_cover: f64,
    pub min_percent_reference_to_cover: f64,
    pub min_complexity: f32,
    pub use_paired_reads: bool,
    /// Use the naive LCA instead of the best hit for non-taxonomy classifications.
    pub lca_for_functional: bool,
    /// 0 = one worker per available core.
    pub threads: usize,
    pub queue_capacity: usize,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            min_score: 50.0,
            top_percent: 10.0,
            max_expected: 0.01,
            min_percent_identity: 0.0,
            min_support: 0.0,
            min_support_percent: 0.05,
            lca_algorithm: LcaAlgorithm::Naive,
            lca_coverage_percent: 100.0,
            weighted_lca_percent: 80.0,
            allow_weighted_lca_below_species: false,
            coverage_weighting: CoverageWeighting::SharedPerMatch,
            min_overlap: 0,
            use_identity_filter: false,
            use_contaminant_filter: false,
            min_percent_read_to_cover: 0.0,
            min_percent_reference_to_cover: 0.0,
            min_complexity: 0.0,
            use_paired_reads: false,
            lca_for_functional: false,
            threads: 0,
            queue_capacity: 1024,
        }
    }
}

fn check_percent(field: &str, value: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(BinningError::config(field, format!("{} is not in [0, 100]", value)));
    }
    Ok(())
}

impl BinningConfig {
    pub fn validate(&self) -> Result<()> {
        check_percent("topPercent", self.top_percent as f64)?;
        check_percent("minPercentIdentity", self.min_percent_identity as f64)?;
        check_percent("minSupportPercent", self.min_support_percent)?;
        check_percent("lcaCoveragePercent", self.lca_coverage_percent)?;
        check_percent("weightedLCAPercent", self.weighted_lca_percent)?;
        check_percent("minPercentReadToCover", self.min_percent_read_to_cover)?;
        check_percent("minPercentReferenceToCover", self.min_percent_reference_to_cover)?;
        if self.lca_coverage_percent == 0.0 {
            return Err(BinningError::config("lcaCoveragePercent", "must be positive"));
        }
        if self.weighted_lca_percent == 0.0 {
            return Err(BinningError::config("weightedLCAPercent", "must be positive"));
        }
        if self.max_expected < 0.0 {
            return Err(BinningError::config("maxExpected", "must not be negative"));
        }
        if self.min_support < 0.0 {
            return Err(BinningError::config("minSupport", "must not be negative"));
        }
        if self.queue_capacity == 0 {
            return Err(BinningError::config("queueCapacity", "must be at least 1"));
        }
        Ok(())
    }

    pub fn match_filter(&self) -> MatchFilterParams {
        MatchFilterParams {
            min_score: self.min_score,
            top_percent: self.top_percent,
            max_expected: self.max_expected,
            min_percent_identity: self.min_percent_identity,
        }
    }

    /// Effective min-support threshold for a table holding `total_weight`.
    pub fn resolve_min_support(&self, total_weight: f64) -> f64 {
        if self.min_support_percent > 0.0 {
            (self.min_support_percent / 100.0 * total_weight).max(1.0)
        } else {
            self.min_support
        }
    }

    /// Number of worker threads to start.
    pub fn worker_count(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

impl fmt::Display for BinningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "minScore={} topPercent={} maxExpected={} minPercentIdentity={} \
             minSupport={} minSupportPercent={} lcaAlgorithm={} lcaCoveragePercent={} \
             weightedLCAPercent={} allowBelowSpecies={} coverageWeighting={} minOverlap={} \
             identityFilter={} contaminantFilter={} minPercentReadToCover={} \
             minPercentReferenceToCover={} minComplexity={} pairedReads={} lcaForFunctional={}",
            self.min_score,
            self.top_percent,
            self.max_expected,
            self.min_percent_identity,
            self.min_support,
            self.min_support_percent,
            self.lca_algorithm.as_str(),
            self.lca_coverage_percent,
            self.weighted_lca_percent,
            self.allow_weighted_lca_below_species,
            self.coverage_weighting.as_str(),
            self.min_overlap,
            self.use_identity_filter,
            self.use_contaminant_filter,
            self.min_percent_read_to_cover,
            self.min_percent_reference_to_cover,
            self.min_complexity,
            self.use_paired_reads,
            self.lca_for_functional,
        )
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| BinningError::config(key, format!("cannot parse {:?}", value)))
}

impl FromStr for BinningConfig {
    type Err = BinningError;

    /// Parses a parameter string; keys that are absent keep their defaults.
    fn from_str(s: &str) -> Result<Self> {
        let mut config = BinningConfig::default();
        for token in s.split_whitespace() {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| BinningError::config(token, "expected key=value"))?;
            match key {
                "minScore" => config.min_score = parse_value(key, value)?,
                "topPercent" => config.top_percent = parse_value(key, value)?,
                "maxExpected" => config.max_expected = parse_value(key, value)?,
                "minPercentIdentity" => config.min_percent_identity = parse_value(key, value)?,
                "minSupport" => config.min_support = parse_value(key, value)?,
                "minSupportPercent" => config.min_support_percent = parse_value(key, value)?,
                "lcaAlgorithm" => config.lca_algorithm = value.parse()?,
                "lcaCoveragePercent" => config.lca_coverage_percent = parse_value(key, value)?,
                "weightedLCAPercent" => config.weighted_lca_percent = parse_value(key, value)?,
                "allowBelowSpecies" => config.allow_weighted_lca_below_species = parse_value(key, value)?,
                "coverageWeighting" => config.coverage_weighting = value.parse()?,
                "minOverlap" => config.min_overlap = parse_value(key, value)?,
                "identityFilter" => config.use_identity_filter = parse_value(key, value)?,
                "contaminantFilter" => config.use_contaminant_filter = parse_value(key, value)?,
                "minPercentReadToCover" => config.min_percent_read_to_cover = parse_value(key, value)?,
                "minPercentReferenceToCover" => {
                    config.min_percent_reference_to_cover = parse_value(key, value)?
                }
                "minComplexity" => config.min_complexity = parse_value(key, value)?,
                "pairedReads" => config.use_paired_reads = parse_value(key, value)?,
                "lcaForFunctional" => config.lca_for_functional = parse_value(key, value)?,
                _ => log::warn!("ignoring unknown parameter {:?}", key),
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_string_round_trip() {
        let mut config = BinningConfig::default();
        config.min_score = 35.5;
        config.lca_algorithm = LcaAlgorithm::Weighted;
        config.coverage_weighting = CoverageWeighting::BestScorePerSegment;
        config.use_paired_reads = true;
        let parsed: BinningConfig = config.to_string().parse().unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_parameter_string() {
        let config: BinningConfig = "topPercent=5 lcaAlgorithm=longReads".parse().unwrap();
        assert_eq!(config.top_percent, 5.0);
        assert_eq!(config.lca_algorithm, LcaAlgorithm::LongReads);
        assert_eq!(config.min_score, BinningConfig::default().min_score);
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!("topPercent=abc".parse::<BinningConfig>().is_err());
        assert!("lcaAlgorithm=magic".parse::<BinningConfig>().is_err());
        assert!("topPercent".parse::<BinningConfig>().is_err());

        let mut config = BinningConfig::default();
        config.top_percent = 120.0;
        assert!(matches!(config.validate(), Err(BinningError::Config { .. })));
    }

    #[test]
    fn test_min_support_resolution() {
        let mut config = BinningConfig::default();
        config.min_support_percent = 1.0;
        assert_eq!(config.resolve_min_support(1000.0), 10.0);
        assert_eq!(config.resolve_min_support(10.0), 1.0);
        config.min_support_percent = 0.0;
        config.min_support = 5.0;
        assert_eq!(config.resolve_min_support(1000.0), 5.0);
    }
}
