//src/types.rs

use std::sync::Arc;

/// A node id in a classification tree. Positive values are real nodes,
/// zero means "no id" on a match and negative values are reserved sinks.
pub type ClassId = i32;

/// Read has no matches at all.
pub const NOHITS_ID: ClassId = -1;
/// Read has matches but none could be used for an assignment.
pub const UNASSIGNED_ID: ClassId = -2;
/// Read sequence was below the complexity threshold.
pub const LOW_COMPLEXITY_ID: ClassId = -3;
/// Read was explained by contaminant taxa.
pub const CONTAMINANTS_ID: ClassId = -6;

/// Index of the taxonomy among the loaded classifications. The taxonomy id
/// of a match is its "primary taxon".
pub const TAXONOMY_INDEX: usize = 0;
pub const TAXONOMY_NAME: &str = "Taxonomy";

/// Class id -> summed read weight for one classification.
pub type CountTable = ahash::AHashMap<ClassId, f64>;

/// Display label for a reserved id, `None` for ordinary node ids.
pub fn sentinel_label(id: ClassId) -> Option<&'static str> {
    match id {
        NOHITS_ID => Some("No hits"),
        UNASSIGNED_ID => Some("Not assigned"),
        LOW_COMPLEXITY_ID => Some("Low complexity"),
        CONTAMINANTS_ID => Some("Contaminants"),
        _ => None,
    }
}

/// One database hit of a read.
#[derive(Debug, Clone)]
pub struct Match {
    /// Class id per classification, indexed like `Classifications::names`.
    pub class_ids: Vec<ClassId>,
    pub bit_score: f32,
    pub expected: f64,
    /// Zero when unknown.
    pub percent_identity: f32,
    /// Aligned query span, 1-based; `query_start > query_end` on the reverse strand.
    pub query_start: u32,
    pub query_end: u32,
    pub reference: Arc<str>,
    pub ref_start: u32,
    pub ref_end: u32,
    pub ref_length: Option<u32>,
    pub ignored: bool,
}

impl Match {
    pub fn new(bit_score: f32, query_start: u32, query_end: u32, reference: &str) -> Self {
        Self {
            class_ids: Vec::new(),
            bit_score,
            expected: 0.0,
            percent_identity: 0.0,
            query_start,
            query_end,
            reference: Arc::from(reference),
            ref_start: 0,
            ref_end: 0,
            ref_length: None,
            ignored: false,
        }
    }

    pub fn with_class_ids(mut self, class_ids: Vec<ClassId>) -> Self {
        self.class_ids = class_ids;
        self
    }

    pub fn with_taxon(self, taxon: ClassId) -> Self {
        self.with_class_ids(vec![taxon])
    }

    pub fn with_expected(mut self, expected: f64) -> Self {
        self.expected = expected;
        self
    }

    pub fn with_percent_identity(mut self, percent_identity: f32) -> Self {
        self.percent_identity = percent_identity;
        self
    }

    pub fn with_reference_span(mut self, start: u32, end: u32, length: Option<u32>) -> Self {
        self.ref_start = start;
        self.ref_end = end;
        self.ref_length = length;
        self
    }

    /// Id in the given classification, 0 if the match has none.
    #[inline]
    pub fn class_id(&self, classification: usize) -> ClassId {
        self.class_ids.get(classification).copied().unwrap_or(0)
    }

    /// The taxonomy id of this match.
    #[inline]
    pub fn taxon_id(&self) -> ClassId {
        self.class_id(TAXONOMY_INDEX)
    }

    /// Query span as `(low, high)`.
    #[inline]
    pub fn query_span(&self) -> (u32, u32) {
        if self.query_start <= self.query_end {
            (self.query_start, self.query_end)
        } else {
            (self.query_end, self.query_start)
        }
    }

    pub fn is_reverse_strand(&self) -> bool {
        self.query_start > self.query_end
    }
}

/// A query sequence together with all of its matches.
#[derive(Debug, Clone)]
pub struct Read {
    pub name: String,
    pub length: u32,
    /// Number of reads this record stands for.
    pub weight: f64,
    /// Zero when unknown.
    pub complexity: f32,
    pub matches: Vec<Match>,
    pub mate: Option<String>,
}

impl Read {
    pub fn new(name: &str, length: u32, matches: Vec<Match>) -> Self {
        Self {
            name: name.to_string(),
            length,
            weight: 1.0,
            complexity: 0.0,
            matches,
            mate: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_mate(mut self, mate: &str) -> Self {
        self.mate = Some(mate.to_string());
        self
    }
}

/// Final per-read result of a binning run, one slot per classification.
#[derive(Debug, Clone)]
pub struct ReadAssignment {
    pub read_name: String,
    pub mate: Option<String>,
    pub weight: f64,
    pub class_ids: Vec<ClassId>,
    /// Extra `(id, weight)` pairs for reads that span several genes.
    pub additional: Vec<Vec<(ClassId, f64)>>,
}

/// A structured representation of one row in a clade report.
#[derive(Debug, Clone)]
pub struct ClassificationReportRow {
    pub pct: f64,
    /// Weight of the node and all its descendants.
    pub clade_weight: f64,
    /// Weight assigned to the node itself.
    pub own_weight: f64,
    pub class_id: ClassId,
    pub rank: String,
    pub name: String,
    /// Indentation level in the text report.
    pub depth: usize,
    pub parent_id: Option<ClassId>,
}
