// src/hits.rs

use ahash::AHashMap;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::types::{ClassId, Match, Read};

/// Opens a text file, transparently decompressing `.gz`.
pub fn open_text<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let f = File::open(path)?;

    let is_gz = path.extension().map(|ext| ext == "gz").unwrap_or(false);

    let reader: Box<dyn BufRead + Send> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(reader)
}

/// Maps reference names to class ids, one table per classification.
/// Index 0 is the taxonomy.
#[derive(Debug, Clone, Default)]
pub struct ReferenceMapping {
    names: Vec<String>,
    tables: Vec<AHashMap<String, ClassId>>,
}

impl ReferenceMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_classification(&mut self, name: &str, table: AHashMap<String, ClassId>) {
        self.names.push(name.to_string());
        self.tables.push(table);
    }

    /// Adds a classification from a `reference\tclassId` file.
    pub fn add_file<P: AsRef<Path>>(&mut self, name: &str, path: P) -> Result<()> {
        let table = load_reference_table(path)?;
        self.add_classification(name, table);
        Ok(())
    }

    pub fn classification_names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Class id per classification for a reference; unknown references get 0.
    pub fn class_ids(&self, reference: &str) -> Vec<ClassId> {
        self.tables
            .iter()
            .map(|table| table.get(reference).copied().unwrap_or(0))
            .collect()
    }
}

/// Loads `reference\tclassId` lines. Malformed lines are logged and skipped.
pub fn load_reference_table<P: AsRef<Path>>(path: P) -> Result<AHashMap<String, ClassId>> {
    let path = path.as_ref();
    let reader = open_text(path)?;
    let mut table = AHashMap::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.trim_end().split('\t');
        match (parts.next(), parts.next().map(|id| id.trim().parse::<ClassId>())) {
            (Some(reference), Some(Ok(id))) if !reference.is_empty() => {
                table.insert(reference.to_string(), id);
            }
            _ => log::warn!("{}:{}: malformed mapping line, skipping", path.display(), line_no + 1),
        }
    }
    log::info!("Loaded {} reference mappings from {}", table.len(), path.display());
    Ok(table)
}

/// The other mate's name for reads named `xxx/1` or `xxx/2`.
pub fn mate_name(read_name: &str) -> Option<String> {
    if let Some(base) = read_name.strip_suffix("/1") {
        Some(format!("{}/2", base))
    } else {
        read_name.strip_suffix("/2").map(|base| format!("{}/1", base))
    }
}

struct HitLine {
    query: String,
    hit: Match,
}

/// Reads BLAST tabular output (`-outfmt 6`, optionally with `slen` as a 13th
/// column) and yields one [`Read`] per run of consecutive lines with the same
/// query name.
pub struct HitReader {
    reader: Box<dyn BufRead + Send>,
    path: PathBuf,
    mapping: Arc<ReferenceMapping>,
    references: AHashMap<String, Arc<str>>,
    line: String,
    line_no: usize,
    pending: Option<HitLine>,
    skipped: usize,
    done: bool,
}

impl HitReader {
    pub fn open<P: AsRef<Path>>(path: P, mapping: Arc<ReferenceMapping>) -> Result<Self> {
        let path = path.as_ref();
        Ok(Self::from_reader(open_text(path)?, path, mapping))
    }

    pub fn from_reader(reader: Box<dyn BufRead + Send>, path: &Path, mapping: Arc<ReferenceMapping>) -> Self {
        Self {
            reader,
            path: path.to_path_buf(),
            mapping,
            references: AHashMap::new(),
            line: String::new(),
            line_no: 0,
            pending: None,
            skipped: 0,
            done: false,
        }
    }

    /// Number of malformed lines skipped so far.
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    fn parse_line(&mut self) -> Option<HitLine> {
        let fields: Vec<&str> = self.line.trim_end().split('\t').collect();
        if fields.len() < 12 {
            return None;
        }
        let query = fields[0].trim();
        let subject = fields[1].trim();
        if query.is_empty() || subject.is_empty() {
            return None;
        }
        let percent_identity: f32 = fields[2].trim().parse().ok()?;
        let query_start: u32 = fields[6].trim().parse().ok()?;
        let query_end: u32 = fields[7].trim().parse().ok()?;
        let ref_start: u32 = fields[8].trim().parse().ok()?;
        let ref_end: u32 = fields[9].trim().parse().ok()?;
        let expected: f64 = fields[10].trim().parse().ok()?;
        let bit_score: f32 = fields[11].trim().parse().ok()?;
        let ref_length = match fields.get(12) {
            Some(s) => Some(s.trim().parse::<u32>().ok()?),
            None => None,
        };

        let reference = match self.references.get(subject) {
            Some(r) => Arc::clone(r),
            None => {
                let r: Arc<str> = Arc::from(subject);
                self.references.insert(subject.to_string(), Arc::clone(&r));
                r
            }
        };
        let mut hit = Match::new(bit_score, query_start, query_end, "")
            .with_expected(expected)
            .with_percent_identity(percent_identity)
            .with_reference_span(ref_start, ref_end, ref_length)
            .with_class_ids(self.mapping.class_ids(subject));
        hit.reference = reference;
        Some(HitLine {
            query: query.to_string(),
            hit,
        })
    }

    /// Next well-formed line, `None` at end of input.
    fn next_hit(&mut self) -> Result<Option<HitLine>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if self.line.trim().is_empty() || self.line.starts_with('#') {
                continue;
            }
            match self.parse_line() {
                Some(hit) => return Ok(Some(hit)),
                None => {
                    self.skipped += 1;
                    log::warn!("{}:{}: malformed hit line, skipping", self.path.display(), self.line_no);
                }
            }
        }
    }

    fn finish_read(name: String, matches: Vec<Match>) -> Read {
        let length = matches.iter().map(|m| m.query_span().1).max().unwrap_or(0);
        let mate = mate_name(&name);
        let mut read = Read::new(&name, length, matches);
        read.mate = mate;
        read
    }
}

impl Iterator for HitReader {
    type Item = Result<Read>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let first = match self.pending.take() {
            Some(hit) => hit,
            None => match self.next_hit() {
                Ok(Some(hit)) => hit,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            },
        };

        let name = first.query;
        let mut matches = vec![first.hit];
        loop {
            match self.next_hit() {
                Ok(Some(hit)) if hit.query == name => matches.push(hit.hit),
                Ok(Some(hit)) => {
                    self.pending = Some(hit);
                    break;
                }
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        Some(Ok(Self::finish_read(name, matches)))
    }
}

/// A list of hit files that can be streamed any number of times, once per
/// pass over the dataset.
#[derive(Clone)]
pub struct HitSource {
    paths: Vec<PathBuf>,
    mapping: Arc<ReferenceMapping>,
}

impl HitSource {
    pub fn new(paths: Vec<PathBuf>, mapping: Arc<ReferenceMapping>) -> Self {
        Self { paths, mapping }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Fresh stream over the reads of all files, in order. Files are opened
    /// as the stream reaches them.
    pub fn stream(&self) -> HitStream {
        HitStream {
            paths: self.paths.clone().into_iter(),
            mapping: Arc::clone(&self.mapping),
            current: None,
            reads: 0,
        }
    }
}

/// Reads of several hit files, one file after the other. Stops after the
/// first error.
pub struct HitStream {
    paths: std::vec::IntoIter<PathBuf>,
    mapping: Arc<ReferenceMapping>,
    current: Option<HitReader>,
    reads: usize,
}

impl Iterator for HitStream {
    type Item = Result<Read>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = &mut self.current {
                match reader.next() {
                    Some(Ok(read)) => {
                        self.reads += 1;
                        return Some(Ok(read));
                    }
                    Some(Err(e)) => {
                        self.current = None;
                        self.paths = Vec::new().into_iter();
                        return Some(Err(e));
                    }
                    None => {
                        log::debug!(
                            "Read {} reads from {} ({} malformed lines skipped)",
                            self.reads,
                            reader.path.display(),
                            reader.skipped_lines()
                        );
                        self.current = None;
                    }
                }
            }
            let path = self.paths.next()?;
            match HitReader::open(&path, Arc::clone(&self.mapping)) {
                Ok(reader) => {
                    self.current = Some(reader);
                    self.reads = 0;
                }
                Err(e) => {
                    self.paths = Vec::new().into_iter();
                    return Some(Err(e));
                }
            }
        }
    }
}
