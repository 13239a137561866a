// 🏗️ Parser Framework - format detection + streaming extraction
// One extractor per SourceKind, selected once per file by detect_source().

use crate::error::ImportError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::{debug, warn};

// ============================================================================
// CORE TYPES
// ============================================================================

/// SourceKind - which family of file a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Delimited text with a header row (.csv)
    Tabular,
    /// Line-delimited or whole-document JSON (.json)
    Structured,
    /// XML document (.xml)
    Markup,
}

impl SourceKind {
    /// Short code stored with audit entries
    pub fn code(&self) -> &'static str {
        match self {
            SourceKind::Tabular => "csv",
            SourceKind::Structured => "json",
            SourceKind::Markup => "xml",
        }
    }

    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Tabular => "CSV",
            SourceKind::Structured => "JSON",
            SourceKind::Markup => "XML",
        }
    }

    pub fn from_code(code: &str) -> Option<SourceKind> {
        match code {
            "csv" => Some(SourceKind::Tabular),
            "json" => Some(SourceKind::Structured),
            "xml" => Some(SourceKind::Markup),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// RawRow - untyped field name → raw value mapping, consumed once by normalize()
pub type RawRow = Map<String, Value>;

/// Lazy, single-pass sequence of row groups. Each group holds at most
/// `group_size` rows; an empty file yields no groups at all.
pub type RowGroups = Box<dyn Iterator<Item = Result<Vec<RawRow>, ImportError>>>;

// ============================================================================
// EXTRACTOR TRAIT
// ============================================================================

/// RecordExtractor - one implementation per SourceKind
pub trait RecordExtractor {
    /// Open `path` and return its rows in groups of at most `group_size`.
    ///
    /// The returned iterator owns the file handle; dropping it releases the
    /// file, whether or not it was exhausted.
    fn extract(&self, path: &Path, group_size: usize) -> Result<RowGroups, ImportError>;

    /// Source kind this extractor handles
    fn source_kind(&self) -> SourceKind;
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect source kind from the file extension (case-insensitive).
///
/// # Examples:
/// ```
/// use poi_import::{detect_source, SourceKind};
/// use std::path::Path;
///
/// assert_eq!(detect_source(Path::new("pois.CSV")).unwrap(), SourceKind::Tabular);
/// assert!(detect_source(Path::new("pois.txt")).is_err());
/// ```
pub fn detect_source(path: &Path) -> Result<SourceKind, ImportError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("csv") => Ok(SourceKind::Tabular),
        Some("json") => Ok(SourceKind::Structured),
        Some("xml") => Ok(SourceKind::Markup),
        Some(other) => Err(ImportError::UnsupportedFormat {
            extension: format!(".{}", other),
        }),
        None => Err(ImportError::UnsupportedFormat {
            extension: "(none)".to_string(),
        }),
    }
}

/// Get the extractor for a source kind
pub fn get_extractor(source: SourceKind) -> Box<dyn RecordExtractor> {
    match source {
        SourceKind::Tabular => Box::new(CsvExtractor),
        SourceKind::Structured => Box::new(JsonExtractor),
        SourceKind::Markup => Box::new(XmlExtractor::new()),
    }
}

// ============================================================================
// TABULAR (.csv)
// ============================================================================

/// Streams a delimited file with a header row.
pub struct CsvExtractor;

impl RecordExtractor for CsvExtractor {
    fn extract(&self, path: &Path, group_size: usize) -> Result<RowGroups, ImportError> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        Ok(Box::new(CsvGroups {
            reader,
            headers,
            group_size,
            record: csv::StringRecord::new(),
            done: false,
        }))
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Tabular
    }
}

struct CsvGroups {
    reader: csv::Reader<File>,
    headers: Vec<String>,
    group_size: usize,
    record: csv::StringRecord,
    done: bool,
}

impl Iterator for CsvGroups {
    type Item = Result<Vec<RawRow>, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut rows = Vec::with_capacity(self.group_size.min(1024));
        while rows.len() < self.group_size {
            match self.reader.read_record(&mut self.record) {
                Ok(true) => {
                    let row: RawRow = self
                        .headers
                        .iter()
                        .zip(self.record.iter())
                        .map(|(h, v)| (h.clone(), Value::String(v.to_string())))
                        .collect();
                    rows.push(row);
                }
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }

        if rows.is_empty() {
            None
        } else {
            debug!(rows = rows.len(), "csv group");
            Some(Ok(rows))
        }
    }
}

// ============================================================================
// STRUCTURED (.json)
// ============================================================================

/// Line-delimited JSON first; whole-document JSON when the file is not a
/// line-delimited stream.
pub struct JsonExtractor;

/// Outcome of probing a file for line-delimited records
pub enum LineProbe {
    /// First record line parsed as an object; streaming continues from there
    LineDelimited(JsonLineGroups),
    /// First non-blank line is not a standalone JSON object
    NotLineDelimited,
}

impl JsonExtractor {
    /// Look at the first non-blank line. Nothing is emitted before the decision,
    /// so falling back never reprocesses rows.
    pub fn probe(path: &Path, group_size: usize) -> Result<LineProbe, ImportError> {
        let mut lines = BufReader::new(File::open(path)?).lines();
        let mut line_no = 0;

        while let Some(line) = lines.next() {
            let line = line?;
            line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return Ok(match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(first)) => LineProbe::LineDelimited(JsonLineGroups {
                    lines,
                    line_no,
                    pending: Some(first),
                    group_size,
                    done: false,
                }),
                _ => LineProbe::NotLineDelimited,
            });
        }

        // Empty or blank-only file: a valid stream with no records
        Ok(LineProbe::LineDelimited(JsonLineGroups {
            lines,
            line_no,
            pending: None,
            group_size,
            done: true,
        }))
    }

    /// Whole file as one document: an object becomes a one-element collection,
    /// an array must hold objects.
    pub fn read_document(path: &Path) -> Result<Vec<RawRow>, ImportError> {
        let text = fs::read_to_string(path)?;
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(row) => Ok(vec![row]),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| match item {
                    Value::Object(row) => Ok(row),
                    _ => Err(ImportError::UnexpectedStructure(format!(
                        "array element {} is not an object",
                        idx + 1
                    ))),
                })
                .collect(),
            _ => Err(ImportError::UnexpectedStructure(
                "document is neither an object nor an array".to_string(),
            )),
        }
    }
}

impl RecordExtractor for JsonExtractor {
    fn extract(&self, path: &Path, group_size: usize) -> Result<RowGroups, ImportError> {
        match JsonExtractor::probe(path, group_size)? {
            LineProbe::LineDelimited(groups) => Ok(Box::new(groups)),
            LineProbe::NotLineDelimited => {
                warn!(path = %path.display(), "not line-delimited JSON, reading whole document");
                let rows = JsonExtractor::read_document(path)?;
                Ok(Box::new(BufferedGroups::new(rows, group_size)))
            }
        }
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Structured
    }
}

/// Streaming groups over a line-delimited JSON file
pub struct JsonLineGroups {
    lines: Lines<BufReader<File>>,
    line_no: usize,
    pending: Option<RawRow>,
    group_size: usize,
    done: bool,
}

impl Iterator for JsonLineGroups {
    type Item = Result<Vec<RawRow>, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut rows = Vec::with_capacity(self.group_size.min(1024));
        if let Some(first) = self.pending.take() {
            rows.push(first);
        }

        while !self.done && rows.len() < self.group_size {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.done = true;
                    break;
                }
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(row)) => rows.push(row),
                Ok(_) => {
                    self.done = true;
                    return Some(Err(ImportError::UnexpectedStructure(format!(
                        "line {} is not a JSON object",
                        self.line_no
                    ))));
                }
                Err(source) => {
                    self.done = true;
                    return Some(Err(ImportError::JsonLine {
                        line: self.line_no,
                        source,
                    }));
                }
            }
        }

        if rows.is_empty() {
            None
        } else {
            debug!(rows = rows.len(), "json lines group");
            Some(Ok(rows))
        }
    }
}

// ============================================================================
// MARKUP (.xml)
// ============================================================================

/// Tags a node's direct children must include for it to count as a record
pub const MARKUP_REQUIRED_TAGS: [&str; 6] = [
    "pid",
    "pname",
    "platitude",
    "plongitude",
    "pcategory",
    "pratings",
];

/// Parses the whole tree, then picks every element whose direct children
/// cover MARKUP_REQUIRED_TAGS. Extra children are kept, never disqualifying.
pub struct XmlExtractor {
    required: HashSet<&'static str>,
}

impl XmlExtractor {
    pub fn new() -> Self {
        XmlExtractor {
            required: MARKUP_REQUIRED_TAGS.iter().copied().collect(),
        }
    }

    /// All qualifying rows of a document, in document order
    pub fn rows_from_str(&self, text: &str) -> Result<Vec<RawRow>, ImportError> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let doc = roxmltree::Document::parse_with_options(text, options)?;
        let mut rows = Vec::new();

        for node in doc.descendants().filter(|n| n.is_element()) {
            let children: Vec<roxmltree::Node> =
                node.children().filter(|c| c.is_element()).collect();

            let tags: HashSet<&str> = children.iter().map(|c| c.tag_name().name()).collect();
            if !self.required.iter().all(|t| tags.contains(t)) {
                continue;
            }

            let row: RawRow = children
                .iter()
                .map(|child| {
                    let text: String = child
                        .descendants()
                        .filter(|d| d.is_text())
                        .filter_map(|d| d.text())
                        .collect();
                    (
                        child.tag_name().name().to_string(),
                        Value::String(text.trim().to_string()),
                    )
                })
                .collect();
            rows.push(row);
        }

        Ok(rows)
    }
}

impl Default for XmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordExtractor for XmlExtractor {
    fn extract(&self, path: &Path, group_size: usize) -> Result<RowGroups, ImportError> {
        let text = fs::read_to_string(path)?;
        let rows = self.rows_from_str(&text)?;
        debug!(rows = rows.len(), "xml document parsed");
        Ok(Box::new(BufferedGroups::new(rows, group_size)))
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Markup
    }
}

// ============================================================================
// IN-MEMORY REGROUPING
// ============================================================================

/// Re-groups an in-memory collection into chunks of `group_size`
pub struct BufferedGroups {
    rows: std::vec::IntoIter<RawRow>,
    group_size: usize,
}

impl BufferedGroups {
    pub fn new(rows: Vec<RawRow>, group_size: usize) -> Self {
        BufferedGroups {
            rows: rows.into_iter(),
            group_size: group_size.max(1),
        }
    }
}

impl Iterator for BufferedGroups {
    type Item = Result<Vec<RawRow>, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        let group: Vec<RawRow> = self.rows.by_ref().take(self.group_size).collect();
        if group.is_empty() {
            None
        } else {
            Some(Ok(group))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
