//! Source Map v3 model and chain collapsing.
//!
//! Every pipeline stage emits a map pointing at the previous stage's output.
//! [`collapse`] walks that chain back to the original sources so each bundle's
//! map references the pre-pipeline files directly.
//!
//! - [`vlq`] - Base64-VLQ codec for the `mappings` field
//! - [`chain`] - map discovery, chain tracing and rewriting

pub mod chain;
pub mod vlq;

use serde::{Deserialize, Serialize};

pub use chain::{collapse, locate_map, shift_map_columns};

/// A Source Map v3 document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    /// Always 3.
    pub version: u32,

    /// Generated file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Prefix applied to every entry of `sources`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,

    /// Original sources, relative to the map (after `source_root`).
    #[serde(default)]
    pub sources: Vec<String>,

    /// Inline contents of `sources`, index-aligned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,

    /// Symbol names referenced by mappings.
    #[serde(default)]
    pub names: Vec<String>,

    /// VLQ-encoded mappings.
    #[serde(default)]
    pub mappings: String,
}

/// Position in an original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalPosition {
    /// Index into `sources`.
    pub source: u32,
    /// Zero-based line.
    pub line: u32,
    /// Zero-based column.
    pub column: u32,
    /// Index into `names`.
    pub name: Option<u32>,
}

/// One decoded mapping segment of a generated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Zero-based generated column.
    pub generated_column: u32,
    /// Original position, absent for generated-only segments.
    pub original: Option<OriginalPosition>,
}

/// Decoded mappings, one entry per generated line.
pub type Mappings = Vec<Vec<Segment>>;

impl SourceMap {
    /// Creates an empty map for `file`.
    pub fn new(file: Option<String>) -> Self {
        Self {
            version: 3,
            file,
            source_root: None,
            sources: Vec::new(),
            sources_content: None,
            names: Vec::new(),
            mappings: String::new(),
        }
    }

    /// Parses a map from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serializes the map to compact JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decodes `mappings`.
    pub fn decode(&self) -> Result<Mappings, String> {
        decode_mappings(&self.mappings)
    }

    /// Replaces `mappings` with the encoding of `lines`.
    pub fn set_mappings(&mut self, lines: &[Vec<Segment>]) {
        self.mappings = encode_mappings(lines);
    }

    /// Content of source `index` when inlined.
    pub fn source_content(&self, index: usize) -> Option<&str> {
        self.sources_content
            .as_ref()
            .and_then(|contents| contents.get(index))
            .and_then(|content| content.as_deref())
    }
}

/// Decodes a `mappings` string into per-line segments.
pub fn decode_mappings(mappings: &str) -> Result<Mappings, String> {
    let mut lines = Vec::new();
    let (mut source, mut line, mut column, mut name) = (0i64, 0i64, 0i64, 0i64);

    for encoded_line in mappings.split(';') {
        let mut segments = Vec::new();
        let mut generated_column = 0i64;

        for encoded in encoded_line.split(',').filter(|s| !s.is_empty()) {
            let values = vlq::decode_segment(encoded)?;
            generated_column += values[0];
            if generated_column < 0 {
                return Err(format!("negative generated column in `{encoded}`"));
            }

            let original = match values.len() {
                1 => None,
                4 | 5 => {
                    source += values[1];
                    line += values[2];
                    column += values[3];
                    let name_index = if values.len() == 5 {
                        name += values[4];
                        Some(name)
                    } else {
                        None
                    };
                    if source < 0 || line < 0 || column < 0 || name_index.is_some_and(|n| n < 0) {
                        return Err(format!("negative original position in `{encoded}`"));
                    }
                    Some(OriginalPosition {
                        source: field(source, encoded)?,
                        line: field(line, encoded)?,
                        column: field(column, encoded)?,
                        name: name_index.map(|n| field(n, encoded)).transpose()?,
                    })
                }
                n => return Err(format!("segment `{encoded}` has {n} fields")),
            };

            segments.push(Segment {
                generated_column: field(generated_column, encoded)?,
                original,
            });
        }
        lines.push(segments);
    }

    Ok(lines)
}

fn field(value: i64, encoded: &str) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("value {value} out of range in `{encoded}`"))
}

/// Encodes per-line segments into a `mappings` string.
pub fn encode_mappings(lines: &[Vec<Segment>]) -> String {
    let mut out = String::new();
    let (mut source, mut line, mut column, mut name) = (0i64, 0i64, 0i64, 0i64);

    for (index, segments) in lines.iter().enumerate() {
        if index > 0 {
            out.push(';');
        }
        let mut generated_column = 0i64;
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            vlq::encode(segment.generated_column as i64 - generated_column, &mut out);
            generated_column = segment.generated_column as i64;

            if let Some(original) = segment.original {
                vlq::encode(original.source as i64 - source, &mut out);
                vlq::encode(original.line as i64 - line, &mut out);
                vlq::encode(original.column as i64 - column, &mut out);
                source = original.source as i64;
                line = original.line as i64;
                column = original.column as i64;
                if let Some(n) = original.name {
                    vlq::encode(n as i64 - name, &mut out);
                    name = n as i64;
                }
            }
        }
    }

    out
}

/// Finds the segment covering `column` on generated `line`.
pub fn lookup(lines: &Mappings, line: u32, column: u32) -> Option<&Segment> {
    let segments = lines.get(line as usize)?;
    let idx = segments.partition_point(|s| s.generated_column <= column);
    idx.checked_sub(1).map(|i| &segments[i])
}
