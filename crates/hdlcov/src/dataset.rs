//! Dataset records and JSON / JSON-lines I/O.
//!
//! A dataset is either one JSON object per line or a single JSON array of
//! objects. The format is picked from the first non-whitespace character.

use crate::result::{HdlcovError, HdlcovResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Opaque module identifier.
///
/// Datasets use either integers or strings for `index`. The two kinds stay
/// distinct: `7` and `"7"` are different modules, and each is written back
/// in the form it was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleId {
    /// Integer index
    Int(i64),
    /// String index
    Text(String),
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

impl From<i64> for ModuleId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

/// One unit of HDL source in the dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Unique identifier
    pub index: ModuleId,
    /// Complete source text, used verbatim in compilation units
    pub full_code: String,
    /// Referenced child modules (may repeat or dangle)
    #[serde(default)]
    pub children: Vec<ModuleId>,
}

impl ModuleRecord {
    /// Create a record
    #[must_use]
    pub fn new(
        index: impl Into<ModuleId>,
        full_code: impl Into<String>,
        children: impl IntoIterator<Item = impl Into<ModuleId>>,
    ) -> Self {
        Self {
            index: index.into(),
            full_code: full_code.into(),
            children: children.into_iter().map(Into::into).collect(),
        }
    }
}

/// Load module records from a JSON-lines file or a JSON array document
pub fn load_dataset(path: &Path) -> HdlcovResult<Vec<ModuleRecord>> {
    let records = read_json_records(path)?;
    tracing::debug!(path = %path.display(), records = records.len(), "loaded dataset");
    Ok(records)
}

/// Read any deserializable records from a JSON-lines file or JSON array
pub fn read_json_records<T: DeserializeOwned>(path: &Path) -> HdlcovResult<Vec<T>> {
    let text = std::fs::read_to_string(path).map_err(|e| HdlcovError::io(path, e))?;
    parse_json_records(&text, path)
}

/// Parse records from text; `origin` is only used in error messages
pub fn parse_json_records<T: DeserializeOwned>(text: &str, origin: &Path) -> HdlcovResult<Vec<T>> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).map_err(|e| HdlcovError::MalformedDataset {
            path: origin.to_path_buf(),
            line: e.line(),
            message: e.to_string(),
        });
    }

    let mut records = Vec::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|e| HdlcovError::MalformedDataset {
            path: origin.to_path_buf(),
            line: number + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Render a value as JSON indented with four spaces
pub fn to_pretty_json<T: Serialize>(value: &T) -> HdlcovResult<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| HdlcovError::Serialization {
        message: e.to_string(),
    })
}

/// Write a value as an indented JSON document, creating parent directories
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> HdlcovResult<()> {
    let json = to_pretty_json(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HdlcovError::io(parent, e))?;
    }
    std::fs::write(path, json).map_err(|e| HdlcovError::io(path, e))
}
