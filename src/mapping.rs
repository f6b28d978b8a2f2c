// Column mapping: best-guess proposal, human confirmation, application.
//
// The proposal is a pure function of the headers and the schema. Whatever
// collects the human's choices (stdin prompts, a preset file) only feeds
// overrides into `MappingProposal` before `confirm`.
use crate::error::{MappingError, PresetError};
use crate::schema::{DatasetKind, FieldSpec};
use crate::types::{CanonicalTable, Cell, MappingRow, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChoice {
    pub field: &'static FieldSpec,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingProposal {
    pub kind: DatasetKind,
    pub headers: Vec<String>,
    pub choices: Vec<FieldChoice>,
}

/// Confirmed renaming from source headers to canonical field names, in
/// schema order. Ignored fields are simply absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub kind: DatasetKind,
    pairs: Vec<(&'static str, String)>,
}

/// Pre-select each field's best guess when it exists verbatim among the
/// (already normalized) headers.
pub fn propose_mapping(headers: &[String], kind: DatasetKind) -> MappingProposal {
    let choices = kind
        .fields()
        .iter()
        .map(|field| FieldChoice {
            field,
            source: headers.iter().find(|h| h.as_str() == field.guess).cloned(),
        })
        .collect();
    MappingProposal { kind, headers: headers.to_vec(), choices }
}

impl MappingProposal {
    /// Override one field. `None` means "ignore".
    pub fn set(&mut self, canonical: &str, source: Option<String>) -> Result<(), MappingError> {
        if let Some(src) = &source {
            if !self.headers.iter().any(|h| h == src) {
                return Err(MappingError::UnknownSource {
                    kind: self.kind,
                    source_column: src.clone(),
                });
            }
        }
        let choice = self
            .choices
            .iter_mut()
            .find(|c| c.field.name == canonical)
            .ok_or_else(|| MappingError::UnknownField {
                kind: self.kind,
                field: canonical.to_string(),
            })?;
        choice.source = source;
        Ok(())
    }

    /// Apply every entry of a preset. Entries are validated one by one; the
    /// first invalid one aborts.
    pub fn apply_preset(&mut self, preset: &BTreeMap<String, Option<String>>) -> Result<(), MappingError> {
        for (canonical, source) in preset {
            let source = source.as_ref().map(|s| s.trim().to_lowercase());
            self.set(canonical, source)?;
        }
        Ok(())
    }

    pub fn confirm(self) -> ColumnMapping {
        let pairs = self
            .choices
            .into_iter()
            .filter_map(|c| c.source.map(|s| (c.field.name, s)))
            .collect();
        ColumnMapping { kind: self.kind, pairs }
    }

    pub fn rows(&self) -> Vec<MappingRow> {
        self.choices
            .iter()
            .map(|c| MappingRow {
                field: c.field.name.to_string(),
                label: c.field.label.to_string(),
                source: c.source.clone().unwrap_or_else(|| "<ignore>".to_string()),
            })
            .collect()
    }
}

impl ColumnMapping {
    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.pairs
    }

    pub fn source_for(&self, canonical: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(c, _)| *c == canonical)
            .map(|(_, s)| s.as_str())
    }

    /// Preset form: every schema field, `None` for ignored ones.
    pub fn to_preset(&self) -> BTreeMap<String, Option<String>> {
        self.kind
            .fields()
            .iter()
            .map(|f| (f.name.to_string(), self.source_for(f.name).map(str::to_string)))
            .collect()
    }
}

/// Rename the confirmed source columns to canonical names. Every other
/// column is left out of the canonical table; `table` itself is untouched.
/// Blank cells become `Cell::Missing`.
pub fn apply_mapping(table: &Table, mapping: &ColumnMapping) -> CanonicalTable {
    let mut columns = Vec::new();
    let mut indices = Vec::new();
    for (canonical, source) in &mapping.pairs {
        match table.column_index(source) {
            Some(idx) => {
                columns.push(*canonical);
                indices.push(idx);
            }
            None => debug!(field = *canonical, source = %source, "mapped column not in file"),
        }
    }

    let rows = table
        .rows
        .iter()
        .map(|row| {
            indices
                .iter()
                .map(|&i| match row.get(i) {
                    Some(v) if !v.trim().is_empty() => Cell::Text(v.clone()),
                    _ => Cell::Missing,
                })
                .collect()
        })
        .collect();

    info!(
        kind = %mapping.kind,
        mapped = columns.len(),
        dropped = table.headers.len().saturating_sub(indices.len()),
        "mapping applied"
    );
    CanonicalTable { kind: mapping.kind, columns, rows }
}

/// JSON preset: confirmed mappings per kind plus optional thresholds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub mappings: BTreeMap<DatasetKind, BTreeMap<String, Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<crate::config::Thresholds>,
}

impl Preset {
    pub fn mapping_for(&self, kind: DatasetKind) -> Option<&BTreeMap<String, Option<String>>> {
        self.mappings.get(&kind)
    }

    pub fn store(&mut self, mapping: &ColumnMapping) {
        self.mappings.insert(mapping.kind, mapping.to_preset());
    }

    /// Read and validate a preset file. Embedded thresholds must be in range.
    pub fn load(path: &Path) -> Result<Self, PresetError> {
        let text = std::fs::read_to_string(path).map_err(|source| PresetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let preset: Preset = serde_json::from_str(&text).map_err(|source| PresetError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(t) = &preset.thresholds {
            t.validate()?;
        }
        debug!(path = %path.display(), kinds = preset.mappings.len(), "preset loaded");
        Ok(preset)
    }

    /// Load `path` if it exists, else start empty. Used when saving into a
    /// preset that may hold other kinds already.
    pub fn load_or_default(path: &Path) -> Result<Self, PresetError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
