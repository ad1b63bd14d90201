//! Lint engine integration
//!
//! - `engine`: the external checker seam and its Vale implementation
//! - `runner`: batched parallel execution over the corpus
//! - `dedup`: collapsing raw diagnostics into canonical findings per rule

pub mod dedup;
pub mod engine;
pub mod runner;

use crate::error::{Error, Result};
use crate::util::truncate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One raw finding as emitted by the lint engine.
///
/// The file it belongs to is the key of the surrounding [`DiagnosticMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Diagnostic {
    /// Rule id, e.g. `RedHat.TermsErrors`
    pub check: String,
    pub message: String,
    #[serde(rename = "Match")]
    pub matched_text: String,
    pub severity: String,
    pub link: String,
    pub line: u32,
    /// `[start_col, end_col]`
    pub span: Vec<u32>,
}

/// File path → diagnostics for that file. Ordered by path.
pub type DiagnosticMap = BTreeMap<String, Vec<Diagnostic>>;

/// Total number of raw diagnostics across all files.
pub fn diagnostic_count(map: &DiagnosticMap) -> usize {
    map.values().map(Vec::len).sum()
}

/// Merge `incoming` into `merged`. A file already present is overwritten.
pub fn merge_into(merged: &mut DiagnosticMap, incoming: DiagnosticMap) {
    merged.extend(incoming);
}

/// Parse the JSON document produced by one engine invocation.
///
/// Blank output means "no findings". An engine runtime error payload
/// (`{"Code": "E100", "Text": ...}`) or anything that is not a map of
/// diagnostic arrays is an engine error.
pub fn parse_engine_output(output: &str) -> Result<DiagnosticMap> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(DiagnosticMap::new());
    }

    let value: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
        Error::engine(format!(
            "Invalid JSON from lint engine: {} (preview: {})",
            e,
            truncate(trimmed, 200)
        ))
    })?;

    if let Some(code) = value.get("Code").and_then(|c| c.as_str()) {
        let text = value
            .get("Text")
            .and_then(|t| t.as_str())
            .unwrap_or("Unknown error");
        return Err(Error::engine(format!("{}: {}", code, text)));
    }

    serde_json::from_value(value)
        .map_err(|e| Error::engine(format!("Unexpected lint engine output shape: {}", e)))
}
