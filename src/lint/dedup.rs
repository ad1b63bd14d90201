//! Collapse per-occurrence diagnostics into canonical findings per rule.

use super::{Diagnostic, DiagnosticMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

const UNKNOWN_RULE: &str = "Unknown";

/// A diagnostic with its location reduced to one representative example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalFinding {
    pub message: String,
    #[serde(rename = "match")]
    pub matched_text: String,
    pub severity: String,
    #[serde(default)]
    pub link: String,
    pub example_file: String,
    pub line: u32,
}

/// Rule id → its canonical findings, in first-seen order.
pub type RuleRecords = BTreeMap<String, Vec<CanonicalFinding>>;

/// Identity of a finding. File and line are not part of it.
type DedupKey<'a> = (&'a str, &'a str, &'a str, &'a str);

fn dedup_key(diag: &Diagnostic) -> DedupKey<'_> {
    (
        diag.check.as_str(),
        diag.message.as_str(),
        diag.matched_text.as_str(),
        diag.severity.as_str(),
    )
}

/// Keep the first diagnostic for each `(rule, message, match, severity)`.
///
/// Entries are visited in `(file, line)` order, so the kept example is the
/// same on every run regardless of which lint batch finished first.
pub fn deduplicate(merged: &DiagnosticMap) -> RuleRecords {
    let mut entries: Vec<(&str, &Diagnostic)> = merged
        .iter()
        .flat_map(|(file, diags)| diags.iter().map(move |d| (file.as_str(), d)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0).then(a.1.line.cmp(&b.1.line)));

    let mut seen: HashSet<DedupKey<'_>> = HashSet::new();
    let mut records = RuleRecords::new();
    for (file, diag) in entries {
        if !seen.insert(dedup_key(diag)) {
            continue;
        }
        let rule = if diag.check.is_empty() {
            UNKNOWN_RULE
        } else {
            diag.check.as_str()
        };
        records
            .entry(rule.to_string())
            .or_default()
            .push(CanonicalFinding {
                message: diag.message.clone(),
                matched_text: diag.matched_text.clone(),
                severity: diag.severity.clone(),
                link: diag.link.clone(),
                example_file: file.to_string(),
                line: diag.line,
            });
    }
    records
}

/// Number of canonical findings across all rules.
pub fn finding_count(records: &RuleRecords) -> usize {
    records.values().map(Vec::len).sum()
}
