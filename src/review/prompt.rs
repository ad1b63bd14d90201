use super::RuleTarget;
use crate::lint::dedup::CanonicalFinding;
use std::path::Path;

/// One prompt line per finding, capped at `max`, with a note for the rest.
pub fn findings_summary(findings: &[CanonicalFinding], max: usize) -> String {
    let mut lines: Vec<String> = findings
        .iter()
        .take(max)
        .map(|f| {
            format!(
                "- Match: '{}' | Message: {} | Example: {}:{}",
                f.matched_text, f.message, f.example_file, f.line
            )
        })
        .collect();
    if findings.len() > max {
        lines.push(format!(
            "... and {} more similar errors",
            findings.len() - max
        ));
    }
    lines.join("\n")
}

fn fixtures_section(target: &RuleTarget, root: &Path) -> String {
    let dir = root.join(&target.fixture_dir);
    if !dir.is_dir() {
        return String::new();
    }
    let mut section = format!("\n\nTest Fixtures Directory: {}", target.fixture_dir.display());
    if root.join(&target.invalid_fixture).is_file() {
        section.push_str(&format!(
            "\n- Invalid examples file (should trigger rule): {}",
            target.invalid_fixture.display()
        ));
    }
    if root.join(&target.valid_fixture).is_file() {
        section.push_str(&format!(
            "\n- Valid examples file (should NOT trigger rule): {}",
            target.valid_fixture.display()
        ));
    }
    section
}

/// The full review request for one rule.
///
/// Paths are given relative to `root`, which is where the agent runs.
pub fn build_review_prompt(
    target: &RuleTarget,
    root: &Path,
    rule_text: &str,
    findings: &[CanonicalFinding],
    max_findings: usize,
) -> String {
    let rule_file = target.rule_file.display();
    let invalid = target.invalid_fixture.display();
    let valid = target.valid_fixture.display();
    format!(
        r#"Review the following Vale rule and its errors to identify false positives.

Rule: {rule_id}
Rule file: {rule_file}{fixtures}

Current rule content:
```yaml
{rule_text}
```

Errors detected (unique, deduplicated):
{summary}

Task:
1. Review each unique error and determine if it's a false positive
2. If you find false positives, update the rule to exclude them
3. You can:
   - Add exceptions to existing patterns
   - Modify swap mappings
   - Add negative lookaheads/lookbehinds
   - Update the rule's pattern to be more specific

4. IMPORTANT - Regex Simplicity Guidelines:
   - Keep regex patterns SIMPLE and READABLE
   - If a regex pattern becomes overly complex, labyrinthine, or verbose, do NOT add it
   - Prefer simple, straightforward patterns over complex ones
   - If you cannot express the fix with a simple regex, consider if the rule should be modified differently
   - Complex nested lookaheads/lookbehinds are a red flag - keep patterns minimal
   - Example of GOOD (simple): '(?i)\bfoo\b'
   - Example of BAD (overly complex): '(?i)(?<!\w)(?:foo|bar)(?!\w)(?:(?<=\s)|(?=\s))(?!.*(?:baz|qux))'

5. IMPORTANT - Update test fixtures when removing false positives:
   - When you remove a term/pattern as a false positive from the rule, also update the test fixtures:
     a. Remove the false positive examples from {invalid} (if they exist there)
     b. Add the false positive examples to {valid} to ensure they won't be flagged
   - Each fixture file contains plain text terms/examples to test the rule
   - The testinvalid.adoc file should contain examples that SHOULD trigger the rule
   - The testvalid.adoc file should contain examples that should NOT trigger the rule

If you identify false positives and make changes:
- Edit the rule file {rule_file}
- Update fixture files if they exist: {invalid} and/or {valid}

IMPORTANT: Only modify the rule if you're confident that the errors are false positives. Be conservative.
IMPORTANT: Any regex you create must be simple and not overly verbose.

After your analysis, provide a summary of:
- How many errors are false positives
- What changes you made to the rule (if any)
- What changes you made to test fixtures (if any)
- Reasoning for the changes
- Confirmation that any regex added is simple and readable
"#,
        rule_id = target.rule_id,
        fixtures = fixtures_section(target, root),
        summary = findings_summary(findings, max_findings),
    )
}
