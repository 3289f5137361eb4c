//! Catalog of script libraries that submitted code may import.
//!
//! Each library is Rhai source compiled into a module when first loaded into
//! an engine instance. Code imports a library with `import "<name>" as <alias>;`.

use regex::Regex;
use std::sync::OnceLock;

const STATS: &str = r#"
fn sum(values) {
    let total = 0.0;
    for v in values { total += v; }
    total
}

fn mean(values) {
    if values.len() == 0 { throw "mean of an empty array"; }
    let total = 0.0;
    for v in values { total += v; }
    total / values.len()
}

fn variance(values) {
    let n = values.len();
    if n == 0 { throw "variance of an empty array"; }
    let total = 0.0;
    for v in values { total += v; }
    let m = total / n;
    let acc = 0.0;
    for v in values { let d = v - m; acc += d * d; }
    acc / n
}

fn stdev(values) {
    let n = values.len();
    if n == 0 { throw "stdev of an empty array"; }
    let total = 0.0;
    for v in values { total += v; }
    let m = total / n;
    let acc = 0.0;
    for v in values { let d = v - m; acc += d * d; }
    (acc / n).sqrt()
}
"#;

const TEXT: &str = r#"
fn words(s) {
    let out = [];
    let current = "";
    for c in s {
        if c == ' ' || c == '\n' || c == '\t' || c == '\r' {
            if current.len() > 0 { out.push(current); current = ""; }
        } else {
            current += c;
        }
    }
    if current.len() > 0 { out.push(current); }
    out
}

fn word_count(s) {
    let count = 0;
    let inside = false;
    for c in s {
        if c == ' ' || c == '\n' || c == '\t' || c == '\r' {
            inside = false;
        } else if !inside {
            inside = true;
            count += 1;
        }
    }
    count
}

fn lines(s) {
    s.split('\n')
}
"#;

const CSV: &str = r#"
fn parse(s) {
    let rows = [];
    for line in s.split('\n') {
        let row = line;
        row.trim();
        if row.len() == 0 { continue; }
        rows.push(row.split(','));
    }
    rows
}

fn to_csv(rows) {
    let out = "";
    for row in rows {
        let first = true;
        for cell in row {
            if !first { out += ","; }
            out += `${cell}`;
            first = false;
        }
        out += "\n";
    }
    out
}
"#;

const CATALOG: &[(&str, &str)] = &[("stats", STATS), ("text", TEXT), ("csv", CSV)];

static IMPORT_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

/// Returns the source of a catalog library.
#[must_use]
pub fn source(name: &str) -> Option<&'static str> {
    CATALOG
        .iter()
        .find(|(catalog_name, _)| *catalog_name == name)
        .map(|(_, source)| *source)
}

/// Names of every library in the catalog.
#[must_use]
pub fn names() -> Vec<&'static str> {
    CATALOG.iter().map(|(name, _)| *name).collect()
}

/// Library names imported by `code`, in first-seen order without duplicates.
///
/// Names outside the catalog are returned too; loading them fails and the
/// import then fails inside the engine.
#[must_use]
pub fn referenced(code: &str) -> Vec<String> {
    let Some(pattern) = IMPORT_PATTERN
        .get_or_init(|| Regex::new(r#"\bimport\s+"([^"]+)""#).ok())
        .as_ref()
    else {
        return Vec::new();
    };

    let mut found: Vec<String> = Vec::new();
    for captures in pattern.captures_iter(code) {
        if let Some(name) = captures.get(1).map(|m| m.as_str()) {
            if !found.iter().any(|existing| existing == name) {
                found.push(name.to_string());
            }
        }
    }
    found
}
