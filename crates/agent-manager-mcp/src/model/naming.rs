//! Naming helpers: slugs, directory-derived ids and display titles.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading pipeline phase prefix such as `01-` or `03-05-`.
static PHASE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}(-\d{1,2})?-").expect("valid phase regex"));

/// Normalize a display name or file stem into a slug.
///
/// Lowercases, collapses whitespace runs into `-` and drops anything outside
/// `[a-z0-9-]`. Applying it twice yields the same string.
pub fn normalize_slug(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut in_space = false;
    for ch in lower.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' {
            out.push(ch);
        }
    }
    out
}

/// Directory names may carry one cosmetic leading hyphen (`-core`).
pub fn strip_leading_hyphen(name: &str) -> &str {
    name.strip_prefix('-').unwrap_or(name)
}

/// `backend-ecosystems` -> `Backend Ecosystems`.
pub fn title_case(folder: &str) -> String {
    folder
        .split('-')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Remove a pipeline phase prefix: `01-02-foo-bar` -> `foo-bar`.
pub fn strip_phase_prefix(folder: &str) -> &str {
    match PHASE_PREFIX.find(folder) {
        Some(m) => &folder[m.end()..],
        None => folder,
    }
}

/// A single, plain path component: no separators, no `.`/`..`, no leading
/// dot, no surrounding whitespace.
pub fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && value.trim() == value
        && !value.starts_with('.')
        && !value.contains(['/', '\\', '\0'])
}

/// Primary collation weight of one lowercased character: punctuation and
/// whitespace, then digits, then letters with Latin-1 accents folded away.
fn primary_weight(ch: char) -> (u8, char) {
    let folded = match ch {
        'à'..='å' => 'a',
        'ç' => 'c',
        'è'..='ë' => 'e',
        'ì'..='ï' => 'i',
        'ñ' => 'n',
        'ò'..='ö' | 'ø' => 'o',
        'ù'..='ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    };
    let class = if folded.is_alphabetic() {
        2
    } else if folded.is_numeric() {
        1
    } else {
        0
    };
    (class, folded)
}

/// Ordering used for every title and name sort in the navigation tree.
///
/// Three levels: base letters (accent and case blind, symbols before digits
/// before letters), then accents (unaccented first), then case (lowercase
/// first). Accent folding covers Latin-1 only; other scripts compare by code
/// point within their class.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    let (la, lb) = (a.to_lowercase(), b.to_lowercase());
    la.chars()
        .map(primary_weight)
        .cmp(lb.chars().map(primary_weight))
        .then_with(|| la.cmp(&lb))
        .then_with(|| b.cmp(a))
}
