//! Candidate regulatory clause extraction.
//!
//! A layered cascade of textual heuristics pulls candidate clauses out of
//! extracted regulatory text. Each pattern category contributes matches
//! independently; the combined list is unioned, not prioritized. Pattern-only
//! extraction on loosely formatted text often yields nothing, so a
//! paragraph-level keyword fallback guarantees the retrieval stage still has
//! candidate material whenever any obligation language exists.

use std::sync::LazyLock;

use regex::Regex;

/// Minimum clause length for cascade matches.
const MIN_CLAUSE_LEN: usize = 50;
/// Minimum paragraph length for the fallback tier.
const MIN_FALLBACK_PARA_LEN: usize = 100;

/// Obligation keywords recognized by the cascade (exact, lowercase).
const OBLIGATION_KEYWORDS: [&str; 8] = [
    "must",
    "shall",
    "should",
    "required",
    "requirement",
    "comply",
    "compliance",
    "mandatory",
];

/// `Section 3:` / `§ 4.1 -` style markers.
static SECTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Section\s+|§\s*)\d+(?:\.\d+)*\s*[:.\-]\s*[A-Z]").unwrap()
});

/// Bare dotted-number headings (`4.2 Cleaning`).
static NUMBERED_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)+\s+[A-Z]").unwrap());

/// `Article 9:` / `Regulation 12.` / `Rule 3 -` style markers.
static LABELLED_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Article|Regulation|Rule)\s+\d+(?:\.\d+)*\s*[:.\-]\s*[A-Z]").unwrap()
});

/// Alternation over [`OBLIGATION_KEYWORDS`], built from the list itself so
/// the regex and fallback tiers cannot drift apart.
static KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&OBLIGATION_KEYWORDS.join("|")).unwrap());

/// Extract candidate regulatory clauses from raw text.
///
/// Cascade tiers, each contributing independently:
/// 1. numbered-section markers (`Section N`, `§N`) captured up to the next
///    such marker or end of text;
/// 2. bare dotted-number headings (`N.N Title`);
/// 3. labelled patterns (`Article`/`Regulation`/`Rule` + number);
/// 4. obligation-keyword spans captured up to a blank-line boundary.
///
/// Matches of 50 characters or fewer are dropped. If the cascade yields
/// nothing, falls back to blank-line paragraphs longer than 100 characters
/// containing at least one obligation keyword (case-insensitive).
pub fn extract_clauses(text: &str) -> Vec<String> {
    let mut clauses = Vec::new();

    for marker in [&SECTION_MARKER, &NUMBERED_MARKER, &LABELLED_MARKER] {
        collect_marker_spans(text, marker, &mut clauses);
    }
    collect_keyword_spans(text, &mut clauses);

    if clauses.is_empty() {
        collect_fallback_paragraphs(text, &mut clauses);
    }

    clauses
}

/// Slice the text between successive marker match starts; each span runs
/// from one marker to the next (or end of text).
fn collect_marker_spans(text: &str, marker: &Regex, out: &mut Vec<String>) {
    let starts: Vec<usize> = marker.find_iter(text).map(|m| m.start()).collect();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let clause = text[start..end].trim();
        if clause.len() > MIN_CLAUSE_LEN {
            out.push(clause.to_string());
        }
    }
}

/// Capture from each obligation keyword up to the next blank line.
/// Non-overlapping: scanning resumes past each captured span.
fn collect_keyword_spans(text: &str, out: &mut Vec<String>) {
    let mut pos = 0;
    while let Some(m) = KEYWORD_RE.find_at(text, pos) {
        let end = text[m.start()..]
            .find("\n\n")
            .map(|i| m.start() + i)
            .unwrap_or(text.len());
        let clause = text[m.start()..end].trim();
        if clause.len() > MIN_CLAUSE_LEN {
            out.push(clause.to_string());
        }
        if end >= text.len() {
            break;
        }
        pos = end + 2;
    }
}

/// Fallback tier: blank-line-delimited paragraphs with obligation language.
/// The keyword match here is a case-insensitive substring check and also
/// accepts "regulation" itself.
fn collect_fallback_paragraphs(text: &str, out: &mut Vec<String>) {
    for para in text.split("\n\n") {
        let para = para.trim();
        if para.len() <= MIN_FALLBACK_PARA_LEN {
            continue;
        }
        let lower = para.to_lowercase();
        let has_keyword = OBLIGATION_KEYWORDS
            .iter()
            .chain(std::iter::once(&"regulation"))
            .any(|kw| lower.contains(kw));
        if has_keyword {
            out.push(para.to_string());
        }
    }
}
