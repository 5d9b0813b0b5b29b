//! Post-processing: deterministic cleanup of generated advisory prose.
//!
//! The report is plain text laid out with base-14 fonts, but models answer
//! in Markdown whether asked to or not: fenced blocks, `**bold**` labels,
//! `## headings`, zero-width characters. Left in, those show up in the PDF
//! as literal asterisks and hashes. Each rule below is a pure `&str → String`
//! pass, independently testable.
//!
//! ## Rule Order
//!
//! Fences are stripped first so the heading and emphasis passes see the
//! real content; line endings are normalised before any per-line rule.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one advisory completion.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip heading markers (`### Title` → `Title`)
/// 4. Strip emphasis markers (`**x**`, `__x__`, `*x*`)
/// 5. Normalise bullets (`* item`, `+ item` → `- item`)
/// 6. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 7. Trim trailing whitespace per line
/// 8. Collapse runs of blank lines to a single blank line
/// 9. Trim the whole text
pub fn clean_advisory(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = strip_heading_markers(&s);
    let s = strip_emphasis(&s);
    let s = normalise_bullets(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip heading markers ────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+").unwrap());

fn strip_heading_markers(input: &str) -> String {
    RE_HEADING.replace_all(input, "").to_string()
}

// ── Rule 4: Strip emphasis markers ───────────────────────────────────────────

static RE_STRONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\*\*|__)(.+?)(\*\*|__)").unwrap());
static RE_EM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\s][^*\n]*?)\*").unwrap());

fn strip_emphasis(input: &str) -> String {
    let s = RE_STRONG.replace_all(input, "$2");
    RE_EM.replace_all(&s, "$1").to_string()
}

// ── Rule 5: Normalise bullets ────────────────────────────────────────────────

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^([ \t]*)[*+][ \t]+").unwrap());

fn normalise_bullets(input: &str) -> String {
    RE_BULLET.replace_all(input, "$1- ").to_string()
}

// ── Rule 6: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 7: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 8: Collapse blank-line runs ─────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
