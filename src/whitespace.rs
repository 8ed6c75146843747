//! Unicode whitespace normalization for user input.
//!
//! Characters are classified by how they render:
//!
//! - **Line breaks** end a line (LF, VT, FF, CR, NEL)
//! - **Space appearance** renders as blank space and collapses to one ASCII space
//! - **Empty appearance** is invisible and is deleted
//!
//! [`sanitize_line`] normalizes a single line, [`sanitize_with`] splits on
//! line breaks first and rejoins the normalized lines. All functions are pure.

use std::sync::OnceLock;

use regex::Regex;

/// How a special character renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appearance {
    LineBreak,
    Space,
    Empty,
}

/// Entry of the fixed character table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialCharacter {
    pub name: &'static str,
    /// Named HTML entity, where one exists
    pub entity: Option<&'static str>,
    pub code_point: char,
    pub appearance: Appearance,
}

const fn special(
    name: &'static str,
    entity: Option<&'static str>,
    code_point: char,
    appearance: Appearance,
) -> SpecialCharacter {
    SpecialCharacter {
        name,
        entity,
        code_point,
        appearance,
    }
}

/// Every character the normalizer knows about. Each code point appears once.
pub const SPECIAL_CHARACTERS: &[SpecialCharacter] = &[
    special("line feed", Some("&NewLine;"), '\u{000A}', Appearance::LineBreak),
    special("line tabulation", None, '\u{000B}', Appearance::LineBreak),
    special("form feed", None, '\u{000C}', Appearance::LineBreak),
    special("carriage return", None, '\u{000D}', Appearance::LineBreak),
    special("next line", None, '\u{0085}', Appearance::LineBreak),
    special("character tabulation", Some("&Tab;"), '\u{0009}', Appearance::Space),
    special("space", None, '\u{0020}', Appearance::Space),
    special("no-break space", Some("&nbsp;"), '\u{00A0}', Appearance::Space),
    special("ogham space mark", None, '\u{1680}', Appearance::Space),
    special("en quad", None, '\u{2000}', Appearance::Space),
    special("em quad", None, '\u{2001}', Appearance::Space),
    special("en space", Some("&ensp;"), '\u{2002}', Appearance::Space),
    special("em space", Some("&emsp;"), '\u{2003}', Appearance::Space),
    special("three-per-em space", Some("&emsp13;"), '\u{2004}', Appearance::Space),
    special("four-per-em space", Some("&emsp14;"), '\u{2005}', Appearance::Space),
    special("six-per-em space", None, '\u{2006}', Appearance::Space),
    special("figure space", Some("&numsp;"), '\u{2007}', Appearance::Space),
    special("punctuation space", Some("&puncsp;"), '\u{2008}', Appearance::Space),
    special("thin space", Some("&thinsp;"), '\u{2009}', Appearance::Space),
    special("hair space", Some("&hairsp;"), '\u{200A}', Appearance::Space),
    special("line separator", None, '\u{2028}', Appearance::Space),
    special("paragraph separator", None, '\u{2029}', Appearance::Space),
    special("narrow no-break space", None, '\u{202F}', Appearance::Space),
    special("medium mathematical space", Some("&MediumSpace;"), '\u{205F}', Appearance::Space),
    special("ideographic space", None, '\u{3000}', Appearance::Space),
    special("mongolian vowel separator", None, '\u{180E}', Appearance::Empty),
    special("zero width space", Some("&ZeroWidthSpace;"), '\u{200B}', Appearance::Empty),
    special("zero width non-joiner", Some("&zwnj;"), '\u{200C}', Appearance::Empty),
    special("zero width joiner", Some("&zwj;"), '\u{200D}', Appearance::Empty),
    special("left-to-right mark", Some("&lrm;"), '\u{200E}', Appearance::Empty),
    special("right-to-left mark", Some("&rlm;"), '\u{200F}', Appearance::Empty),
    special("word joiner", Some("&NoBreak;"), '\u{2060}', Appearance::Empty),
    special("zero width no-break space", None, '\u{FEFF}', Appearance::Empty),
];

/// Look up the appearance of a character, `None` for ordinary characters.
pub fn classify(c: char) -> Option<Appearance> {
    SPECIAL_CHARACTERS
        .iter()
        .find(|special| special.code_point == c)
        .map(|special| special.appearance)
}

/// Build a regex character class from table entries plus extra characters.
fn character_class(appearances: &[Appearance], extra: &[char]) -> String {
    let mut class = String::from("[");
    let chars = SPECIAL_CHARACTERS
        .iter()
        .filter(|special| appearances.contains(&special.appearance))
        .map(|special| special.code_point)
        .chain(extra.iter().copied());
    for c in chars {
        class.push_str(&format!("\\x{{{:X}}}", c as u32));
    }
    class.push_str("]+");
    class
}

fn compile(pattern: String) -> Regex {
    // Patterns are built from the constant table above; failure is a bug.
    Regex::new(&pattern).unwrap_or_else(|e| panic!("invalid whitespace pattern {}: {}", pattern, e))
}

fn line_breaks() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| compile(character_class(&[Appearance::LineBreak], &[])))
}

fn spaces() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| compile(character_class(&[Appearance::Space], &['\u{000C}'])))
}

fn invisibles() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| compile(character_class(&[Appearance::Empty, Appearance::LineBreak], &[])))
}

/// Normalize whitespace in a single line.
///
/// Runs of space-appearance characters (and form feeds) become one ASCII
/// space, invisible characters and any line breaks left in the input are
/// deleted, and leading/trailing ASCII spaces are trimmed. Empty input is
/// returned unchanged.
///
/// # Example
///
/// ```
/// use sanitizer::whitespace::sanitize_line;
///
/// assert_eq!(sanitize_line("\u{00A0} a\u{200B}b\t\tc "), "ab c");
/// ```
pub fn sanitize_line(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }

    let spaced = spaces().replace_all(s, " ");
    let visible = invisibles().replace_all(&spaced, "");
    visible.trim_matches(' ').to_string()
}

/// Normalize whitespace and merge lines with a single space.
pub fn sanitize(s: &str) -> String {
    sanitize_with(s, true)
}

/// Normalize whitespace line by line.
///
/// The input is split at every run of line breaks, each line is normalized
/// with [`sanitize_line`], and the lines are rejoined with a space when
/// `merge_lines_by_space` is set or with `'\n'` otherwise. Trailing empty
/// lines are dropped. Empty input is returned unchanged.
///
/// # Example
///
/// ```
/// use sanitizer::whitespace::sanitize_with;
///
/// assert_eq!(sanitize_with("one \r\n\r\n  two", true), "one two");
/// assert_eq!(sanitize_with("one \r\n\r\n  two", false), "one\ntwo");
/// ```
pub fn sanitize_with(s: &str, merge_lines_by_space: bool) -> String {
    if s.is_empty() {
        return String::new();
    }

    let mut lines: Vec<&str> = line_breaks().split(s).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    let separator = if merge_lines_by_space { " " } else { "\n" };
    lines
        .into_iter()
        .map(sanitize_line)
        .collect::<Vec<_>>()
        .join(separator)
}

/// [`sanitize_line`] for optional input; `None` passes through.
pub fn sanitize_line_opt(s: Option<&str>) -> Option<String> {
    s.map(sanitize_line)
}

/// [`sanitize_with`] for optional input; `None` passes through.
pub fn sanitize_opt(s: Option<&str>, merge_lines_by_space: bool) -> Option<String> {
    s.map(|s| sanitize_with(s, merge_lines_by_space))
}
