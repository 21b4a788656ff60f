// Text normalization used before blacklist matching.
//
// Pure functions, no state. The matcher runs every term against both forms
// produced here.

/// Leet-speak glyphs and the letters they stand in for.
const LEET_SUBSTITUTIONS: &[(char, char)] = &[
    ('0', 'o'),
    ('1', 'i'),
    ('3', 'e'),
    ('4', 'a'),
    ('5', 's'),
    ('7', 't'),
    ('@', 'a'),
    ('$', 's'),
    ('!', 'i'),
    ('+', 't'),
];

/// The two views of a message that matching is attempted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    /// Only the letters `a`-`z`, everything else dropped. Catches `f u c k`.
    pub collapsed: String,
    /// Whitespace runs folded to a single space. Keeps phrase boundaries.
    pub spaced: String,
}

fn substitute(c: char) -> char {
    LEET_SUBSTITUTIONS
        .iter()
        .find(|(glyph, _)| *glyph == c)
        .map(|(_, letter)| *letter)
        .unwrap_or(c)
}

/// Lowercase and undo leet substitutions, leaving everything else in place.
fn substituted(text: &str) -> String {
    text.to_lowercase().chars().map(substitute).collect()
}

/// Normalize `text` into its collapsed and spaced forms.
pub fn normalize(text: &str) -> NormalizedText {
    let substituted = substituted(text);

    let collapsed = substituted
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .collect();
    let spaced = substituted.split_whitespace().collect::<Vec<_>>().join(" ");

    NormalizedText { collapsed, spaced }
}

/// Canonical stored form of a blacklist term.
///
/// Terms go through the same lowercase + substitution + whitespace folding as
/// message text so `h4x` and `hax` are the same entry.
pub fn normalize_term(term: &str) -> String {
    normalize(term.trim()).spaced
}
