//! Compound-phrase subsumption.

use keyword_types::CanonicalTerm;

/// Function words ignored when comparing token sequences.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "at", "by", "for", "from", "in", "of", "on", "or", "the", "to", "with",
];

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Tokens of `term` minus stop words.
pub fn meaningful_tokens(term: &CanonicalTerm) -> Vec<&str> {
    term.tokens().filter(|t| !is_stop_word(t)).collect()
}

/// True when one term's meaningful tokens appear, in order, inside the
/// other's and the two sequences share their first or last token.
///
/// `beta ga2o3` subsumes `beta ga2o3 single crystal` (prefix-aligned) and
/// `doherty amplifier` subsumes `doherty power amplifier`. The shorter side
/// must carry at least `min_shared_tokens` meaningful tokens, which keeps a
/// bare `air` from swallowing `air quality`. The relation is symmetric.
pub fn is_subsumed(a: &CanonicalTerm, b: &CanonicalTerm, min_shared_tokens: usize) -> bool {
    subsumes_tokens(&meaningful_tokens(a), &meaningful_tokens(b), min_shared_tokens)
}

/// [`is_subsumed`] over token sequences that already had stop words removed.
pub fn subsumes_tokens(a: &[&str], b: &[&str], min_shared_tokens: usize) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.len() < min_shared_tokens.max(1) {
        return false;
    }
    let aligned = short.first() == long.first() || short.last() == long.last();
    aligned && is_subsequence(short, long)
}

fn is_subsequence(short: &[&str], long: &[&str]) -> bool {
    let mut remaining = long.iter();
    short
        .iter()
        .all(|token| remaining.by_ref().any(|candidate| candidate == token))
}
