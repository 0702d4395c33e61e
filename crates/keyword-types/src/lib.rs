//! Shared types for keyword deduplication, plus the normalizer every stage
//! compares through.
//!
//! A [`KeywordRecord`] is what the reader produces and what the reconciler
//! hands back; it is never mutated. Everything else is derived from its raw
//! key: [`NormalizedForm`] (case and separators unified, short parenthetical
//! qualifier split off), then [`Lemma`] (after morphological folding), then
//! [`CanonicalTerm`] (after synonym resolution). Output records use the
//! compact `{ "k": ..., "t": ... }` shape of [`KeywordOutput`].
//!
//! ```rust
//! use keyword_types::{KeywordRecord, normalize};
//!
//! let form = normalize("Zero-Energy Building (ZEB)");
//! assert_eq!(form.as_str(), "zero energy building");
//! assert_eq!(form.qualifier(), Some("zeb"));
//!
//! let record = KeywordRecord::new("si(111)", 10);
//! assert_eq!(record.normalized().as_str(), "si");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator every keyword is unified to before comparison.
pub const SEPARATOR: char = ' ';

/// Longest parenthetical content (in characters) treated as a qualifier.
pub const MAX_QUALIFIER_LEN: usize = 4;

/// Association score attached to a keyword ("total link strength").
pub type Score = u64;

/// One input row: the raw keyword and its score.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub key: String,
    pub score: Score,
}

impl KeywordRecord {
    pub fn new(key: impl Into<String>, score: Score) -> Self {
        Self {
            key: key.into(),
            score,
        }
    }

    /// Comparable form of the raw key.
    pub fn normalized(&self) -> NormalizedForm {
        normalize(&self.key)
    }
}

/// Output row in the compact shape consumers expect.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct KeywordOutput {
    pub k: String,
    pub t: Score,
}

impl From<&KeywordRecord> for KeywordOutput {
    fn from(record: &KeywordRecord) -> Self {
        Self {
            k: record.key.clone(),
            t: record.score,
        }
    }
}

impl From<KeywordOutput> for KeywordRecord {
    fn from(out: KeywordOutput) -> Self {
        Self {
            key: out.k,
            score: out.t,
        }
    }
}

/// Case-folded, separator-unified keyword with any short qualifier split off.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct NormalizedForm {
    text: String,
    qualifier: Option<String>,
}

impl NormalizedForm {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Content of the first parenthetical qualifier that was stripped.
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        split_tokens(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for NormalizedForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

macro_rules! term_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(text: impl Into<String>) -> Self {
                Self(text.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn tokens(&self) -> impl Iterator<Item = &str> {
                split_tokens(&self.0)
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

term_newtype!(
    /// Normalized keyword after morphological folding.
    Lemma
);

term_newtype!(
    /// Lemma after synonym and abbreviation resolution; the clustering key.
    CanonicalTerm
);

impl From<Lemma> for CanonicalTerm {
    fn from(lemma: Lemma) -> Self {
        CanonicalTerm(lemma.0)
    }
}

/// Normalize a raw keyword into its comparable form.
///
/// Lower-cases, strips parenthetical qualifiers of 1–4 alphanumeric
/// characters (`si(111)` → `si`), maps `-`, `_` and whitespace to a single
/// space, and trims. The steps are repeated until nothing changes, which
/// makes the function idempotent. Never fails; `""` maps to `""`.
pub fn normalize(raw: &str) -> NormalizedForm {
    let mut text = raw.to_lowercase();
    let mut qualifier = None;
    loop {
        let (stripped, found) = strip_short_qualifiers(&text);
        if qualifier.is_none() {
            qualifier = found;
        }
        let unified = unify_separators(&stripped);
        if unified == text {
            break;
        }
        text = unified;
    }
    NormalizedForm { text, qualifier }
}

/// Split unified text into tokens.
pub fn split_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(SEPARATOR).filter(|t| !t.is_empty())
}

fn is_separator(c: char) -> bool {
    c == '-' || c == '_' || c.is_whitespace()
}

fn unify_separators(text: &str) -> String {
    text.split(is_separator)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_short_qualifier(content: &str) -> bool {
    let len = content.chars().count();
    (1..=MAX_QUALIFIER_LEN).contains(&len) && content.chars().all(char::is_alphanumeric)
}

fn strip_short_qualifiers(text: &str) -> (String, Option<String>) {
    let mut out = String::with_capacity(text.len());
    let mut found = None;
    let mut rest = text;
    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        match after.find(['(', ')']) {
            Some(close) if after[close..].starts_with(')') && is_short_qualifier(&after[..close]) => {
                out.push_str(&rest[..open]);
                out.push(SEPARATOR);
                found.get_or_insert_with(|| after[..close].to_string());
                rest = &after[close + 1..];
            }
            _ => {
                out.push_str(&rest[..=open]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    (out, found)
}
