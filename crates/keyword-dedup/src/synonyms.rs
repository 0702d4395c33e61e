//! Abbreviation and near-synonym resolution.
//!
//! A [`SynonymTable`] maps aliases to canonical terms. Both sides are keyed
//! through the normalizer and the morphology folder (with an empty working
//! set), so `Demand-Side`, `demand side` and `demand sides` share one entry.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::Path;

use keyword_morphy::{Morphy, WorkingSet};
use keyword_types::{CanonicalTerm, Lemma, SEPARATOR, normalize};
use tracing::{debug, info};

use crate::config::ConfigurationError;

/// Read-only alias → canonical mapping.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    entries: HashMap<String, String>,
}

impl SynonymTable {
    /// A table that resolves every lemma to itself.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from `(alias, canonical)` pairs.
    pub fn from_pairs<I, A, C>(pairs: I, morphy: &Morphy) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (A, C)>,
        A: AsRef<str>,
        C: AsRef<str>,
    {
        let numbered = pairs.into_iter().enumerate().map(|(idx, pair)| (idx + 1, pair));
        Self::build(numbered, "pairs", morphy)
    }

    /// Load a table file of `alias = canonical` lines.
    pub fn load(path: &Path, morphy: &Morphy) -> Result<Self, ConfigurationError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&text, &path.display().to_string(), morphy)?;
        info!("loaded {} synonym entries from {}", table.len(), path.display());
        Ok(table)
    }

    /// Parse table text. `origin` names the source in error messages.
    pub fn parse(text: &str, origin: &str, morphy: &Morphy) -> Result<Self, ConfigurationError> {
        let mut pairs = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (alias, canonical) = line
                .split_once('=')
                .ok_or_else(|| malformed(origin, idx + 1, "expected `alias = canonical`"))?;
            let (alias, canonical) = (alias.trim(), canonical.trim());
            if alias.is_empty() || canonical.is_empty() {
                return Err(malformed(
                    origin,
                    idx + 1,
                    "alias and canonical term must both be non-empty",
                ));
            }
            pairs.push((idx + 1, (alias, canonical)));
        }
        Self::build(pairs, origin, morphy)
    }

    /// Key both sides of every entry. An alias that folds to the same key as
    /// an earlier alias must also agree on the canonical term.
    fn build<I, A, C>(pairs: I, origin: &str, morphy: &Morphy) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (usize, (A, C))>,
        A: AsRef<str>,
        C: AsRef<str>,
    {
        let mut raw: HashMap<String, (String, usize)> = HashMap::new();
        for (line, (alias, canonical)) in pairs {
            let alias = table_key(alias.as_ref(), morphy);
            let canonical = table_key(canonical.as_ref(), morphy);
            if alias.is_empty() || alias == canonical {
                continue;
            }
            match raw.entry(alias) {
                Entry::Occupied(entry) => {
                    let (previous, first) = entry.get();
                    if *previous != canonical {
                        return Err(malformed(
                            origin,
                            line,
                            &format!(
                                "alias {:?} already maps to {previous:?} on line {first}, not {canonical:?}",
                                entry.key()
                            ),
                        ));
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert((canonical, line));
                }
            }
        }
        let raw = raw
            .into_iter()
            .map(|(alias, (canonical, _))| (alias, canonical))
            .collect();
        Ok(Self {
            entries: settle(raw)?,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a lemma to its canonical term.
    ///
    /// Whole-lemma entries win; otherwise single-token entries are applied
    /// token by token. Unknown lemmas resolve to themselves.
    pub fn resolve(&self, lemma: &Lemma) -> CanonicalTerm {
        self.lookup(lemma)
            .unwrap_or_else(|| CanonicalTerm::from(lemma.clone()))
    }

    /// Like [`SynonymTable::resolve`], but `None` when no entry applies.
    pub fn lookup(&self, lemma: &Lemma) -> Option<CanonicalTerm> {
        if let Some(canonical) = self.entries.get(lemma.as_str()) {
            debug!(lemma = lemma.as_str(), canonical = canonical.as_str(), "synonym");
            return Some(CanonicalTerm::new(canonical.clone()));
        }
        let mut replaced = false;
        let tokens: Vec<&str> = lemma
            .tokens()
            .map(|token| match self.entries.get(token) {
                Some(canonical) => {
                    replaced = true;
                    canonical.as_str()
                }
                None => token,
            })
            .collect();
        if !replaced {
            return None;
        }
        let separator = String::from(SEPARATOR);
        let canonical = tokens.join(separator.as_str());
        debug!(lemma = lemma.as_str(), canonical = canonical.as_str(), "token synonym");
        Some(CanonicalTerm::new(canonical))
    }
}

fn malformed(origin: &str, line: usize, reason: &str) -> ConfigurationError {
    ConfigurationError::Malformed {
        origin: origin.to_string(),
        line,
        reason: reason.to_string(),
    }
}

fn table_key(raw: &str, morphy: &Morphy) -> String {
    morphy.fold(&normalize(raw), &WorkingSet::empty()).into_string()
}

/// Collapse chains so that every value is final; a cycle is a config error.
fn settle(raw: HashMap<String, String>) -> Result<HashMap<String, String>, ConfigurationError> {
    let mut settled = HashMap::with_capacity(raw.len());
    for (alias, canonical) in &raw {
        let mut target = canonical;
        let mut hops = 0usize;
        while let Some(next) = raw.get(target) {
            hops += 1;
            if hops > raw.len() {
                return Err(ConfigurationError::SynonymCycle(alias.clone()));
            }
            target = next;
        }
        settled.insert(alias.clone(), target.clone());
    }
    Ok(settled)
}
