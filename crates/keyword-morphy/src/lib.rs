//! Morphological folding for bibliometric keywords.
//!
//! Reduces plural, past-tense and regional spelling variants of each token to
//! a shared lemma so that `cooling systems`, `cooling system` and
//! `cooling-system` compare equal. Works token by token on a
//! [`NormalizedForm`] and applies, in order:
//!
//! 1. Exceptions (irregular plurals and invariant words).
//! 2. Paired rules (`-ions`, `-ings`, `-ed`), which only fire when the folded
//!    token is already present in the caller's [`WorkingSet`].
//! 3. Plural suffix rules.
//! 4. Spelling variants (`-isation` → `-ization`, `colour` → `color`).
//!
//! Each token is stepped until no rule applies, so folding is idempotent.
//!
//! # Example
//! ```rust
//! use keyword_morphy::{Morphy, WorkingSet};
//! use keyword_types::normalize;
//!
//! let morph = Morphy::new();
//! let forms = [normalize("energy savings"), normalize("energy saving")];
//! let working = WorkingSet::from_forms(&forms);
//!
//! assert_eq!(morph.fold(&forms[0], &working).as_str(), "energy saving");
//! assert_eq!(morph.fold(&normalize("Cities"), &WorkingSet::empty()).as_str(), "city");
//! ```

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result, bail};
use keyword_types::{Lemma, NormalizedForm, SEPARATOR};

/// Shortest token a rule is allowed to produce.
const MIN_STEM_LEN: usize = 3;

/// Upper bound on rule applications per token.
const MAX_FOLD_STEPS: usize = 16;

const PAIRED_RULES: &[(&str, &str)] = &[
    ("ions", "ion"),
    ("ings", "ing"),
    ("ied", "y"),
    ("ed", "e"),
    ("ed", ""),
];

const PLURAL_RULES: &[(&str, &str)] = &[
    ("sses", "ss"),
    ("ies", "y"),
    ("xes", "x"),
    ("ches", "ch"),
    ("shes", "sh"),
    ("s", ""),
];

/// Endings the bare `s` rule never strips.
const PLURAL_GUARDS: &[&str] = &["ss", "us", "is", "ics", "ions", "ings"];

/// Suffix rewrites that only ever occur as British spellings.
const SPELLING_SUFFIXES: &[(&str, &str)] = &[("isation", "ization")];

/// `-ise` verbs with a regional `-ize` form. Endings apply only to these
/// stems, so `raised`, `promising` and `advertising` are left alone.
const ISE_STEMS: &[&str] = &[
    "carbon", "categor", "character", "commercial", "crystall", "decarbon", "digit", "digital",
    "emphas", "general", "harmon", "hybrid", "industrial", "ion", "legal", "local",
    "maxim", "minim", "mobil", "model", "modern", "monet", "neutral", "normal", "optim",
    "organ", "parameter", "polar", "priorit", "real", "recogn", "standard", "stabil",
    "steril", "summar", "symbol", "synchron", "synthes", "urban", "util", "visual",
];

const ISE_ENDINGS: &[(&str, &str)] = &[
    ("ise", "ize"),
    ("ised", "ized"),
    ("ising", "izing"),
    ("iser", "izer"),
];

/// `-yse` verbs with a regional `-yze` form.
const YSE_STEMS: &[&str] = &["anal", "catal", "dial", "electrol", "hydrol", "paral", "pyrol"];

const YSE_ENDINGS: &[(&str, &str)] = &[
    ("yse", "yze"),
    ("ysed", "yzed"),
    ("ysing", "yzing"),
    ("yser", "yzer"),
];

const SPELLING_WORDS: &[(&str, &str)] = &[
    ("aluminium", "aluminum"),
    ("analogue", "analog"),
    ("behaviour", "behavior"),
    ("catalogue", "catalog"),
    ("centre", "center"),
    ("colour", "color"),
    ("defence", "defense"),
    ("fibre", "fiber"),
    ("flavour", "flavor"),
    ("grey", "gray"),
    ("harbour", "harbor"),
    ("labour", "labor"),
    ("licence", "license"),
    ("litre", "liter"),
    ("metre", "meter"),
    ("modelling", "modeling"),
    ("modelled", "modeled"),
    ("neighbour", "neighbor"),
    ("programme", "program"),
    ("sulphur", "sulfur"),
    ("theatre", "theater"),
    ("travelling", "traveling"),
    ("vapour", "vapor"),
];

const BUILTIN_EXCEPTIONS: &[(&str, &str)] = &[
    ("analyses", "analysis"),
    ("children", "child"),
    ("crises", "crisis"),
    ("criteria", "criterion"),
    ("curricula", "curriculum"),
    ("diagnoses", "diagnosis"),
    ("feet", "foot"),
    ("hypotheses", "hypothesis"),
    ("indices", "index"),
    ("matrices", "matrix"),
    ("men", "man"),
    ("mice", "mouse"),
    ("nuclei", "nucleus"),
    ("phenomena", "phenomenon"),
    ("radii", "radius"),
    ("spectra", "spectrum"),
    ("stimuli", "stimulus"),
    ("syntheses", "synthesis"),
    ("teeth", "tooth"),
    ("theses", "thesis"),
    ("vertices", "vertex"),
    ("women", "woman"),
    ("atlas", "atlas"),
    ("bias", "bias"),
    ("canvas", "canvas"),
    ("chaos", "chaos"),
    ("lens", "lens"),
    ("means", "means"),
    ("news", "news"),
    ("series", "series"),
    ("species", "species"),
];

/// Which rule produced a folding step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FoldSource {
    Exception,
    Paired {
        suffix: &'static str,
        replacement: &'static str,
    },
    Plural {
        suffix: &'static str,
        replacement: &'static str,
    },
    Spelling {
        from: &'static str,
        to: &'static str,
    },
}

/// One rewrite of a single token, kept for diagnostics.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FoldStep {
    pub from: String,
    pub to: String,
    pub source: FoldSource,
}

/// Token vocabulary of the records being deduplicated.
///
/// Paired rules consult it so that `buildings` only folds to `building` when
/// some record actually spells `building`.
#[derive(Clone, Debug, Default)]
pub struct WorkingSet {
    tokens: HashSet<String>,
}

impl WorkingSet {
    /// A working set that disables every paired rule.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_forms<'a, I>(forms: I) -> Self
    where
        I: IntoIterator<Item = &'a NormalizedForm>,
    {
        let tokens = forms
            .into_iter()
            .flat_map(|form| form.tokens().map(str::to_string))
            .collect();
        Self { tokens }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Rule-based folder with a settled exception table.
#[derive(Clone, Debug)]
pub struct Morphy {
    exceptions: HashMap<String, String>,
}

impl Default for Morphy {
    fn default() -> Self {
        Self::new()
    }
}

impl Morphy {
    /// Folder with the built-in exception list.
    pub fn new() -> Self {
        Self {
            exceptions: builtin_exceptions(),
        }
    }

    /// Built-in exceptions extended with an exception file.
    ///
    /// Each line holds `surface lemma`; a line with a single word marks that
    /// word invariant. Blank lines and `#` comments are skipped. Entries from
    /// the file override built-in ones.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut raw = builtin_exceptions();
        raw.extend(load_exc(path.as_ref())?);
        Ok(Self {
            exceptions: settle_exceptions(raw)?,
        })
    }

    /// Fold every token of `form` to its lemma.
    pub fn fold(&self, form: &NormalizedForm, working: &WorkingSet) -> Lemma {
        self.fold_traced(form, working).0
    }

    /// Like [`Morphy::fold`], also returning every rewrite that was applied.
    pub fn fold_traced(
        &self,
        form: &NormalizedForm,
        working: &WorkingSet,
    ) -> (Lemma, Vec<FoldStep>) {
        let mut steps = Vec::new();
        let tokens: Vec<String> = form
            .tokens()
            .map(|token| self.fold_token(token, working, &mut steps))
            .collect();
        let separator = String::from(SEPARATOR);
        (Lemma::new(tokens.join(separator.as_str())), steps)
    }

    fn fold_token(&self, token: &str, working: &WorkingSet, steps: &mut Vec<FoldStep>) -> String {
        let mut current = token.to_string();
        for _ in 0..MAX_FOLD_STEPS {
            let Some((next, source)) = self.step(&current, working) else {
                break;
            };
            steps.push(FoldStep {
                from: std::mem::replace(&mut current, next.clone()),
                to: next,
                source,
            });
        }
        current
    }

    fn step(&self, token: &str, working: &WorkingSet) -> Option<(String, FoldSource)> {
        if let Some(lemma) = self.exceptions.get(token) {
            return (lemma != token).then(|| (lemma.clone(), FoldSource::Exception));
        }
        if !token.chars().all(char::is_alphabetic) {
            return None;
        }
        paired(token, working)
            .or_else(|| plural(token, working))
            .or_else(|| spelling(token))
    }
}

fn paired(token: &str, working: &WorkingSet) -> Option<(String, FoldSource)> {
    for &(suffix, replacement) in PAIRED_RULES {
        let Some(candidate) = apply_rule(token, suffix, replacement) else {
            continue;
        };
        let source = FoldSource::Paired {
            suffix,
            replacement,
        };
        if working.contains(&candidate) {
            return Some((candidate, source));
        }
        // "embedded" -> "embedd" -> "embed"
        if replacement.is_empty()
            && let Some(undoubled) = undouble(&candidate)
            && working.contains(&undoubled)
        {
            return Some((undoubled, source));
        }
    }
    None
}

fn plural(token: &str, working: &WorkingSet) -> Option<(String, FoldSource)> {
    let candidates: Vec<(String, FoldSource)> = PLURAL_RULES
        .iter()
        .filter(|(suffix, _)| *suffix != "s" || !PLURAL_GUARDS.iter().any(|g| token.ends_with(*g)))
        .filter_map(|&(suffix, replacement)| {
            apply_rule(token, suffix, replacement).map(|candidate| {
                (
                    candidate,
                    FoldSource::Plural {
                        suffix,
                        replacement,
                    },
                )
            })
        })
        .collect();

    // Prefer a spelling the input already uses ("niches" -> "niche", not "nich").
    let known = candidates
        .iter()
        .position(|(candidate, _)| working.contains(candidate))
        .unwrap_or(0);
    candidates.into_iter().nth(known)
}

fn spelling(token: &str) -> Option<(String, FoldSource)> {
    if let Some(&(from, to)) = SPELLING_WORDS.iter().find(|(from, _)| *from == token) {
        return Some((to.to_string(), FoldSource::Spelling { from, to }));
    }
    stem_spelling(token, ISE_STEMS, ISE_ENDINGS)
        .or_else(|| stem_spelling(token, YSE_STEMS, YSE_ENDINGS))
        .or_else(|| {
            SPELLING_SUFFIXES.iter().find_map(|&(from, to)| {
                apply_rule(token, from, to)
                    .map(|candidate| (candidate, FoldSource::Spelling { from, to }))
            })
        })
}

fn stem_spelling(
    token: &str,
    stems: &[&str],
    endings: &[(&'static str, &'static str)],
) -> Option<(String, FoldSource)> {
    endings.iter().find_map(|&(from, to)| {
        let stem = token.strip_suffix(from)?;
        stems
            .contains(&stem)
            .then(|| (format!("{stem}{to}"), FoldSource::Spelling { from, to }))
    })
}

fn apply_rule(surface: &str, suffix: &str, replacement: &str) -> Option<String> {
    let stem = surface.strip_suffix(suffix)?;
    let candidate = format!("{stem}{replacement}");
    (candidate.chars().count() >= MIN_STEM_LEN).then_some(candidate)
}

fn undouble(candidate: &str) -> Option<String> {
    let mut chars = candidate.chars();
    let last = chars.next_back()?;
    let prev = chars.next_back()?;
    if last != prev || "aeiou".contains(last) {
        return None;
    }
    let undoubled = &candidate[..candidate.len() - last.len_utf8()];
    (undoubled.chars().count() >= MIN_STEM_LEN).then(|| undoubled.to_string())
}

fn load_exc(path: &Path) -> Result<HashMap<String, String>> {
    let file =
        File::open(path).with_context(|| format!("open exception file {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut map = HashMap::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line =
            line.with_context(|| format!("read line {} in {}", lineno + 1, path.display()))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace().map(str::to_lowercase);
        let Some(surface) = parts.next() else {
            continue;
        };
        let lemma = parts.next().unwrap_or_else(|| surface.clone());
        if parts.next().is_some() {
            bail!(
                "line {} in {}: expected `surface lemma`, got {line:?}",
                lineno + 1,
                path.display()
            );
        }
        map.insert(surface, lemma);
    }
    Ok(map)
}

/// The built-in list has no chains, so marking each lemma invariant is all
/// it takes to settle it.
fn builtin_exceptions() -> HashMap<String, String> {
    let mut map: HashMap<String, String> = BUILTIN_EXCEPTIONS
        .iter()
        .map(|(surface, lemma)| (surface.to_string(), lemma.to_string()))
        .collect();
    for (_, lemma) in BUILTIN_EXCEPTIONS {
        map.entry(lemma.to_string()).or_insert_with(|| lemma.to_string());
    }
    map
}

/// Resolve chains (`a -> b -> c` becomes `a -> c`) and mark every target
/// invariant so that exception lookups are fixpoints.
fn settle_exceptions(raw: HashMap<String, String>) -> Result<HashMap<String, String>> {
    let mut settled = HashMap::with_capacity(raw.len() * 2);
    for (surface, lemma) in &raw {
        let mut target = lemma;
        let mut hops = 0usize;
        while let Some(next) = raw.get(target)
            && next != target
        {
            hops += 1;
            if hops > raw.len() {
                bail!("exception cycle through {surface:?}");
            }
            target = next;
        }
        settled.insert(surface.clone(), target.clone());
    }
    let targets: Vec<String> = settled.values().cloned().collect();
    for target in targets {
        settled.entry(target.clone()).or_insert(target);
    }
    Ok(settled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyword_types::normalize;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fold(raw: &str) -> String {
        Morphy::new()
            .fold(&normalize(raw), &WorkingSet::empty())
            .into_string()
    }

    fn fold_with(raw: &str, corpus: &[&str]) -> String {
        let forms: Vec<NormalizedForm> = corpus.iter().map(|k| normalize(k)).collect();
        Morphy::new()
            .fold(&normalize(raw), &WorkingSet::from_forms(&forms))
            .into_string()
    }

    #[test]
    fn folds_regular_plurals() {
        assert_eq!(fold("cities"), "city");
        assert_eq!(fold("systems"), "system");
        assert_eq!(fold("cooling systems"), "cooling system");
        assert_eq!(fold("facades"), "facade");
        assert_eq!(fold("environmental impacts"), "environmental impact");
        assert_eq!(fold("approaches"), "approach");
        assert_eq!(fold("classes"), "class");
        assert_eq!(fold("boxes"), "box");
    }

    #[test]
    fn leaves_guarded_words_alone() {
        for word in ["glass", "campus", "analysis", "physics", "gas", "series", "bias"] {
            assert_eq!(fold(word), word, "{word} should be invariant");
        }
        assert_eq!(fold("ga2o3"), "ga2o3");
        assert_eq!(fold("ties"), "tie");
    }

    #[test]
    fn uses_exceptions() {
        assert_eq!(fold("children"), "child");
        assert_eq!(fold("analyses"), "analysis");
        assert_eq!(fold("criteria"), "criterion");
    }

    #[test]
    fn paired_rules_require_partner_in_working_set() {
        assert_eq!(fold("buildings"), "buildings");
        assert_eq!(fold_with("buildings", &["building"]), "building");
        assert_eq!(fold("carbon emissions"), "carbon emissions");
        assert_eq!(
            fold_with("carbon emissions", &["carbon emission"]),
            "carbon emission"
        );
        assert_eq!(fold_with("renewed", &["renew"]), "renew");
        assert_eq!(fold("renewed"), "renewed");
        assert_eq!(fold_with("embedded", &["embed"]), "embed");
        assert_eq!(fold_with("studied", &["study"]), "study");
    }

    #[test]
    fn prefers_plural_candidate_seen_in_input() {
        assert_eq!(fold("niches"), "nich");
        assert_eq!(fold_with("niches", &["niche"]), "niche");
    }

    #[test]
    fn folds_regional_spelling() {
        assert_eq!(fold("decarbonisation"), "decarbonization");
        assert_eq!(fold("decarbonization"), "decarbonization");
        assert_eq!(fold("colours"), "color");
        assert_eq!(fold("centres"), "center");
        assert_eq!(fold("optimised"), "optimized");
        assert_eq!(fold("characterising"), "characterizing");
        assert_eq!(fold("catalysed"), "catalyzed");
        assert_eq!(fold("catalogues"), "catalog");
    }

    #[test]
    fn spelling_rules_leave_native_words_alone() {
        for word in [
            "raised",
            "rising",
            "promising",
            "advertising",
            "supervised",
            "vogue",
            "rogue",
            "prise",
            "vise",
            "exercise",
            "enterprise",
            "franchise",
            "compromise",
            "expertise",
        ] {
            assert_eq!(fold(word), word, "{word} is not a regional variant");
        }
    }

    #[test]
    fn builtin_exceptions_are_already_settled() {
        let raw: HashMap<String, String> = BUILTIN_EXCEPTIONS
            .iter()
            .map(|(surface, lemma)| (surface.to_string(), lemma.to_string()))
            .collect();
        assert_eq!(settle_exceptions(raw).unwrap(), builtin_exceptions());
        assert_eq!(Morphy::new().exceptions, builtin_exceptions());
    }

    #[test]
    fn fold_is_idempotent() {
        let morph = Morphy::new();
        let corpus = [
            normalize("energy saving"),
            normalize("building"),
            normalize("bias"),
        ];
        let working = WorkingSet::from_forms(&corpus);
        for raw in [
            "energy savings",
            "zero-energy buildings",
            "biased",
            "decarbonisations",
            "centres",
            "cities",
            "analyses",
            "niches",
        ] {
            let once = morph.fold(&normalize(raw), &working);
            let twice = morph.fold(&normalize(once.as_str()), &working);
            assert_eq!(once, twice, "input {raw:?}");
        }
    }

    #[test]
    fn traces_provenance() {
        let (lemma, steps) = Morphy::new().fold_traced(&normalize("colours"), &WorkingSet::empty());
        assert_eq!(lemma.as_str(), "color");
        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[0].source, FoldSource::Plural { .. }));
        assert!(matches!(steps[1].source, FoldSource::Spelling { .. }));
    }

    #[test]
    fn loads_exception_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# irregulars").unwrap();
        writeln!(file, "oxen ox").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "kinetics").unwrap();
        writeln!(file, "dynamos").unwrap();
        let morph = Morphy::load(file.path()).unwrap();
        let working = WorkingSet::empty();
        assert_eq!(morph.fold(&normalize("oxen"), &working).as_str(), "ox");
        assert_eq!(morph.fold(&normalize("dynamos"), &working).as_str(), "dynamos");
        assert_eq!(morph.fold(&normalize("children"), &working).as_str(), "child");
    }

    #[test]
    fn exception_chains_settle_and_cycles_fail() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "aa bb").unwrap();
        writeln!(file, "bb cc").unwrap();
        let morph = Morphy::load(file.path()).unwrap();
        assert_eq!(morph.fold(&normalize("aa"), &WorkingSet::empty()).as_str(), "cc");

        let mut cyclic = NamedTempFile::new().unwrap();
        writeln!(cyclic, "xx yy").unwrap();
        writeln!(cyclic, "yy xx").unwrap();
        assert!(Morphy::load(cyclic.path()).is_err());
    }

    #[test]
    fn missing_exception_file_errors() {
        assert!(Morphy::load("/nonexistent/keyword.exc").is_err());
    }
}
