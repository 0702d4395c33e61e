use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use keyword_types::{CanonicalTerm, KeywordRecord};
use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::reconcile::{precedence, reconcile};
use crate::subsume::{meaningful_tokens, subsumes_tokens};

/// A record together with the forms derived from its key.
#[derive(Debug, Clone)]
pub struct KeyedRecord<'a> {
    pub record: &'a KeywordRecord,
    pub qualifier: Option<String>,
    pub canonical: CanonicalTerm,
}

/// Why two canonical terms ended up in the same cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchReason {
    Subsumed,
    EditDistance { distance: usize },
}

/// An edge of the cluster graph between two distinct canonical terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub left: CanonicalTerm,
    pub right: CanonicalTerm,
    #[serde(flatten)]
    pub reason: MatchReason,
}

/// Records judged to denote the same concept, with one representative.
#[derive(Debug, Clone)]
pub struct Cluster<'a> {
    members: Vec<KeyedRecord<'a>>,
    links: Vec<Link>,
    representative: usize,
}

impl<'a> Cluster<'a> {
    /// Build a cluster and pick its representative; `None` when empty.
    pub fn new(mut members: Vec<KeyedRecord<'a>>, links: Vec<Link>) -> Option<Self> {
        members.sort_by(|a, b| precedence(a.record, b.record));
        let best = reconcile(members.iter().map(|m| m.record))?;
        let representative = members.iter().position(|m| std::ptr::eq(m.record, best))?;
        Some(Self {
            members,
            links,
            representative,
        })
    }

    pub fn representative(&self) -> &'a KeywordRecord {
        self.members[self.representative].record
    }

    /// Members ordered by precedence; the representative comes first.
    pub fn members(&self) -> &[KeyedRecord<'a>] {
        &self.members
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Groups keyed records into clusters.
///
/// Records with equal canonical terms always share a cluster. Distinct terms
/// are joined when one subsumes the other or when their edit distance is
/// within the configured bound; clusters are the connected components.
#[derive(Debug, Clone, Default)]
pub struct Clusterer {
    config: EngineConfig,
}

impl Clusterer {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn cluster<'a>(&self, keyed: Vec<KeyedRecord<'a>>) -> Vec<Cluster<'a>> {
        let mut by_term: BTreeMap<CanonicalTerm, Vec<KeyedRecord<'a>>> = BTreeMap::new();
        for record in keyed {
            by_term
                .entry(record.canonical.clone())
                .or_default()
                .push(record);
        }
        let terms: Vec<CanonicalTerm> = by_term.keys().cloned().collect();
        let shapes: Vec<TermShape<'_>> = terms.iter().map(TermShape::new).collect();
        let candidates = CandidateIndex::new(&shapes, &self.config);

        let mut dsu = DisjointSet::new(terms.len());
        let mut links: Vec<(usize, Link)> = Vec::new();
        for i in 0..terms.len() {
            for j in candidates.partners(i, &shapes) {
                let Some(reason) = self.shape_reason(&shapes[i], &shapes[j]) else {
                    continue;
                };
                if dsu.union(i, j) {
                    debug!(
                        left = terms[i].as_str(),
                        right = terms[j].as_str(),
                        ?reason,
                        "linked terms"
                    );
                    links.push((
                        i,
                        Link {
                            left: terms[i].clone(),
                            right: terms[j].clone(),
                            reason,
                        },
                    ));
                }
            }
        }

        let mut components: HashMap<usize, (Vec<KeyedRecord<'a>>, Vec<Link>)> = HashMap::new();
        for (idx, records) in by_term.into_values().enumerate() {
            let root = dsu.find(idx);
            components.entry(root).or_default().0.extend(records);
        }
        for (idx, link) in links {
            let root = dsu.find(idx);
            components.entry(root).or_default().1.push(link);
        }

        let mut clusters: Vec<Cluster<'a>> = components
            .into_values()
            .filter_map(|(members, links)| Cluster::new(members, links))
            .collect();
        clusters.sort_by(compare_clusters);
        clusters
    }

    /// Edge test between two distinct canonical terms.
    pub fn match_reason(&self, a: &CanonicalTerm, b: &CanonicalTerm) -> Option<MatchReason> {
        self.shape_reason(&TermShape::new(a), &TermShape::new(b))
    }

    fn shape_reason(&self, a: &TermShape<'_>, b: &TermShape<'_>) -> Option<MatchReason> {
        if subsumes_tokens(&a.tokens, &b.tokens, self.config.min_shared_tokens) {
            return Some(MatchReason::Subsumed);
        }
        self.edit_distance(a, b)
            .map(|distance| MatchReason::EditDistance { distance })
    }

    fn edit_distance(&self, a: &TermShape<'_>, b: &TermShape<'_>) -> Option<usize> {
        if !self.config.fuzzy {
            return None;
        }
        if a.chars.min(b.chars) < self.config.min_fuzzy_len {
            return None;
        }
        if self.config.require_same_initial && a.initial != b.initial {
            return None;
        }
        // Numbers carry meaning ("ga2o3" vs "ga2o5"); never fuzz across them.
        if a.numbers != b.numbers {
            return None;
        }
        let max = self.config.max_distance_for(a.chars.max(b.chars));
        if max == 0 || a.chars.abs_diff(b.chars) > max {
            return None;
        }
        if histogram_gap(&a.histogram, &b.histogram) > max {
            return None;
        }
        let distance = strsim::levenshtein(a.text, b.text);
        (distance <= max).then_some(distance)
    }
}

/// Bins: `a`-`z`, `0`-`9`, everything else.
const HISTOGRAM_BINS: usize = 37;

/// Per-term data computed once before the pairwise pass.
struct TermShape<'t> {
    text: &'t str,
    tokens: Vec<&'t str>,
    chars: usize,
    initial: Option<char>,
    /// Digit runs in order; `term1 topic10` gives `["1", "10"]`.
    numbers: Vec<&'t str>,
    histogram: [u16; HISTOGRAM_BINS],
}

impl<'t> TermShape<'t> {
    fn new(term: &'t CanonicalTerm) -> Self {
        let text = term.as_str();
        let mut histogram = [0u16; HISTOGRAM_BINS];
        for c in text.chars() {
            let bin = match c {
                'a'..='z' => c as usize - 'a' as usize,
                '0'..='9' => 26 + (c as usize - '0' as usize),
                _ => HISTOGRAM_BINS - 1,
            };
            histogram[bin] = histogram[bin].saturating_add(1);
        }
        Self {
            text,
            tokens: meaningful_tokens(term),
            chars: text.chars().count(),
            initial: text.chars().next(),
            numbers: text
                .split(|c: char| !c.is_ascii_digit())
                .filter(|run| !run.is_empty())
                .collect(),
            histogram,
        }
    }
}

/// Lower bound on the edit distance of two strings with these character
/// counts: every edit moves at most one character in or out of a bin.
fn histogram_gap(a: &[u16; HISTOGRAM_BINS], b: &[u16; HISTOGRAM_BINS]) -> usize {
    let (mut surplus, mut deficit) = (0usize, 0usize);
    for (x, y) in a.iter().zip(b) {
        if x > y {
            surplus += usize::from(x - y);
        } else {
            deficit += usize::from(y - x);
        }
    }
    surplus.max(deficit)
}

/// Buckets terms so that only pairs able to match are compared.
///
/// Subsumption needs a shared first or last meaningful token; an edit
/// distance match needs the same initial (when required) and a length
/// difference within the largest distance tier.
struct CandidateIndex<'t> {
    by_first: HashMap<&'t str, Vec<usize>>,
    by_last: HashMap<&'t str, Vec<usize>>,
    /// `(chars, term)` pairs sorted by length.
    by_initial: HashMap<Option<char>, Vec<(usize, usize)>>,
    same_initial: bool,
    band: usize,
}

impl<'t> CandidateIndex<'t> {
    fn new(shapes: &[TermShape<'t>], config: &EngineConfig) -> Self {
        let mut index = Self {
            by_first: HashMap::new(),
            by_last: HashMap::new(),
            by_initial: HashMap::new(),
            same_initial: config.require_same_initial,
            band: config.short_max_distance.max(config.long_max_distance),
        };
        for (idx, shape) in shapes.iter().enumerate() {
            if shape.tokens.len() >= config.min_shared_tokens.max(1) {
                if let (Some(first), Some(last)) = (shape.tokens.first(), shape.tokens.last()) {
                    index.by_first.entry(*first).or_default().push(idx);
                    index.by_last.entry(*last).or_default().push(idx);
                }
            }
            if config.fuzzy && shape.chars >= config.min_fuzzy_len {
                let key = index.initial_key(shape);
                index
                    .by_initial
                    .entry(key)
                    .or_default()
                    .push((shape.chars, idx));
            }
        }
        for bucket in index.by_initial.values_mut() {
            bucket.sort_unstable();
        }
        index
    }

    fn initial_key(&self, shape: &TermShape<'_>) -> Option<char> {
        if self.same_initial { shape.initial } else { None }
    }

    /// Terms after `i` that could match it, ascending.
    fn partners(&self, i: usize, shapes: &[TermShape<'t>]) -> Vec<usize> {
        let shape = &shapes[i];
        let mut partners = Vec::new();
        for (bucket, token) in [
            (&self.by_first, shape.tokens.first()),
            (&self.by_last, shape.tokens.last()),
        ] {
            if let Some(ids) = token.and_then(|t| bucket.get(t)) {
                let start = ids.partition_point(|&j| j <= i);
                partners.extend_from_slice(&ids[start..]);
            }
        }
        if let Some(bucket) = self.by_initial.get(&self.initial_key(shape)) {
            let low = shape.chars.saturating_sub(self.band);
            let high = shape.chars + self.band;
            let start = bucket.partition_point(|&(chars, _)| chars < low);
            partners.extend(
                bucket[start..]
                    .iter()
                    .take_while(|&&(chars, _)| chars <= high)
                    .map(|&(_, j)| j)
                    .filter(|&j| j > i),
            );
        }
        partners.sort_unstable();
        partners.dedup();
        partners
    }
}

fn compare_clusters(a: &Cluster<'_>, b: &Cluster<'_>) -> Ordering {
    precedence(a.representative(), b.representative())
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    /// Returns `false` when both were already connected.
    fn union(&mut self, left: usize, right: usize) -> bool {
        let left_root = self.find(left);
        let right_root = self.find(right);
        if left_root == right_root {
            return false;
        }
        match self.rank[left_root].cmp(&self.rank[right_root]) {
            Ordering::Less => self.parent[left_root] = right_root,
            Ordering::Greater => self.parent[right_root] = left_root,
            Ordering::Equal => {
                self.parent[right_root] = left_root;
                self.rank[left_root] += 1;
            }
        }
        true
    }
}
