//! Pipeline entry point: normalize, fold, resolve, cluster, reconcile.

use keyword_morphy::{Morphy, WorkingSet};
use std::collections::BTreeMap;

use keyword_types::{CanonicalTerm, KeywordOutput, KeywordRecord, Lemma, NormalizedForm};
use serde::Serialize;
use tracing::{debug, info};

use crate::cluster::{Cluster, Clusterer, KeyedRecord, Link};
use crate::config::{ConfigurationError, EngineConfig, EngineSettings};
use crate::synonyms::SynonymTable;

/// Deterministic keyword deduplicator.
///
/// Holds only read-only tables, so one engine can serve any number of runs
/// (and threads) at once.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    clusterer: Clusterer,
    synonyms: SynonymTable,
    morphy: Morphy,
}

impl Engine {
    pub fn new(config: EngineConfig, synonyms: SynonymTable, morphy: Morphy) -> Self {
        Self {
            clusterer: Clusterer::new(config.sanitized()),
            synonyms,
            morphy,
        }
    }

    /// Build an engine from optional table and config paths.
    ///
    /// Every configured path must load; an unset path falls back to the
    /// built-in behavior (default thresholds, built-in exceptions, identity
    /// synonym resolution).
    pub fn from_settings(settings: &EngineSettings) -> Result<Self, ConfigurationError> {
        let config = match &settings.engine_config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        let morphy = match &settings.morph_exceptions {
            Some(path) => {
                Morphy::load(path).map_err(|e| ConfigurationError::Morphology(format!("{e:#}")))?
            }
            None => Morphy::new(),
        };
        let synonyms = match &settings.synonyms {
            Some(path) => SynonymTable::load(path, &morphy)?,
            None => SynonymTable::empty(),
        };
        Ok(Self::new(config, synonyms, morphy))
    }

    /// Derive the canonical term of every record.
    ///
    /// Synonym keys are folded without input context, while records are
    /// folded against the whole input. When a record's lemma misses the table
    /// its context-free fold is tried as well, and a hit found that way is
    /// shared with every record that folded to the same lemma. Adding records
    /// to the input therefore never undoes a synonym merge.
    pub fn canonicalize<'a>(&self, records: &'a [KeywordRecord]) -> Vec<KeyedRecord<'a>> {
        let forms: Vec<NormalizedForm> = records.iter().map(KeywordRecord::normalized).collect();
        let working = WorkingSet::from_forms(&forms);
        let bare = WorkingSet::empty();

        let mut adopted: BTreeMap<Lemma, CanonicalTerm> = BTreeMap::new();
        let folded: Vec<(Lemma, Option<CanonicalTerm>)> = records
            .iter()
            .zip(&forms)
            .map(|(record, form)| {
                let (lemma, steps) = self.morphy.fold_traced(form, &working);
                for step in &steps {
                    debug!(key = record.key.as_str(), from = step.from.as_str(), to = step.to.as_str(), source = ?step.source, "fold");
                }
                if let Some(canonical) = self.synonyms.lookup(&lemma) {
                    return (lemma, Some(canonical));
                }
                let context_free = self.morphy.fold(form, &bare);
                let hit = (context_free != lemma)
                    .then(|| self.synonyms.lookup(&context_free))
                    .flatten();
                if let Some(canonical) = &hit {
                    adopted
                        .entry(lemma.clone())
                        .and_modify(|current| {
                            if *canonical < *current {
                                *current = canonical.clone();
                            }
                        })
                        .or_insert_with(|| canonical.clone());
                }
                (lemma, hit)
            })
            .collect();

        records
            .iter()
            .zip(forms)
            .zip(folded)
            .map(|((record, form), (lemma, hit))| {
                let canonical = hit
                    .or_else(|| adopted.get(&lemma).cloned())
                    .unwrap_or_else(|| CanonicalTerm::from(lemma));
                KeyedRecord {
                    record,
                    qualifier: form.qualifier().map(str::to_string),
                    canonical,
                }
            })
            .collect()
    }

    /// Canonical term for a single keyword, folded without input context.
    pub fn canonical_term(&self, raw: &str) -> CanonicalTerm {
        let form = keyword_types::normalize(raw);
        self.synonyms
            .resolve(&self.morphy.fold(&form, &WorkingSet::empty()))
    }

    /// Deduplicate `records`. Total over any input; empty in, empty out.
    pub fn run<'a>(&self, records: &'a [KeywordRecord]) -> Deduplication<'a> {
        let keyed = self.canonicalize(records);
        let clusters = self.clusterer.cluster(keyed);
        let dedup = Deduplication { clusters };
        info!(
            input = records.len(),
            clusters = dedup.clusters.len(),
            merged = dedup.merged_count(),
            "deduplicated keywords"
        );
        for cluster in dedup.clusters.iter().filter(|c| c.len() > 1) {
            debug!(
                representative = cluster.representative().key.as_str(),
                members = cluster.len(),
                "merged cluster"
            );
        }
        dedup
    }

    /// Owned representatives of `records`, in output order.
    pub fn dedup(&self, records: &[KeywordRecord]) -> Vec<KeywordRecord> {
        self.run(records)
            .representatives()
            .into_iter()
            .cloned()
            .collect()
    }
}

/// Result of one engine run.
///
/// Clusters, and therefore representatives, are ordered by descending score,
/// then shorter key, then lexical key.
#[derive(Debug, Clone)]
pub struct Deduplication<'a> {
    pub clusters: Vec<Cluster<'a>>,
}

impl<'a> Deduplication<'a> {
    pub fn representatives(&self) -> Vec<&'a KeywordRecord> {
        self.clusters.iter().map(Cluster::representative).collect()
    }

    pub fn outputs(&self) -> Vec<KeywordOutput> {
        self.clusters
            .iter()
            .map(|c| KeywordOutput::from(c.representative()))
            .collect()
    }

    /// Number of input records dropped in favor of a representative.
    pub fn merged_count(&self) -> usize {
        self.clusters.iter().map(|c| c.len() - 1).sum()
    }

    /// Audit trail for every cluster that merged more than one record.
    pub fn report(&self) -> Vec<ClusterReport> {
        self.clusters
            .iter()
            .filter(|c| c.len() > 1)
            .map(ClusterReport::from)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub representative: KeywordOutput,
    pub members: Vec<MemberReport>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberReport {
    pub k: String,
    pub t: u64,
    pub canonical: CanonicalTerm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
}

impl From<&Cluster<'_>> for ClusterReport {
    fn from(cluster: &Cluster<'_>) -> Self {
        Self {
            representative: KeywordOutput::from(cluster.representative()),
            members: cluster
                .members()
                .iter()
                .map(|m| MemberReport {
                    k: m.record.key.clone(),
                    t: m.record.score,
                    canonical: m.canonical.clone(),
                    qualifier: m.qualifier.clone(),
                })
                .collect(),
            links: cluster.links().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(synonyms: &str) -> Engine {
        let morphy = Morphy::new();
        let table = SynonymTable::parse(synonyms, "test", &morphy).unwrap();
        Engine::new(EngineConfig::default(), table, morphy)
    }

    fn outputs(engine: &Engine, records: &[KeywordRecord]) -> Vec<(String, u64)> {
        engine
            .dedup(records)
            .into_iter()
            .map(|r| (r.key, r.score))
            .collect()
    }

    #[test]
    fn canonicalizes_through_every_stage() {
        let engine = engine_with("si = silicon");
        let records = vec![
            KeywordRecord::new("Si(111)", 10),
            KeywordRecord::new("energy savings", 4),
            KeywordRecord::new("energy saving", 9),
        ];
        let keyed = engine.canonicalize(&records);
        assert_eq!(keyed[0].canonical.as_str(), "silicon");
        assert_eq!(keyed[0].qualifier.as_deref(), Some("111"));
        assert_eq!(keyed[1].canonical.as_str(), "energy saving");
        assert_eq!(keyed[2].canonical.as_str(), "energy saving");
    }

    #[test]
    fn empty_input_is_empty_output() {
        let engine = Engine::default();
        let dedup = engine.run(&[]);
        assert!(dedup.clusters.is_empty());
        assert!(dedup.outputs().is_empty());
        assert_eq!(dedup.merged_count(), 0);
    }

    #[test]
    fn duplicates_are_tolerated() {
        let engine = Engine::default();
        let records = vec![
            KeywordRecord::new("heat pump", 30),
            KeywordRecord::new("heat pump", 30),
            KeywordRecord::new("heat pump", 12),
        ];
        assert_eq!(outputs(&engine, &records), vec![("heat pump".to_string(), 30)]);
    }

    #[test]
    fn report_lists_merged_clusters_only() {
        let engine = engine_with("");
        let records = vec![
            KeywordRecord::new("cities", 139),
            KeywordRecord::new("city", 191),
            KeywordRecord::new("algorithm", 223),
        ];
        let dedup = engine.run(&records);
        let report = dedup.report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].representative.k, "city");
        assert_eq!(report[0].members.len(), 2);
        assert!(report[0].members.iter().all(|m| m.canonical.as_str() == "city"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json[0]["representative"]["t"], 191);
        assert!(json[0]["members"][0].get("qualifier").is_none());
    }

    #[test]
    fn outputs_follow_precedence_order() {
        let engine = Engine::default();
        let records = vec![
            KeywordRecord::new("adoption", 105),
            KeywordRecord::new("algorithm", 223),
            KeywordRecord::new("air", 103),
            KeywordRecord::new("algorithms", 104),
        ];
        assert_eq!(
            outputs(&engine, &records),
            vec![
                ("algorithm".to_string(), 223),
                ("adoption".to_string(), 105),
                ("air".to_string(), 103),
            ]
        );
    }

    #[test]
    fn extra_records_do_not_undo_a_synonym_merge() {
        let engine = engine_with("energy savings = energy conservation");
        let pair = vec![
            KeywordRecord::new("energy savings", 10),
            KeywordRecord::new("energy conservation", 50),
        ];
        assert_eq!(
            outputs(&engine, &pair),
            vec![("energy conservation".to_string(), 50)]
        );

        let mut with_singular = pair.clone();
        with_singular.push(KeywordRecord::new("energy saving", 5));
        assert_eq!(
            outputs(&engine, &with_singular),
            vec![("energy conservation".to_string(), 50)]
        );
        let keyed = engine.canonicalize(&with_singular);
        assert!(keyed.iter().all(|k| k.canonical.as_str() == "energy conservation"));
    }

    #[test]
    fn canonical_term_for_single_keyword() {
        let engine = engine_with("zero energy house = zero energy building");
        assert_eq!(
            engine.canonical_term("Zero-Energy Houses").as_str(),
            "zero energy building"
        );
    }
}
