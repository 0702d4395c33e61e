use std::path::PathBuf;

use keyword_dedup::records::{self, InputFormat};
use keyword_dedup::{Engine, EngineConfig, EngineSettings, SynonymTable, reconcile};
use keyword_morphy::Morphy;
use keyword_types::KeywordRecord;

fn manifest_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

fn bundled_engine() -> Engine {
    Engine::from_settings(&EngineSettings {
        synonyms: Some(manifest_path("data/synonyms.txt")),
        ..EngineSettings::default()
    })
    .unwrap()
}

fn records(pairs: &[(&str, u64)]) -> Vec<KeywordRecord> {
    pairs
        .iter()
        .map(|(key, score)| KeywordRecord::new(*key, *score))
        .collect()
}

fn pairs(records: &[KeywordRecord]) -> Vec<(String, u64)> {
    records.iter().map(|r| (r.key.clone(), r.score)).collect()
}

fn expected(pairs: &[(&str, u64)]) -> Vec<(String, u64)> {
    pairs.iter().map(|(k, t)| (k.to_string(), *t)).collect()
}

#[test]
fn plural_variants_merge() {
    let engine = Engine::default();
    let out = engine.dedup(&records(&[("cities", 139), ("city", 191)]));
    assert_eq!(pairs(&out), expected(&[("city", 191)]));
}

#[test]
fn compound_phrase_is_subsumed() {
    let engine = Engine::default();
    let out = engine.dedup(&records(&[
        ("beta-ga2o3", 50),
        ("beta-ga2o3 single-crystals", 12),
    ]));
    assert_eq!(pairs(&out), expected(&[("beta-ga2o3", 50)]));
}

#[test]
fn abbreviation_resolves_through_synonym_table() {
    let morphy = Morphy::new();
    let table = SynonymTable::from_pairs([("si", "silicon")], &morphy).unwrap();
    let engine = Engine::new(EngineConfig::default(), table, morphy);
    let out = engine.dedup(&records(&[("si(111)", 10), ("si", 8), ("silicon", 40)]));
    assert_eq!(pairs(&out), expected(&[("silicon", 40)]));
}

#[test]
fn unrelated_keywords_stay_apart() {
    let engine = Engine::default();
    let out = engine.dedup(&records(&[("algorithm", 223), ("adoption", 105)]));
    assert_eq!(pairs(&out), expected(&[("algorithm", 223), ("adoption", 105)]));
}

#[test]
fn fixture_file_end_to_end() {
    let text = std::fs::read_to_string(manifest_path("tests/fixtures/keywords.csv")).unwrap();
    let parsed = records::parse_records(&text, InputFormat::Csv);
    assert_eq!(parsed.records.len(), 29);
    assert_eq!(parsed.rejected.len(), 1);
    assert_eq!(parsed.rejected[0].line, 31);

    let dedup = bundled_engine().run(&parsed.records);
    let out: Vec<KeywordRecord> = dedup.representatives().into_iter().cloned().collect();
    assert_eq!(
        pairs(&out),
        expected(&[
            ("climate change", 300),
            ("efficiency", 250),
            ("algorithm", 223),
            ("city", 191),
            ("carbon emissions", 190),
            ("energy savings", 141),
            ("adoption", 105),
            ("air", 103),
            ("zero energy building", 85),
            ("decarbonisation", 64),
            ("adaptation", 63),
            ("air-quality", 63),
            ("facades", 54),
            ("airtightness", 34),
            ("air-conditioning system", 34),
            ("demand-side", 33),
            ("doherty amplifier", 20),
        ])
    );
    assert_eq!(dedup.merged_count(), 12);

    let csv = records::to_csv_string(dedup.representatives());
    assert!(csv.starts_with("keyword, total link strength\nclimate change, 300\n"));
}

#[test]
fn synonym_table_changes_the_partition() {
    let input = records(&[
        ("efficiency", 250),
        ("efficient", 17),
        ("zero energy building", 85),
        ("zero energy house", 11),
    ]);
    assert_eq!(Engine::default().dedup(&input).len(), 4);
    assert_eq!(
        pairs(&bundled_engine().dedup(&input)),
        expected(&[("efficiency", 250), ("zero energy building", 85)])
    );
}

#[test]
fn representatives_reconcile_to_themselves() {
    let engine = bundled_engine();
    let text = std::fs::read_to_string(manifest_path("tests/fixtures/keywords.csv")).unwrap();
    let input = records::parse_records(&text, InputFormat::Csv).records;
    let out = engine.dedup(&input);
    for record in &out {
        assert_eq!(reconcile(std::iter::once(record)), Some(record));
    }

    let out = engine.dedup(&records(&[("buildings", 100), ("building", 1), ("builsings", 50)]));
    assert_eq!(pairs(&out), expected(&[("buildings", 100), ("builsings", 50)]));
    for record in &out {
        assert_eq!(reconcile(std::iter::once(record)), Some(record));
    }
}

#[test]
fn result_is_independent_of_input_order() {
    let engine = bundled_engine();
    let text = std::fs::read_to_string(manifest_path("tests/fixtures/keywords.csv")).unwrap();
    let input = records::parse_records(&text, InputFormat::Csv).records;
    let baseline = engine.dedup(&input);

    let reversed: Vec<KeywordRecord> = input.iter().rev().cloned().collect();
    assert_eq!(engine.dedup(&reversed), baseline);

    let mut rotated = input.clone();
    rotated.rotate_left(11);
    assert_eq!(engine.dedup(&rotated), baseline);
}

#[test]
fn every_input_lands_in_exactly_one_cluster() {
    let engine = bundled_engine();
    let text = std::fs::read_to_string(manifest_path("tests/fixtures/keywords.csv")).unwrap();
    let input = records::parse_records(&text, InputFormat::Csv).records;
    let dedup = engine.run(&input);

    let total: usize = dedup.clusters.iter().map(|c| c.len()).sum();
    assert_eq!(total, input.len());
    for record in &input {
        let owners = dedup
            .clusters
            .iter()
            .filter(|c| c.members().iter().any(|m| std::ptr::eq(m.record, record)))
            .count();
        assert_eq!(owners, 1, "{} is not in exactly one cluster", record.key);
    }
    for cluster in &dedup.clusters {
        let best = cluster.representative();
        assert!(cluster.members().iter().all(|m| best.score >= m.record.score));
    }
}

#[test]
fn raising_a_score_never_loses_the_keyword() {
    let engine = bundled_engine();
    let mut input = records(&[("cities", 139), ("city", 191), ("facade", 25), ("facades", 54)]);
    input[0].score = 500;
    let out = engine.dedup(&input);
    assert!(out.iter().any(|r| r.key == "cities" && r.score == 500));
}

#[test]
fn map_export_feeds_the_engine() {
    let text = std::fs::read_to_string(manifest_path("tests/fixtures/map_export.txt")).unwrap();
    let (csv, rejected) = records::export_to_csv(&text);
    assert!(rejected.is_empty());
    assert_eq!(
        csv,
        "keyword, total link strength\nadaptation, 63\nadoption, 105\nair, 103\ncities, 139\ncity, 191\n"
    );

    let parsed = records::parse_records(&csv, InputFormat::Csv);
    let out = Engine::default().dedup(&parsed.records);
    assert_eq!(
        pairs(&out),
        expected(&[("city", 191), ("adoption", 105), ("air", 103), ("adaptation", 63)])
    );
}

#[test]
fn broken_table_fails_before_clustering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("synonyms.txt");
    std::fs::write(&path, "si silicon\n").unwrap();
    let err = Engine::from_settings(&EngineSettings {
        synonyms: Some(path),
        ..EngineSettings::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains(":1:"));
}
