use figment::providers::{Format, Toml};
use figment::Figment;

use evidence_core::config::{expand_path, Config, DEFAULT_CONFIG};
use evidence_core::Error;

#[test]
fn default_settings_build_a_valid_registry() {
    let settings = Config::defaults().settings().expect("settings");
    settings.validate().expect("valid");
    let registry = settings.registry().expect("registry");

    assert_eq!(registry.len(), 11);
    assert_eq!(registry.names()[0], "cart_literature");
    assert!((registry.total_weight() - 1.0).abs() < 1e-3, "weights sum near 1.0");
    for c in registry.iter() {
        assert!(c.weight >= 0.04 && c.weight <= 0.20, "{} weight {}", c.name, c.weight);
    }
    assert_eq!(settings.retrieval.top_k_per_collection, 5);
    assert_eq!(settings.retrieval.max_results, 30);
    assert!((settings.retrieval.tiers.high - 0.75).abs() < f32::EPSILON);
    assert!((settings.retrieval.tiers.medium - 0.60).abs() < f32::EPSILON);
}

#[test]
fn collection_without_weight_fails_fast() {
    let figment = Figment::new().merge(Toml::string(
        r#"
        [[collections]]
        name = "cart_literature"
        label = "Literature"
        "#,
    ));
    let err = Config::from_figment(figment).settings().expect_err("missing weight");
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn collection_without_label_fails_fast() {
    let figment = Figment::new().merge(Toml::string(
        r#"
        [[collections]]
        name = "cart_literature"
        label = ""
        weight = 0.2
        "#,
    ));
    let settings = Config::from_figment(figment).settings().expect("parses");
    assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn overrides_merge_over_defaults() {
    let figment = Figment::new()
        .merge(Toml::string(DEFAULT_CONFIG))
        .merge(Toml::string("[retrieval]\ntop_k_per_collection = 8\n[retrieval.tiers]\nhigh = 0.8\nmedium = 0.5\n"));
    let config = Config::from_figment(figment);
    let settings = config.settings().expect("settings");
    assert_eq!(settings.retrieval.top_k_per_collection, 8);
    assert!((settings.retrieval.tiers.high - 0.8).abs() < f32::EPSILON);
    assert_eq!(settings.retrieval.max_expansion_terms, 5, "untouched keys keep defaults");
    let top_k: usize = config.get("retrieval.top_k_per_collection").expect("get");
    assert_eq!(top_k, 8);
}

#[test]
fn inverted_tiers_are_rejected() {
    let figment = Figment::new()
        .merge(Toml::string(DEFAULT_CONFIG))
        .merge(Toml::string("[retrieval.tiers]\nhigh = 0.5\nmedium = 0.7\n"));
    let settings = Config::from_figment(figment).settings().expect("settings");
    assert!(settings.validate().is_err());
}

#[test]
fn store_paths_expand_variables() {
    let tmp = tempfile::TempDir::new().expect("tmp");
    std::env::set_var("EVIDENCE_TEST_DATA_ROOT", tmp.path());
    assert_eq!(expand_path("${EVIDENCE_TEST_DATA_ROOT}/lancedb"), tmp.path().join("lancedb"));
    assert_eq!(expand_path("data/lancedb"), std::path::PathBuf::from("data/lancedb"));
}
