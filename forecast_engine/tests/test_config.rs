use approx::assert_relative_eq;
use forecast_engine::config::{
    EngineConfig, Horizon, HorizonProfile, HorizonRegistry, CONFIG_PATH_ENV,
};
use forecast_engine::error::ForecastError;
use forecast_engine::models::ForecasterKind;
use forecast_engine::validator::ValidationMode;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::tempdir;

#[test]
fn test_default_profiles_are_valid() {
    let registry = HorizonRegistry::default();
    registry.validate().unwrap();
    assert_eq!(registry.profiles().len(), 4);

    for profile in registry.profiles() {
        assert_relative_eq!(profile.weights.sum(), 1.0, epsilon = 1e-9);
        assert!(profile.daily_change_cap <= profile.horizon_change_cap);
    }
}

#[test]
fn test_longer_horizons_are_wider_and_looser() {
    let registry = HorizonRegistry::default();
    let profiles: Vec<&HorizonProfile> = Horizon::ALL
        .iter()
        .map(|h| registry.get(*h).unwrap())
        .collect();

    for pair in profiles.windows(2) {
        assert!(pair[1].confidence_multiplier > pair[0].confidence_multiplier);
        assert!(pair[1].horizon_change_cap > pair[0].horizon_change_cap);
        assert!(pair[1].mape_ceiling_pct > pair[0].mape_ceiling_pct);
        assert!(pair[1].params.context_length > pair[0].params.context_length);
        assert!(
            pair[1].weights.get(ForecasterKind::TreeEnsemble)
                <= pair[0].weights.get(ForecasterKind::TreeEnsemble)
        );
    }
    assert_relative_eq!(profiles[0].confidence_multiplier, 1.0);
}

#[rstest]
#[case("7d", Horizon::Days7)]
#[case("15", Horizon::Days15)]
#[case(" 30d ", Horizon::Days30)]
#[case("90D", Horizon::Days90)]
fn test_horizon_parse(#[case] raw: &str, #[case] expected: Horizon) {
    let parsed: Horizon = raw.parse().unwrap();
    assert_eq!(parsed, expected);
    assert_eq!(parsed.to_string(), format!("{}d", expected.days()));
}

#[rstest]
#[case("8d")]
#[case("week")]
#[case("")]
fn test_unsupported_horizon(#[case] raw: &str) {
    assert!(matches!(
        raw.parse::<Horizon>(),
        Err(ForecastError::InvalidParameter(_))
    ));
}

#[test]
fn test_horizon_serializes_as_label() {
    assert_eq!(serde_json::to_string(&Horizon::Days15).unwrap(), "\"15d\"");
    let back: Horizon = serde_json::from_str("\"90d\"").unwrap();
    assert_eq!(back, Horizon::Days90);
}

fn broken(mutate: impl FnOnce(&mut HorizonProfile)) -> HorizonProfile {
    let mut profile = HorizonProfile::default_for(Horizon::Days30);
    mutate(&mut profile);
    profile
}

#[rstest]
#[case(broken(|p| p.weights.foundation = 0.5))]
#[case(broken(|p| p.weights.tree_ensemble = -0.1))]
#[case(broken(|p| p.confidence_multiplier = 0.9))]
#[case(broken(|p| p.horizon_change_cap = 1.5))]
#[case(broken(|p| p.daily_change_cap = 0.2))]
#[case(broken(|p| p.mape_ceiling_pct = 0.0))]
#[case(broken(|p| p.params.context_length = 1))]
fn test_invalid_profile_rejected(#[case] profile: HorizonProfile) {
    assert!(profile.validate().is_err());
    let mut registry = HorizonRegistry::default();
    assert!(registry.insert(profile).is_err());
    assert_eq!(registry, HorizonRegistry::default());
}

#[test]
fn test_weight_sum_tolerance() {
    let profile = broken(|p| p.weights.foundation += 0.005);
    profile.validate().unwrap();
}

#[test]
fn test_registry_replaces_profiles() {
    let custom = broken(|p| p.confidence_multiplier = 1.5);
    let registry = HorizonRegistry::from_profiles(vec![custom.clone()]).unwrap();
    assert_eq!(registry.profiles().len(), 4);
    assert_eq!(registry.get(Horizon::Days30).unwrap(), &custom);
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.toml");

    let mut config = EngineConfig::default();
    config.validator.mode = ValidationMode::Rolling;
    config.drift.ljung_box_lags = Some(6);
    config.regime.scheduled_events = vec![chrono::NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()];
    config.save(&path).unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(
        &path,
        r#"
[drift]
alpha = 0.01

[validator]
mode = "ROLLING"
max_folds = 4

[regime]
scheduled_events = ["2024-06-27"]
"#,
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_relative_eq!(config.drift.alpha, 0.01);
    assert_eq!(config.drift.baseline_size, 90);
    assert_eq!(config.validator.mode, ValidationMode::Rolling);
    assert_eq!(config.validator.max_folds, 4);
    assert_eq!(config.validator.train_days, 252);
    assert_eq!(config.regime.scheduled_events.len(), 1);
    assert_eq!(config.horizons, HorizonRegistry::default());
}

fn write_horizon_overrides(path: &std::path::Path, profiles: &[HorizonProfile]) {
    let entries = profiles
        .iter()
        .map(|p| toml::Value::try_from(p).unwrap())
        .collect();
    let mut horizons = toml::Table::new();
    horizons.insert("profiles".to_string(), toml::Value::Array(entries));
    let mut root = toml::Table::new();
    root.insert("horizons".to_string(), toml::Value::Table(horizons));
    std::fs::write(path, toml::to_string(&root).unwrap()).unwrap();
}

#[test]
fn test_single_horizon_override_keeps_other_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.toml");

    let mut weekly = HorizonProfile::default_for(Horizon::Days7);
    weekly.confidence_multiplier = 1.25;
    write_horizon_overrides(&path, &[weekly.clone()]);
    assert!(std::fs::read_to_string(&path)
        .unwrap()
        .contains("[[horizons.profiles]]"));

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.horizons.profiles().len(), 4);
    assert_eq!(config.horizons.get(Horizon::Days7).unwrap(), &weekly);
    for horizon in [Horizon::Days15, Horizon::Days30, Horizon::Days90] {
        assert_eq!(
            config.horizons.get(horizon).unwrap(),
            &HorizonProfile::default_for(horizon)
        );
    }
}

#[test]
fn test_horizon_overrides_are_checked() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.toml");

    let weekly = HorizonProfile::default_for(Horizon::Days7);
    write_horizon_overrides(&path, &[weekly.clone(), weekly.clone()]);
    assert!(matches!(EngineConfig::load(&path), Err(ForecastError::Config(_))));

    let mut loose = weekly;
    loose.confidence_multiplier = 0.5;
    write_horizon_overrides(&path, &[loose]);
    assert!(matches!(EngineConfig::load(&path), Err(ForecastError::Config(_))));
}

#[test]
fn test_load_rejects_invalid_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.toml");

    std::fs::write(&path, "[calibration]\ninner_level = 0.99\n").unwrap();
    assert!(matches!(
        EngineConfig::load(&path),
        Err(ForecastError::InvalidParameter(_))
    ));

    std::fs::write(&path, "[drift\nalpha = ").unwrap();
    assert!(matches!(EngineConfig::load(&path), Err(ForecastError::Config(_))));

    assert!(matches!(
        EngineConfig::load(dir.path().join("missing.toml")),
        Err(ForecastError::IoError(_))
    ));
}

#[test]
fn test_from_env() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "[drift_trend]\nwindow = 5\n").unwrap();

    std::env::set_var(CONFIG_PATH_ENV, &path);
    assert_eq!(EngineConfig::from_env().drift_trend.window, 5);

    std::env::set_var(CONFIG_PATH_ENV, dir.path().join("missing.toml"));
    assert_eq!(EngineConfig::from_env(), EngineConfig::default());

    std::env::remove_var(CONFIG_PATH_ENV);
}
