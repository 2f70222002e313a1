use std::{env, sync::Mutex};

use super::*;

// Environment variables are process-global; serialize the tests that
// touch them so parallel runs cannot observe each other's overrides.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn load_with_env(vars: &[(&str, &str)]) -> Settings {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    for (key, value) in vars {
        env::set_var(key, value);
    }
    let settings = load_settings();
    for (key, _) in vars {
        env::remove_var(key);
    }
    settings
}

#[test]
fn defaults_match_the_survey_conventions() {
    let settings = Settings::default();
    assert_eq!(settings.sheet_name, "Sheet1");
    assert_eq!(settings.flush_threshold, 5);
    assert!(settings.fresh_reads);
    assert_eq!(settings.consistency_mode(), ConsistencyMode::FreshRead);
}

#[test]
fn cached_read_mode_is_opt_in() {
    let settings = Settings {
        fresh_reads: false,
        ..Settings::default()
    };
    assert_eq!(settings.consistency_mode(), ConsistencyMode::CachedRead);
}

#[test]
fn validate_data_dir_rejects_missing_directory() {
    let settings = Settings {
        data_dir: PathBuf::from("/definitely/not/here"),
        ..Settings::default()
    };
    assert!(validate_data_dir(&settings).is_err());
}

#[test]
fn plain_env_vars_override_defaults() {
    let settings = load_with_env(&[
        ("SERVER_BIND", "0.0.0.0:7001"),
        ("STORE_BASE_URL", "http://store.example:9000/"),
    ]);
    assert_eq!(settings.server_bind, "0.0.0.0:7001");
    assert_eq!(settings.store_base_url, "http://store.example:9000/");
}

#[test]
fn app_prefixed_vars_win_over_plain_ones() {
    let settings = load_with_env(&[
        ("SERVER_BIND", "0.0.0.0:7001"),
        ("APP__BIND_ADDR", "0.0.0.0:7002"),
        ("STORE_BASE_URL", "http://plain.example:9000/"),
        ("APP__STORE_BASE_URL", "http://prefixed.example:9000/"),
    ]);
    assert_eq!(settings.server_bind, "0.0.0.0:7002");
    assert_eq!(settings.store_base_url, "http://prefixed.example:9000/");
}

#[test]
fn flush_threshold_override_ignores_zero_and_garbage() {
    let settings = load_with_env(&[("APP__FLUSH_THRESHOLD", "0")]);
    assert_eq!(settings.flush_threshold, 5, "zero would disable batching");

    let settings = load_with_env(&[("APP__FLUSH_THRESHOLD", "three")]);
    assert_eq!(settings.flush_threshold, 5);

    let settings = load_with_env(&[("APP__FLUSH_THRESHOLD", "3")]);
    assert_eq!(settings.flush_threshold, 3);
}

#[test]
fn fresh_reads_and_token_come_from_the_environment() {
    let settings = load_with_env(&[
        ("APP__FRESH_READS", "false"),
        ("APP__STORE_TOKEN", "secret-token"),
        ("APP__SHEET_NAME", "Votes"),
        ("APP__DATA_DIR", "/srv/pairs"),
    ]);
    assert!(!settings.fresh_reads);
    assert_eq!(settings.consistency_mode(), ConsistencyMode::CachedRead);
    assert_eq!(settings.store_token.as_deref(), Some("secret-token"));
    assert_eq!(settings.sheet_name, "Votes");
    assert_eq!(settings.data_dir, PathBuf::from("/srv/pairs"));
}
