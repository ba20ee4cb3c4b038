//! Tests for environment-driven configuration.

use std::time::Duration;

use serial_test::serial;
use shows_bot::config::Config;
use shows_bot::error::AppError;

const KEYS: &[&str] = &[
    "TELEGRAM_TOKEN",
    "TMDB_API_KEY",
    "NOTIFICATIONS_ENABLED",
    "CHECK_INTERVAL",
    "EPISODE_NOTIFICATION_THRESHOLD",
    "MAX_RESULTS",
    "TVMAZE_BASE_URL",
    "TVMAZE_MAX_RETRIES",
];

fn clear_env() {
    for key in KEYS {
        // SAFETY: tests touching the environment run serially.
        unsafe { std::env::remove_var(key) };
    }
}

fn set_env(key: &str, value: &str) {
    // SAFETY: tests touching the environment run serially.
    unsafe { std::env::set_var(key, value) };
}

#[test]
#[serial]
fn test_load_overrides_defaults() {
    clear_env();
    set_env("TELEGRAM_TOKEN", "123:abc");
    set_env("TMDB_API_KEY", "tmdb-key");
    set_env("CHECK_INTERVAL", "60");
    set_env("EPISODE_NOTIFICATION_THRESHOLD", "3600");
    set_env("MAX_RESULTS", "10");
    set_env("TVMAZE_BASE_URL", "http://localhost:8080/");
    set_env("TVMAZE_MAX_RETRIES", "1");

    let mut config = Config::new();
    config.load().unwrap();

    assert_eq!(config.telegram_token, "123:abc");
    assert_eq!(config.tmdb_api_key.as_deref(), Some("tmdb-key"));
    assert_eq!(config.check_interval, Duration::from_secs(60));
    assert_eq!(config.episode_notification_threshold, Duration::from_secs(3600));
    assert_eq!(config.max_results, 10);
    assert_eq!(config.providers.tvmaze.base_url, "http://localhost:8080");
    assert_eq!(config.providers.tvmaze.max_retries, 1);
    assert_eq!(config.providers.tmdb.max_retries, 3);

    clear_env();
}

#[test]
#[serial]
fn test_missing_token_with_notifications_enabled() {
    clear_env();

    let mut config = Config::new();
    config.load().unwrap();
    let err = config.validate().unwrap_err();

    assert!(matches!(err, AppError::MissingConfig { ref key } if key == "TELEGRAM_TOKEN"));
}

#[test]
#[serial]
fn test_notifications_disabled_after_load_skips_token_check() {
    clear_env();
    set_env("NOTIFICATIONS_ENABLED", "true");

    let mut config = Config::new();
    config.load().unwrap();
    assert!(config.features.notifications);

    config.features.notifications = false;
    config.validate().unwrap();
    assert!(config.telegram_token.is_empty());

    clear_env();
}

#[test]
#[serial]
fn test_token_optional_when_notifications_disabled() {
    clear_env();
    set_env("NOTIFICATIONS_ENABLED", "false");

    let mut config = Config::new();
    config.load().unwrap();
    config.validate().unwrap();

    assert!(!config.features.notifications);
    assert!(config.telegram_token.is_empty());

    clear_env();
}

#[test]
#[serial]
fn test_invalid_number_is_rejected() {
    clear_env();
    set_env("TELEGRAM_TOKEN", "123:abc");
    set_env("CHECK_INTERVAL", "six hours");

    let err = Config::new().load().unwrap_err();

    assert!(matches!(err, AppError::InvalidConfig { ref key, .. } if key == "CHECK_INTERVAL"));

    clear_env();
}
