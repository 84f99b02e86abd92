/*!
 * Tests for application configuration functionality
 */

use ksl_review::app_config::{Config, LogLevel, TranslationProvider};

use crate::common::{create_temp_dir, create_test_file};

/// Test default configuration values
#[test]
fn test_defaultConfig_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.translation.provider, TranslationProvider::OpenAI);
    assert_eq!(config.translation.get_endpoint(), "https://api.openai.com/v1");
    assert!(config.translation.system_prompt.is_empty());
    assert_eq!(config.pipeline.batching.first_pass_batch_size, 10);
    assert_eq!(config.pipeline.batching.retry_batch_size, 3);
    assert_eq!(config.pipeline.batching.first_pass_delay_ms, 100);
    assert_eq!(config.pipeline.batching.retry_delay_ms, 200);
    assert_eq!(config.server.bind_address, "127.0.0.1:3000");
    assert_eq!(config.log_level, LogLevel::Info);
}

/// Test loading a missing file writes the defaults
#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let config = Config::load_or_create(&path).unwrap();

    assert!(path.exists());
    let reloaded = Config::from_file(&path).unwrap();
    assert_eq!(reloaded.translation.get_model(), config.translation.get_model());
    assert_eq!(reloaded.pipeline.batching, config.pipeline.batching);
}

/// Test saving and loading preserves overrides
#[test]
fn test_save_withOverrides_shouldRoundTrip() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let mut config = Config::default();
    config.translation.provider = TranslationProvider::LMStudio;
    config.translation.active_provider_config_mut().model = "ksl-gloss-local".to_string();
    config.quality.max_length_ratio = 4.5;
    config.database.enabled = true;
    config.save(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.translation.provider, TranslationProvider::LMStudio);
    assert_eq!(loaded.translation.get_model(), "ksl-gloss-local");
    assert_eq!(loaded.translation.get_endpoint(), "http://localhost:1234/v1");
    assert_eq!(loaded.quality.max_length_ratio, 4.5);
    assert!(loaded.database.enabled);
    assert!(loaded.validate().is_ok());
}

/// Test that a malformed file is reported rather than replaced
#[test]
fn test_loadOrCreate_withMalformedFile_shouldFail() {
    let dir = create_temp_dir().unwrap();
    let path = create_test_file(dir.path(), "conf.json", "{ not json").unwrap();

    assert!(Config::load_or_create(&path).is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}
