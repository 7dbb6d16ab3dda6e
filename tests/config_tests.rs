use std::sync::Arc;
use tempfile::TempDir;

use hashchat::config::{
    AppConfig, ConfigService, EnvOverrides, LlmProvider, Network, CONFIG_FILE_NAME,
};
use hashchat::secrets::{NoopCipher, ScryptAesCipher, SecretCipher, ENCRYPTED_PREFIX};

fn service(dir: &TempDir, cipher: Arc<dyn SecretCipher>) -> ConfigService {
    ConfigService::new(dir.path().join(CONFIG_FILE_NAME), cipher)
}

fn populated_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.hedera.account_id = "0.0.5005".into();
    config.hedera.private_key = "302e020100300506032b657004220420-test".into();
    config.hedera.network = Network::Mainnet;
    config.openai.api_key = "sk-openai-test".into();
    config.anthropic.api_key = "sk-ant-api-test".into();
    config.llm_provider = LlmProvider::Anthropic;
    config
}

#[tokio::test]
async fn round_trip_under_both_encryption_scenarios() {
    let original = populated_config();

    for cipher in [
        Arc::new(ScryptAesCipher::new("unit-master")) as Arc<dyn SecretCipher>,
        Arc::new(NoopCipher) as Arc<dyn SecretCipher>,
    ] {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, cipher);

        service.save(&original).await.unwrap();
        let restored = service.load().await;
        assert_eq!(restored, original);
    }
}

#[tokio::test]
async fn many_save_load_cycles_preserve_the_config() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, Arc::new(ScryptAesCipher::new("unit-master")));
    let original = populated_config();

    let mut current = original.clone();
    for _ in 0..5 {
        service.save(&current).await.unwrap();
        current = service.load().await;
        assert_eq!(current, original);
    }
}

#[tokio::test]
async fn secrets_are_marked_ciphertext_on_disk_when_available() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, Arc::new(ScryptAesCipher::new("unit-master")));
    service.save(&populated_config()).await.unwrap();

    let raw = std::fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    for pointer in ["/hedera/privateKey", "/openai/apiKey", "/anthropic/apiKey"] {
        let field = value.pointer(pointer).unwrap().as_str().unwrap();
        assert!(
            field.starts_with(ENCRYPTED_PREFIX),
            "{pointer} is not marked as ciphertext"
        );
    }
    // Non-sensitive fields stay readable.
    assert_eq!(value.pointer("/hedera/accountId").unwrap(), "0.0.5005");
}

#[tokio::test]
async fn partial_file_is_completed_from_defaults() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, Arc::new(NoopCipher));
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        r#"{ "hedera": { "accountId": "0.0.7" } }"#,
    )
    .unwrap();

    let config = service.load().await;
    assert_eq!(config.hedera.account_id, "0.0.7");
    assert_eq!(config.hedera.network, Network::Testnet);
    assert_eq!(config.openai.model, AppConfig::default().openai.model);
    assert_eq!(config.anthropic.model, AppConfig::default().anthropic.model);
    assert_eq!(config.llm_provider, AppConfig::default().llm_provider);
}

#[tokio::test]
async fn corrupt_file_yields_full_defaults() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir, Arc::new(NoopCipher));
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{ invalid json }").unwrap();

    assert_eq!(service.load().await, AppConfig::default());
}

#[tokio::test]
async fn config_written_by_a_keyless_install_is_readable_after_enabling_encryption() {
    let dir = TempDir::new().unwrap();

    // First run without platform encryption: plaintext on disk.
    let plain = service(&dir, Arc::new(NoopCipher));
    plain.save(&populated_config()).await.unwrap();

    // Later the platform cipher becomes available; the plaintext values are
    // still accepted and survive the next save encrypted.
    let sealed = ConfigService::new(
        dir.path().join(CONFIG_FILE_NAME),
        Arc::new(ScryptAesCipher::new("unit-master")),
    );
    let migrated = sealed.load().await;
    assert_eq!(migrated, populated_config());

    sealed.save(&migrated).await.unwrap();
    let raw = std::fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap();
    assert!(raw.contains(ENCRYPTED_PREFIX));
    assert_eq!(sealed.load().await, populated_config());
}

mod environment {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "HEDERA_OPERATOR_ID",
        "HEDERA_OPERATOR_KEY",
        "HEDERA_NETWORK",
        "OPENAI_API_KEY",
        "OPENAI_MODEL",
        "ANTHROPIC_API_KEY",
        "ANTHROPIC_MODEL",
        "LLM_PROVIDER",
    ];

    fn clear_vars() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn capture_reflects_environment() {
        clear_vars();
        env::set_var("HEDERA_OPERATOR_ID", "0.0.999");
        env::set_var("HEDERA_OPERATOR_KEY", "priv-key");
        env::set_var("HEDERA_NETWORK", "mainnet");

        let overrides = EnvOverrides::capture();
        assert_eq!(overrides.hedera_account_id.as_deref(), Some("0.0.999"));
        assert_eq!(overrides.hedera_private_key.as_deref(), Some("priv-key"));
        assert_eq!(overrides.hedera_network, Some(Network::Mainnet));
        assert!(overrides.openai_api_key.is_none());

        clear_vars();
    }

    #[test]
    #[serial]
    fn single_provider_key_selects_that_provider() {
        clear_vars();
        env::set_var("ANTHROPIC_API_KEY", "sk-ant-from-env");

        let overrides = EnvOverrides::capture();
        assert_eq!(overrides.llm_provider, Some(LlmProvider::Anthropic));

        let mut config = AppConfig::default();
        overrides.apply(&mut config);
        assert_eq!(config.anthropic.api_key, "sk-ant-from-env");
        assert_eq!(config.llm_provider, LlmProvider::Anthropic);

        clear_vars();
    }

    #[test]
    #[serial]
    fn explicit_provider_wins_over_inference() {
        clear_vars();
        env::set_var("ANTHROPIC_API_KEY", "sk-ant-from-env");
        env::set_var("LLM_PROVIDER", "openai");

        let overrides = EnvOverrides::capture();
        assert_eq!(overrides.llm_provider, Some(LlmProvider::Openai));

        clear_vars();
    }
}
