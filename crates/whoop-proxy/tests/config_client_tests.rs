//! Configuration, client construction and store wiring tests.
//!
//! Tests actual behavior, not constants.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use whoop_proxy::client::WhoopClient;
use whoop_proxy::config::{Config, api};
use whoop_proxy::server::ProxyServer;
use whoop_proxy::token::{FileTokenStore, TokenRecord, TokenStore};

fn record(access_token: &str) -> TokenRecord {
    TokenRecord {
        id: Uuid::new_v4(),
        access_token: access_token.into(),
        refresh_token: Some("RT1".into()),
        expires_in: 3600,
        issued_at: Utc::now(),
    }
}

// =============================================================================
// Config Behavior Tests
// =============================================================================

#[test]
fn test_config_defaults_to_store_path_constant() {
    let config = Config::new("id", "secret", "https://proxy.example/callback");
    assert_eq!(config.store_path, std::path::PathBuf::from(api::DEFAULT_STORE_PATH));
    assert_eq!(config.max_resource_retries, api::MAX_RESOURCE_RETRIES);
}

#[test]
fn test_with_store_path_overrides_location() {
    let config = Config::new("id", "secret", "uri").with_store_path("/var/lib/whoop/tokens.jsonl");
    assert_eq!(config.store_path, std::path::PathBuf::from("/var/lib/whoop/tokens.jsonl"));
}

// =============================================================================
// Client Behavior Tests
// =============================================================================

#[test]
fn test_client_creation_succeeds() {
    let client = WhoopClient::new(&Config::new("id", "secret", "uri"));
    assert!(client.is_ok());
}

#[test]
fn test_server_rejects_unparseable_authorize_url() {
    let mut config = Config::for_testing("http://127.0.0.1:1");
    config.authorize_url = "not a url".to_string();
    let store: Arc<dyn TokenStore> = Arc::new(whoop_proxy::token::MemoryTokenStore::new());
    assert!(ProxyServer::new(&config, store).is_err());
}

// =============================================================================
// File Store Tests
// =============================================================================

#[tokio::test]
async fn test_file_store_write_after_crash_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("tokens.jsonl");

    {
        let store = FileTokenStore::open(&path).await.unwrap();
        store.create(&record("AT1")).await.unwrap();
    }

    // Crash mid-write leaves an unterminated fragment.
    let mut contents = std::fs::read_to_string(&path).unwrap();
    contents.push_str("{\"id\":\"trunc");
    std::fs::write(&path, contents).unwrap();

    let rotated = record("AT2");
    FileTokenStore::open(&path).await.unwrap().create(&rotated).await.unwrap();

    let reopened = FileTokenStore::open(&path).await.unwrap();
    let latest = reopened.latest().await.unwrap().unwrap();
    assert_eq!(latest.id, rotated.id);
    assert_eq!(latest.access_token, "AT2");
}

#[tokio::test]
async fn test_file_store_skips_torn_trailing_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.jsonl");

    let store = FileTokenStore::open(&path).await.unwrap();
    store.create(&record("AT1")).await.unwrap();

    let mut contents = std::fs::read_to_string(&path).unwrap();
    contents.push_str("{\"id\":\"trunc");
    std::fs::write(&path, contents).unwrap();

    let latest = store.latest().await.unwrap().unwrap();
    assert_eq!(latest.access_token, "AT1");
}

#[tokio::test]
async fn test_file_store_never_written_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTokenStore::open(dir.path().join("tokens.jsonl")).await.unwrap();
    assert!(store.latest().await.unwrap().is_none());
}
