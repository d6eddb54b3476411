//! Integration tests for the memory-service HTTP adapter.

use serde_json::json;

use memharness::domain::models::MemoryConfig;
use memharness::domain::ports::{EntryDraft, MemoryError, MemoryService};
use memharness::infrastructure::memory::HttpMemoryService;

fn config(base_url: &str) -> MemoryConfig {
    MemoryConfig {
        base_url: base_url.to_string(),
        vault_id: "bench".to_string(),
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn test_create_memory_returns_id() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v0/vaults/bench/memories")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": "mem-42"}).to_string())
        .create_async()
        .await;

    let service = HttpMemoryService::new(&config(&server.url())).unwrap();
    let id = service
        .create_memory("trip notes", "conversation", "")
        .await
        .unwrap();
    assert_eq!(id, "mem-42");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_list_entries_passes_limit_and_parses_records() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v0/vaults/bench/memories/mem-1/entries")
        .match_query(mockito::Matcher::UrlEncoded(
            "limit".to_string(),
            "10".to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "entries": [
                    {"rawEntry": "hello", "summary": "greeting", "role": "speaker_1"}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let service = HttpMemoryService::new(&config(&server.url())).unwrap();
    let entries = service.list_entries("mem-1", 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].raw_entry, "hello");
    assert_eq!(entries[0].role, "speaker_1");
}

#[tokio::test]
async fn test_add_entry_posts_camel_case_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v0/vaults/bench/memories/mem-1/entries")
        .match_body(mockito::Matcher::PartialJson(json!({
            "rawEntry": "hello",
            "summary": "greeting",
            "role": "speaker_1"
        })))
        .with_status(202)
        .create_async()
        .await;

    let service = HttpMemoryService::new(&config(&server.url())).unwrap();
    service
        .add_entry(
            "mem-1",
            EntryDraft {
                raw_entry: "hello".to_string(),
                summary: "greeting".to_string(),
                role: "speaker_1".to_string(),
                tags: std::collections::BTreeMap::new(),
            },
        )
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_search_parses_context_snapshots() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v0/search")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "entries": [],
                "latestContext": "most recent",
                "bestContext": "highest fidelity"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let service = HttpMemoryService::new(&config(&server.url())).unwrap();
    let results = service.search("mem-1", "vacation plans", 5).await.unwrap();
    assert_eq!(results.latest_context.as_deref(), Some("most recent"));
    assert_eq!(results.best_context.as_deref(), Some("highest fidelity"));
}

#[tokio::test]
async fn test_missing_asset_maps_to_asset_missing() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v0/assets/nope")
        .with_status(404)
        .create_async()
        .await;

    let service = HttpMemoryService::new(&config(&server.url())).unwrap();
    let err = service.get_asset("nope").await.unwrap_err();
    assert!(matches!(err, MemoryError::AssetMissing(id) if id == "nope"));
}

#[tokio::test]
async fn test_backend_error_carries_status_and_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("PUT", "/v0/vaults/bench/memories/mem-1/contexts")
        .with_status(500)
        .with_body("replica down")
        .create_async()
        .await;

    let service = HttpMemoryService::new(&config(&server.url())).unwrap();
    let err = service.put_context("mem-1", "{}").await.unwrap_err();
    match err {
        MemoryError::Backend(msg) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("replica down"));
        }
        other => panic!("Expected Backend, got {other:?}"),
    }
}
