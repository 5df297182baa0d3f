use plait::store::{InMemoryStore, IndexPolicy, Namespace, SearchQuery, Store};
use plait::utils::collections::update_map;
use serde_json::json;

fn ns(segments: &[&str]) -> Namespace {
    Namespace::new(segments.iter().copied())
}

#[tokio::test]
async fn put_get_delete_round_trip() {
    let store = InMemoryStore::new();
    let users = ns(&["users", "alice"]);

    store
        .put(&users, "profile", json!({"bio": "writes rust"}), IndexPolicy::Default)
        .await
        .unwrap();

    let item = store.get(&users, "profile").await.unwrap().unwrap();
    assert_eq!(item.value, json!({"bio": "writes rust"}));
    assert_eq!(item.key, "profile");

    assert!(store.delete(&users, "profile").await.unwrap());
    assert!(!store.delete(&users, "profile").await.unwrap());
    assert!(store.get(&users, "profile").await.unwrap().is_none());
}

#[tokio::test]
async fn overwrite_updates_value_and_timestamp() {
    let store = InMemoryStore::new();
    let memories = ns(&["memories"]);

    store
        .put(&memories, "m1", json!({"text": "old"}), IndexPolicy::Default)
        .await
        .unwrap();
    let first = store.get(&memories, "m1").await.unwrap().unwrap();

    store
        .put(&memories, "m1", json!({"text": "new"}), IndexPolicy::Default)
        .await
        .unwrap();
    let second = store.get(&memories, "m1").await.unwrap().unwrap();

    assert_eq!(second.value, json!({"text": "new"}));
    assert_eq!(first.created_at, second.created_at);
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
async fn search_ranks_by_term_overlap() {
    let store = InMemoryStore::new();
    let notes = ns(&["notes"]);

    store
        .put(&notes, "geese", json!({"text": "geese honk at geese"}), IndexPolicy::Default)
        .await
        .unwrap();
    store
        .put(&notes, "mixed", json!({"text": "geese and ducks"}), IndexPolicy::Default)
        .await
        .unwrap();
    store
        .put(&notes, "ducks", json!({"text": "ducks quack"}), IndexPolicy::Default)
        .await
        .unwrap();

    let hits = store
        .search(&notes, &SearchQuery::text("geese honk").with_limit(10))
        .await
        .unwrap();
    assert_eq!(hits[0].item.key, "geese");
    assert!(hits[0].score > hits[1].score);
    assert!(hits.iter().all(|h| h.item.key != "ducks"));
}

#[tokio::test]
async fn search_respects_namespace_boundaries() {
    let store = InMemoryStore::new();
    store
        .put(&ns(&["a"]), "k", json!({"text": "shared term"}), IndexPolicy::Default)
        .await
        .unwrap();
    store
        .put(&ns(&["a", "nested"]), "k2", json!({"text": "shared term"}), IndexPolicy::Default)
        .await
        .unwrap();
    store
        .put(&ns(&["b"]), "k3", json!({"text": "shared term"}), IndexPolicy::Default)
        .await
        .unwrap();

    let hits = store
        .search(&ns(&["a"]), &SearchQuery::text("shared"))
        .await
        .unwrap();
    // Namespace "a" and its descendants, never "b".
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.item.namespace.starts_with(&ns(&["a"]))));
}

#[tokio::test]
async fn field_selective_indexing_limits_what_is_searchable() {
    let store = InMemoryStore::new();
    let docs = ns(&["docs"]);
    store
        .put(
            &docs,
            "d1",
            json!({"title": "quarterly report", "body": "secret sauce"}),
            IndexPolicy::Fields(vec!["title".to_string()]),
        )
        .await
        .unwrap();

    let by_title = store.search(&docs, &SearchQuery::text("quarterly")).await.unwrap();
    assert_eq!(by_title.len(), 1);

    let by_body = store.search(&docs, &SearchQuery::text("secret")).await.unwrap();
    assert!(by_body.is_empty());
}

#[tokio::test]
async fn skip_policy_excludes_entry_from_search_but_not_get() {
    let store = InMemoryStore::new();
    let docs = ns(&["docs"]);
    store
        .put(&docs, "hidden", json!({"text": "findable words"}), IndexPolicy::Skip)
        .await
        .unwrap();

    assert!(store.get(&docs, "hidden").await.unwrap().is_some());
    let hits = store.search(&docs, &SearchQuery::text("findable")).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn filter_constrains_hits_to_matching_fields() {
    let store = InMemoryStore::new();
    let tickets = ns(&["tickets"]);
    store
        .put(
            &tickets,
            "t1",
            json!({"text": "printer broken", "status": "open"}),
            IndexPolicy::Default,
        )
        .await
        .unwrap();
    store
        .put(
            &tickets,
            "t2",
            json!({"text": "printer fixed", "status": "closed"}),
            IndexPolicy::Default,
        )
        .await
        .unwrap();

    let hits = store
        .search(
            &tickets,
            &SearchQuery::text("printer").with_filter(update_map([("status", json!("open"))])),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.key, "t1");
}

#[tokio::test]
async fn list_namespaces_reports_each_once() {
    let store = InMemoryStore::new();
    store
        .put(&ns(&["a"]), "k1", json!(1), IndexPolicy::Skip)
        .await
        .unwrap();
    store
        .put(&ns(&["a"]), "k2", json!(2), IndexPolicy::Skip)
        .await
        .unwrap();
    store
        .put(&ns(&["b", "c"]), "k3", json!(3), IndexPolicy::Skip)
        .await
        .unwrap();

    let namespaces = store.list_namespaces().await.unwrap();
    assert_eq!(namespaces, vec![ns(&["a"]), ns(&["b", "c"])]);
}
