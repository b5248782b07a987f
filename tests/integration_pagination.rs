use fleeting_server::config::DeliveryMode;
use serde_json::{Value, json};
use std::collections::HashSet;

mod common;

#[tokio::test]
async fn test_listing_walks_every_page() {
    let app = common::TestApp::spawn_with(Some(3), DeliveryMode::AtLeastOnce).await;

    let mut ids = HashSet::new();
    for i in 0..10 {
        ids.insert(app.create_ok(&json!({"username": "paged", "text": format!("m{i}")})).await);
    }

    let delivered = app.list("paged").await;
    let seen: HashSet<String> = delivered.iter().map(|m| m["id"].as_str().unwrap().to_string()).collect();

    assert_eq!(delivered.len(), 10);
    assert_eq!(seen, ids);
    assert!(app.list("paged").await.is_empty());
}

#[tokio::test]
async fn test_exact_page_multiple() {
    let app = common::TestApp::spawn_with(Some(2), DeliveryMode::AtLeastOnce).await;

    for i in 0..4 {
        app.create_ok(&json!({"username": "even", "text": format!("m{i}")})).await;
    }

    assert_eq!(app.list("even").await.len(), 4);
    assert!(app.list("even").await.is_empty());
}

#[tokio::test]
async fn test_exclusive_readers_split_messages() {
    let app = common::TestApp::spawn_with(Some(4), DeliveryMode::Exclusive).await;

    let mut ids = HashSet::new();
    for i in 0..12 {
        ids.insert(app.create_ok(&json!({"username": "shared", "text": format!("m{i}")})).await);
    }

    let (a, b) = tokio::join!(app.list("shared"), app.list("shared"));

    let collect = |messages: &[Value]| -> HashSet<String> {
        messages.iter().map(|m| m["id"].as_str().unwrap().to_string()).collect()
    };
    let (a, b) = (collect(&a), collect(&b));

    assert!(a.is_disjoint(&b));
    assert_eq!(&a | &b, ids);
}
