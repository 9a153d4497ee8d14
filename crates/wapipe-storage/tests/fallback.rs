// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FallbackStore degradation behaviour.

use std::sync::Arc;

use chrono::{Duration, Utc};
use wapipe_core::{MessageFilter, MessageOrder, MessagePatch, MessageStatus, MessageStore};
use wapipe_storage::{FallbackStore, InMemoryStore, SqliteStore};
use wapipe_test_utils::fixtures::queued_message;

#[tokio::test]
async fn reads_merge_primary_and_fallback() {
    let primary = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let fallback = Arc::new(InMemoryStore::new());
    let store = FallbackStore::new(primary.clone(), fallback.clone());

    let now = Utc::now();
    let mut durable = queued_message("durable", "acme", now + Duration::seconds(1));
    durable.priority = wapipe_core::Priority::Low;
    primary.create(&durable).await.unwrap();
    fallback
        .create(&queued_message("stranded", "acme", now))
        .await
        .unwrap();

    let all = store
        .find_many(&MessageFilter::default(), MessageOrder::Dispatch, None)
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["stranded", "durable"]);

    // An update for a message only the fallback holds lands there.
    assert!(
        store
            .update("stranded", &MessagePatch::status(MessageStatus::Failed))
            .await
            .unwrap()
    );
    let stranded = fallback
        .find_many(&MessageFilter::by_id("stranded"), MessageOrder::Dispatch, None)
        .await
        .unwrap();
    assert_eq!(stranded[0].status, MessageStatus::Failed);
    assert_eq!(store.count(&MessageFilter::default()).await.unwrap(), 2);
}

#[tokio::test]
async fn prune_touches_only_the_fallback() {
    let primary = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let fallback = Arc::new(InMemoryStore::new());
    let store = FallbackStore::new(primary.clone(), fallback.clone());

    let old = Utc::now() - Duration::days(3);
    let targets: [(&str, &dyn MessageStore); 2] =
        [("p", primary.as_ref()), ("f", fallback.as_ref())];
    for (id, target) in targets {
        let mut m = queued_message(id, "acme", old);
        m.status = MessageStatus::Sent;
        m.processed_at = Some(old);
        target.create(&m).await.unwrap();
    }

    let pruned = store.prune_terminal(Utc::now()).await.unwrap();
    assert_eq!(pruned, 1);
    assert!(fallback.is_empty());
    assert_eq!(primary.count(&MessageFilter::default()).await.unwrap(), 1);
}
