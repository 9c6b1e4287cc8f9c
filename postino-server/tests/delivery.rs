mod common;

use anyhow::Result;
use common::{fresh_pool, memory_cache, FailingCache, FailingDirectory, RecordingCache};
use postino_core::{
    ChannelKind, Limits, NewMessage, ReadSource, SendDirectRequest, SendGroupRequest,
};
use postino_server::cache::{MemoryCache, RecencyCache};
use postino_server::config::FanoutPolicy;
use postino_server::directory::{Directory, SqliteDirectory};
use postino_server::dispatch::Dispatcher;
use postino_server::read::ReadCoordinator;
use postino_server::store::{MessageStore, SqliteStore};
use postino_server::{ErrorKind, ServiceError};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use time::{Duration as TimeDelta, OffsetDateTime};

struct Fixture {
    store: Arc<SqliteStore>,
    directory: Arc<SqliteDirectory>,
    dispatcher: Dispatcher,
    reader: ReadCoordinator,
}

fn wire(pool: &SqlitePool, cache: Arc<dyn RecencyCache>, policy: FanoutPolicy) -> Fixture {
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let directory = Arc::new(SqliteDirectory::new(pool.clone()));
    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::clone(&cache),
        directory.clone(),
        policy,
        Limits::default(),
    );
    let reader = ReadCoordinator::new(store.clone(), cache);
    Fixture {
        store,
        directory,
        dispatcher,
        reader,
    }
}

fn direct(sender: &str, recipient: &str, text: &str) -> SendDirectRequest {
    SendDirectRequest {
        sender_id: sender.to_string(),
        recipient_id: recipient.to_string(),
        text: text.to_string(),
    }
}

fn group(sender: &str, group_id: &str, text: &str) -> SendGroupRequest {
    SendGroupRequest {
        sender_id: sender.to_string(),
        group_id: group_id.to_string(),
        text: text.to_string(),
    }
}

fn t(secs: i64) -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH + TimeDelta::seconds(1_700_000_000 + secs)
}

#[tokio::test]
async fn blocked_sender_is_refused_and_nothing_is_stored() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = Arc::new(RecordingCache::new());
    let fx = wire(&pool, cache.clone(), FanoutPolicy::Strict);
    fx.directory.set_block("bob", "alice", true).await?;

    let err = fx
        .dispatcher
        .send_direct(&direct("alice", "bob", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccessDenied { .. }));
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
    assert!(!err.is_retryable());

    let stored = fx.store.query_messages_since("bob", OffsetDateTime::UNIX_EPOCH).await?;
    assert!(stored.is_empty());
    assert_eq!(cache.pushes_for("bob"), 0);

    // the block is one-directional
    fx.dispatcher.send_direct(&direct("bob", "alice", "why?")).await?;
    // and lifting it lets messages through again
    fx.directory.set_block("bob", "alice", false).await?;
    fx.dispatcher.send_direct(&direct("alice", "bob", "hi")).await?;
    assert_eq!(cache.pushes_for("bob"), 1);
    Ok(())
}

async fn stored_messages(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM messages").fetch_one(pool).await?)
}

#[tokio::test]
async fn failed_block_lookup_refuses_the_direct_send() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = Arc::new(RecordingCache::new());
    let dispatcher = Dispatcher::new(
        Arc::new(SqliteStore::new(pool.clone())),
        cache.clone(),
        Arc::new(FailingDirectory),
        FanoutPolicy::Strict,
        Limits::default(),
    );

    let err = dispatcher
        .send_direct(&direct("alice", "bob", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Database(_)));
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(stored_messages(&pool).await?, 0);
    assert!(cache.pushes.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_membership_lookup_refuses_the_group_send() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = Arc::new(RecordingCache::new());
    let dispatcher = Dispatcher::new(
        Arc::new(SqliteStore::new(pool.clone())),
        cache.clone(),
        Arc::new(FailingDirectory),
        FanoutPolicy::Strict,
        Limits::default(),
    );

    let err = dispatcher
        .send_group(&group("alice", "g", "hi all"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert!(err.is_retryable());
    assert_eq!(stored_messages(&pool).await?, 0);
    assert!(cache.pushes.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn group_send_pushes_once_per_member_except_sender() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = Arc::new(RecordingCache::new());
    let fx = wire(&pool, cache.clone(), FanoutPolicy::Strict);
    let g = fx.directory.create_group("bambis").await?;
    for user in ["a", "b", "c"] {
        fx.directory.set_membership(&g.group_id, user, true).await?;
    }
    // adding twice does not duplicate the member
    fx.directory.set_membership(&g.group_id, "b", true).await?;

    let message = fx.dispatcher.send_group(&group("a", &g.group_id, "hello_group")).await?;

    assert_eq!(cache.pushes_for("a"), 0);
    assert_eq!(cache.pushes_for("b"), 1);
    assert_eq!(cache.pushes_for("c"), 1);
    assert!(cache
        .pushes
        .lock()
        .unwrap()
        .iter()
        .all(|(_, id)| id == &message.message_id));

    let for_b = fx.store.query_messages_since("b", OffsetDateTime::UNIX_EPOCH).await?;
    assert_eq!(for_b.len(), 1);
    assert_eq!(for_b[0].channel_kind, ChannelKind::Group);
    assert_eq!(for_b[0].sender_id, "a");
    Ok(())
}

#[tokio::test]
async fn group_with_no_members_still_persists() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = Arc::new(RecordingCache::new());
    let fx = wire(&pool, cache.clone(), FanoutPolicy::Strict);
    assert!(fx.directory.list_group_members("ghost").await?.is_empty());

    fx.dispatcher.send_group(&group("a", "ghost", "anyone?")).await?;
    assert!(cache.pushes.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn twenty_one_sends_leave_the_newest_twenty_cached() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = memory_cache();
    let fx = wire(&pool, cache.clone(), FanoutPolicy::Strict);

    for i in 1..=21 {
        fx.dispatcher
            .send_direct(&direct("alice", "bob", &format!("P{i}")))
            .await?;
    }

    let window = cache.read("bob").await?;
    let texts: Vec<&str> = window.iter().map(|s| s.text.as_str()).collect();
    let expected: Vec<String> = (2..=21).rev().map(|i| format!("P{i}")).collect();
    assert_eq!(texts, expected);
    Ok(())
}

#[tokio::test]
async fn cache_answer_matches_store_answer_when_window_covers() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = memory_cache();
    let fx = wire(&pool, cache.clone(), FanoutPolicy::Strict);
    let g = fx.directory.create_group("friends").await?;
    fx.directory.set_membership(&g.group_id, "bob", true).await?;

    let mut sent = Vec::new();
    for i in 0..6 {
        let m = if i % 2 == 0 {
            fx.dispatcher.send_direct(&direct("alice", "bob", &format!("d{i}"))).await?
        } else {
            fx.dispatcher.send_group(&group("carol", &g.group_id, &format!("g{i}"))).await?
        };
        sent.push(m);
        // distinct timestamps keep the tie order out of the comparison
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // the oldest cached entry is at or before the threshold: cache is enough
    let min = sent[0].timestamp;
    let first = fx.reader.read("bob", min).await?;
    assert_eq!(first.source, ReadSource::Cache);
    let from_store = fx.store.query_messages_since("bob", min).await?;
    assert_eq!(first.messages, from_store);

    let min = sent[3].timestamp;
    let partial = fx.reader.read("bob", min).await?;
    assert_eq!(partial.source, ReadSource::Cache);
    assert_eq!(partial.messages.len(), 3);
    assert_eq!(partial.messages, fx.store.query_messages_since("bob", min).await?);

    // same question twice, no writes in between: same answer
    let again = fx.reader.read("bob", min).await?;
    assert_eq!(again, partial);
    Ok(())
}

#[tokio::test]
async fn own_group_message_is_in_neither_cache_nor_store_answer() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = memory_cache();
    let fx = wire(&pool, cache.clone(), FanoutPolicy::Strict);
    let g = fx.directory.create_group("g").await?;
    for user in ["alice", "bob"] {
        fx.directory.set_membership(&g.group_id, user, true).await?;
    }

    let first = fx.dispatcher.send_direct(&direct("alice", "bob", "hi")).await?;
    tokio::time::sleep(Duration::from_millis(2)).await;
    fx.dispatcher.send_group(&group("bob", &g.group_id, "own")).await?;

    let via_cache = fx.reader.read("bob", first.timestamp).await?;
    assert_eq!(via_cache.source, ReadSource::Cache);
    let from_store = fx.store.query_messages_since("bob", first.timestamp).await?;
    assert_eq!(via_cache.messages, from_store);
    assert_eq!(from_store.len(), 1);
    assert_eq!(from_store[0].text, "hi");

    // alice still gets bob's group message from the store
    let for_alice = fx.store.query_messages_since("alice", first.timestamp).await?;
    let texts: Vec<&str> = for_alice.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, ["own"]);
    Ok(())
}

#[tokio::test]
async fn equal_timestamps_come_back_in_the_same_order_from_cache_and_store() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = memory_cache();
    let fx = wire(&pool, cache.clone(), FanoutPolicy::Strict);

    // arrival order differs from message id order
    for id in ["id-2", "id-3", "id-1"] {
        let m = fx
            .store
            .persist(NewMessage::direct("alice", "bob", id).with_id(id).with_timestamp(t(5)))
            .await?;
        cache.push("bob", m.summary()).await?;
    }

    let outcome = fx.reader.read("bob", t(5)).await?;
    assert_eq!(outcome.source, ReadSource::Cache);
    assert_eq!(outcome.messages, fx.store.query_messages_since("bob", t(5)).await?);
    let ids: Vec<&str> = outcome.messages.iter().map(|s| s.message_id.as_str()).collect();
    assert_eq!(ids, ["id-3", "id-2", "id-1"]);
    Ok(())
}

#[tokio::test]
async fn read_older_than_the_window_goes_to_the_store() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = memory_cache();
    let fx = wire(&pool, cache.clone(), FanoutPolicy::Strict);

    // ten messages in the store, only the last five (oldest at t=100) cached
    for i in 0..10 {
        let m = fx
            .store
            .persist(NewMessage::direct("alice", "u", &format!("m{i}")).with_timestamp(t(i * 20 - 80)))
            .await?;
        if m.timestamp >= t(20) {
            cache.push("u", m.summary()).await?;
        }
    }
    assert_eq!(cache.read("u").await?.last().map(|s| s.timestamp), Some(t(20)));

    let min = t(-30);
    let outcome = fx.reader.read("u", min).await?;
    assert_eq!(outcome.source, ReadSource::Store);
    assert_eq!(outcome.messages, fx.store.query_messages_since("u", min).await?);
    assert_eq!(outcome.messages.len(), 7);
    assert!(outcome
        .messages
        .windows(2)
        .all(|w| w[0].timestamp >= w[1].timestamp));
    Ok(())
}

#[tokio::test]
async fn empty_cache_falls_back_to_store() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let fx = wire(&pool, memory_cache(), FanoutPolicy::Strict);
    fx.store
        .persist(NewMessage::direct("alice", "bob", "written before the cache existed"))
        .await?;

    let outcome = fx.reader.read("bob", OffsetDateTime::UNIX_EPOCH).await?;
    assert_eq!(outcome.source, ReadSource::Store);
    assert_eq!(outcome.messages.len(), 1);
    Ok(())
}

#[tokio::test]
async fn expired_cache_reads_as_a_miss() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = Arc::new(MemoryCache::new(20, Duration::from_millis(50)));
    let fx = wire(&pool, cache.clone(), FanoutPolicy::Strict);
    let m = fx.dispatcher.send_direct(&direct("alice", "bob", "hi")).await?;

    assert_eq!(fx.reader.read("bob", m.timestamp).await?.source, ReadSource::Cache);
    tokio::time::sleep(Duration::from_millis(120)).await;
    let outcome = fx.reader.read("bob", m.timestamp).await?;
    assert_eq!(outcome.source, ReadSource::Store);
    assert_eq!(outcome.messages.len(), 1);
    Ok(())
}

#[tokio::test]
async fn strict_fanout_reports_cache_failure_but_keeps_the_message() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let fx = wire(&pool, Arc::new(FailingCache), FanoutPolicy::Strict);

    let err = fx
        .dispatcher
        .send_direct(&direct("alice", "bob", "hi"))
        .await
        .unwrap_err();
    let message_id = match &err {
        ServiceError::FanoutDegraded {
            message_id, failed, ..
        } => {
            assert_eq!(*failed, 1);
            message_id.clone()
        }
        other => panic!("expected FanoutDegraded, got {other:?}"),
    };
    assert_eq!(err.kind(), ErrorKind::Cache);
    assert!(err.is_retryable());

    // delivered all the same, and reads survive a dead cache
    let outcome = fx.reader.read("bob", OffsetDateTime::UNIX_EPOCH).await?;
    assert_eq!(outcome.source, ReadSource::Store);
    assert_eq!(outcome.messages.len(), 1);
    assert_eq!(outcome.messages[0].message_id, message_id);
    Ok(())
}

#[tokio::test]
async fn best_effort_fanout_swallows_cache_failure() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let fx = wire(&pool, Arc::new(FailingCache), FanoutPolicy::BestEffort);
    let g = fx.directory.create_group("g").await?;
    for user in ["a", "b", "c"] {
        fx.directory.set_membership(&g.group_id, user, true).await?;
    }

    let message = fx.dispatcher.send_group(&group("a", &g.group_id, "hi all")).await?;
    let for_c = fx.store.query_messages_since("c", OffsetDateTime::UNIX_EPOCH).await?;
    assert_eq!(for_c[0].message_id, message.message_id);
    Ok(())
}

#[tokio::test]
async fn invalid_request_has_no_side_effects() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = Arc::new(RecordingCache::new());
    let fx = wire(&pool, cache.clone(), FanoutPolicy::Strict);

    let err = fx.dispatcher.send_direct(&direct("alice", "", "hi")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = fx
        .dispatcher
        .send_direct(&direct("alice", "bob", &"x".repeat(256)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(stored_messages(&pool).await?, 0);
    assert!(cache.pushes.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn duplicate_message_id_is_a_persistence_error() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let store = SqliteStore::new(pool.clone());
    store
        .persist(NewMessage::direct("alice", "bob", "first").with_id("fixed"))
        .await?;

    // same id on the other channel is still a clash
    let err = store
        .persist(NewMessage::group("carol", "g", "second").with_id("fixed"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateMessage(ref id) if id == "fixed"));
    assert_eq!(err.kind(), ErrorKind::Persistence);

    let stored = store.query_messages_since("bob", OffsetDateTime::UNIX_EPOCH).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].text, "first");
    Ok(())
}

#[tokio::test]
async fn store_query_merges_both_channels_by_threshold() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let store = SqliteStore::new(pool.clone());
    let directory = SqliteDirectory::new(pool.clone());
    directory.set_membership("g1", "bob", true).await?;

    store.persist(NewMessage::direct("alice", "bob", "old").with_timestamp(t(0))).await?;
    store.persist(NewMessage::direct("alice", "bob", "new").with_timestamp(t(30))).await?;
    store.persist(NewMessage::group("carol", "g1", "group").with_timestamp(t(20))).await?;
    // not for bob
    store.persist(NewMessage::direct("alice", "dave", "other").with_timestamp(t(25))).await?;
    store.persist(NewMessage::group("carol", "g2", "elsewhere").with_timestamp(t(25))).await?;

    let got = store.query_messages_since("bob", t(10)).await?;
    let texts: Vec<&str> = got.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, ["new", "group"]);

    // threshold is inclusive
    let got = store.query_messages_since("bob", t(20)).await?;
    assert_eq!(got.len(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_to_one_recipient_stay_bounded_and_ordered() -> Result<()> {
    let (_td, pool) = fresh_pool().await?;
    let cache = memory_cache();
    let fx = Arc::new(wire(&pool, cache.clone(), FanoutPolicy::Strict));

    let mut tasks = Vec::new();
    for i in 0..40 {
        let fx = Arc::clone(&fx);
        tasks.push(tokio::spawn(async move {
            fx.dispatcher
                .send_direct(&direct(&format!("s{i}"), "bob", "ping"))
                .await
        }));
    }
    for task in tasks {
        task.await??;
    }

    let window = cache.read("bob").await?;
    assert_eq!(window.len(), 20);
    assert!(window.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

    // the window is exactly the 20 newest stored messages
    let all = fx.store.query_messages_since("bob", OffsetDateTime::UNIX_EPOCH).await?;
    assert_eq!(all.len(), 40);
    let oldest_cached = window[19].timestamp;
    assert!(all[20..].iter().all(|s| s.timestamp <= oldest_cached));
    Ok(())
}
