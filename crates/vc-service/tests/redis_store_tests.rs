//! Behaviour of the Redis record store against a live server.
//!
//! These tests run only when `REDIS_URL` is set, for example:
//!
//! ```text
//! REDIS_URL=redis://localhost:6379 cargo test -p vc-service --test redis_store_tests
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use vc_service::repositories::{PutOutcome, RecordStore, RedisRecordStore};

struct RedisFixture {
    store: RedisRecordStore,
    connection: redis::aio::MultiplexedConnection,
    prefix: String,
}

impl RedisFixture {
    /// Connect to `REDIS_URL`, or return `None` when it is not set.
    async fn connect() -> Option<Self> {
        let Ok(url) = std::env::var("REDIS_URL") else {
            eprintln!("REDIS_URL not set, skipping Redis store test");
            return None;
        };

        let store = RedisRecordStore::connect(&url).await.unwrap();
        let connection = redis::Client::open(url.as_str())
            .unwrap()
            .get_multiplexed_async_connection()
            .await
            .unwrap();

        Some(Self {
            store,
            connection,
            prefix: format!("vc-test:{}", uuid::Uuid::new_v4()),
        })
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{name}", self.prefix)
    }

    async fn raw_set(&self, key: &str, value: &str) {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .unwrap();
    }

    async fn cleanup(&self, names: &[&str]) {
        let mut conn = self.connection.clone();
        for name in names {
            let key = self.key(name);
            let _: () = redis::cmd("DEL")
                .arg(&key)
                .arg(format!("{key}:version"))
                .query_async(&mut conn)
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn test_put_if_absent_creates_once() {
    let Some(fx) = RedisFixture::connect().await else {
        return;
    };
    let key = fx.key("absent");

    let first = fx.store.put_if_version(&key, "a", None).await.unwrap();
    let second = fx.store.put_if_version(&key, "b", None).await.unwrap();

    assert_eq!(first, PutOutcome::Written { version: 1 });
    assert_eq!(second, PutOutcome::Conflict);
    let stored = fx.store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.value, "a");
    assert_eq!(stored.version, 1);

    fx.cleanup(&["absent"]).await;
}

#[tokio::test]
async fn test_put_with_matching_version_advances_it() {
    let Some(fx) = RedisFixture::connect().await else {
        return;
    };
    let key = fx.key("match");
    fx.store.put_if_version(&key, "v1", None).await.unwrap();

    let outcome = fx.store.put_if_version(&key, "v2", Some(1)).await.unwrap();

    assert_eq!(outcome, PutOutcome::Written { version: 2 });
    let stored = fx.store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.value, "v2");
    assert_eq!(stored.version, 2);

    fx.cleanup(&["match"]).await;
}

#[tokio::test]
async fn test_put_with_stale_version_conflicts() {
    let Some(fx) = RedisFixture::connect().await else {
        return;
    };
    let key = fx.key("mismatch");
    fx.store.put_if_version(&key, "v1", None).await.unwrap();
    fx.store.put_if_version(&key, "v2", Some(1)).await.unwrap();

    let outcome = fx.store.put_if_version(&key, "lost", Some(1)).await.unwrap();

    assert_eq!(outcome, PutOutcome::Conflict);
    assert_eq!(fx.store.get(&key).await.unwrap().unwrap().value, "v2");

    // Expecting a version on a key that does not exist also conflicts
    let missing = fx.key("missing");
    let outcome = fx.store.put_if_version(&missing, "x", Some(1)).await.unwrap();
    assert_eq!(outcome, PutOutcome::Conflict);
    assert!(fx.store.get(&missing).await.unwrap().is_none());

    fx.cleanup(&["mismatch", "missing"]).await;
}

#[tokio::test]
async fn test_legacy_value_without_version_reads_as_zero() {
    let Some(fx) = RedisFixture::connect().await else {
        return;
    };
    let key = fx.key("legacy");
    fx.raw_set(&key, "mock-meeting-id").await;

    let stored = fx.store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.value, "mock-meeting-id");
    assert_eq!(stored.version, 0);

    assert_eq!(
        fx.store.put_if_version(&key, "x", None).await.unwrap(),
        PutOutcome::Conflict
    );
    assert_eq!(
        fx.store.put_if_version(&key, "real-1", Some(0)).await.unwrap(),
        PutOutcome::Written { version: 1 }
    );

    fx.cleanup(&["legacy"]).await;
}

#[tokio::test]
async fn test_unconditional_put_bumps_version() {
    let Some(fx) = RedisFixture::connect().await else {
        return;
    };
    let key = fx.key("put");

    assert_eq!(fx.store.put(&key, "a").await.unwrap(), 1);
    assert_eq!(fx.store.put(&key, "b").await.unwrap(), 2);
    let stored = fx.store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.value, "b");
    assert_eq!(stored.version, 2);

    fx.store.ping().await.unwrap();
    fx.cleanup(&["put"]).await;
}
