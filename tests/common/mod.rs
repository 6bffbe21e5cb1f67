//! Helpers for integration tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use diesel::connection::SimpleConnection;
use newsletter_dispatch::db::{DbPool, apply_schema, establish_connection_pool};
use newsletter_dispatch::delivery::Dispatcher;
use newsletter_dispatch::delivery::batch_sender::BatchConfig;
use newsletter_dispatch::delivery::provider::{EmailProvider, ProviderError, Receipt};
use newsletter_dispatch::delivery::request_builder::{RequestBuilder, TemplatePersonalizer};
use newsletter_dispatch::domain::{SendRequest, UserId};
use newsletter_dispatch::repository::DieselRepository;
use newsletter_dispatch::unsubscribe::UnsubscribeLinks;
use tempfile::TempDir;

pub const BASE_URL: &str = "https://news.example.com";
pub const UNSUBSCRIBE_SECRET: &str = "unsub-secret";

/// Temporary database with the schema applied. The file lives as long as
/// the value.
pub struct TestDb {
    _dir: TempDir,
    pool: DbPool,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir.");
        let path = dir.path().join("dispatch.db");
        let pool = establish_connection_pool(path.to_str().expect("utf-8 path"))
            .expect("Failed to establish SQLite connection.");
        apply_schema(&pool).expect("Failed to apply schema.");
        TestDb { _dir: dir, pool }
    }

    #[allow(dead_code)]
    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }

    pub fn repo(&self) -> DieselRepository {
        DieselRepository::new(self.pool())
    }

    #[allow(dead_code)]
    pub fn execute(&self, sql: &str) {
        let mut conn = self.pool.get().expect("Failed to get SQLite connection.");
        conn.batch_execute(sql).expect("Failed to run SQL.");
    }

    /// Subject 1 at `sequence` with `users` active subscribers (ids 1..=users),
    /// and topic 10 scheduled at `sequence`.
    #[allow(dead_code)]
    pub fn seed_subject(&self, sequence: i32, users: i32) {
        self.execute(&format!(
            "INSERT INTO subjects (id, name, current_sequence, updated_at) \
             VALUES (1, 'Rust', {sequence}, CURRENT_TIMESTAMP);\n\
             INSERT INTO topics (id, subject_id, sequence, title) \
             VALUES (10, 1, {sequence}, 'Ownership');"
        ));
        for id in 1..=users {
            self.execute(&format!(
                "INSERT INTO users (id, email, name, created_at) \
                 VALUES ({id}, 'user{id}@example.com', NULL, CURRENT_TIMESTAMP);\n\
                 INSERT INTO subscriptions (user_id, subject_id, active, created_at, updated_at) \
                 VALUES ({id}, 1, 1, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP);"
            ));
        }
    }

    #[allow(dead_code)]
    pub fn seed_issue(&self, id: i32, status: &str, html: &str) {
        self.execute(&format!(
            "INSERT INTO issues (id, subject_id, topic_id, title, html, status, created_at) \
             VALUES ({id}, 1, 10, 'Day one', '{html}', '{status}', CURRENT_TIMESTAMP);"
        ));
    }

    #[allow(dead_code)]
    pub fn count(&self, sql: &str) -> i64 {
        use diesel::RunQueryDsl;
        use diesel::sql_types::BigInt;

        #[derive(diesel::QueryableByName)]
        struct Count {
            #[diesel(sql_type = BigInt)]
            n: i64,
        }

        let mut conn = self.pool.get().expect("Failed to get SQLite connection.");
        diesel::sql_query(sql)
            .get_result::<Count>(&mut conn)
            .expect("Failed to count rows.")
            .n
    }
}

/// Provider that records batches and fails any batch containing one of the
/// configured users.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingProvider {
    pub calls: Mutex<Vec<Vec<UserId>>>,
    pub failing: Mutex<Vec<UserId>>,
}

impl RecordingProvider {
    #[allow(dead_code)]
    pub fn failing_for(users: &[i32]) -> Self {
        Self {
            calls: Mutex::default(),
            failing: Mutex::new(users.iter().copied().map(UserId::new).collect()),
        }
    }

    #[allow(dead_code)]
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl EmailProvider for RecordingProvider {
    async fn send_batch(&self, requests: &[SendRequest]) -> Result<Vec<Receipt>, ProviderError> {
        let ids: Vec<UserId> = requests.iter().map(|r| r.user_id).collect();
        self.calls.lock().unwrap().push(ids.clone());

        let failing = self.failing.lock().unwrap();
        if ids.iter().any(|id| failing.contains(id)) {
            return Err(ProviderError::Status {
                status: 500,
                body: "boom".into(),
            });
        }
        Ok(ids
            .iter()
            .map(|id| Receipt {
                message_id: Some(format!("msg-{id}")),
            })
            .collect())
    }
}

#[allow(dead_code)]
pub fn dispatcher(
    db: &TestDb,
    provider: Arc<RecordingProvider>,
    batch_size: usize,
) -> Dispatcher<DieselRepository> {
    let links = UnsubscribeLinks::new(BASE_URL, UNSUBSCRIBE_SECRET);
    Dispatcher::new(
        Arc::new(db.repo()),
        provider,
        RequestBuilder::new("Daily <daily@example.com>".into(), None, links.clone()),
        TemplatePersonalizer::new(BASE_URL, links),
        BatchConfig {
            batch_size,
            batch_delay: std::time::Duration::ZERO,
            max_retries: 1,
            retry_delay: std::time::Duration::ZERO,
        },
        2,
    )
}
