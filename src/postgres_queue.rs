use crate::MineError;
use crate::queue::{QueueBackendLike, WorkItem};
use postgres::error::SqlState;
use postgres::{Client, NoTls};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS work_items (
    id          BIGSERIAL PRIMARY KEY,
    queue       TEXT NOT NULL,
    payload     TEXT NOT NULL,
    lease_token TEXT,
    visible_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS work_items_leasable ON work_items (queue, visible_at, id);
";

const LEASE_SQL: &str = "
UPDATE work_items
   SET lease_token = $2,
       visible_at = now() + make_interval(secs => $3)
 WHERE id = (
       SELECT id FROM work_items
        WHERE queue = $1 AND visible_at <= now()
        ORDER BY id
          FOR UPDATE SKIP LOCKED
        LIMIT 1)
RETURNING id, payload";

/// Queue table shared by every worker. `SKIP LOCKED` keeps concurrent
/// leasers off each other's rows; an expired `visible_at` makes a row
/// leasable again.
///
/// Wraps the blocking `postgres` client, so every call hops onto a blocking
/// thread. Construct and drop it outside the async runtime.
pub struct PostgresQueue {
    client: Arc<Mutex<Client>>,
    queue: String,
}

impl PostgresQueue {
    pub fn connect(database_url: &str, queue: &str) -> Result<Self, MineError> {
        let mut client = Client::connect(database_url, NoTls).map_err(classify)?;
        client.batch_execute(SCHEMA).map_err(classify)?;
        info!(queue, "connected to postgres work queue");
        Ok(Self { client: Arc::new(Mutex::new(client)), queue: queue.to_string() })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    async fn run<T, F>(&self, op: F) -> Result<T, MineError>
    where
        F: FnOnce(&mut Client, &str) -> Result<T, MineError> + Send + 'static,
        T: Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let queue = self.queue.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = client
                .lock()
                .map_err(|_| MineError::Queue("postgres client lock poisoned".to_string()))?;
            op(&mut guard, &queue)
        })
        .await?
    }
}

/// Connection-level failures and serialization conflicts are transient;
/// anything else the server rejected is not.
fn classify(e: postgres::Error) -> MineError {
    match e.code() {
        None => MineError::Queue(e.to_string()),
        Some(code) if *code == SqlState::T_R_SERIALIZATION_FAILURE || *code == SqlState::T_R_DEADLOCK_DETECTED => {
            MineError::Queue(e.to_string())
        }
        Some(_) => MineError::Other(format!("postgres: {}", e)),
    }
}

impl QueueBackendLike for PostgresQueue {
    async fn lease(&self, visibility_timeout: Duration) -> Result<Option<WorkItem>, MineError> {
        let token = uuid::Uuid::new_v4().to_string();
        let secs = visibility_timeout.as_secs_f64();
        self.run(move |client, queue| {
            let row = client.query_opt(LEASE_SQL, &[&queue, &token, &secs]).map_err(classify)?;
            Ok(row.map(|row| {
                let id: i64 = row.get(0);
                WorkItem { id: id as u64, lease_token: token, payload: row.get(1) }
            }))
        })
        .await
    }

    async fn ack(&self, item: &WorkItem) -> Result<(), MineError> {
        let item = item.clone();
        self.run(move |client, queue| {
            let deleted = client
                .execute(
                    "DELETE FROM work_items WHERE queue = $1 AND id = $2 AND lease_token = $3",
                    &[&queue, &(item.id as i64), &item.lease_token],
                )
                .map_err(classify)?;
            if deleted == 0 {
                return Err(MineError::LeaseExpiredOnAck(format!("item {} ({})", item.id, item.payload)));
            }
            Ok(())
        })
        .await
    }

    async fn create(&self, payload: &str) -> Result<u64, MineError> {
        let payload = payload.to_string();
        self.run(move |client, queue| {
            let row = client
                .query_one(
                    "INSERT INTO work_items (queue, payload) VALUES ($1, $2) RETURNING id",
                    &[&queue, &payload],
                )
                .map_err(classify)?;
            let id: i64 = row.get(0);
            Ok(id as u64)
        })
        .await
    }

    async fn pending_count(&self) -> Result<usize, MineError> {
        self.run(|client, queue| {
            let row = client
                .query_one("SELECT count(*) FROM work_items WHERE queue = $1", &[&queue])
                .map_err(classify)?;
            let count: i64 = row.get(0);
            Ok(count as usize)
        })
        .await
    }
}
