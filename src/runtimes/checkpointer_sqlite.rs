/*!
SQLite checkpoint backend.

Provides the `SQLiteCheckpointer` implementation of the
[`Checkpointer`] trait, storing each checkpoint as a row in the
`checkpoints` table with its stable JSON payload (see
[`crate::runtimes::persistence`]) plus indexed columns for id, parent,
and step.

## Behavior

- Uses the serde persistence models for encoding; this module is database
  I/O only.
- When the `sqlite-migrations` feature is enabled (default), embedded
  migrations (`sqlx::migrate!("./migrations")`) run on connect; disabling
  the feature assumes external migration orchestration.
- Checkpoint ids are zero-padded and therefore sort lexicographically in
  creation order, so `ORDER BY checkpoint_id` is history order and
  `MAX(checkpoint_id)` is the latest checkpoint.

## Storage growth

The full checkpoint tree of every thread is retained (append-only by
design — time travel depends on it). Eviction is the embedding
application's responsibility; the `created_at` columns support time-based
cleanup policies:

```bash
sqlite3 plait.db "DELETE FROM checkpoints WHERE created_at < datetime('now', '-30 days')"
sqlite3 plait.db "VACUUM"
```
*/

use std::sync::Arc;

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::instrument;

use crate::runtimes::checkpointer::{
    Checkpoint, CheckpointId, CheckpointMeta, Checkpointer, CheckpointerError, Result,
};
use crate::runtimes::persistence;

/// SQLite-backed checkpointer with full history retention.
pub struct SQLiteCheckpointer {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SQLiteCheckpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SQLiteCheckpointer").finish()
    }
}

impl SQLiteCheckpointer {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: `"sqlite://plait.db"`.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> std::result::Result<Self, CheckpointerError> {
        let pool =
            SqlitePool::connect(database_url)
                .await
                .map_err(|e| CheckpointerError::Backend {
                    message: format!("connect error: {e}"),
                })?;
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(CheckpointerError::Backend {
                    message: format!("migration failure: {e}"),
                });
            }
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn row_to_checkpoint(row: &SqliteRow) -> Result<Checkpoint> {
        let payload: String = row
            .try_get("payload_json")
            .map_err(|e| CheckpointerError::Backend {
                message: format!("payload_json read: {e}"),
            })?;
        persistence::from_json_str(&payload).map_err(|e| CheckpointerError::Serde {
            message: e.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Checkpointer for SQLiteCheckpointer {
    #[instrument(skip(self, checkpoint), err)]
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        let payload =
            persistence::to_json_string(&checkpoint).map_err(|e| CheckpointerError::Serde {
                message: e.to_string(),
            })?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("tx begin: {e}"),
            })?;

        sqlx::query(
            r#"
            INSERT INTO threads (id) VALUES (?1)
            ON CONFLICT(id) DO UPDATE SET updated_at = datetime('now')
            "#,
        )
        .bind(&checkpoint.thread_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("insert thread: {e}"),
        })?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO checkpoints (
                thread_id,
                checkpoint_id,
                parent_checkpoint_id,
                step_index,
                payload_json,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&checkpoint.thread_id)
        .bind(checkpoint.id.as_str())
        .bind(checkpoint.parent_id.as_ref().map(CheckpointId::as_str))
        .bind(checkpoint.step as i64)
        .bind(&payload)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("insert checkpoint: {e}"),
        })?;

        tx.commit().await.map_err(|e| CheckpointerError::Backend {
            message: format!("tx commit: {e}"),
        })?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get(
        &self,
        thread_id: &str,
        checkpoint_id: Option<&CheckpointId>,
    ) -> Result<Option<Checkpoint>> {
        let row_opt: Option<SqliteRow> = match checkpoint_id {
            Some(id) => sqlx::query(
                r#"
                SELECT payload_json FROM checkpoints
                WHERE thread_id = ?1 AND checkpoint_id = ?2
                "#,
            )
            .bind(thread_id)
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("select checkpoint: {e}"),
            })?,
            None => sqlx::query(
                r#"
                SELECT payload_json FROM checkpoints
                WHERE thread_id = ?1
                ORDER BY checkpoint_id DESC
                LIMIT 1
                "#,
            )
            .bind(thread_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("select latest: {e}"),
            })?,
        };

        match (row_opt, checkpoint_id) {
            (Some(row), _) => Ok(Some(Self::row_to_checkpoint(&row)?)),
            (None, Some(id)) => Err(CheckpointerError::NotFound {
                thread_id: thread_id.to_string(),
                checkpoint_id: id.to_string(),
            }),
            (None, None) => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn list(&self, thread_id: &str) -> Result<Vec<CheckpointMeta>> {
        let rows = sqlx::query(
            r#"
            SELECT checkpoint_id, parent_checkpoint_id, step_index, created_at
            FROM checkpoints
            WHERE thread_id = ?1
            ORDER BY checkpoint_id ASC
            "#,
        )
        .bind(thread_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("list checkpoints: {e}"),
        })?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("checkpoint_id");
                let parent: Option<String> = row.get("parent_checkpoint_id");
                let step: i64 = row.get("step_index");
                let created_at: String = row.get("created_at");
                let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .map_err(|e| CheckpointerError::Serde {
                        message: format!("created_at parse: {e}"),
                    })?;
                Ok(CheckpointMeta {
                    id: CheckpointId::from_string(id),
                    parent_id: parent.map(CheckpointId::from_string),
                    step: step as u64,
                    created_at,
                })
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn list_threads(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(r#"SELECT id FROM threads ORDER BY id ASC"#)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("list threads: {e}"),
            })?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}
