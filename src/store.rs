use sqlx::SqlitePool;

use crate::{UserId, error::Result};

/// Durable state: the nickname table, the append-only message log, and the
/// append-only pinned log. Writes are synchronous with the mutation that
/// causes them, so nothing needs flushing at shutdown.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct PinnedEntry {
    pub message_id: i64,
    pub sender: UserId,
    pub kind: String,
    pub text: String,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS members (
                id INTEGER PRIMARY KEY,
                nickname TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender INTEGER NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                reply_target INTEGER,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pinned (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL,
                sender INTEGER NOT NULL,
                kind TEXT NOT NULL,
                text TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_member(&self, id: UserId, nickname: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO members (id,nickname) VALUES (?,?)
             ON CONFLICT(id) DO UPDATE SET nickname=excluded.nickname",
        )
        .bind(id)
        .bind(nickname)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_nickname(&self, id: UserId) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT nickname FROM members WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(nickname,)| nickname))
    }

    pub async fn load_members(&self) -> Result<Vec<(UserId, String)>> {
        Ok(sqlx::query_as("SELECT id,nickname FROM members")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Appends one Message Record and returns its sequence id. Records are
    /// immutable once written.
    pub async fn append_message(
        &self,
        sender: UserId,
        kind: &str,
        payload: &str,
        reply_target: Option<i64>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO messages (sender,kind,payload,reply_target) VALUES (?,?,?,?)",
        )
        .bind(sender)
        .bind(kind)
        .bind(payload)
        .bind(reply_target)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn append_pinned(
        &self,
        message_id: i64,
        sender: UserId,
        kind: &str,
        text: &str,
    ) -> Result<()> {
        sqlx::query("INSERT INTO pinned (message_id,sender,kind,text) VALUES (?,?,?,?)")
            .bind(message_id)
            .bind(sender)
            .bind(kind)
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All pinned entries in creation order.
    pub async fn list_pinned(&self) -> Result<Vec<PinnedEntry>> {
        let rows: Vec<(i64, i64, String, String)> =
            sqlx::query_as("SELECT message_id,sender,kind,text FROM pinned ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(message_id, sender, kind, text)| PinnedEntry {
                message_id,
                sender,
                kind,
                text,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> Store {
        // One connection, or every query would see a different :memory: db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Store::new(pool);
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn upsert_overwrites_the_nickname() {
        let store = store().await;
        store.upsert_member(1, "Ann").await.unwrap();
        store.upsert_member(1, "Annie").await.unwrap();
        assert_eq!(store.get_nickname(1).await.unwrap().as_deref(), Some("Annie"));
        assert_eq!(store.load_members().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn message_ids_are_monotonic() {
        let store = store().await;
        let first = store.append_message(1, "text", "hello", None).await.unwrap();
        let second = store.append_message(2, "photo", "file123", Some(first)).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn pinned_entries_come_back_in_creation_order() {
        let store = store().await;
        store.append_pinned(10, 1, "text", "first").await.unwrap();
        store.append_pinned(11, 2, "photo", "second").await.unwrap();
        let pinned = store.list_pinned().await.unwrap();
        assert_eq!(pinned.len(), 2);
        assert_eq!(pinned[0].text, "first");
        assert_eq!(pinned[1].text, "second");
    }
}
