use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

/// Message sender column value for visitor-authored rows.
pub const SENDER_VISITOR: &str = "visitor";
/// Message sender column value for admin-authored rows.
pub const SENDER_ADMIN: &str = "admin";

/// A visitor who has started a contact chat, identified by their chat key.
#[derive(Debug, Clone, Serialize)]
pub struct Visitor {
    #[serde(skip_serializing)]
    pub id: i64,
    pub chat_key: String,
    pub name: Option<String>,
    pub email: String,
}

/// One entry of a visitor's chat thread.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub sender: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Visitor listing row for the admin panel, unread threads first.
#[derive(Debug, Clone, Serialize)]
pub struct VisitorSummary {
    pub chat_key: String,
    pub name: Option<String>,
    pub email: String,
    pub read: bool,
}

/// One entry of a visitor's mail history.
#[derive(Debug, Clone, Serialize)]
pub struct MailEntry {
    pub sender: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Handle to the site's storage, constructed once at startup and cloned into
/// every request handler. Wraps a shared sqlx pool; no global state.
#[derive(Debug, Clone)]
pub struct DatabaseClient {
    pool: Arc<SqlitePool>,
}

impl DatabaseClient {
    pub async fn new(db_url: &str) -> Result<Self> {
        info!("Initializing database connection");

        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("Invalid database URL: {}", db_url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let client = Self {
            pool: Arc::new(pool),
        };
        client.ensure_schema().await?;

        Ok(client)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visitors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_key TEXT NOT NULL UNIQUE,
                name TEXT,
                email TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .context("Failed to create visitors table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                visitor_id INTEGER NOT NULL REFERENCES visitors(id),
                sender TEXT NOT NULL,
                message TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .context("Failed to create chat_messages table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mail_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                visitor_id INTEGER NOT NULL REFERENCES visitors(id),
                sender TEXT NOT NULL,
                subject TEXT NOT NULL,
                body_text TEXT NOT NULL,
                body_html TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .context("Failed to create mail_log table")?;

        Ok(())
    }

    pub async fn create_visitor(
        &self,
        chat_key: &str,
        name: Option<&str>,
        email: &str,
    ) -> Result<Visitor> {
        let created_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO visitors (chat_key, name, email, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(chat_key)
        .bind(name)
        .bind(email)
        .bind(&created_at)
        .execute(&*self.pool)
        .await
        .context("Failed to insert visitor")?;

        Ok(Visitor {
            id: result.last_insert_rowid(),
            chat_key: chat_key.to_string(),
            name: name.map(|n| n.to_string()),
            email: email.to_string(),
        })
    }

    pub async fn find_visitor_by_chat_key(&self, chat_key: &str) -> Result<Option<Visitor>> {
        let row = sqlx::query("SELECT id, chat_key, name, email FROM visitors WHERE chat_key = ?")
            .bind(chat_key)
            .fetch_optional(&*self.pool)
            .await
            .context("Failed to look up visitor")?;

        match row {
            Some(row) => Ok(Some(Visitor {
                id: row.try_get("id")?,
                chat_key: row.try_get("chat_key")?,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
            })),
            None => Ok(None),
        }
    }

    /// Lists all visitors for the admin panel: threads with unread visitor
    /// messages first, then by most recent activity. Replaces a join over the
    /// chat thread per visitor.
    pub async fn list_visitor_summaries(&self) -> Result<Vec<VisitorSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT v.chat_key, v.name, v.email,
                   COALESCE(SUM(CASE WHEN m.is_read = 0 THEN 1 ELSE 0 END), 0) AS unread_count,
                   COALESCE(MAX(m.created_at), v.created_at) AS last_activity
            FROM visitors v
            LEFT JOIN chat_messages m ON m.visitor_id = v.id
            GROUP BY v.id
            ORDER BY (unread_count > 0) DESC, last_activity DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .context("Failed to list visitors")?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let unread_count: i64 = row.try_get("unread_count")?;
            summaries.push(VisitorSummary {
                chat_key: row.try_get("chat_key")?,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                read: unread_count == 0,
            });
        }

        Ok(summaries)
    }

    pub async fn list_visitors(&self) -> Result<Vec<Visitor>> {
        let rows =
            sqlx::query("SELECT id, chat_key, name, email FROM visitors ORDER BY created_at ASC")
                .fetch_all(&*self.pool)
                .await
                .context("Failed to list visitors")?;

        let mut visitors = Vec::with_capacity(rows.len());
        for row in rows {
            visitors.push(Visitor {
                id: row.try_get("id")?,
                chat_key: row.try_get("chat_key")?,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
            });
        }

        Ok(visitors)
    }

    pub async fn insert_chat_message(
        &self,
        visitor_id: i64,
        sender: &str,
        message: &str,
        read: bool,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO chat_messages (visitor_id, sender, message, is_read, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(visitor_id)
        .bind(sender)
        .bind(message)
        .bind(read)
        .bind(Utc::now().to_rfc3339())
        .execute(&*self.pool)
        .await
        .context("Failed to insert chat message")?;

        Ok(())
    }

    pub async fn list_chat_messages(&self, visitor_id: i64) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT sender, message, is_read, created_at FROM chat_messages \
             WHERE visitor_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(visitor_id)
        .fetch_all(&*self.pool)
        .await
        .context("Failed to load chat thread")?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(ChatMessage {
                sender: row.try_get("sender")?,
                message: row.try_get("message")?,
                read: row.try_get("is_read")?,
                created_at: parse_timestamp(row.try_get("created_at")?)?,
            });
        }

        Ok(messages)
    }

    pub async fn count_chat_messages(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM chat_messages")
            .fetch_one(&*self.pool)
            .await
            .context("Failed to count chat messages")?;

        Ok(row.try_get("count")?)
    }

    /// Marks every unread message in a visitor's thread as read, returning
    /// the number of rows updated.
    pub async fn mark_thread_read(&self, visitor_id: i64) -> Result<u64> {
        let result =
            sqlx::query("UPDATE chat_messages SET is_read = 1 WHERE visitor_id = ? AND is_read = 0")
                .bind(visitor_id)
                .execute(&*self.pool)
                .await
                .context("Failed to mark thread read")?;

        Ok(result.rows_affected())
    }

    pub async fn insert_mail(
        &self,
        visitor_id: i64,
        sender: &str,
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO mail_log (visitor_id, sender, subject, body_text, body_html, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(visitor_id)
        .bind(sender)
        .bind(subject)
        .bind(text)
        .bind(html)
        .bind(Utc::now().to_rfc3339())
        .execute(&*self.pool)
        .await
        .context("Failed to record mail")?;

        Ok(())
    }

    pub async fn list_mail(&self, visitor_id: i64) -> Result<Vec<MailEntry>> {
        let rows = sqlx::query(
            "SELECT sender, subject, body_text, body_html, created_at FROM mail_log \
             WHERE visitor_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(visitor_id)
        .fetch_all(&*self.pool)
        .await
        .context("Failed to load mail history")?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(MailEntry {
                sender: row.try_get("sender")?,
                subject: row.try_get("subject")?,
                text: row.try_get("body_text")?,
                html: row.try_get("body_html")?,
                created_at: parse_timestamp(row.try_get("created_at")?)?,
            });
        }

        Ok(entries)
    }
}

// SQLite has no native datetime type; timestamps are stored as RFC 3339 text.
fn parse_timestamp(raw: String) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(&raw)
        .with_context(|| format!("Invalid timestamp in database: {}", raw))?;
    Ok(parsed.with_timezone(&Utc))
}
