// SQLite-backed audit store.
//
// Tables:
// - participants: every member we have ever seen, never deleted
// - content_records: one row per observed message
// - moderation_actions: one row per executed action
// - warnings: one row per warn action
// - audit_events: the append-only event trail
//
// Every multi-row write runs in one transaction. Participants are upserted
// inside that same transaction before the rows that reference them.

use crate::core::audit::{
    ActionBatch, ActionKind, AuditEvent, AuditQuery, AuditStore, ContentRecord,
    ModerationActionRecord, NewAuditEvent, NewContentRecord, Participant, ParticipantRef,
    ParticipantSummary, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;

#[derive(Clone)]
pub struct SqliteAuditStore {
    pool: Pool<Sqlite>,
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::StorageError(e.to_string())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::StorageError(format!("Corrupt timestamp {:?}: {}", value, e)))
}

async fn ensure_participant(
    conn: &mut SqliteConnection,
    participant: &ParticipantRef,
    now: &str,
) -> Result<(), sqlx::Error> {
    let sql = if participant.name.is_some() {
        r#"
        INSERT INTO participants (id, display_name, verified, created_at)
        VALUES (?, ?, 0, ?)
        ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name
        "#
    } else {
        r#"
        INSERT INTO participants (id, display_name, verified, created_at)
        VALUES (?, ?, 0, ?)
        ON CONFLICT(id) DO NOTHING
        "#
    };
    sqlx::query(sql)
        .bind(participant.id as i64)
        .bind(participant.label())
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_event(
    conn: &mut SqliteConnection,
    event: &NewAuditEvent,
    now: &str,
) -> Result<(), sqlx::Error> {
    ensure_participant(conn, &event.subject, now).await?;
    sqlx::query(
        r#"
        INSERT INTO audit_events (subject_id, kind, detail, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(event.subject.id as i64)
    .bind(&event.kind)
    .bind(&event.detail)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn event_from_row(row: &SqliteRow) -> Result<AuditEvent, StoreError> {
    Ok(AuditEvent {
        id: row.get("id"),
        subject_id: row.get::<i64, _>("subject_id") as u64,
        kind: row.get("kind"),
        detail: row.get("detail"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

impl SqliteAuditStore {
    /// Open (creating if needed) the database at `database_url` and migrate it.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let path_str = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        if !database_url.contains(":memory:") {
            if let Some(parent) = Path::new(path_str).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };
        let options = SqliteConnectOptions::from_str(&conn_str)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables and indices. Safe to run on every start.
    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS participants (
                id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0,
                verified_at TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_records (
                message_id INTEGER PRIMARY KEY,
                author_id INTEGER NOT NULL REFERENCES participants(id),
                guild_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                flagged INTEGER NOT NULL DEFAULT 0,
                flag_reason TEXT,
                flag_severity TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_content_records_author
                ON content_records(author_id, flagged);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target_id INTEGER NOT NULL REFERENCES participants(id),
                moderator_id INTEGER NOT NULL REFERENCES participants(id),
                kind TEXT NOT NULL,
                reason TEXT,
                duration_minutes INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_moderation_actions_target
                ON moderation_actions(target_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS warnings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action_id INTEGER NOT NULL REFERENCES moderation_actions(id),
                target_id INTEGER NOT NULL REFERENCES participants(id),
                moderator_id INTEGER NOT NULL REFERENCES participants(id),
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_warnings_target ON warnings(target_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id INTEGER NOT NULL REFERENCES participants(id),
                kind TEXT NOT NULL CHECK (length(kind) > 0),
                detail TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_events_subject ON audit_events(subject_id);
            CREATE INDEX IF NOT EXISTS idx_audit_events_kind ON audit_events(kind);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn upsert_participant(&self, participant: &ParticipantRef) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        ensure_participant(&mut conn, participant, &timestamp(Utc::now()))
            .await
            .map_err(db_err)
    }

    async fn get_participant(&self, id: u64) -> Result<Option<Participant>, StoreError> {
        let row = sqlx::query(
            "SELECT id, display_name, verified, verified_at, created_at FROM participants WHERE id = ?",
        )
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Participant {
            id: row.get::<i64, _>("id") as u64,
            display_name: row.get("display_name"),
            verified: row.get::<i64, _>("verified") != 0,
            verified_at: row
                .get::<Option<String>, _>("verified_at")
                .map(|s| parse_timestamp(&s))
                .transpose()?,
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        }))
    }

    async fn append(&self, event: NewAuditEvent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        insert_event(&mut tx, &event, &timestamp(Utc::now()))
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)
    }

    async fn record_content(
        &self,
        record: NewContentRecord,
        event: Option<NewAuditEvent>,
    ) -> Result<(), StoreError> {
        let now = timestamp(Utc::now());
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        ensure_participant(&mut tx, &record.author, &now)
            .await
            .map_err(db_err)?;

        // Content is immutable; the flag can only go from unset to set.
        sqlx::query(
            r#"
            INSERT INTO content_records
                (message_id, author_id, guild_id, channel_id, content,
                 flagged, flag_reason, flag_severity, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(message_id) DO UPDATE SET
                flagged = 1,
                flag_reason = excluded.flag_reason,
                flag_severity = excluded.flag_severity
            WHERE content_records.flagged = 0 AND excluded.flagged = 1
            "#,
        )
        .bind(record.message_id as i64)
        .bind(record.author.id as i64)
        .bind(record.guild_id as i64)
        .bind(record.channel_id as i64)
        .bind(&record.content)
        .bind(record.flag.is_some())
        .bind(record.flag.as_ref().map(|f| f.reason.clone()))
        .bind(record.flag.as_ref().map(|f| f.severity.as_str()))
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(event) = &event {
            insert_event(&mut tx, event, &now).await.map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    async fn find_content(&self, message_id: u64) -> Result<Option<ContentRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT message_id, author_id, channel_id, content, flagged, flag_reason, created_at
            FROM content_records WHERE message_id = ?
            "#,
        )
        .bind(message_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ContentRecord {
            message_id: row.get::<i64, _>("message_id") as u64,
            author_id: row.get::<i64, _>("author_id") as u64,
            channel_id: row.get::<i64, _>("channel_id") as u64,
            content: row.get("content"),
            flagged: row.get::<i64, _>("flagged") != 0,
            flag_reason: row.get("flag_reason"),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        }))
    }

    async fn record_action(&self, batch: ActionBatch) -> Result<i64, StoreError> {
        let now = timestamp(Utc::now());
        let action = &batch.action;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        ensure_participant(&mut tx, &action.target, &now)
            .await
            .map_err(db_err)?;
        ensure_participant(&mut tx, &action.moderator, &now)
            .await
            .map_err(db_err)?;

        let action_id = sqlx::query(
            r#"
            INSERT INTO moderation_actions
                (target_id, moderator_id, kind, reason, duration_minutes, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(action.target.id as i64)
        .bind(action.moderator.id as i64)
        .bind(action.kind.as_str())
        .bind(&action.reason)
        .bind(action.duration_minutes.map(|m| m as i64))
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .last_insert_rowid();

        if let Some(reason) = &batch.warning {
            sqlx::query(
                r#"
                INSERT INTO warnings (action_id, target_id, moderator_id, reason, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(action_id)
            .bind(action.target.id as i64)
            .bind(action.moderator.id as i64)
            .bind(reason)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        for event in &batch.events {
            insert_event(&mut tx, event, &now).await.map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(action_id)
    }

    async fn mark_verified(
        &self,
        participant_id: u64,
        at: DateTime<Utc>,
        event: NewAuditEvent,
    ) -> Result<bool, StoreError> {
        let now = timestamp(at);
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        ensure_participant(&mut tx, &ParticipantRef::id_only(participant_id), &now)
            .await
            .map_err(db_err)?;

        let updated = sqlx::query(
            "UPDATE participants SET verified = 1, verified_at = ? WHERE id = ? AND verified = 0",
        )
        .bind(&now)
        .bind(participant_id as i64)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        let newly_verified = updated == 1;
        if newly_verified {
            insert_event(&mut tx, &event, &now).await.map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(newly_verified)
    }

    async fn query_events(&self, query: AuditQuery) -> Result<Vec<AuditEvent>, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, subject_id, kind, detail, created_at FROM audit_events WHERE 1 = 1",
        );
        if let Some(subject) = query.subject {
            builder.push(" AND subject_id = ").push_bind(subject as i64);
        }
        if !query.kinds.is_empty() {
            builder.push(" AND kind IN (");
            let mut kinds = builder.separated(", ");
            for kind in &query.kinds {
                kinds.push_bind(kind.clone());
            }
            kinds.push_unseparated(")");
        }
        builder
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(query.limit as i64);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(event_from_row).collect()
    }

    async fn recent_actions(
        &self,
        target_id: Option<u64>,
        limit: u32,
    ) -> Result<Vec<ModerationActionRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, target_id, moderator_id, kind, reason, duration_minutes, created_at
            FROM moderation_actions
            WHERE ?1 IS NULL OR target_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(target_id.map(|id| id as i64))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut actions = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.get("kind");
            let Some(kind) = ActionKind::parse(&kind) else {
                continue;
            };
            actions.push(ModerationActionRecord {
                id: row.get("id"),
                target_id: row.get::<i64, _>("target_id") as u64,
                moderator_id: row.get::<i64, _>("moderator_id") as u64,
                kind,
                reason: row.get("reason"),
                duration_minutes: row
                    .get::<Option<i64>, _>("duration_minutes")
                    .map(|m| m as u32),
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            });
        }
        Ok(actions)
    }

    async fn participant_summary(&self, id: u64) -> Result<ParticipantSummary, StoreError> {
        let participant = self.get_participant(id).await?;

        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM warnings WHERE target_id = ?1) AS warning_count,
                (SELECT COUNT(*) FROM moderation_actions WHERE target_id = ?1) AS action_count,
                (SELECT COUNT(*) FROM content_records WHERE author_id = ?1 AND flagged = 1)
                    AS flagged_count
            "#,
        )
        .bind(id as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(ParticipantSummary {
            participant,
            warning_count: row.get::<i64, _>("warning_count") as u64,
            action_count: row.get::<i64, _>("action_count") as u64,
            flagged_message_count: row.get::<i64, _>("flagged_count") as u64,
        })
    }
}
