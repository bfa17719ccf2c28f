use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use cadence_core::{
    CadenceError, ChannelConnection, ConnectionCredentials, ConnectionStatus, MediaItem, Result,
    VariantContent,
};
use cadence_scheduler::{ConnectionStore, VariantStore};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::db::init_db;

/// Post variants and channel connections in one SQLite connection.
///
/// Queries are short single-row lookups, so the async trait methods run them
/// inline under the mutex.
pub struct SqliteContentStore {
    db: Mutex<Connection>,
}

impl SqliteContentStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn).map_err(db_err)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn db(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| CadenceError::Internal("content store lock poisoned".into()))
    }

    /// Insert or replace a variant's content.
    pub fn upsert_variant(&self, variant: &VariantContent, now: DateTime<Utc>) -> Result<()> {
        if variant.variant_id.trim().is_empty() {
            return Err(CadenceError::InvalidInput("variant id is required".into()));
        }
        let media = serde_json::to_string(&variant.media)?;
        let db = self.db()?;
        db.execute(
            "INSERT INTO post_variants (id, text, media, created_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                text = excluded.text, media = excluded.media,
                updated_at_ms = excluded.updated_at_ms",
            params![variant.variant_id, variant.text, media, now.timestamp_millis()],
        )
        .map_err(db_err)?;
        debug!(variant_id = %variant.variant_id, "variant stored");
        Ok(())
    }

    /// When the variant was marked published, if ever.
    pub fn variant_published_at(&self, variant_id: &str) -> Result<Option<DateTime<Utc>>> {
        let db = self.db()?;
        let ms: Option<Option<i64>> = db
            .query_row(
                "SELECT published_at_ms FROM post_variants WHERE id = ?1",
                [variant_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        match ms {
            None => Err(CadenceError::NotFound {
                what: "variant",
                id: variant_id.to_string(),
            }),
            Some(ms) => Ok(ms.and_then(DateTime::from_timestamp_millis)),
        }
    }

    /// Insert or replace a channel connection.
    pub fn upsert_connection(&self, conn: &ChannelConnection, now: DateTime<Utc>) -> Result<()> {
        if conn.id.trim().is_empty() {
            return Err(CadenceError::InvalidInput("connection id is required".into()));
        }
        let db = self.db()?;
        db.execute(
            "INSERT INTO channel_connections
             (id, channel_type, status, access_token, base_url, created_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                channel_type = excluded.channel_type, status = excluded.status,
                access_token = excluded.access_token, base_url = excluded.base_url,
                updated_at_ms = excluded.updated_at_ms",
            params![
                conn.id,
                conn.channel_type.as_str(),
                conn.status.to_string(),
                conn.credentials.access_token,
                conn.credentials.base_url,
                now.timestamp_millis(),
            ],
        )
        .map_err(db_err)?;
        info!(connection_id = %conn.id, channel = %conn.channel_type, status = %conn.status, "connection stored");
        Ok(())
    }

    pub fn set_connection_status(
        &self,
        id: &str,
        status: ConnectionStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db()?;
        let n = db
            .execute(
                "UPDATE channel_connections SET status = ?1, updated_at_ms = ?2 WHERE id = ?3",
                params![status.to_string(), now.timestamp_millis(), id],
            )
            .map_err(db_err)?;
        if n == 0 {
            return Err(CadenceError::NotFound {
                what: "connection",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VariantStore for SqliteContentStore {
    async fn get_variant(&self, variant_id: &str) -> Result<Option<VariantContent>> {
        let db = self.db()?;
        let row: Option<(String, String)> = db
            .query_row(
                "SELECT text, media FROM post_variants WHERE id = ?1",
                [variant_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        let Some((text, media)) = row else {
            return Ok(None);
        };
        let media: Vec<MediaItem> = serde_json::from_str(&media)?;
        Ok(Some(VariantContent {
            variant_id: variant_id.to_string(),
            text,
            media,
        }))
    }

    async fn mark_published(&self, variant_id: &str, at: DateTime<Utc>) -> Result<()> {
        let db = self.db()?;
        let n = db
            .execute(
                "UPDATE post_variants SET published_at_ms = ?1, updated_at_ms = ?1 WHERE id = ?2",
                params![at.timestamp_millis(), variant_id],
            )
            .map_err(db_err)?;
        if n == 0 {
            return Err(CadenceError::NotFound {
                what: "variant",
                id: variant_id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionStore for SqliteContentStore {
    async fn get_connection(&self, connection_id: &str) -> Result<Option<ChannelConnection>> {
        let db = self.db()?;
        let row: Option<(String, String, String, Option<String>)> = db
            .query_row(
                "SELECT channel_type, status, access_token, base_url
                 FROM channel_connections WHERE id = ?1",
                [connection_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(db_err)?;
        let Some((channel_type, status, access_token, base_url)) = row else {
            return Ok(None);
        };
        Ok(Some(ChannelConnection {
            id: connection_id.to_string(),
            channel_type: channel_type.parse().map_err(CadenceError::Database)?,
            status: status.parse().map_err(CadenceError::Database)?,
            credentials: ConnectionCredentials {
                access_token,
                base_url,
            },
        }))
    }
}

fn db_err(e: rusqlite::Error) -> CadenceError {
    CadenceError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{ChannelType, MediaKind};

    fn store() -> SqliteContentStore {
        SqliteContentStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn variant_round_trips_with_media() {
        let s = store();
        let now = Utc::now();
        s.upsert_variant(
            &VariantContent {
                variant_id: "v1".into(),
                text: "launch day".into(),
                media: vec![MediaItem {
                    url: "https://cdn.example/a.png".into(),
                    kind: MediaKind::Image,
                    external_id: Some("m-1".into()),
                    alt_text: Some("rocket".into()),
                }],
            },
            now,
        )
        .unwrap();

        let v = s.get_variant("v1").await.unwrap().unwrap();
        assert_eq!(v.text, "launch day");
        assert_eq!(v.count_media(MediaKind::Image), 1);
        assert_eq!(v.media[0].external_id.as_deref(), Some("m-1"));
        assert!(s.get_variant("v2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_published_sets_timestamp() {
        let s = store();
        let now = DateTime::from_timestamp_millis(1_780_000_000_000).unwrap();
        s.upsert_variant(
            &VariantContent {
                variant_id: "v1".into(),
                text: "t".into(),
                media: vec![],
            },
            now,
        )
        .unwrap();
        assert!(s.variant_published_at("v1").unwrap().is_none());
        s.mark_published("v1", now).await.unwrap();
        assert_eq!(s.variant_published_at("v1").unwrap(), Some(now));
        assert!(s.mark_published("nope", now).await.is_err());
    }

    #[tokio::test]
    async fn connection_status_changes_are_visible() {
        let s = store();
        let now = Utc::now();
        s.upsert_connection(
            &ChannelConnection {
                id: "c1".into(),
                channel_type: ChannelType::Mastodon,
                status: ConnectionStatus::Connected,
                credentials: ConnectionCredentials {
                    access_token: "tok".into(),
                    base_url: Some("https://social.example".into()),
                },
            },
            now,
        )
        .unwrap();

        let c = s.get_connection("c1").await.unwrap().unwrap();
        assert!(c.is_usable());
        assert_eq!(c.channel_type, ChannelType::Mastodon);
        assert_eq!(c.credentials.base_url.as_deref(), Some("https://social.example"));

        s.set_connection_status("c1", ConnectionStatus::Error, now)
            .unwrap();
        let c = s.get_connection("c1").await.unwrap().unwrap();
        assert!(!c.is_usable());
        assert!(s.get_connection("c2").await.unwrap().is_none());
    }
}
