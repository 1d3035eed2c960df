//! `sqlx`/SQLite-backed [`Repository`](super::Repository) implementation.
//!
//! Grounded on the teacher's `db/mod.rs`: same pool construction (shared-cache
//! in-memory mode vs file-based with parent-dir creation), same
//! acquire/idle timeout constants, same "check tables, create if missing"
//! migration style using runtime `sqlx::query` rather than the compile-time
//! `query!` macro (so this crate never needs a live `DATABASE_URL` to build).

use super::{
    ChannelRepository, ChannelVisibility, ClientRepository, DeviceRepository, EventRecord,
    EventRepository, TenantRepository,
};
use crate::error::CoreError;
use crate::model::{Channel, ChannelFlags, Client, Device, Event, Tenant};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;

/// `sqlx`-backed repository over a single SQLite database.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connect (creating the file if missing) and run migrations.
    pub async fn new(path: &str) -> Result<Self, sqlx::Error> {
        let pool = if path == ":memory:" {
            let options = SqliteConnectOptions::new()
                .filename("file::memory:")
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    let _ = std::fs::create_dir_all(parent);
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        Self::run_migrations(&pool).await?;
        tracing::info!(path = %path, "repository connected");
        Ok(Self { pool })
    }

    /// Access to the underlying pool, for components that need raw access
    /// (none currently do; kept for parity with the teacher's `Database`).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS clients (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                allowed_channels TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (tenant_id, id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS devices (
                client_id TEXT NOT NULL,
                id TEXT NOT NULL,
                push_token TEXT,
                PRIMARY KEY (client_id, id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS channels (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                persistent INTEGER NOT NULL,
                private INTEGER NOT NULL,
                presence INTEGER NOT NULL,
                push INTEGER NOT NULL,
                is_closed INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS channel_membership (
                tenant_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                PRIMARY KEY (tenant_id, channel_id, client_id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                storage_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                payload BLOB NOT NULL,
                timestamp INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_channel_ts
             ON events (tenant_id, channel_id, timestamp)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn map_sqlx_err(source: sqlx::Error) -> CoreError {
        CoreError::transient("repository", source)
    }
}

fn row_to_channel(tenant_id: &str, channel_id: &str, row: &sqlx::sqlite::SqliteRow) -> Channel {
    Channel {
        id: channel_id.to_string(),
        tenant_id: tenant_id.to_string(),
        flags: ChannelFlags {
            persistent: row.get::<i64, _>("persistent") != 0,
            private: row.get::<i64, _>("private") != 0,
            presence: row.get::<i64, _>("presence") != 0,
            push: row.get::<i64, _>("push") != 0,
            is_closed: row.get::<i64, _>("is_closed") != 0,
        },
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl TenantRepository for SqliteRepository {
    async fn create_tenant(&self, tenant: &Tenant) -> crate::error::CoreResult<()> {
        sqlx::query("INSERT INTO tenants (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&tenant.id)
            .bind(&tenant.name)
            .bind(tenant.created_at)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn delete_tenant(&self, tenant_id: &str) -> crate::error::CoreResult<()> {
        sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(tenant_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn update_tenant(&self, tenant_id: &str, name: &str) -> crate::error::CoreResult<()> {
        sqlx::query("UPDATE tenants SET name = ? WHERE id = ?")
            .bind(name)
            .bind(tenant_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn tenant_exists(&self, tenant_id: &str) -> crate::error::CoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tenants WHERE id = ?)")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await
                .map_err(Self::map_sqlx_err)?;
        Ok(exists)
    }

    async fn list_tenants(&self) -> crate::error::CoreResult<Vec<Tenant>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM tenants")
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(rows
            .into_iter()
            .map(|row| Tenant {
                id: row.get("id"),
                name: row.get("name"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

#[async_trait]
impl ClientRepository for SqliteRepository {
    async fn create_client(&self, client: &Client) -> crate::error::CoreResult<()> {
        sqlx::query(
            "INSERT INTO clients (tenant_id, id, allowed_channels) VALUES (?, ?, ?)",
        )
        .bind(&client.tenant_id)
        .bind(&client.id)
        .bind(client.allowed_channels.join(","))
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn get_client(
        &self,
        tenant_id: &str,
        client_id: &str,
    ) -> crate::error::CoreResult<Option<Client>> {
        let row = sqlx::query(
            "SELECT tenant_id, id, allowed_channels FROM clients WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;

        Ok(row.map(|row| Client {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            allowed_channels: split_csv(row.get("allowed_channels")),
        }))
    }

    async fn update_client_allowed_channels(
        &self,
        tenant_id: &str,
        client_id: &str,
        allowed_channels: &[String],
    ) -> crate::error::CoreResult<()> {
        sqlx::query("UPDATE clients SET allowed_channels = ? WHERE tenant_id = ? AND id = ?")
            .bind(allowed_channels.join(","))
            .bind(tenant_id)
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn delete_client(&self, tenant_id: &str, client_id: &str) -> crate::error::CoreResult<()> {
        sqlx::query("DELETE FROM clients WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn client_exists_in_tenant(
        &self,
        tenant_id: &str,
        client_id: &str,
    ) -> crate::error::CoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE tenant_id = ? AND id = ?)",
        )
        .bind(tenant_id)
        .bind(client_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(exists)
    }

    async fn list_clients_in_tenant(&self, tenant_id: &str) -> crate::error::CoreResult<Vec<Client>> {
        let rows = sqlx::query(
            "SELECT tenant_id, id, allowed_channels FROM clients WHERE tenant_id = ?",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(rows
            .into_iter()
            .map(|row| Client {
                id: row.get("id"),
                tenant_id: row.get("tenant_id"),
                allowed_channels: split_csv(row.get("allowed_channels")),
            })
            .collect())
    }

    async fn list_all_clients(&self) -> crate::error::CoreResult<Vec<Client>> {
        let rows = sqlx::query("SELECT tenant_id, id, allowed_channels FROM clients")
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(rows
            .into_iter()
            .map(|row| Client {
                id: row.get("id"),
                tenant_id: row.get("tenant_id"),
                allowed_channels: split_csv(row.get("allowed_channels")),
            })
            .collect())
    }

    async fn get_client_allowed_channels(
        &self,
        tenant_id: &str,
        client_id: &str,
    ) -> crate::error::CoreResult<Vec<String>> {
        Ok(self
            .get_client(tenant_id, client_id)
            .await?
            .map(|client| client.allowed_channels)
            .unwrap_or_default())
    }
}

fn split_csv(value: String) -> Vec<String> {
    if value.is_empty() {
        Vec::new()
    } else {
        value.split(',').map(|s| s.to_string()).collect()
    }
}

#[async_trait]
impl DeviceRepository for SqliteRepository {
    async fn create_device(&self, device: &Device) -> crate::error::CoreResult<()> {
        sqlx::query("INSERT INTO devices (client_id, id, push_token) VALUES (?, ?, ?)")
            .bind(&device.client_id)
            .bind(&device.id)
            .bind(&device.push_token)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn get_device(
        &self,
        client_id: &str,
        device_id: &str,
    ) -> crate::error::CoreResult<Option<Device>> {
        let row = sqlx::query(
            "SELECT client_id, id, push_token FROM devices WHERE client_id = ? AND id = ?",
        )
        .bind(client_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(row.map(|row| Device {
            id: row.get("id"),
            client_id: row.get("client_id"),
            push_token: row.get("push_token"),
        }))
    }

    async fn delete_device(&self, client_id: &str, device_id: &str) -> crate::error::CoreResult<()> {
        sqlx::query("DELETE FROM devices WHERE client_id = ? AND id = ?")
            .bind(client_id)
            .bind(device_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn list_devices_by_client(&self, client_id: &str) -> crate::error::CoreResult<Vec<Device>> {
        let rows = sqlx::query("SELECT client_id, id, push_token FROM devices WHERE client_id = ?")
            .bind(client_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(rows
            .into_iter()
            .map(|row| Device {
                id: row.get("id"),
                client_id: row.get("client_id"),
                push_token: row.get("push_token"),
            })
            .collect())
    }

    async fn lookup_push_tokens(&self, client_ids: &[String]) -> crate::error::CoreResult<Vec<String>> {
        if client_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = client_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT push_token FROM devices WHERE client_id IN ({placeholders}) AND push_token IS NOT NULL"
        );
        let mut query = sqlx::query(&sql);
        for id in client_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(Self::map_sqlx_err)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get::<Option<String>, _>("push_token"))
            .collect())
    }
}

#[async_trait]
impl ChannelRepository for SqliteRepository {
    async fn create_channel(
        &self,
        tenant_id: &str,
        channel_id: &str,
        flags: ChannelFlags,
    ) -> crate::error::CoreResult<()> {
        sqlx::query(
            "INSERT INTO channels
                (tenant_id, id, persistent, private, presence, push, is_closed, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tenant_id)
        .bind(channel_id)
        .bind(flags.persistent as i64)
        .bind(flags.private as i64)
        .bind(flags.presence as i64)
        .bind(flags.push as i64)
        .bind(flags.is_closed as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn delete_channel(&self, tenant_id: &str, channel_id: &str) -> crate::error::CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(Self::map_sqlx_err)?;
        sqlx::query("DELETE FROM channels WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(channel_id)
            .execute(&mut *tx)
            .await
            .map_err(Self::map_sqlx_err)?;
        sqlx::query("DELETE FROM channel_membership WHERE tenant_id = ? AND channel_id = ?")
            .bind(tenant_id)
            .bind(channel_id)
            .execute(&mut *tx)
            .await
            .map_err(Self::map_sqlx_err)?;
        tx.commit().await.map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn get_channel(
        &self,
        tenant_id: &str,
        channel_id: &str,
    ) -> crate::error::CoreResult<Option<Channel>> {
        let row = sqlx::query(
            "SELECT persistent, private, presence, push, is_closed, created_at
             FROM channels WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(row.map(|row| row_to_channel(tenant_id, channel_id, &row)))
    }

    async fn list_channels(
        &self,
        tenant_id: &str,
        visibility: ChannelVisibility,
    ) -> crate::error::CoreResult<Vec<Channel>> {
        let sql = match visibility {
            ChannelVisibility::Public => {
                "SELECT id, persistent, private, presence, push, is_closed, created_at
                 FROM channels WHERE tenant_id = ? AND private = 0"
            }
            ChannelVisibility::Private => {
                "SELECT id, persistent, private, presence, push, is_closed, created_at
                 FROM channels WHERE tenant_id = ? AND private = 1"
            }
            ChannelVisibility::Any => {
                "SELECT id, persistent, private, presence, push, is_closed, created_at
                 FROM channels WHERE tenant_id = ?"
            }
        };
        let rows = sqlx::query(sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(rows
            .into_iter()
            .map(|row| row_to_channel(tenant_id, row.get("id"), &row))
            .collect())
    }

    async fn list_channels_by_client_membership(
        &self,
        tenant_id: &str,
        client_id: &str,
    ) -> crate::error::CoreResult<Vec<Channel>> {
        let rows = sqlx::query(
            "SELECT c.id, c.persistent, c.private, c.presence, c.push, c.is_closed, c.created_at
             FROM channels c
             JOIN channel_membership m ON m.tenant_id = c.tenant_id AND m.channel_id = c.id
             WHERE c.tenant_id = ? AND m.client_id = ?",
        )
        .bind(tenant_id)
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(rows
            .into_iter()
            .map(|row| row_to_channel(tenant_id, row.get("id"), &row))
            .collect())
    }

    async fn add_channel_membership(
        &self,
        tenant_id: &str,
        channel_id: &str,
        client_id: &str,
    ) -> crate::error::CoreResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO channel_membership (tenant_id, channel_id, client_id)
             VALUES (?, ?, ?)",
        )
        .bind(tenant_id)
        .bind(channel_id)
        .bind(client_id)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn remove_channel_membership(
        &self,
        tenant_id: &str,
        channel_id: &str,
        client_id: &str,
    ) -> crate::error::CoreResult<()> {
        sqlx::query(
            "DELETE FROM channel_membership
             WHERE tenant_id = ? AND channel_id = ? AND client_id = ?",
        )
        .bind(tenant_id)
        .bind(channel_id)
        .bind(client_id)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn set_channel_closed(
        &self,
        tenant_id: &str,
        channel_id: &str,
        is_closed: bool,
    ) -> crate::error::CoreResult<()> {
        sqlx::query("UPDATE channels SET is_closed = ? WHERE tenant_id = ? AND id = ?")
            .bind(is_closed as i64)
            .bind(tenant_id)
            .bind(channel_id)
            .execute(&self.pool)
            .await
            .map_err(Self::map_sqlx_err)?;
        Ok(())
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Event {
    Event {
        id: row.get("storage_id"),
        tenant_id: row.get("tenant_id"),
        channel_id: row.get("channel_id"),
        sender_id: row.get("sender_id"),
        event_type: row.get("event_type"),
        payload: row.get("payload"),
        timestamp: row.get("timestamp"),
    }
}

#[async_trait]
impl EventRepository for SqliteRepository {
    async fn insert_event(&self, record: &EventRecord) -> crate::error::CoreResult<()> {
        sqlx::query(
            "INSERT INTO events (tenant_id, channel_id, sender_id, event_type, payload, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.tenant_id)
        .bind(&record.event.channel_id)
        .bind(&record.event.sender_id)
        .bind(&record.event.event_type)
        .bind(&record.event.payload)
        .bind(record.event.timestamp)
        .execute(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn insert_events(&self, records: &[EventRecord]) -> crate::error::CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(Self::map_sqlx_err)?;
        for record in records {
            sqlx::query(
                "INSERT INTO events
                    (tenant_id, channel_id, sender_id, event_type, payload, timestamp)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.tenant_id)
            .bind(&record.event.channel_id)
            .bind(&record.event.sender_id)
            .bind(&record.event.event_type)
            .bind(&record.event.payload)
            .bind(record.event.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(Self::map_sqlx_err)?;
        }
        tx.commit().await.map_err(Self::map_sqlx_err)?;
        Ok(())
    }

    async fn query_after_ts(
        &self,
        tenant_id: &str,
        channel_id: &str,
        after_ts: i64,
        limit: usize,
    ) -> crate::error::CoreResult<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT storage_id, tenant_id, channel_id, sender_id, event_type, payload, timestamp
             FROM events
             WHERE tenant_id = ? AND channel_id = ? AND timestamp > ?
             ORDER BY timestamp ASC LIMIT ?",
        )
        .bind(tenant_id)
        .bind(channel_id)
        .bind(after_ts)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn query_between_ts(
        &self,
        tenant_id: &str,
        channel_id: &str,
        from_ts: i64,
        to_ts: i64,
        limit: usize,
    ) -> crate::error::CoreResult<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT storage_id, tenant_id, channel_id, sender_id, event_type, payload, timestamp
             FROM events
             WHERE tenant_id = ? AND channel_id = ? AND timestamp BETWEEN ? AND ?
             ORDER BY timestamp ASC LIMIT ?",
        )
        .bind(tenant_id)
        .bind(channel_id)
        .bind(from_ts)
        .bind(to_ts)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn last_n(&self, tenant_id: &str, channel_id: &str, n: usize) -> crate::error::CoreResult<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT storage_id, tenant_id, channel_id, sender_id, event_type, payload, timestamp
             FROM events
             WHERE tenant_id = ? AND channel_id = ?
             ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(tenant_id)
        .bind(channel_id)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn last_n_after_ts(
        &self,
        tenant_id: &str,
        channel_id: &str,
        after_ts: i64,
        n: usize,
    ) -> crate::error::CoreResult<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT storage_id, tenant_id, channel_id, sender_id, event_type, payload, timestamp
             FROM events
             WHERE tenant_id = ? AND channel_id = ? AND timestamp > ?
             ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(tenant_id)
        .bind(channel_id)
        .bind(after_ts)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_sqlx_err)?;
        Ok(rows.iter().map(row_to_event).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Event;

    async fn repo() -> SqliteRepository {
        SqliteRepository::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn tenant_round_trips() {
        let repo = repo().await;
        let tenant = Tenant {
            id: "tenant-1".into(),
            name: "Tenant One".into(),
            created_at: 1000,
        };
        repo.create_tenant(&tenant).await.unwrap();
        assert!(repo.tenant_exists("tenant-1").await.unwrap());
        let listed = repo.list_tenants().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Tenant One");
    }

    #[tokio::test]
    async fn channel_membership_add_remove() {
        let repo = repo().await;
        repo.create_channel("t1", "c1", ChannelFlags::default())
            .await
            .unwrap();
        repo.add_channel_membership("t1", "c1", "client-1")
            .await
            .unwrap();
        let channels = repo
            .list_channels_by_client_membership("t1", "client-1")
            .await
            .unwrap();
        assert_eq!(channels.len(), 1);

        repo.remove_channel_membership("t1", "c1", "client-1")
            .await
            .unwrap();
        let channels = repo
            .list_channels_by_client_membership("t1", "client-1")
            .await
            .unwrap();
        assert!(channels.is_empty());
    }

    #[tokio::test]
    async fn events_query_after_ts_excludes_boundary() {
        let repo = repo().await;
        let base_event = Event {
            id: 0,
            tenant_id: "t1".into(),
            channel_id: "c1".into(),
            sender_id: "sender".into(),
            event_type: "msg".into(),
            payload: b"hi".to_vec(),
            timestamp: 100,
        };
        repo.insert_event(&EventRecord {
            tenant_id: "t1".into(),
            event: base_event.clone(),
        })
        .await
        .unwrap();
        repo.insert_event(&EventRecord {
            tenant_id: "t1".into(),
            event: Event {
                timestamp: 200,
                ..base_event
            },
        })
        .await
        .unwrap();

        let after = repo.query_after_ts("t1", "c1", 100, 10).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].timestamp, 200);
    }

    #[tokio::test]
    async fn batch_insert_writes_all_events_once() {
        let repo = repo().await;
        let records: Vec<EventRecord> = (0..5)
            .map(|i| EventRecord {
                tenant_id: "t1".into(),
                event: Event {
                    id: 0,
                    tenant_id: "t1".into(),
                    channel_id: "c1".into(),
                    sender_id: "sender".into(),
                    event_type: "msg".into(),
                    payload: vec![i as u8],
                    timestamp: 100 + i as i64,
                },
            })
            .collect();
        repo.insert_events(&records).await.unwrap();
        let all = repo.last_n("t1", "c1", 100).await.unwrap();
        assert_eq!(all.len(), 5);
    }
}
