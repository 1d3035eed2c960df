//! Test server management: spawns `pulsehubd` against a scratch SQLite file
//! and a fixed port per test, grounded on the teacher's own
//! `tests/common/server.rs` (`Command::new(target/debug/<bin>)` against a
//! generated `config.toml`).

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;

pub struct TestServer {
    child: Child,
    port: u16,
    metrics_port: Option<u16>,
    data_dir: PathBuf,
    db_path: PathBuf,
    pub token_secret: String,
}

impl TestServer {
    /// Spawn a new `pulsehubd` instance listening on `127.0.0.1:{port}` with
    /// default limits and metrics disabled.
    pub async fn spawn(port: u16) -> anyhow::Result<Self> {
        Self::spawn_internal(port, None, None).await
    }

    /// Spawn with a shortened inactivity timeout and presence debounce, for
    /// scenarios that would otherwise need to wait on the 15-minute/15-second
    /// production defaults.
    pub async fn spawn_with_limits(
        port: u16,
        inactivity_timeout_secs: u64,
        presence_debounce_secs: u64,
    ) -> anyhow::Result<Self> {
        Self::spawn_internal(
            port,
            Some((inactivity_timeout_secs, presence_debounce_secs)),
            None,
        )
        .await
    }

    /// Spawn with the Prometheus `/metrics` endpoint enabled on
    /// `metrics_port`, and a shortened inactivity timeout.
    pub async fn spawn_with_metrics(
        port: u16,
        metrics_port: u16,
        inactivity_timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        Self::spawn_internal(port, Some((inactivity_timeout_secs, 15)), Some(metrics_port)).await
    }

    async fn spawn_internal(
        port: u16,
        limits: Option<(u64, u64)>,
        metrics_port: Option<u16>,
    ) -> anyhow::Result<Self> {
        let data_dir = std::env::temp_dir().join(format!("pulsehub-test-{port}"));
        std::fs::create_dir_all(&data_dir)?;

        let token_secret = format!("test-secret-{port}");
        let config_path = data_dir.join("config.toml");
        let db_path = data_dir.join("test.db");

        let limits_section = match limits {
            Some((inactivity, debounce)) => format!(
                "\n[limits]\ninactivity_timeout_secs = {inactivity}\npresence_debounce_secs = {debounce}\n"
            ),
            None => String::new(),
        };

        let config_content = format!(
            r#"
[server]
listen = "127.0.0.1:{port}"
token_secret = "{token_secret}"

[database]
path = "{db_display}"

[metrics]
port = {metrics_port}
{limits_section}"#,
            port = port,
            token_secret = token_secret,
            db_display = db_path.display(),
            metrics_port = metrics_port.unwrap_or(0),
            limits_section = limits_section,
        );
        std::fs::write(&config_path, config_content)?;

        let cargo_manifest_dir = env!("CARGO_MANIFEST_DIR");
        let binary_path = PathBuf::from(cargo_manifest_dir).join("target/debug/pulsehubd");

        let child = Command::new(&binary_path)
            .arg("-c")
            .arg(&config_path)
            .spawn()?;

        let server = Self {
            child,
            port,
            metrics_port,
            data_dir,
            db_path,
            token_secret,
        };
        server.wait_for_ready().await?;
        Ok(server)
    }

    /// Scrape the local `/metrics` endpoint and parse one Prometheus counter
    /// value out of the text exposition format. `None` if the metric isn't
    /// present yet (e.g. its first increment hasn't happened) or metrics
    /// weren't enabled for this server.
    pub async fn scrape_metric(&self, name: &str) -> Option<f64> {
        let port = self.metrics_port?;
        let body = reqwest::get(format!("http://127.0.0.1:{port}/metrics"))
            .await
            .ok()?
            .text()
            .await
            .ok()?;
        body.lines()
            .filter(|line| !line.starts_with('#'))
            .find_map(|line| {
                let (metric, value) = line.rsplit_once(' ')?;
                (metric == name).then(|| value.parse().ok()).flatten()
            })
    }

    /// Insert a channel row directly, bypassing the (out-of-scope) admin
    /// HTTP surface -- spec.md treats that surface as "specified only by
    /// the operations it calls on the core", so tests seed the core's own
    /// repository instead of driving a nonexistent HTTP API.
    pub async fn seed_channel(
        &self,
        tenant_id: &str,
        channel_id: &str,
        persistent: bool,
        presence: bool,
    ) -> anyhow::Result<()> {
        let pool = sqlx::SqlitePool::connect(&format!("sqlite://{}", self.db_path.display()))
            .await?;
        sqlx::query(
            "INSERT INTO channels
                (tenant_id, id, persistent, private, presence, push, is_closed, created_at)
             VALUES (?, ?, ?, 0, ?, 0, 0, 0)",
        )
        .bind(tenant_id)
        .bind(channel_id)
        .bind(persistent)
        .bind(presence)
        .execute(&pool)
        .await?;
        pool.close().await;
        Ok(())
    }

    /// Insert a client row with the given allowed channel list.
    pub async fn seed_client(
        &self,
        tenant_id: &str,
        client_id: &str,
        allowed_channels: &[&str],
    ) -> anyhow::Result<()> {
        let pool = sqlx::SqlitePool::connect(&format!("sqlite://{}", self.db_path.display()))
            .await?;
        sqlx::query("INSERT INTO clients (tenant_id, id, allowed_channels) VALUES (?, ?, ?)")
            .bind(tenant_id)
            .bind(client_id)
            .bind(allowed_channels.join(","))
            .execute(&pool)
            .await?;
        pool.close().await;
        Ok(())
    }

    /// Count persisted events for a channel, for assertions on S5-style
    /// batched persistence.
    pub async fn count_events(&self, tenant_id: &str, channel_id: &str) -> anyhow::Result<i64> {
        let pool = sqlx::SqlitePool::connect(&format!("sqlite://{}", self.db_path.display()))
            .await?;
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM events WHERE tenant_id = ? AND channel_id = ?",
        )
        .bind(tenant_id)
        .bind(channel_id)
        .fetch_one(&pool)
        .await?;
        pool.close().await;
        Ok(count.0)
    }

    async fn wait_for_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.address()).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("pulsehubd did not start listening on {}", self.address())
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/", self.port)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}
