//! pulsehub-node - multi-tenant real-time pub/sub node
//!
//! Accepts WebSocket connections, verifies bearer tokens, and fans events
//! out across per-tenant hubs and channels, with an optional cross-node bus
//! for multi-node deployments.

mod auth;
mod bus;
mod cache;
mod config;
mod connection;
mod error;
mod http;
mod hub;
mod metrics;
mod model;
mod persistence;
mod push;
mod session;
mod telemetry;

use crate::auth::{HmacTokenVerifier, TokenVerifier};
use crate::bus::memory::LocalBus;
use crate::cache::InMemoryCache;
use crate::config::{LimitsConfig, NodeConfig};
use crate::hub::{ChannelDeps, HubRegistry};
use crate::persistence::queue::PersistenceQueue;
use crate::persistence::sqlite::SqliteRepository;
use crate::persistence::Repository;
use crate::push::NullPushSink;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {flag}");
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    }
}

fn init_tracing(format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }
}

/// Build a TLS acceptor from a certificate chain and private key on disk.
fn load_tls_acceptor(cert_path: &str, key_path: &str) -> anyhow::Result<TlsAcceptor> {
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(std::fs::File::open(
        cert_path,
    )?))
    .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(std::fs::File::open(
        key_path,
    )?))?
    .ok_or_else(|| anyhow::anyhow!("no private key found in {key_path}"))?;

    let server_config = tokio_rustls::rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Accept loop for the WebSocket listener: every accepted stream is handed
/// off to its own task so a slow handshake never blocks new connections.
async fn run_listener(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    verifier: Arc<dyn TokenVerifier>,
    registry: Arc<HubRegistry>,
    deps: Arc<ChannelDeps>,
    limits: LimitsConfig,
) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
        };

        let verifier = verifier.clone();
        let registry = registry.clone();
        let deps = deps.clone();
        let limits = limits.clone();
        let tls = tls.clone();

        tokio::spawn(async move {
            let result = if let Some(acceptor) = tls {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        connection::accept(tls_stream, verifier, registry, deps, limits).await
                    }
                    Err(err) => {
                        warn!(peer = %peer_addr, error = %err, "tls handshake failed");
                        return;
                    }
                }
            } else {
                connection::accept_plain(stream, verifier, registry, deps, limits).await
            };

            if let Err(err) = result {
                warn!(peer = %peer_addr, error = %err, "connection ended with error");
            }
        });
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();

    let config = NodeConfig::load(&config_path).map_err(|e| {
        eprintln!("ERROR: failed to load config from {config_path}: {e}");
        e
    })?;

    init_tracing(&config.server.log_format);

    let server_id = if config.server.server_id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        config.server.server_id.clone()
    };

    info!(server_id = %server_id, listen = %config.server.listen, "starting pulsehub-node");

    let repository = Arc::new(SqliteRepository::new(&config.database.path).await?);
    info!(path = %config.database.path, "persistence repository ready");

    let persistence = PersistenceQueue::spawn(repository.clone(), config.persistence.clone());
    let repository: Arc<dyn Repository> = repository;
    let cache = InMemoryCache::new();
    let bus: crate::bus::SharedBus = Arc::new(LocalBus::new());
    let presence = Arc::new(hub::presence::PresenceTracker::new(
        config.limits.heartbeat_ttl(),
    ));

    let deps = Arc::new(ChannelDeps {
        server_id: server_id.clone(),
        cache,
        repository,
        bus,
        push: Arc::new(NullPushSink),
        persistence,
        presence,
        limits: config.limits.clone(),
    });

    let registry = HubRegistry::new();
    let verifier: Arc<dyn TokenVerifier> = Arc::new(HmacTokenVerifier::new(
        config.server.token_secret.clone().into_bytes(),
    ));

    if config.metrics.port == 0 {
        info!("metrics disabled");
    } else {
        metrics::init();
        let port = config.metrics.port;
        tokio::spawn(async move {
            http::run_http_server(port).await;
        });
        info!(port, "prometheus http server started");
    }

    let tls_acceptor = match &config.server.tls {
        Some(tls) => Some(load_tls_acceptor(&tls.cert_path, &tls.key_path)?),
        None => None,
    };
    if tls_acceptor.is_some() {
        info!("tls enabled");
    }

    let listener = TcpListener::bind(config.server.listen).await?;
    info!(addr = %config.server.listen, "websocket listener bound");

    let mut shutdown = std::pin::pin!(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    });

    tokio::select! {
        _ = run_listener(listener, tls_acceptor, verifier, registry, deps, config.limits.clone()) => {}
        _ = &mut shutdown => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
