//! `Hub` and `HubRegistry` (§4.5, §4.6): per-tenant channel ownership and
//! the top-level tenant → `Hub` map. Grounded on
//! `examples/original_source/channels/core/hub.go`, translated from its
//! `sync.Map`-of-channels shape into `dashmap` and from session-pointer
//! lookups into the `SessionHandle` trait object.

use super::channel::HubChannel;
use super::deps::ChannelDeps;
use super::SessionHandle;
use crate::model::{Channel, Event};
use dashmap::DashMap;
use std::sync::{Arc, Weak};

/// A single tenant's channel and session state (§3.1 `Hub`).
///
/// Owns its channels outright (`Arc<HubChannel>`); holds sessions as
/// `Arc<dyn SessionHandle>`, which is a non-owning reference in spirit --
/// `crate::session::Session` is kept alive by the connection task, not by
/// the hub, and removes itself on close.
pub struct Hub {
    tenant_id: String,
    channels: DashMap<String, Arc<HubChannel>>,
    sessions: DashMap<String, Arc<dyn SessionHandle>>,
    deps: Arc<ChannelDeps>,
    self_ref: std::sync::OnceLock<Weak<Hub>>,
}

impl Hub {
    fn new(tenant_id: String, deps: Arc<ChannelDeps>) -> Arc<Self> {
        let hub = Arc::new(Self {
            tenant_id,
            channels: DashMap::new(),
            sessions: DashMap::new(),
            deps,
            self_ref: std::sync::OnceLock::new(),
        });
        let _ = hub.self_ref.set(Arc::downgrade(&hub));
        hub
    }

    /// This hub's tenant id.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn weak_self(&self) -> Weak<Hub> {
        self.self_ref.get().cloned().unwrap_or_else(Weak::new)
    }

    /// §4.5: look up a channel already resident in this hub, without
    /// creating one.
    pub fn contains_hub_channel(&self, channel_id: &str) -> Option<Arc<HubChannel>> {
        self.channels.get(channel_id).map(|entry| entry.clone())
    }

    fn get_or_load_channel(&self, meta: Channel) -> Arc<HubChannel> {
        if let Some(existing) = self.channels.get(&meta.id) {
            return existing.clone();
        }
        let channel = HubChannel::new(meta.clone(), self.weak_self(), self.deps.clone());
        self.channels
            .entry(meta.id)
            .or_insert(channel)
            .clone()
    }

    /// §4.5: register a session as connected to this tenant.
    pub fn add_client(&self, session: Arc<dyn SessionHandle>) {
        self.sessions.insert(session.identifier().to_string(), session);
    }

    /// §4.5: deregister a session; callers are still responsible for
    /// unsubscribing it from each channel it had joined (the hub does not
    /// track per-session channel membership -- `Session` does, per the
    /// weak-back-reference design note).
    pub fn remove_client(&self, identifier: &str) {
        self.sessions.remove(identifier);
    }

    /// §4.5: add a subscriber to `channel_id`, creating the channel (with
    /// `flags`) if this is the first subscriber.
    pub async fn subscribe(
        &self,
        channel_meta: Channel,
        session: Arc<dyn SessionHandle>,
    ) -> Arc<HubChannel> {
        let channel = self.get_or_load_channel(channel_meta);
        channel.new_client(session).await;
        channel
    }

    /// §4.5: remove a subscriber from `channel_id`, if it exists.
    pub async fn unsubscribe(&self, channel_id: &str, identifier: &str, client_id: &str) {
        if let Some(channel) = self.channels.get(channel_id).map(|e| e.clone()) {
            channel.remove_client(identifier, client_id).await;
        }
    }

    /// §4.5 / §4.4.2: publish locally, creating the channel (with `flags`)
    /// if it does not yet exist -- matches the Go original's
    /// `Hub.Publish`, which lazily creates a channel on first publish too.
    pub async fn publish(&self, channel_meta: Channel, event: Event, should_store: bool) -> bool {
        let channel = self.get_or_load_channel(channel_meta);
        channel.publish(event, should_store).await
    }

    /// §4.4.5: remove and tear down a channel (inactivity close, or an
    /// explicit admin delete).
    pub async fn delete_channel(&self, channel_id: &str) {
        if let Some((_, channel)) = self.channels.remove(channel_id) {
            channel.delete_channel().await;
        }
    }

    /// §4.4.2 `ChannelAccess` handling: propagate a channel-access grant to
    /// every local session belonging to `client_id` (a client may hold more
    /// than one session, one per device).
    pub async fn add_channel_to_client(&self, client_id: &str, channel_id: &str) {
        for entry in self.sessions.iter() {
            if entry.value().client_id() == client_id {
                let envelope = pulsehub_wire::Envelope::new(
                    pulsehub_wire::EnvelopePayload::NewChannel(channel_id.to_string()),
                );
                if let Ok(bytes) = pulsehub_wire::encode(&envelope) {
                    entry.value().publish(bytes).await;
                }
            }
        }
    }

    /// Mirror of [`Hub::add_channel_to_client`] for revocation.
    pub async fn remove_channel_from_client(&self, client_id: &str, channel_id: &str) {
        for entry in self.sessions.iter() {
            if entry.value().client_id() == client_id {
                let envelope = pulsehub_wire::Envelope::new(
                    pulsehub_wire::EnvelopePayload::RemoveChannel(channel_id.to_string()),
                );
                if let Ok(bytes) = pulsehub_wire::encode(&envelope) {
                    entry.value().publish(bytes).await;
                }
            }
        }
    }
}

/// Top-level tenant → [`Hub`] map (§4.6), one per node.
pub struct HubRegistry {
    hubs: DashMap<String, Arc<Hub>>,
}

impl HubRegistry {
    /// Build an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            hubs: DashMap::new(),
        })
    }

    /// Look up a tenant's hub, creating it (with fresh, empty state, wired
    /// to `deps`) if it does not yet exist. Hubs are never proactively
    /// evicted: a tenant with no active channels or sessions is cheap (two
    /// empty dashmaps), and §4.6 does not call for tenant-level garbage
    /// collection. Every tenant on a node shares the same `deps` bundle in
    /// practice (one node, one repository/bus/persistence queue), but the
    /// registry does not assume that -- each hub keeps the bundle it was
    /// created with.
    pub fn get_or_create(&self, tenant_id: &str, deps: Arc<ChannelDeps>) -> Arc<Hub> {
        if let Some(existing) = self.hubs.get(tenant_id) {
            return existing.clone();
        }
        let hub = Hub::new(tenant_id.to_string(), deps);
        self.hubs
            .entry(tenant_id.to_string())
            .or_insert(hub)
            .clone()
    }

    /// Drop a tenant's hub entirely. Not currently driven by any spec
    /// operation (tenants are not deleted in §4.1), kept for operator
    /// tooling / tests.
    pub fn remove(&self, tenant_id: &str) {
        self.hubs.remove(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::LocalBus;
    use crate::cache::InMemoryCache;
    use crate::config::{LimitsConfig, PersistenceConfig};
    use crate::hub::presence::PresenceTracker;
    use crate::model::ChannelFlags;
    use crate::persistence::queue::PersistenceQueue;
    use crate::persistence::sqlite::SqliteRepository;
    use crate::push::NullPushSink;
    use async_trait::async_trait;

    struct NoopSession {
        identifier: String,
        client_id: String,
    }

    #[async_trait]
    impl SessionHandle for NoopSession {
        fn identifier(&self) -> &str {
            &self.identifier
        }
        fn client_id(&self) -> &str {
            &self.client_id
        }
        async fn publish(&self, _bytes: Vec<u8>) {}
    }

    async fn deps() -> Arc<ChannelDeps> {
        let repo = Arc::new(SqliteRepository::new(":memory:").await.unwrap());
        Arc::new(ChannelDeps {
            server_id: "node-test".into(),
            cache: InMemoryCache::new(),
            repository: repo.clone(),
            bus: Arc::new(LocalBus::new()),
            push: Arc::new(NullPushSink),
            persistence: PersistenceQueue::spawn(repo, PersistenceConfig::default()),
            presence: Arc::new(PresenceTracker::new(std::time::Duration::from_secs(180))),
            limits: LimitsConfig::default(),
        })
    }

    #[tokio::test]
    async fn get_or_create_returns_same_hub_for_same_tenant() {
        let registry = HubRegistry::new();
        let deps = deps().await;
        let a = registry.get_or_create("tenant-1", deps.clone());
        let b = registry.get_or_create("tenant-1", deps);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn subscribe_then_contains_hub_channel() {
        let registry = HubRegistry::new();
        let deps = deps().await;
        let hub = registry.get_or_create("tenant-1", deps);

        let session = Arc::new(NoopSession {
            identifier: "client-1-dev-1".into(),
            client_id: "client-1".into(),
        });
        hub.subscribe(
            Channel {
                id: "room".into(),
                tenant_id: "tenant-1".into(),
                flags: ChannelFlags::default(),
                created_at: 0,
            },
            session,
        )
        .await;

        assert!(hub.contains_hub_channel("room").is_some());
        assert!(hub.contains_hub_channel("missing").is_none());
    }

    #[tokio::test]
    async fn different_tenants_get_different_hubs() {
        let registry = HubRegistry::new();
        let deps = deps().await;
        let a = registry.get_or_create("tenant-1", deps.clone());
        let b = registry.get_or_create("tenant-2", deps);
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
