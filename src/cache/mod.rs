//! Cache (§6.4): an in-process read-through/write-through cache sitting in
//! front of the [`Repository`](crate::persistence::Repository), sparing it
//! from per-subscribe/per-publish lookups on the hot path.
//!
//! The teacher's analogous layer is a Redis client; since a cross-process
//! cache is out of scope here (single binary, no external cache service
//! named in the config surface), this is a `dashmap`-backed in-process
//! stand-in behind the same trait shape -- swappable for a Redis-backed
//! implementation without touching callers.

use crate::model::{Channel, Client, Device, Tenant};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A recent event retained in the per-channel ring buffer, for fast replay
/// to newly-subscribed sessions without a repository round trip.
#[derive(Debug, Clone)]
pub struct CachedEvent {
    /// Opaque MessagePack-encoded event payload, ready to resend as-is.
    pub encoded: Vec<u8>,
    /// Insertion time, used to expire entries older than the cache TTL.
    pub inserted_at: Instant,
}

/// Typed accessors the core needs from the cache (§6.4).
///
/// Mirrors Redis's LPUSH/LTRIM/LRANGE/LLEN semantics for the bounded
/// per-channel event list: push to the front, trim to a max length, and
/// read back a bounded window.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a cached tenant, if present.
    async fn get_tenant(&self, tenant_id: &str) -> Option<Tenant>;
    /// Cache a tenant.
    async fn put_tenant(&self, tenant: Tenant);
    /// Evict a tenant.
    async fn remove_tenant(&self, tenant_id: &str);

    /// Fetch a cached client, if present.
    async fn get_client(&self, tenant_id: &str, client_id: &str) -> Option<Client>;
    /// Cache a client.
    async fn put_client(&self, client: Client);
    /// Evict a client.
    async fn remove_client(&self, tenant_id: &str, client_id: &str);

    /// Fetch a cached device, if present.
    async fn get_device(&self, client_id: &str, device_id: &str) -> Option<Device>;
    /// Cache a device.
    async fn put_device(&self, device: Device);
    /// Evict a device.
    async fn remove_device(&self, client_id: &str, device_id: &str);

    /// Fetch cached channel metadata, if present.
    async fn get_channel(&self, tenant_id: &str, channel_id: &str) -> Option<Channel>;
    /// Cache channel metadata.
    async fn put_channel(&self, channel: Channel);
    /// Evict channel metadata.
    async fn remove_channel(&self, tenant_id: &str, channel_id: &str);

    /// Fetch a client's cached `allowed_channels` set, if present.
    async fn get_allowed_channels(&self, tenant_id: &str, client_id: &str) -> Option<Vec<String>>;
    /// Cache a client's `allowed_channels` set.
    async fn put_allowed_channels(&self, tenant_id: &str, client_id: &str, channels: Vec<String>);
    /// Evict a client's cached `allowed_channels` set.
    async fn remove_allowed_channels(&self, tenant_id: &str, client_id: &str);

    /// Push a newly-published event's encoded bytes onto a channel's
    /// recent-events list, trimming to the configured cap.
    async fn push_recent_event(&self, tenant_id: &str, channel_id: &str, encoded: Vec<u8>);
    /// Read back a channel's recent events, oldest first, already filtered
    /// to those inserted within the TTL window.
    async fn recent_events(&self, tenant_id: &str, channel_id: &str) -> Vec<Vec<u8>>;
}

fn key(tenant_id: &str, id: &str) -> String {
    format!("{tenant_id}:{id}")
}

/// Default cap on the per-channel recent-events ring buffer.
pub const DEFAULT_EVENT_CAP: usize = 50;
/// Default TTL for entries in the recent-events ring buffer.
pub const DEFAULT_EVENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// `dashmap`-backed in-process [`Cache`] implementation.
pub struct InMemoryCache {
    tenants: DashMap<String, Tenant>,
    clients: DashMap<String, Client>,
    devices: DashMap<String, Device>,
    channels: DashMap<String, Channel>,
    allowed_channels: DashMap<String, Vec<String>>,
    recent_events: DashMap<String, VecDeque<CachedEvent>>,
    event_cap: usize,
    event_ttl: Duration,
}

impl InMemoryCache {
    /// Build a cache with the default recent-events cap and TTL.
    pub fn new() -> Arc<Self> {
        Self::with_limits(DEFAULT_EVENT_CAP, DEFAULT_EVENT_TTL)
    }

    /// Build a cache with explicit recent-events cap and TTL.
    pub fn with_limits(event_cap: usize, event_ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            tenants: DashMap::new(),
            clients: DashMap::new(),
            devices: DashMap::new(),
            channels: DashMap::new(),
            allowed_channels: DashMap::new(),
            recent_events: DashMap::new(),
            event_cap,
            event_ttl,
        })
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self {
            tenants: DashMap::new(),
            clients: DashMap::new(),
            devices: DashMap::new(),
            channels: DashMap::new(),
            allowed_channels: DashMap::new(),
            recent_events: DashMap::new(),
            event_cap: DEFAULT_EVENT_CAP,
            event_ttl: DEFAULT_EVENT_TTL,
        }
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_tenant(&self, tenant_id: &str) -> Option<Tenant> {
        self.tenants.get(tenant_id).map(|entry| entry.clone())
    }

    async fn put_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id.clone(), tenant);
    }

    async fn remove_tenant(&self, tenant_id: &str) {
        self.tenants.remove(tenant_id);
    }

    async fn get_client(&self, tenant_id: &str, client_id: &str) -> Option<Client> {
        self.clients.get(&key(tenant_id, client_id)).map(|e| e.clone())
    }

    async fn put_client(&self, client: Client) {
        self.clients
            .insert(key(&client.tenant_id, &client.id), client);
    }

    async fn remove_client(&self, tenant_id: &str, client_id: &str) {
        self.clients.remove(&key(tenant_id, client_id));
    }

    async fn get_device(&self, client_id: &str, device_id: &str) -> Option<Device> {
        self.devices.get(&key(client_id, device_id)).map(|e| e.clone())
    }

    async fn put_device(&self, device: Device) {
        self.devices
            .insert(key(&device.client_id, &device.id), device);
    }

    async fn remove_device(&self, client_id: &str, device_id: &str) {
        self.devices.remove(&key(client_id, device_id));
    }

    async fn get_channel(&self, tenant_id: &str, channel_id: &str) -> Option<Channel> {
        self.channels.get(&key(tenant_id, channel_id)).map(|e| e.clone())
    }

    async fn put_channel(&self, channel: Channel) {
        self.channels
            .insert(key(&channel.tenant_id, &channel.id), channel);
    }

    async fn remove_channel(&self, tenant_id: &str, channel_id: &str) {
        self.channels.remove(&key(tenant_id, channel_id));
        self.recent_events.remove(&key(tenant_id, channel_id));
    }

    async fn get_allowed_channels(&self, tenant_id: &str, client_id: &str) -> Option<Vec<String>> {
        self.allowed_channels
            .get(&key(tenant_id, client_id))
            .map(|e| e.clone())
    }

    async fn put_allowed_channels(&self, tenant_id: &str, client_id: &str, channels: Vec<String>) {
        self.allowed_channels
            .insert(key(tenant_id, client_id), channels);
    }

    async fn remove_allowed_channels(&self, tenant_id: &str, client_id: &str) {
        self.allowed_channels.remove(&key(tenant_id, client_id));
    }

    async fn push_recent_event(&self, tenant_id: &str, channel_id: &str, encoded: Vec<u8>) {
        let mut entry = self
            .recent_events
            .entry(key(tenant_id, channel_id))
            .or_default();
        entry.push_back(CachedEvent {
            encoded,
            inserted_at: Instant::now(),
        });
        while entry.len() > self.event_cap {
            entry.pop_front();
        }
    }

    async fn recent_events(&self, tenant_id: &str, channel_id: &str) -> Vec<Vec<u8>> {
        let Some(entry) = self.recent_events.get(&key(tenant_id, channel_id)) else {
            return Vec::new();
        };
        let ttl = self.event_ttl;
        entry
            .iter()
            .filter(|cached| cached.inserted_at.elapsed() < ttl)
            .map(|cached| cached.encoded.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tenant_round_trips() {
        let cache = InMemoryCache::new();
        let tenant = Tenant {
            id: "t1".into(),
            name: "Tenant One".into(),
            created_at: 0,
        };
        cache.put_tenant(tenant.clone()).await;
        assert_eq!(cache.get_tenant("t1").await, Some(tenant));
        cache.remove_tenant("t1").await;
        assert_eq!(cache.get_tenant("t1").await, None);
    }

    #[tokio::test]
    async fn recent_events_trims_to_cap() {
        let cache = InMemoryCache::with_limits(3, Duration::from_secs(60));
        for i in 0..5u8 {
            cache.push_recent_event("t1", "c1", vec![i]).await;
        }
        let events = cache.recent_events("t1", "c1").await;
        assert_eq!(events, vec![vec![2], vec![3], vec![4]]);
    }

    #[tokio::test]
    async fn recent_events_expire_past_ttl() {
        let cache = InMemoryCache::with_limits(50, Duration::from_millis(5));
        cache.push_recent_event("t1", "c1", vec![1]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.recent_events("t1", "c1").await.is_empty());
    }

    #[tokio::test]
    async fn removing_channel_clears_its_recent_events() {
        let cache = InMemoryCache::new();
        cache.push_recent_event("t1", "c1", vec![1]).await;
        cache
            .remove_channel("t1", "c1")
            .await;
        assert!(cache.recent_events("t1", "c1").await.is_empty());
    }
}
