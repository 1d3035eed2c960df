//! Repository (§6.3): the persistence backend consumed by the core.
//!
//! Everything here is a trait plus one concrete `sqlx`/SQLite implementation
//! ([`sqlite::SqliteRepository`]), grounded on the teacher's `db/mod.rs`
//! sqlx pool + migration style. Admin CRUD surfaces that call these traits
//! are out of scope; the traits themselves are in scope because the core
//! (Session::init, HubChannel lookup/creation, the persistence queue) calls
//! them directly.

pub mod queue;
pub mod sqlite;

use crate::error::CoreResult;
use crate::model::{Channel, ChannelFlags, Client, Device, Event, Tenant};
use async_trait::async_trait;

/// Tenant CRUD (§6.3 "Tenants").
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Create a new tenant.
    async fn create_tenant(&self, tenant: &Tenant) -> CoreResult<()>;
    /// Delete a tenant and everything scoped to it.
    async fn delete_tenant(&self, tenant_id: &str) -> CoreResult<()>;
    /// Update a tenant's mutable fields (currently just `name`).
    async fn update_tenant(&self, tenant_id: &str, name: &str) -> CoreResult<()>;
    /// Whether a tenant exists.
    async fn tenant_exists(&self, tenant_id: &str) -> CoreResult<bool>;
    /// List all tenants.
    async fn list_tenants(&self) -> CoreResult<Vec<Tenant>>;
}

/// Client CRUD (§6.3 "Clients").
#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Create a client within a tenant.
    async fn create_client(&self, client: &Client) -> CoreResult<()>;
    /// Fetch a client by id within its tenant.
    async fn get_client(&self, tenant_id: &str, client_id: &str) -> CoreResult<Option<Client>>;
    /// Update a client's `allowed_channels`.
    async fn update_client_allowed_channels(
        &self,
        tenant_id: &str,
        client_id: &str,
        allowed_channels: &[String],
    ) -> CoreResult<()>;
    /// Delete a client.
    async fn delete_client(&self, tenant_id: &str, client_id: &str) -> CoreResult<()>;
    /// Whether a client exists within a tenant.
    async fn client_exists_in_tenant(&self, tenant_id: &str, client_id: &str) -> CoreResult<bool>;
    /// List clients within a tenant.
    async fn list_clients_in_tenant(&self, tenant_id: &str) -> CoreResult<Vec<Client>>;
    /// List all clients across all tenants.
    async fn list_all_clients(&self) -> CoreResult<Vec<Client>>;
    /// The channel ids a client may subscribe to or publish on.
    async fn get_client_allowed_channels(
        &self,
        tenant_id: &str,
        client_id: &str,
    ) -> CoreResult<Vec<String>>;
}

/// Device CRUD and push-token lookups (§6.3 "Devices").
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Register a device for a client.
    async fn create_device(&self, device: &Device) -> CoreResult<()>;
    /// Fetch a device by id.
    async fn get_device(&self, client_id: &str, device_id: &str) -> CoreResult<Option<Device>>;
    /// Delete a device.
    async fn delete_device(&self, client_id: &str, device_id: &str) -> CoreResult<()>;
    /// List all devices for a client.
    async fn list_devices_by_client(&self, client_id: &str) -> CoreResult<Vec<Device>>;
    /// Look up push tokens for a set of clients (used by the push sink).
    async fn lookup_push_tokens(&self, client_ids: &[String]) -> CoreResult<Vec<String>>;
}

/// Visibility filter for [`ChannelRepository::list_channels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelVisibility {
    /// Only channels with `flags.private == false`.
    Public,
    /// Only channels with `flags.private == true`.
    Private,
    /// Every channel regardless of visibility.
    Any,
}

/// Channel CRUD and membership (§6.3 "Channels").
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Create a channel with fixed-for-lifetime flags.
    async fn create_channel(
        &self,
        tenant_id: &str,
        channel_id: &str,
        flags: ChannelFlags,
    ) -> CoreResult<()>;
    /// Delete a channel and its membership/history.
    async fn delete_channel(&self, tenant_id: &str, channel_id: &str) -> CoreResult<()>;
    /// Fetch channel metadata.
    async fn get_channel(&self, tenant_id: &str, channel_id: &str) -> CoreResult<Option<Channel>>;
    /// List channels in a tenant, filtered by visibility.
    async fn list_channels(
        &self,
        tenant_id: &str,
        visibility: ChannelVisibility,
    ) -> CoreResult<Vec<Channel>>;
    /// List channels a client is a member of.
    async fn list_channels_by_client_membership(
        &self,
        tenant_id: &str,
        client_id: &str,
    ) -> CoreResult<Vec<Channel>>;
    /// Add a client to a channel's allowed-channels membership.
    async fn add_channel_membership(
        &self,
        tenant_id: &str,
        channel_id: &str,
        client_id: &str,
    ) -> CoreResult<()>;
    /// Remove a client from a channel's allowed-channels membership.
    async fn remove_channel_membership(
        &self,
        tenant_id: &str,
        channel_id: &str,
        client_id: &str,
    ) -> CoreResult<()>;
    /// Set a channel's `is_closed` flag.
    async fn set_channel_closed(
        &self,
        tenant_id: &str,
        channel_id: &str,
        is_closed: bool,
    ) -> CoreResult<()>;
}

/// A single inbound record destined for the write-behind persistence queue.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Owning tenant.
    pub tenant_id: String,
    /// The event to persist.
    pub event: Event,
}

/// Event history storage and query operations (§6.3 "Channel events").
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert a single event.
    async fn insert_event(&self, record: &EventRecord) -> CoreResult<()>;
    /// Insert a batch of events in one transaction.
    async fn insert_events(&self, records: &[EventRecord]) -> CoreResult<()>;
    /// Events on a channel with `timestamp > after_ts`, oldest first.
    async fn query_after_ts(
        &self,
        tenant_id: &str,
        channel_id: &str,
        after_ts: i64,
        limit: usize,
    ) -> CoreResult<Vec<Event>>;
    /// Events on a channel with `from_ts <= timestamp <= to_ts`.
    async fn query_between_ts(
        &self,
        tenant_id: &str,
        channel_id: &str,
        from_ts: i64,
        to_ts: i64,
        limit: usize,
    ) -> CoreResult<Vec<Event>>;
    /// The most recent N events on a channel, newest first.
    async fn last_n(&self, tenant_id: &str, channel_id: &str, n: usize) -> CoreResult<Vec<Event>>;
    /// The most recent N events after a timestamp, newest first.
    async fn last_n_after_ts(
        &self,
        tenant_id: &str,
        channel_id: &str,
        after_ts: i64,
        n: usize,
    ) -> CoreResult<Vec<Event>>;
}

/// Full repository surface, composed from the per-concern traits above.
/// A single concrete type (`SqliteRepository`) implements all of them, the
/// same way the teacher's `Database` wraps one `SqlitePool` behind several
/// query modules.
pub trait Repository:
    TenantRepository + ClientRepository + DeviceRepository + ChannelRepository + EventRepository
{
}

impl<T> Repository for T where
    T: TenantRepository + ClientRepository + DeviceRepository + ChannelRepository + EventRepository
{
}
