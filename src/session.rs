//! Session (§4.3): one connected client's identity, allowed-channel set,
//! and dispatch of inbound wire frames. Grounded on
//! `examples/original_source/channels/core/session.go`.
//!
//! A session does not own its socket -- `crate::connection::Connection`
//! does, and hands this session only an outbound byte sink (a bounded
//! `mpsc::Sender`). This keeps the hub/channel layer ignorant of transport
//! details: it only ever sees a session through the [`crate::hub::SessionHandle`]
//! trait.

use crate::auth::Identity;
use crate::cache::Cache;
use crate::hub::{ChannelDeps, Hub, HubChannel, SessionHandle};
use crate::model::Channel;
use crate::persistence::Repository;
use async_trait::async_trait;
use parking_lot::RwLock;
use pulsehub_wire::{Ack, Envelope, EnvelopePayload};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One connected client (§3.1 `Session`).
pub struct Session {
    id: String,
    identifier: String,
    client_id: String,
    device_id: String,
    identity: Identity,
    hub: Arc<Hub>,
    deps: Arc<ChannelDeps>,
    allowed_channels: RwLock<Vec<String>>,
    subscribed: RwLock<Vec<Arc<HubChannel>>>,
    is_closed: AtomicBool,
    outbound: mpsc::Sender<Vec<u8>>,
}

impl Session {
    /// §4.3.1: load the client's allowed channels (cache, falling back to
    /// the repository), register with the hub, and stamp an initial
    /// presence timestamp.
    pub async fn init(
        identity: Identity,
        device_id: Option<String>,
        hub: Arc<Hub>,
        deps: Arc<ChannelDeps>,
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> Arc<Self> {
        let device_id = device_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        let identifier = format!("{}-{}", identity.client_id, device_id);

        let allowed_channels = Self::load_allowed_channels(&identity, &deps).await;

        let session = Arc::new(Self {
            id: session_id,
            identifier,
            client_id: identity.client_id.clone(),
            device_id,
            identity,
            hub: hub.clone(),
            deps: deps.clone(),
            allowed_channels: RwLock::new(allowed_channels),
            subscribed: RwLock::new(Vec::new()),
            is_closed: AtomicBool::new(false),
            outbound,
        });

        deps.presence.update_client_timestamp(&session.client_id);
        hub.add_client(session.clone());
        crate::metrics::CONNECTED_SESSIONS.inc();

        session
    }

    async fn load_allowed_channels(identity: &Identity, deps: &Arc<ChannelDeps>) -> Vec<String> {
        if let Some(cached) = deps
            .cache
            .get_allowed_channels(&identity.tenant_id, &identity.client_id)
            .await
        {
            return cached;
        }

        match deps
            .repository
            .get_client_allowed_channels(&identity.tenant_id, &identity.client_id)
            .await
        {
            Ok(channels) => {
                deps.cache
                    .put_allowed_channels(&identity.tenant_id, &identity.client_id, channels.clone())
                    .await;
                channels
            }
            Err(err) => {
                tracing::error!(
                    tenant_id = %identity.tenant_id, client_id = %identity.client_id, error = %err,
                    "failed to load allowed channels, treating client as having none"
                );
                Vec::new()
            }
        }
    }

    /// Session id, assigned at connect time (not the wire identifier).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The owning tenant.
    pub fn tenant_id(&self) -> &str {
        &self.identity.tenant_id
    }

    /// Device id distinguishing this session from the client's others.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// §4.2 `on_heartbeat()`: called when the connection's read loop
    /// receives a pong. Stamps the presence tracker's last-seen timestamp --
    /// the only other place this happens is [`Session::init`], deliberately
    /// never on every inbound frame (see `PresenceTracker::update_client_timestamp`).
    pub fn on_heartbeat(&self) {
        self.deps.presence.update_client_timestamp(&self.client_id);
    }

    fn is_allowed(&self, channel_id: &str) -> bool {
        self.identity.admin_kind()
            || self
                .allowed_channels
                .read()
                .iter()
                .any(|c| c == channel_id)
    }

    async fn resolve_channel(&self, channel_id: &str) -> Option<Channel> {
        if let Some(channel) = self.deps.cache.get_channel(self.tenant_id(), channel_id).await {
            return Some(channel);
        }
        match self
            .deps
            .repository
            .get_channel(self.tenant_id(), channel_id)
            .await
        {
            Ok(Some(channel)) => {
                self.deps.cache.put_channel(channel.clone()).await;
                Some(channel)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::error!(
                    tenant_id = %self.tenant_id(), channel_id, error = %err,
                    "failed to resolve channel metadata"
                );
                None
            }
        }
    }

    /// §4.3.3: dispatch one decoded inbound frame.
    pub async fn on_message(self: &Arc<Self>, bytes: Vec<u8>) {
        if self.is_closed.load(Ordering::SeqCst) {
            return;
        }

        let envelope: Envelope = match pulsehub_wire::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(session = %self.identifier, error = %err, "dropping malformed frame");
                return;
            }
        };

        match envelope.payload {
            EnvelopePayload::Subscribe(request) => {
                let did_subscribe = self.try_subscribe(&request.channel_id).await;
                self.notify_ack(request.id, did_subscribe).await;
            }
            EnvelopePayload::Publish(request) => {
                let timestamp = crate::hub::presence::now_unix();
                let event = crate::model::Event {
                    id: 0,
                    tenant_id: self.tenant_id().to_string(),
                    channel_id: request.channel_id.clone(),
                    sender_id: self.client_id.clone(),
                    event_type: request.event_type.clone(),
                    payload: request.payload.clone(),
                    timestamp,
                };
                let did_publish = self.try_publish(&request.channel_id, event, request.id != 0).await;
                if request.id != 0 {
                    self.notify_ack(request.id, did_publish).await;
                }
            }
            // Every other variant is server-to-client only; a client that
            // sends one is misbehaving, and we just ignore it.
            _ => {
                tracing::debug!(session = %self.identifier, "ignoring client-to-server frame of a server-only type");
            }
        }
    }

    async fn try_subscribe(self: &Arc<Self>, channel_id: &str) -> bool {
        if !self.is_allowed(channel_id) {
            crate::metrics::ADMISSION_REJECTED.inc();
            return false;
        }

        let Some(meta) = self.resolve_channel(channel_id).await else {
            crate::metrics::ADMISSION_REJECTED.inc();
            return false;
        };

        let handle: Arc<dyn SessionHandle> = self.clone();
        let channel = self.hub.subscribe(meta, handle).await;
        self.subscribed.write().push(channel);

        self.deps.presence.add_online_channel_device(
            self.tenant_id(),
            channel_id,
            &self.client_id,
            &self.device_id,
        );

        true
    }

    async fn try_publish(&self, channel_id: &str, event: crate::model::Event, should_store: bool) -> bool {
        if !self.is_allowed(channel_id) {
            crate::metrics::ADMISSION_REJECTED.inc();
            return false;
        }

        let Some(meta) = self.resolve_channel(channel_id).await else {
            crate::metrics::ADMISSION_REJECTED.inc();
            return false;
        };

        crate::metrics::EVENTS_PUBLISHED.inc();
        self.hub.publish(meta, event, should_store).await
    }

    async fn notify_ack(&self, reply_to: u32, status: bool) {
        let envelope = Envelope::new(EnvelopePayload::Ack(Ack { reply_to, status }));
        if let Ok(bytes) = pulsehub_wire::encode(&envelope) {
            self.send_bytes(bytes).await;
        }
    }

    async fn send_bytes(&self, bytes: Vec<u8>) {
        if self.outbound.send(bytes).await.is_err() {
            tracing::debug!(session = %self.identifier, "outbound queue closed, dropping frame");
        }
    }

    /// §4.3.2: server-initiated access grant while connected (triggered by
    /// a bus `ChannelAccess` envelope routed through the hub).
    pub async fn add_channel(&self, channel_id: &str) {
        self.allowed_channels.write().push(channel_id.to_string());
        let envelope = Envelope::new(EnvelopePayload::NewChannel(channel_id.to_string()));
        if let Ok(bytes) = pulsehub_wire::encode(&envelope) {
            self.send_bytes(bytes).await;
        }
    }

    /// §4.3.2: server-initiated access revocation while connected.
    pub async fn remove_channel(&self, channel_id: &str) {
        let envelope = Envelope::new(EnvelopePayload::RemoveChannel(channel_id.to_string()));
        if let Ok(bytes) = pulsehub_wire::encode(&envelope) {
            self.send_bytes(bytes).await;
        }

        let removed = {
            let mut subscribed = self.subscribed.write();
            if let Some(pos) = subscribed.iter().position(|c| c.channel_id() == channel_id) {
                Some(subscribed.remove(pos))
            } else {
                None
            }
        };

        if removed.is_some() {
            self.hub
                .unsubscribe(channel_id, &self.identifier, &self.client_id)
                .await;
            self.allowed_channels.write().retain(|c| c != channel_id);
        }
    }

    /// §4.3.4: idempotent teardown -- unsubscribe from every joined
    /// channel and deregister from the hub. Safe to call more than once
    /// (e.g. from both the read loop's close path and a hook).
    pub async fn close(self: &Arc<Self>) {
        if self.is_closed.swap(true, Ordering::SeqCst) {
            return;
        }

        crate::metrics::CONNECTED_SESSIONS.dec();

        let channels = std::mem::take(&mut *self.subscribed.write());
        for channel in channels {
            channel.remove_client(&self.identifier, &self.client_id).await;
            self.deps.presence.remove_online_channel_device(
                self.tenant_id(),
                channel.channel_id(),
                &self.client_id,
                &self.device_id,
            );
        }

        self.hub.remove_client(&self.identifier);
    }
}

#[async_trait]
impl SessionHandle for Session {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn publish(&self, bytes: Vec<u8>) {
        if self.is_closed.load(Ordering::SeqCst) {
            return;
        }
        self.send_bytes(bytes).await;
    }
}
