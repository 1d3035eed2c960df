//! `HubChannel` (§4.4): a node-local handle to one channel. The hard center
//! of the core -- subscriber fan-out, presence substate, and coordination
//! with persistence/push/bus -- grounded on
//! `examples/original_source/channels/core/channel.go`.
//!
//! Concurrency primitives follow the Go original's own shape
//! (`sync.Map` + `atomic.Int32`) rather than the teacher's actor-per-entity
//! model: `dashmap` for the subscriber set and presence substate,
//! `AtomicI64`/`AtomicBool` for the counter and closing flag. See §5's
//! "fine-grained maps and atomics... no global locks".

use super::deps::ChannelDeps;
use super::presence::{now_millis, now_unix};
use super::registry::Hub;
use super::SessionHandle;
use crate::model::{Channel, ChannelFlags, Event};
use crate::persistence::EventRecord;
use crate::push::PushRequest;
use dashmap::DashMap;
use pulsehub_wire::{
    ChannelEventPayload, ClientJoin, ClientLeave, Envelope, EnvelopePayload, ExternalEnvelope,
    ExternalPayload, InitialPresenceStatus, OnlineStatusUpdate, PresenceStatus,
};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

/// One client's local presence entry, as tracked by this `HubChannel`
/// (§4.4.3): not the same as [`super::presence::PresenceTracker`], which is
/// node-wide and heartbeat-driven -- this is the channel-scoped broadcast
/// state every subscriber's `InitialOnlineStatus` snapshot is built from.
#[derive(Debug, Clone, Copy)]
struct PresenceEntry {
    online: bool,
    timestamp: i64,
}

/// Either a membership-changed (`JOIN`/`LEAVE`) kind for
/// [`HubChannel::publish_join_leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipKind {
    /// A client joined the channel.
    Join,
    /// A client left the channel.
    Leave,
}

/// Node-local handle to a channel (§3.1 `HubChannel`, §4.4).
pub struct HubChannel {
    tenant_id: String,
    channel_id: String,
    flags: ChannelFlags,
    subscribers: DashMap<String, Arc<dyn SessionHandle>>,
    presence_state: DashMap<String, PresenceEntry>,
    subscriber_count: AtomicI64,
    is_closing: AtomicBool,
    /// Bumped on every `new_client`; an armed inactivity timer captures the
    /// epoch at arm time and only acts if it is unchanged on expiry --
    /// matches the "re-read authoritative state before acting" timer
    /// hygiene design note without needing real timer cancellation.
    inactivity_epoch: AtomicU64,
    hub: Weak<Hub>,
    deps: Arc<ChannelDeps>,
    bus_reader: AsyncMutex<Option<JoinHandle<()>>>,
}

impl HubChannel {
    /// Build a new, empty `HubChannel` for `meta`, and start its cross-node
    /// bus subscription (§4.4.5 step 3: "ask the bus to subscribe to
    /// `tenant_id:channel_id`").
    pub fn new(meta: Channel, hub: Weak<Hub>, deps: Arc<ChannelDeps>) -> Arc<Self> {
        let presence_state = DashMap::new();
        if meta.flags.presence {
            for (client_id, last_seen) in deps
                .presence
                .get_channel_clients_presence(&meta.tenant_id, &meta.id)
            {
                presence_state.insert(
                    client_id,
                    PresenceEntry {
                        online: false,
                        timestamp: last_seen,
                    },
                );
            }
        }

        let channel = Arc::new(Self {
            tenant_id: meta.tenant_id,
            channel_id: meta.id,
            flags: meta.flags,
            subscribers: DashMap::new(),
            presence_state,
            subscriber_count: AtomicI64::new(0),
            is_closing: AtomicBool::new(false),
            inactivity_epoch: AtomicU64::new(0),
            hub,
            deps,
            bus_reader: AsyncMutex::new(None),
        });

        let reader = tokio::spawn(run_bus_reader(channel.clone()));
        // spawn() requires `channel` to already be alive; store the handle
        // so `delete_channel` can abort it without waiting on a lock cycle.
        if let Ok(mut guard) = channel.bus_reader.try_lock() {
            *guard = Some(reader);
        }

        channel
    }

    /// Owning tenant.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Channel id, unique within its tenant.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Fixed-for-lifetime flags (except `is_closed`, not tracked locally).
    pub fn flags(&self) -> ChannelFlags {
        self.flags
    }

    /// Current count of locally-connected subscribers.
    pub fn subscriber_count(&self) -> i64 {
        self.subscriber_count.load(Ordering::SeqCst)
    }

    fn topic(&self) -> String {
        ExternalEnvelope::topic(&self.tenant_id, &self.channel_id)
    }

    /// §4.4.1: add a subscriber, cancel any pending inactivity timer.
    pub async fn new_client(self: &Arc<Self>, session: Arc<dyn SessionHandle>) {
        if self.is_closing.load(Ordering::SeqCst) {
            return;
        }

        // Cancel any pending inactivity close by advancing the epoch: the
        // armed timer's captured epoch will no longer match.
        self.inactivity_epoch.fetch_add(1, Ordering::SeqCst);

        self.subscriber_count.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .insert(session.identifier().to_string(), session.clone());
        crate::metrics::ACTIVE_CHANNELS.set(self.subscriber_count.load(Ordering::SeqCst).max(0));

        if self.flags.presence {
            self.notify_online(session.as_ref()).await;
            self.send_initial_presence(session.as_ref()).await;
        }
    }

    async fn notify_online(&self, session: &dyn SessionHandle) {
        let now_ms = now_millis();
        let t_now = now_unix();
        self.presence_state.insert(
            session.client_id().to_string(),
            PresenceEntry {
                online: true,
                timestamp: t_now,
            },
        );

        if self.deps.presence.last_seen_before(session.client_id(), now_ms) {
            self.publish_status_change(OnlineStatusUpdate {
                channel_id: self.channel_id.clone(),
                client_id: session.client_id().to_string(),
                status: true,
                timestamp: t_now,
            })
            .await;
        }
    }

    async fn send_initial_presence(&self, session: &dyn SessionHandle) {
        let client_status = self
            .presence_state
            .iter()
            .filter(|entry| entry.key() != session.client_id())
            .map(|entry| {
                (
                    entry.key().clone(),
                    PresenceStatus {
                        status: entry.value().online,
                        timestamp: entry.value().timestamp,
                    },
                )
            })
            .collect();

        let envelope = Envelope::new(EnvelopePayload::InitialOnlineStatus(
            InitialPresenceStatus {
                channel_id: self.channel_id.clone(),
                client_status,
            },
        ));

        match pulsehub_wire::encode(&envelope) {
            Ok(bytes) => session.publish(bytes).await,
            Err(err) => tracing::error!(
                tenant_id = %self.tenant_id, channel_id = %self.channel_id, error = %err,
                "failed to marshal initial presence snapshot"
            ),
        }
    }

    /// §4.4.1 / §4.4.4: remove a subscriber, arm the inactivity timer if the
    /// count reaches zero, and schedule the presence-offline debounce.
    pub async fn remove_client(self: &Arc<Self>, identifier: &str, client_id: &str) {
        if self.is_closing.load(Ordering::SeqCst) {
            return;
        }

        self.subscribers.remove(identifier);
        let remaining = self.subscriber_count.fetch_sub(1, Ordering::SeqCst) - 1;
        crate::metrics::ACTIVE_CHANNELS.set(remaining.max(0));

        if self.flags.presence {
            self.schedule_offline_debounce(client_id.to_string());
        }

        if remaining == 0 {
            self.arm_inactivity_timer();
        }
    }

    fn schedule_offline_debounce(self: &Arc<Self>, client_id: String) {
        let channel = self.clone();
        let armed_at_ms = now_millis();
        let debounce = self.deps.limits.presence_debounce();
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if !channel.deps.presence.last_seen_before(&client_id, armed_at_ms) {
                // Client heartbeated again (e.g. reconnected on another
                // device) since we armed -- no offline transition (§4.4.3,
                // S3).
                return;
            }

            let now = now_unix();
            channel
                .presence_state
                .insert(client_id.clone(), PresenceEntry {
                    online: false,
                    timestamp: now,
                });
            channel
                .publish_status_change(OnlineStatusUpdate {
                    channel_id: channel.channel_id.clone(),
                    client_id,
                    status: false,
                    timestamp: now,
                })
                .await;
        });
    }

    fn arm_inactivity_timer(self: &Arc<Self>) {
        let channel = self.clone();
        let epoch = self.inactivity_epoch.load(Ordering::SeqCst);
        let timeout = self.deps.limits.inactivity_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            if channel.inactivity_epoch.load(Ordering::SeqCst) != epoch {
                // A subscribe arrived (or another cycle of 0-subscribers
                // started) since this timer was armed; stand down.
                return;
            }
            if channel.subscriber_count.load(Ordering::SeqCst) != 0 {
                return;
            }

            let Some(hub) = channel.hub.upgrade() else {
                return;
            };
            crate::metrics::CHANNELS_CLOSED_IDLE.inc();
            hub.delete_channel(&channel.channel_id).await;
        });
    }

    /// §4.4.2: local or admin-originated publish. Persists (if
    /// `persistent ∧ should_store`), pushes to offline members (if
    /// `presence ∧ push`), replicates to peers, then fans out locally.
    pub async fn publish(&self, event: Event, should_store: bool) -> bool {
        if self.is_closing.load(Ordering::SeqCst) {
            return false;
        }

        if self.flags.persistent && should_store {
            self.deps
                .persistence
                .enqueue(EventRecord {
                    tenant_id: self.tenant_id.clone(),
                    event: event.clone(),
                })
                .await;
            self.deps
                .cache
                .push_recent_event(&self.tenant_id, &self.channel_id, event.payload.clone())
                .await;
        }

        if self.flags.presence && self.flags.push {
            for entry in self.presence_state.iter() {
                if !entry.value().online {
                    self.deps
                        .push
                        .enqueue(PushRequest {
                            tenant_id: self.tenant_id.clone(),
                            channel_id: self.channel_id.clone(),
                            client_id: entry.key().clone(),
                            payload: event.payload.clone(),
                        })
                        .await;
                }
            }
        }

        self.deps
            .bus
            .publish(
                &self.topic(),
                ExternalEnvelope::new(
                    self.deps.server_id.clone(),
                    ExternalPayload::ChannelEvent {
                        sender_id: event.sender_id.clone(),
                        event_type: event.event_type.clone(),
                        payload: event.payload.clone(),
                        timestamp: event.timestamp,
                    },
                ),
            )
            .await;

        self.fan_out(EnvelopePayload::ChannelEvent(ChannelEventPayload {
            sender_id: event.sender_id,
            event_type: event.event_type,
            payload: event.payload,
            channel_id: event.channel_id,
            timestamp: event.timestamp,
        }))
        .await;

        true
    }

    /// §4.4.2: inbound from the bus or an admin bypass. No persistence, no
    /// push, no replication -- only local fan-out.
    pub async fn external_publish(&self, payload: ChannelEventPayload) -> bool {
        if self.is_closing.load(Ordering::SeqCst) {
            return false;
        }
        self.fan_out_event(payload).await;
        true
    }

    async fn fan_out_event(&self, payload: ChannelEventPayload) {
        let envelope = Envelope::new(EnvelopePayload::ChannelEvent(payload));
        self.broadcast(envelope).await;
    }

    /// §4.4.2: membership JOIN/LEAVE notifications.
    pub async fn publish_join_leave(&self, kind: MembershipKind, client_id: String) {
        if self.is_closing.load(Ordering::SeqCst) {
            return;
        }
        let payload = match kind {
            MembershipKind::Join => EnvelopePayload::JoinChannel(ClientJoin {
                channel_id: self.channel_id.clone(),
                client_id,
            }),
            MembershipKind::Leave => EnvelopePayload::LeaveChannel(ClientLeave {
                channel_id: self.channel_id.clone(),
                client_id,
            }),
        };
        self.broadcast(Envelope::new(payload)).await;
    }

    /// §4.4.2: a local presence transition -- replicate to peers, fan out
    /// to every local subscriber except the client whose status changed.
    pub async fn publish_status_change(&self, update: OnlineStatusUpdate) -> bool {
        if self.is_closing.load(Ordering::SeqCst) {
            return false;
        }

        self.presence_state.insert(
            update.client_id.clone(),
            PresenceEntry {
                online: update.status,
                timestamp: update.timestamp,
            },
        );

        crate::metrics::PRESENCE_TRANSITIONS
            .with_label_values(&[if update.status { "online" } else { "offline" }])
            .inc();

        self.deps
            .bus
            .publish(
                &self.topic(),
                ExternalEnvelope::new(
                    self.deps.server_id.clone(),
                    ExternalPayload::OnlineStatus {
                        client_id: update.client_id.clone(),
                        status: update.status,
                        timestamp: update.timestamp,
                    },
                ),
            )
            .await;

        self.broadcast_excluding(
            Envelope::new(EnvelopePayload::OnlineStatus(update.clone())),
            &update.client_id,
        )
        .await;

        true
    }

    /// §4.4.2: inbound presence update from another node. Updates local
    /// substate and fans out, excluding the updating client, but never
    /// replicates (it didn't originate here) or republishes to the bus.
    pub async fn external_publish_status_change(&self, update: OnlineStatusUpdate) -> bool {
        if self.is_closing.load(Ordering::SeqCst) {
            return false;
        }

        self.presence_state.insert(
            update.client_id.clone(),
            PresenceEntry {
                online: update.status,
                timestamp: update.timestamp,
            },
        );

        self.broadcast_excluding(
            Envelope::new(EnvelopePayload::OnlineStatus(update.clone())),
            &update.client_id,
        )
        .await;

        true
    }

    async fn fan_out(&self, payload: EnvelopePayload) {
        self.broadcast(Envelope::new(payload)).await;
    }

    async fn broadcast(&self, envelope: Envelope) {
        let bytes = match pulsehub_wire::encode(&envelope) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(
                    tenant_id = %self.tenant_id, channel_id = %self.channel_id, error = %err,
                    "failed to marshal envelope, aborting this fan-out"
                );
                return;
            }
        };
        let recipients = self.subscribers.len();
        let _span = crate::telemetry::create_fanout_span(&self.tenant_id, &self.channel_id, recipients);
        for entry in self.subscribers.iter() {
            entry.value().publish(bytes.clone()).await;
        }
    }

    async fn broadcast_excluding(&self, envelope: Envelope, excluded_client_id: &str) {
        let bytes = match pulsehub_wire::encode(&envelope) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(
                    tenant_id = %self.tenant_id, channel_id = %self.channel_id, error = %err,
                    "failed to marshal envelope, aborting this fan-out"
                );
                return;
            }
        };
        for entry in self.subscribers.iter() {
            if entry.value().client_id() != excluded_client_id {
                entry.value().publish(bytes.clone()).await;
            }
        }
    }

    /// §4.4.5 invariant (a): stop accepting any further fan-out, unsubscribe
    /// everyone, and abort the bus reader task.
    pub async fn delete_channel(&self) {
        self.is_closing.store(true, Ordering::SeqCst);

        let envelope = Envelope::new(EnvelopePayload::RemoveChannel(self.channel_id.clone()));
        if let Ok(bytes) = pulsehub_wire::encode(&envelope) {
            for entry in self.subscribers.iter() {
                entry.value().publish(bytes.clone()).await;
            }
        }
        self.subscribers.clear();

        if let Some(handle) = self.bus_reader.lock().await.take() {
            handle.abort();
        }
    }
}

/// Dispatch loop for one `HubChannel`'s cross-node bus subscription
/// (§4.8). Runs for the channel's lifetime; aborted from
/// [`HubChannel::delete_channel`].
async fn run_bus_reader(channel: Arc<HubChannel>) {
    let topic = channel.topic();
    let mut subscription = channel.deps.bus.subscribe(&topic).await;

    loop {
        let envelope = match subscription.receiver.recv().await {
            Ok(envelope) => envelope,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(topic = %topic, skipped, "bus reader lagged, envelopes dropped");
                continue;
            }
        };

        if envelope.server_id == channel.deps.server_id {
            let _span = crate::telemetry::create_bus_span(&topic, "self_echo");
            continue;
        }

        match envelope.payload {
            ExternalPayload::ChannelEvent {
                sender_id,
                event_type,
                payload,
                timestamp,
            } => {
                let _span = crate::telemetry::create_bus_span(&topic, "channel_event");
                channel
                    .external_publish(ChannelEventPayload {
                        sender_id,
                        event_type,
                        payload,
                        channel_id: channel.channel_id.clone(),
                        timestamp,
                    })
                    .await;
            }
            ExternalPayload::OnlineStatus {
                client_id,
                status,
                timestamp,
            } => {
                let _span = crate::telemetry::create_bus_span(&topic, "online_status");
                channel
                    .external_publish_status_change(OnlineStatusUpdate {
                        channel_id: channel.channel_id.clone(),
                        client_id,
                        status,
                        timestamp,
                    })
                    .await;
            }
            ExternalPayload::ChannelAccess { add, client_id } => {
                let _span = crate::telemetry::create_bus_span(&topic, "channel_access");
                if let Some(hub) = channel.hub.upgrade() {
                    if add {
                        hub.add_channel_to_client(&client_id, &channel.channel_id).await;
                    } else {
                        hub.remove_channel_from_client(&client_id, &channel.channel_id).await;
                    }
                }
            }
            ExternalPayload::ChannelPresence { join, client_id } => {
                let _span = crate::telemetry::create_bus_span(&topic, "channel_presence");
                let kind = if join {
                    MembershipKind::Join
                } else {
                    MembershipKind::Leave
                };
                channel.publish_join_leave(kind, client_id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::LocalBus;
    use crate::cache::InMemoryCache;
    use crate::config::{LimitsConfig, PersistenceConfig};
    use crate::hub::registry::HubRegistry;
    use crate::persistence::queue::PersistenceQueue;
    use crate::persistence::sqlite::SqliteRepository;
    use crate::push::NullPushSink;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSession {
        identifier: String,
        client_id: String,
        received: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl SessionHandle for RecordingSession {
        fn identifier(&self) -> &str {
            &self.identifier
        }
        fn client_id(&self) -> &str {
            &self.client_id
        }
        async fn publish(&self, bytes: Vec<u8>) {
            self.received.lock().unwrap().push(bytes);
        }
    }

    fn session(client_id: &str, device_id: &str) -> Arc<RecordingSession> {
        Arc::new(RecordingSession {
            identifier: format!("{client_id}-{device_id}"),
            client_id: client_id.to_string(),
            received: Mutex::new(Vec::new()),
        })
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
            presence: Arc::new(super::super::presence::PresenceTracker::new(
                std::time::Duration::from_secs(180),
            )),
            limits: LimitsConfig::default(),
        })
    }

    fn sample_channel(tenant: &str, id: &str, flags: ChannelFlags) -> Channel {
        Channel {
            id: id.into(),
            tenant_id: tenant.into(),
            flags,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn local_fan_out_reaches_all_subscribers() {
        let registry = HubRegistry::new();
        let deps = deps().await;
        let hub = registry.get_or_create("tenant-1", deps.clone());
        let channel = HubChannel::new(
            sample_channel("tenant-1", "room", ChannelFlags::default()),
            Arc::downgrade(&hub),
            deps,
        );

        let a = session("a", "d1");
        let b = session("b", "d2");
        channel.new_client(a.clone()).await;
        channel.new_client(b.clone()).await;

        assert_eq!(channel.subscriber_count(), 2);

        let event = Event {
            id: 0,
            tenant_id: "tenant-1".into(),
            channel_id: "room".into(),
            sender_id: "a".into(),
            event_type: "msg".into(),
            payload: b"hi".to_vec(),
            timestamp: 100,
        };
        assert!(channel.publish(event, true).await);

        assert_eq!(a.received.lock().unwrap().len(), 1);
        assert_eq!(b.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closing_channel_stops_all_fan_out() {
        let registry = HubRegistry::new();
        let deps = deps().await;
        let hub = registry.get_or_create("tenant-1", deps.clone());
        let channel = HubChannel::new(
            sample_channel("tenant-1", "room", ChannelFlags::default()),
            Arc::downgrade(&hub),
            deps,
        );

        let a = session("a", "d1");
        channel.new_client(a.clone()).await;
        channel.delete_channel().await;

        let event = Event {
            id: 0,
            tenant_id: "tenant-1".into(),
            channel_id: "room".into(),
            sender_id: "a".into(),
            event_type: "msg".into(),
            payload: b"hi".to_vec(),
            timestamp: 100,
        };
        assert!(!channel.publish(event, true).await);
        assert!(a.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn presence_initial_snapshot_excludes_joining_client() {
        let flags = ChannelFlags {
            presence: true,
            ..ChannelFlags::default()
        };
        let registry = HubRegistry::new();
        let deps = deps().await;
        let hub = registry.get_or_create("tenant-1", deps.clone());
        let channel = HubChannel::new(sample_channel("tenant-1", "room", flags), Arc::downgrade(&hub), deps);

        let a = session("a", "d1");
        channel.new_client(a.clone()).await;

        let b = session("b", "d2");
        channel.new_client(b.clone()).await;

        // b's INITIAL_ONLINE_STATUS snapshot must not contain "b" itself.
        let received = b.received.lock().unwrap();
        let snapshot_frame = received
            .iter()
            .find_map(|bytes| {
                let envelope: Envelope = pulsehub_wire::decode(bytes).ok()?;
                match envelope.payload {
                    EnvelopePayload::InitialOnlineStatus(snapshot) => Some(snapshot),
                    _ => None,
                }
            })
            .expect("b received an initial presence snapshot");
        assert!(!snapshot_frame.client_status.contains_key("b"));
        assert!(snapshot_frame.client_status.contains_key("a"));
    }

    #[tokio::test]
    async fn subscriber_count_reaches_zero_after_all_remove() {
        let registry = HubRegistry::new();
        let deps = deps().await;
        let hub = registry.get_or_create("tenant-1", deps.clone());
        let channel = HubChannel::new(
            sample_channel("tenant-1", "room", ChannelFlags::default()),
            Arc::downgrade(&hub),
            deps,
        );

        let a = session("a", "d1");
        channel.new_client(a.clone()).await;
        channel.remove_client(a.identifier(), a.client_id()).await;

        assert_eq!(channel.subscriber_count(), 0);
    }
}
