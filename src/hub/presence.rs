//! Presence tracking (§4.5), grounded on `original_source/channels/core/presence.go`'s
//! `PresenceHandler` interface and `channel.go`'s `shouldNotifyOnlinePresenceChange`/
//! `shouldNotifyOfflinePresenceChange`.
//!
//! Two things are tracked, deliberately kept separate as in the original:
//! a client's last-seen heartbeat timestamp (global, cross-channel), and
//! which devices of a client are currently subscribed to a given channel
//! (per-channel, used to decide when a client's presence on that channel
//! actually flips).

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs() as i64
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as i64
}

fn key3(tenant_id: &str, channel_id: &str, client_id: &str) -> String {
    format!("{tenant_id}:{channel_id}:{client_id}")
}

/// §4.7 staleness GC window: reads that scan per-channel device entries
/// prune entries older than this, guaranteeing liveness even if a node
/// crashes without running its own cleanup.
const STALE_AFTER: Duration = Duration::from_millis(72_000);

fn prune_stale_devices(devices: &DashMap<String, i64>) {
    let cutoff = now_unix() - STALE_AFTER.as_secs() as i64;
    devices.retain(|_, last_seen| *last_seen >= cutoff);
}

/// Tracks client heartbeats and per-channel device presence across the
/// whole node.
///
/// The resolved Open Question (design note): presence-offline transitions
/// are debounced using the *last-seen timestamp* rather than a per-session
/// cancelable timer -- a reconnect within the debounce window simply bumps
/// the timestamp forward, so the delayed offline check (run from
/// [`crate::hub::channel::HubChannel`]) finds the timestamp has moved and
/// skips the transition, matching `shouldNotifyOfflinePresenceChange`'s
/// "lastTimeStamp.Before(now)" check without needing a cancelable timer
/// per disconnect.
pub struct PresenceTracker {
    /// Stored in milliseconds, not the `unix_seconds` the public
    /// `get_client_timestamp` returns: the online/offline debounce checks in
    /// `HubChannel` (`notify_online`, `schedule_offline_debounce`) need
    /// sub-second resolution to tell "stamped just now, before this check"
    /// from "stamped in some earlier second", matching the original's
    /// `time.Unix(lastTimeStamp, 0).Before(time.Now())` (a whole-second
    /// stamp compared against a sub-second clock reading is before `now`
    /// whenever it's genuinely earlier, never tied).
    client_timestamps: DashMap<String, AtomicI64>,
    channel_devices: DashMap<String, DashMap<String, i64>>,
    heartbeat_ttl: Duration,
}

impl PresenceTracker {
    /// Build a tracker with the given heartbeat TTL (§6.5's
    /// `heartbeat_ttl_secs`, default 3 minutes).
    pub fn new(heartbeat_ttl: Duration) -> Self {
        Self {
            client_timestamps: DashMap::new(),
            channel_devices: DashMap::new(),
            heartbeat_ttl,
        }
    }

    /// Stamp `client_id` as seen now. Called on connect and on each
    /// heartbeat (pong receipt) -- never on every inbound frame, so that a
    /// Subscribe frame that triggers a presence join doesn't stamp its own
    /// "last seen" out from under the online-transition check that follows.
    pub fn update_client_timestamp(&self, client_id: &str) {
        self.update_client_timestamp_at(client_id, now_millis());
    }

    fn update_client_timestamp_at(&self, client_id: &str, ts_millis: i64) {
        self.client_timestamps
            .entry(client_id.to_string())
            .and_modify(|existing| {
                let current = existing.load(Ordering::Relaxed);
                if ts_millis > current {
                    existing.store(ts_millis, Ordering::Relaxed);
                }
            })
            .or_insert_with(|| AtomicI64::new(ts_millis));
    }

    /// The last-seen timestamp for a client in unix seconds, or 0 if never
    /// seen (§4.7's `get_client_timestamp`).
    pub fn get_client_timestamp(&self, client_id: &str) -> i64 {
        self.last_seen_millis(client_id) / 1000
    }

    /// The last-seen timestamp for a client in milliseconds, or 0 if never
    /// seen -- used internally wherever a same-second tie must not be
    /// mistaken for "hasn't been seen since".
    fn last_seen_millis(&self, client_id: &str) -> i64 {
        self.client_timestamps
            .get(client_id)
            .map(|ts| ts.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// True if the client has a last-seen timestamp strictly before `now`,
    /// at millisecond resolution. Used by the online-join and
    /// offline-debounce checks in `HubChannel` to tell "last stamped before
    /// this check started" from "stamped again since".
    pub(crate) fn last_seen_before(&self, client_id: &str, now_millis: i64) -> bool {
        self.last_seen_millis(client_id) < now_millis
    }

    /// True if the client's last-seen timestamp is within the heartbeat TTL.
    pub fn is_client_recently_seen(&self, client_id: &str) -> bool {
        let ts = self.get_client_timestamp(client_id);
        ts != 0 && now_unix() - ts <= self.heartbeat_ttl.as_secs() as i64
    }

    /// Register a device as online for a client on a channel.
    pub fn add_online_channel_device(
        &self,
        tenant_id: &str,
        channel_id: &str,
        client_id: &str,
        device_id: &str,
    ) {
        self.channel_devices
            .entry(key3(tenant_id, channel_id, client_id))
            .or_default()
            .insert(device_id.to_string(), now_unix());
    }

    /// Remove a device's online registration for a client on a channel.
    pub fn remove_online_channel_device(
        &self,
        tenant_id: &str,
        channel_id: &str,
        client_id: &str,
        device_id: &str,
    ) {
        if let Some(devices) = self.channel_devices.get(&key3(tenant_id, channel_id, client_id)) {
            devices.remove(device_id);
        }
    }

    /// How many devices of `client_id` are currently online on the channel.
    ///
    /// Prunes entries older than [`STALE_AFTER`] before counting (§4.7
    /// staleness GC): a node that crashed without calling
    /// `remove_online_channel_device` must not leave a client stuck "online"
    /// forever.
    pub fn get_channel_amount_of_client_devices(
        &self,
        tenant_id: &str,
        channel_id: &str,
        client_id: &str,
    ) -> i64 {
        self.channel_devices
            .get(&key3(tenant_id, channel_id, client_id))
            .map(|devices| {
                prune_stale_devices(&devices);
                devices.len() as i64
            })
            .unwrap_or(0)
    }

    /// Whether a specific device is registered online for the client on
    /// the channel. Prunes stale entries first, same as
    /// [`Self::get_channel_amount_of_client_devices`].
    pub fn is_client_device_connected_to_channel(
        &self,
        tenant_id: &str,
        channel_id: &str,
        client_id: &str,
        device_id: &str,
    ) -> bool {
        self.channel_devices
            .get(&key3(tenant_id, channel_id, client_id))
            .map(|devices| {
                prune_stale_devices(&devices);
                devices.contains_key(device_id)
            })
            .unwrap_or(false)
    }

    /// A snapshot of `{client_id: last_seen_timestamp}` for every client
    /// this tracker has ever recorded activity for on the channel -- used
    /// to seed a `HubChannel`'s local presence substate on creation. Prunes
    /// stale device entries first, same as the per-client accessors.
    pub fn get_channel_clients_presence(
        &self,
        tenant_id: &str,
        channel_id: &str,
    ) -> std::collections::HashMap<String, i64> {
        let prefix = format!("{tenant_id}:{channel_id}:");
        self.channel_devices
            .iter()
            .filter_map(|entry| {
                let client_id = entry.key().strip_prefix(&prefix)?;
                prune_stale_devices(entry.value());
                let last_seen = entry.value().iter().map(|d| *d.value()).max().unwrap_or(0);
                Some((client_id.to_string(), last_seen))
            })
            .collect()
    }
}
