//! Connection registry for the console slot and the buzzer peer map.

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::{
    dto::{common::BuzzerSummary, ws::StatusUpdatePayload},
    error::ServiceError,
};

/// Handle used to push messages to the identified console.
#[derive(Debug, Clone)]
pub struct ConsoleHandle {
    /// Session identifier sent in `CONNECTED`, used to tell replacements apart.
    pub session_id: String,
    /// Channel sender for pushing messages to the console WebSocket.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// A registered buzzer peer and its latest telemetry.
#[derive(Debug, Clone)]
pub struct BuzzerPeer {
    /// Stable opaque buzzer identifier.
    pub id: String,
    /// Display name, mutable through `PLAYER_RENAME`.
    pub name: String,
    /// Advisory MAC address reported at registration.
    pub mac_address: Option<String>,
    /// Channel sender for pushing messages to the buzzer WebSocket.
    pub tx: mpsc::UnboundedSender<Message>,
    /// Registration instant, epoch milliseconds.
    pub connected_at: i64,
    /// Position in connection order, assigned at registration.
    pub player_number: usize,
    /// Last reported battery percentage.
    pub battery: Option<i32>,
    /// Last reported WiFi signal strength in dBm.
    pub wifi_rssi: Option<i32>,
    /// Last reported free heap bytes.
    pub free_heap: Option<i64>,
    /// Last calibrated latency the device reported, milliseconds.
    pub latency: Option<i64>,
}

impl BuzzerPeer {
    /// Project this peer into the console-facing summary form.
    pub fn summary(&self) -> BuzzerSummary {
        BuzzerSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            connected_at: self.connected_at,
            battery: self.battery,
            wifi_rssi: self.wifi_rssi,
            latency: self.latency,
            connected: true,
        }
    }
}

/// Why a buzzer registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// The buzzer id is already registered on another transport.
    DuplicateId,
    /// The registry is at its configured capacity.
    Full,
}

impl RegisterError {
    /// Refusal reason carried in `CONNECTION_REJECTED`.
    pub fn reason(self) -> &'static str {
        match self {
            RegisterError::DuplicateId => "buzzer ID already connected",
            RegisterError::Full => "maximum number of buzzers reached",
        }
    }
}

/// Tracks the two classes of peers: at most one console, and buzzers keyed by id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    console: RwLock<Option<ConsoleHandle>>,
    buzzers: DashMap<String, BuzzerPeer>,
    // Serializes registrations so `size + 1` player numbering stays atomic.
    register_lock: Mutex<()>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a console handle, replacing any previous one (last writer wins).
    ///
    /// Returns the handle that was displaced, so the caller can close it.
    pub async fn set_console(&self, handle: ConsoleHandle) -> Option<ConsoleHandle> {
        let mut guard = self.console.write().await;
        guard.replace(handle)
    }

    /// Clear the console slot, but only if `session_id` still owns it.
    ///
    /// A replaced console's teardown must not evict its replacement.
    pub async fn clear_console(&self, session_id: &str) {
        let mut guard = self.console.write().await;
        if guard
            .as_ref()
            .is_some_and(|handle| handle.session_id == session_id)
        {
            *guard = None;
        }
    }

    /// Sender for the identified console, if one is connected.
    pub async fn console_tx(&self) -> Option<mpsc::UnboundedSender<Message>> {
        let guard = self.console.read().await;
        guard.as_ref().map(|handle| handle.tx.clone())
    }

    /// Whether a console is currently identified.
    pub async fn console_connected(&self) -> bool {
        self.console.read().await.is_some()
    }

    /// Register a buzzer, enforcing id uniqueness and the capacity limit.
    ///
    /// On success the peer is inserted with `player_number = size + 1` and
    /// returned for the acknowledgement and the console announcement.
    pub async fn register_buzzer(
        &self,
        id: String,
        name: Option<String>,
        mac_address: Option<String>,
        tx: mpsc::UnboundedSender<Message>,
        connected_at: i64,
        max_buzzers: usize,
    ) -> Result<BuzzerPeer, RegisterError> {
        let _guard = self.register_lock.lock().await;

        if self.buzzers.contains_key(&id) {
            return Err(RegisterError::DuplicateId);
        }
        if self.buzzers.len() >= max_buzzers {
            return Err(RegisterError::Full);
        }

        let peer = BuzzerPeer {
            name: name.unwrap_or_else(|| id.clone()),
            id: id.clone(),
            mac_address,
            tx,
            connected_at,
            player_number: self.buzzers.len() + 1,
            battery: None,
            wifi_rssi: None,
            free_heap: None,
            latency: None,
        };
        self.buzzers.insert(id, peer.clone());
        Ok(peer)
    }

    /// Remove a buzzer, returning the evicted peer for the disconnect announcement.
    pub fn remove_buzzer(&self, id: &str) -> Option<BuzzerPeer> {
        self.buzzers.remove(id).map(|(_, peer)| peer)
    }

    /// Whether `id` is currently registered.
    pub fn contains_buzzer(&self, id: &str) -> bool {
        self.buzzers.contains_key(id)
    }

    /// Sender for one buzzer, if registered.
    pub fn buzzer_tx(&self, id: &str) -> Option<mpsc::UnboundedSender<Message>> {
        self.buzzers.get(id).map(|peer| peer.tx.clone())
    }

    /// Display name of one buzzer, if registered.
    pub fn buzzer_name(&self, id: &str) -> Option<String> {
        self.buzzers.get(id).map(|peer| peer.name.clone())
    }

    /// Senders for every registered buzzer.
    pub fn all_buzzer_tx(&self) -> Vec<(String, mpsc::UnboundedSender<Message>)> {
        self.buzzers
            .iter()
            .map(|entry| (entry.id.clone(), entry.tx.clone()))
            .collect()
    }

    /// Number of registered buzzers.
    pub fn buzzer_count(&self) -> usize {
        self.buzzers.len()
    }

    /// Console-facing summaries in player-number order.
    pub fn summaries(&self) -> Vec<BuzzerSummary> {
        let mut peers: Vec<_> = self
            .buzzers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        peers.sort_by_key(|peer| peer.player_number);
        peers.into_iter().map(|peer| peer.summary()).collect()
    }

    /// Store the latest telemetry report for a buzzer.
    pub fn update_telemetry(&self, id: &str, status: StatusUpdatePayload) {
        if let Some(mut peer) = self.buzzers.get_mut(id) {
            if status.battery.is_some() {
                peer.battery = status.battery;
            }
            if status.wifi_rssi.is_some() {
                peer.wifi_rssi = status.wifi_rssi;
            }
            if status.free_heap.is_some() {
                peer.free_heap = status.free_heap;
            }
        }
    }

    /// Store the latest calibrated latency a buzzer reported.
    pub fn update_latency(&self, id: &str, latency_ms: i64) {
        if let Some(mut peer) = self.buzzers.get_mut(id) {
            peer.latency = Some(latency_ms);
        }
    }

    /// Rename a buzzer, returning its sender for the name-update push.
    pub fn rename_buzzer(
        &self,
        id: &str,
        new_name: &str,
    ) -> Result<mpsc::UnboundedSender<Message>, ServiceError> {
        match self.buzzers.get_mut(id) {
            Some(mut peer) => {
                peer.name = new_name.to_string();
                Ok(peer.tx.clone())
            }
            None => Err(ServiceError::NotFound(format!("buzzer `{id}` not found"))),
        }
    }
}
