/**
 * STATE HUB - Point unique de sérialisation des mutations + publication
 *
 * RÔLE :
 * Seul composant autorisé à modifier le WorldState. Les listeners UDP/TCP
 * appellent `apply_telemetry` / `apply_alert`, la gateway appelle `attach`
 * pour obtenir snapshot + abonnement.
 *
 * FONCTIONNEMENT :
 * - Un verrou unique (`Shared<HubInner>`) couvre état + liste d'abonnés :
 *   l'application d'une mutation et sa publication se font sous le même
 *   verrou, l'ordre de publication est donc l'ordre d'application.
 * - Chaque abonné possède une file mpsc bornée. La publication utilise
 *   `try_send` et ne bloque jamais : file pleine => abonné retiré et marqué
 *   "overflowed", la gateway coupe alors la connexion du viewer.
 * - `Subscription` se désabonne dans son `Drop` (idempotent).
 */

use crate::models::{Alert, CnInfo, ConnectionStats, TelemetrySample};
use crate::state::{new_state, Shared, WorldSnapshot, WorldState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Événement de changement publié après chaque mutation
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    Telemetry(TelemetrySample),
    Alert(Alert),
}

/// Raison de fin d'un abonnement
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionEnded {
    #[error("subscriber queue overflowed")]
    Overflowed,
    #[error("hub closed")]
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    pub ports: CnInfo,
    pub viewer_queue_capacity: usize,
    pub alert_log_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            ports: CnInfo::default(),
            viewer_queue_capacity: 256,
            alert_log_capacity: 1000,
        }
    }
}

struct SubscriberSlot {
    tx: mpsc::Sender<HubEvent>,
    overflowed: Arc<AtomicBool>,
}

struct HubInner {
    world: WorldState,
    subscribers: HashMap<u64, SubscriberSlot>,
    next_subscriber: u64,
    queue_capacity: usize,
    closed: bool,
}

impl HubInner {
    fn publish(&mut self, event: HubEvent) {
        self.subscribers.retain(|id, slot| match slot.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                slot.overflowed.store(true, Ordering::Release);
                warn!("subscriber {} overflowed its queue, dropping it", id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
        self.world.stats_mut().viewers_connected = self.subscribers.len() as u64;
    }

    fn register(&mut self, inner: &Shared<HubInner>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let overflowed = Arc::new(AtomicBool::new(false));
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        if !self.closed {
            self.subscribers.insert(id, SubscriberSlot { tx, overflowed: overflowed.clone() });
        }
        // hub fermé : tx est lâché ici, le receiver verra tout de suite la fin
        self.world.stats_mut().viewers_connected = self.subscribers.len() as u64;
        Subscription {
            id,
            rx,
            overflowed,
            hub: Arc::downgrade(inner),
        }
    }
}

/// Poignée clonable vers le hub
#[derive(Clone)]
pub struct Hub {
    inner: Shared<HubInner>,
}

impl Hub {
    pub fn new(settings: HubSettings) -> Self {
        Self {
            inner: new_state(HubInner {
                world: WorldState::new(settings.ports, settings.alert_log_capacity),
                subscribers: HashMap::new(),
                next_subscriber: 0,
                queue_capacity: settings.viewer_queue_capacity.max(1),
                closed: false,
            }),
        }
    }

    /// Remplace l'échantillon courant du patient puis publie "telemetry"
    pub fn apply_telemetry(&self, sample: TelemetrySample) {
        let mut inner = self.inner.lock();
        inner.world.apply_telemetry(sample.clone());
        inner.publish(HubEvent::Telemetry(sample));
    }

    /// Ajoute au journal (et met à jour les constantes si embarquées) puis publie "alert"
    pub fn apply_alert(&self, alert: Alert) {
        let mut inner = self.inner.lock();
        inner.world.apply_alert(alert.clone());
        inner.publish(HubEvent::Alert(alert));
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.inner.lock().world.snapshot()
    }

    pub fn stats(&self) -> ConnectionStats {
        *self.inner.lock().world.stats()
    }

    /// Nouvel abonné : reçoit chaque événement publié après cet appel
    pub fn subscribe(&self) -> Subscription {
        self.inner.lock().register(&self.inner)
    }

    /// Snapshot + abonnement sous le même verrou : aucun trou, aucun doublon
    pub fn attach(&self) -> (WorldSnapshot, Subscription) {
        let mut inner = self.inner.lock();
        let snapshot = inner.world.snapshot();
        let subscription = inner.register(&self.inner);
        (snapshot, subscription)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Datagramme UDP décodé : échantillon et compteur sous le même verrou
    pub fn apply_datagram(&self, sample: TelemetrySample) {
        let mut inner = self.inner.lock();
        inner.world.stats_mut().udp_packets_received += 1;
        inner.world.apply_telemetry(sample.clone());
        inner.publish(HubEvent::Telemetry(sample));
    }

    pub fn record_udp_decode_error(&self) {
        self.inner.lock().world.stats_mut().udp_decode_errors += 1;
    }

    pub fn record_alert_decode_error(&self) {
        self.inner.lock().world.stats_mut().alert_decode_errors += 1;
    }

    /// Compte une connexion d'alertes acceptée ; la jauge active redescend au drop du guard
    pub fn alert_connection_opened(&self) -> AlertConnectionGuard {
        {
            let mut inner = self.inner.lock();
            let stats = inner.world.stats_mut();
            stats.tcp_connections_accepted += 1;
            stats.tcp_connections_active += 1;
        }
        AlertConnectionGuard { hub: self.clone() }
    }

    /// Termine tous les abonnements ; les nouveaux abonnés sont fermés d'office
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.subscribers.clear();
        inner.world.stats_mut().viewers_connected = 0;
        debug!("hub closed");
    }

    fn unsubscribe(inner: &Mutex<HubInner>, id: u64) {
        let mut inner = inner.lock();
        if inner.subscribers.remove(&id).is_some() {
            let remaining = inner.subscribers.len() as u64;
            inner.world.stats_mut().viewers_connected = remaining;
        }
    }
}

pub struct AlertConnectionGuard {
    hub: Hub,
}

impl Drop for AlertConnectionGuard {
    fn drop(&mut self) {
        let mut inner = self.hub.inner.lock();
        let stats = inner.world.stats_mut();
        stats.tcp_connections_active = stats.tcp_connections_active.saturating_sub(1);
    }
}

/// Flux d'événements d'un abonné, dans l'ordre de publication
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<HubEvent>,
    overflowed: Arc<AtomicBool>,
    hub: Weak<Mutex<HubInner>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Prochain événement. Après un débordement, renvoie `Overflowed` sans
    /// vider la file : l'abonné devra repartir d'un snapshot.
    pub async fn recv(&mut self) -> Result<HubEvent, SubscriptionEnded> {
        if self.overflowed.load(Ordering::Acquire) {
            return Err(SubscriptionEnded::Overflowed);
        }
        match self.rx.recv().await {
            Some(event) => Ok(event),
            None if self.overflowed.load(Ordering::Acquire) => Err(SubscriptionEnded::Overflowed),
            None => Err(SubscriptionEnded::Closed),
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(inner) = self.hub.upgrade() {
            Hub::unsubscribe(&inner, self.id);
        }
    }
}
