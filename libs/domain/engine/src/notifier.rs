// [libs/domain/engine/src/notifier.rs]
/*!
 * =================================================================
 * APARATO: NÚCLEO DE DIFUSIÓN DE EVENTOS (§9 "Async alert send")
 * CLASIFICACIÓN: DOMAIN SUPPORT (ESTRATO L2)
 * RESPONSABILIDAD: ENTREGA NO BLOQUEANTE DE TRANSICIONES A UN
 *                   CONSUMIDOR EXTERNO (FORMATEADOR/NOTIFICADOR)
 *
 * El motor de alertas y el Docker Focus Watcher nunca esperan a que
 * un notificador externo procese un evento: `broadcast::Sender::send`
 * es síncrono y devuelve de inmediato incluso sin receptores vivos,
 * lo que satisface la exigencia de §9 de no poder estancar las
 * actualizaciones ante un notificador lento.
 * =================================================================
 */

use aether_domain_models::AetherEvent;
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CHANNEL_CAPACITY: usize = 512;

/// Única fuente de eventos internos del Hub. Clonable: cada suscriptor
/// (el dashboard por WebSocket, un futuro puente SMTP) recibe su
/// propio `Receiver` independiente sobre el mismo flujo.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<AetherEvent>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AetherEvent> {
        self.tx.subscribe()
    }

    /// Emite un evento sin bloquear al llamador. La ausencia de
    /// suscriptores vivos no es un error del motor: sólo significa que
    /// nadie está escuchando el dashboard en este instante.
    pub fn send(&self, event: AetherEvent) {
        if self.tx.send(event).is_err() {
            debug!("📭 [NOTIFIER]: event broadcast with no active subscribers");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_domain_models::{AlertTransitionState, ThresholdAlertNotification};

    fn sample_event() -> AetherEvent {
        AetherEvent::ThresholdAlert(ThresholdAlertNotification {
            system_name: "edge-01".into(),
            alert_type: "CPU".into(),
            descriptor: None,
            state: AlertTransitionState::Triggered,
            current_value: 91.0,
            threshold: 80.0,
            duration_minutes: 1,
            details: None,
        })
    }

    #[test]
    fn sending_without_subscribers_never_panics() {
        let notifier = Notifier::new();
        notifier.send(sample_event());
    }

    #[tokio::test]
    async fn a_subscriber_receives_a_sent_event() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        notifier.send(sample_event());

        let received = rx.recv().await.expect("subscriber should receive the event");
        assert!(matches!(received, AetherEvent::ThresholdAlert(_)));
    }
}
