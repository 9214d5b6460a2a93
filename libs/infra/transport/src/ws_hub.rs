// [libs/infra/transport/src/ws_hub.rs]
/*!
 * =================================================================
 * APARATO: WEBSOCKET HUB (C4)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: MULTIPLEXADO POR ID DE CORRELACIÓN SOBRE UN SOCKET
 *
 * Un `WsConn` por System: el Hub mantiene un socket de larga vida con
 * un mapa `inflight: id -> waiter` protegido por mutex. El socket en
 * sí (aceptar, leer/escribir frames) es responsabilidad de quien lo
 * posee (normalmente un handler axum); este módulo sólo arbitra la
 * correlación de peticiones concurrentes sobre el mismo socket y
 * expone un canal de caída (`down_signal`) para que el dueño del
 * System sepa cuándo el socket dejó de estar vivo.
 * =================================================================
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;

use crate::errors::{TransportError, TransportResult};

type Waiter = oneshot::Sender<Vec<u8>>;

/// Conexión WebSocket de larga vida asociada a un System. Clonable:
/// cada llamada concurrente obtiene su propio `oneshot` waiter sobre
/// el mismo socket lógico.
#[derive(Clone)]
pub struct WsConn {
    outbound: mpsc::Sender<Vec<u8>>,
    inflight: Arc<Mutex<HashMap<u32, Waiter>>>,
    next_id: Arc<AtomicU32>,
    down_signal: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    /// Puesto a `true` por `close()` (§4.3: "On WS transport error…
    /// close the WS, then attempt SSH once"). Compartido entre todos
    /// los clones de este `WsConn`, de forma que cerrarlo desde un
    /// llamador de C5 lo marca desconectado para todos a la vez.
    closed: Arc<AtomicBool>,
}

impl WsConn {
    /// Envuelve un socket ya aceptado. `outbound` transmite frames ya
    /// codificados hacia el escritor real del socket (normalmente una
    /// tarea dedicada corriendo `futures_util::SinkExt::send` sobre un
    /// `WebSocketStream`); `down_signal` se dispara cuando esa tarea
    /// detecta el cierre del socket.
    pub fn new(outbound: mpsc::Sender<Vec<u8>>, down_signal: oneshot::Receiver<()>) -> Self {
        Self {
            outbound,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU32::new(1)),
            down_signal: Arc::new(Mutex::new(Some(down_signal))),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    /// Cierra esta conexión de cara al resto del núcleo (§4.3): marca
    /// `is_connected()` en `false` para todos los clones y falla de
    /// inmediato cualquier waiter en vuelo, en vez de dejarlos expirar
    /// por deadline. Idempotente.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.inflight.lock().await.clear();
    }

    /// Registra un frame entrante por su id de correlación; entrega al
    /// waiter si existe, descarta con una advertencia si no (§4.3: "an
    /// id de correlación ausente del mapa" nunca es un error fatal).
    pub async fn deliver(&self, id: u32, body: Vec<u8>) {
        let mut inflight = self.inflight.lock().await;
        match inflight.remove(&id) {
            Some(waiter) => {
                let _ = waiter.send(body);
            }
            None => warn!("🔻 [WS_HUB]: discarding frame for unknown or already-cancelled id={}", id),
        }
    }

    /// Envía un frame ya codificado y espera su respuesta correlacionada
    /// por `id`, hasta que el llamador cancele removiendo el waiter (el
    /// deadline en sí lo impone C5 con `tokio::time::timeout`).
    pub async fn send_and_wait(&self, mut encode_with_id: impl FnMut(u32) -> Vec<u8>) -> TransportResult<oneshot::Receiver<Vec<u8>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::WsSendFailure("connection already closed".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut inflight = self.inflight.lock().await;
            inflight.insert(id, tx);
        }

        let frame = encode_with_id(id);
        if self.outbound.send(frame).await.is_err() {
            self.inflight.lock().await.remove(&id);
            return Err(TransportError::WsSendFailure("outbound channel closed".into()));
        }

        Ok(rx)
    }

    /// Retira el waiter de un id cancelado (deadline vencido). Una
    /// respuesta tardía para este id, si llega, será descartada
    /// silenciosamente por `deliver` (§4.3).
    pub async fn cancel(&self, id: u32) {
        self.inflight.lock().await.remove(&id);
    }

    /// Toma el receptor de caída del socket; sólo un llamador puede
    /// esperarlo (normalmente el updater del System que lo posee).
    pub async fn take_down_signal(&self) -> Option<oneshot::Receiver<()>> {
        self.down_signal.lock().await.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivering_a_known_id_resolves_its_waiter() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel(4);
        let (_down_tx, down_rx) = oneshot::channel();
        let conn = WsConn::new(outbound_tx, down_rx);

        let rx = conn.send_and_wait(|id| id.to_be_bytes().to_vec()).await.expect("send should succeed");
        let sent = outbound_rx.recv().await.expect("frame should be sent");
        let id = u32::from_be_bytes(sent.try_into().unwrap());

        conn.deliver(id, b"pong".to_vec()).await;
        let body = rx.await.expect("waiter should resolve");
        assert_eq!(body, b"pong");
    }

    #[tokio::test]
    async fn delivering_an_unknown_id_is_a_silent_no_op() {
        let (outbound_tx, _outbound_rx) = mpsc::channel(4);
        let (_down_tx, down_rx) = oneshot::channel();
        let conn = WsConn::new(outbound_tx, down_rx);

        conn.deliver(999, b"orphan".to_vec()).await;
    }

    #[tokio::test]
    async fn cancelling_a_waiter_prevents_late_delivery_from_resolving_it() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel(4);
        let (_down_tx, down_rx) = oneshot::channel();
        let conn = WsConn::new(outbound_tx, down_rx);

        let rx = conn.send_and_wait(|id| id.to_be_bytes().to_vec()).await.expect("send should succeed");
        let sent = outbound_rx.recv().await.expect("frame should be sent");
        let id = u32::from_be_bytes(sent.try_into().unwrap());

        conn.cancel(id).await;
        conn.deliver(id, b"late".to_vec()).await;
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn closing_fails_inflight_waiters_and_marks_disconnected() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel(4);
        let (_down_tx, down_rx) = oneshot::channel();
        let conn = WsConn::new(outbound_tx, down_rx);

        let rx = conn.send_and_wait(|id| id.to_be_bytes().to_vec()).await.expect("send should succeed");
        outbound_rx.recv().await.expect("frame should be sent");

        conn.close().await;

        assert!(!conn.is_connected());
        assert!(rx.await.is_err());
        assert!(matches!(
            conn.send_and_wait(|id| id.to_be_bytes().to_vec()).await,
            Err(TransportError::WsSendFailure(_))
        ));
    }
}
