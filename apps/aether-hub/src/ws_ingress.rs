// [apps/aether-hub/src/ws_ingress.rs]
/*!
 * =================================================================
 * APARATO: INGRESO WEBSOCKET DE AGENTES (C4, lado Hub)
 * CLASIFICACIÓN: TRANSPORT ADAPTER (ESTRATO L1-APP)
 * RESPONSABILIDAD: PUENTE ENTRE EL SOCKET AXUM Y `WsConn`
 *
 * Este módulo es el único lugar del Hub que conoce `axum::extract::ws`:
 * acepta la conexión entrante de un Agente, la envuelve en un
 * `WsConn` (C4, en `aether-infra-transport`) y se la entrega al
 * Manager (C7) vía `bind_ws`. A partir de ahí el núcleo de dominio no
 * vuelve a tocar un tipo de Axum.
 *
 * Dos tareas por conexión, en el mismo patrón que el resto del
 * corpus usa para un socket full-duplex: un escritor que reenvía los
 * frames salientes de `WsConn` al socket (intercalando un `Ping` de
 * nivel transporte cada `ws_keepalive_interval_s`, §3.1, para que un
 * socket a medio cerrar no quede colgado indefinidamente), un lector
 * que entrega los frames entrantes a `WsConn::deliver`, y esta tarea
 * orquestadora que aborta la que quede viva en cuanto la otra termina.
 * =================================================================
 */

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use aether_domain_models::AgentResponse;
use aether_infra_transport::{decode_frame, WsConn};

use crate::state::AppState;

const OUTBOUND_BUFFER: usize = 32;

pub async fn accept_agent_socket(
    Path(system_id): Path<String>,
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| bridge_agent_socket(socket, system_id, state))
}

async fn bridge_agent_socket(socket: WebSocket, system_id: String, state: AppState) {
    let (mut socket_sink, mut socket_stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_BUFFER);
    let (down_tx, down_rx) = oneshot::channel();

    let conn = WsConn::new(outbound_tx, down_rx);
    let inbound_conn = conn.clone();

    if let Err(e) = state.manager.bind_ws(&system_id, conn).await {
        warn!(system = %system_id, error = %e, "🔌 [WS_INGRESS]: rejecting socket, system could not be bound");
        let _ = socket_sink.send(Message::Close(None)).await;
        return;
    }

    info!(system = %system_id, "🔗 [WS_INGRESS]: agent socket bound");

    let keepalive_interval = Duration::from_secs(state.ws_keepalive_interval_s.max(1));
    let mut writer_task = tokio::spawn(async move {
        let mut keepalive = tokio::time::interval(keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        keepalive.tick().await; // the first tick fires immediately; skip it

        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if socket_sink.send(Message::Binary(frame)).await.is_err() {
                        break;
                    }
                }
                _ = keepalive.tick() => {
                    if socket_sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let reader_system_id = system_id.clone();
    let mut reader_task = tokio::spawn(async move {
        while let Some(message) = socket_stream.next().await {
            match message {
                Ok(Message::Binary(bytes)) => deliver_inbound_frame(&inbound_conn, &reader_system_id, &bytes).await,
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(system = %reader_system_id, error = %e, "🔌 [WS_INGRESS]: socket read failed, treating as closed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer_task => reader_task.abort(),
        _ = &mut reader_task => writer_task.abort(),
    }

    let _ = down_tx.send(());
}

/// Decodifica el encabezado de 4 bytes de un frame entrante, extrae su
/// id de correlación y lo entrega al `WsConn` de esta conexión. Un
/// frame que no decodifica como `AgentResponse`, o cuyo id ya no está
/// en el mapa de en-vuelo, se descarta silenciosamente (§4.3): nunca
/// tumba la conexión.
async fn deliver_inbound_frame(conn: &WsConn, system_id: &str, bytes: &[u8]) {
    if bytes.len() < 4 {
        warn!(system = %system_id, "🔻 [WS_INGRESS]: discarding frame shorter than its own length header");
        return;
    }

    let body = &bytes[4..];
    let Ok(response) = decode_frame::<AgentResponse>(body) else {
        warn!(system = %system_id, "🔻 [WS_INGRESS]: discarding frame that failed to decode as an agent response");
        return;
    };

    let Some(id) = response.id else {
        warn!(system = %system_id, "🔻 [WS_INGRESS]: discarding response frame without a correlation id");
        return;
    };

    conn.deliver(id, body.to_vec()).await;
}
