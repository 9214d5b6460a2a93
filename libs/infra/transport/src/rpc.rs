// [libs/infra/transport/src/rpc.rs]
/*!
 * =================================================================
 * APARATO: AGENT RPC (C5)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: API ÚNICA SOBRE WEBSOCKET Y SSH CON FALLBACK Y DEADLINE
 *
 * `call(system, action, data)` prefiere el WebSocket del System si está
 * conectado; ante cualquier fallo de transporte (I/O, decodificación,
 * cancelación) cierra el WS y reintenta exactamente una vez por SSH
 * (§4.3). Cada llamada impone su propio presupuesto de tiempo vía
 * `tokio::time::timeout`, con el default por familia de acción de
 * `RpcAction::default_timeout_ms`.
 * =================================================================
 */

use std::time::Duration;

use tokio::time::timeout;
use tracing::{instrument, warn};

use aether_domain_models::{AgentRequest, AgentResponse, AgentResponsePayload, RequestPayload, RpcAction};

use crate::codec::{decode_enveloped_json, decode_frame, decode_legacy, encode_enveloped_json, encode_frame, encode_legacy};
use crate::errors::{TransportError, TransportResult};
use crate::ssh::SshDialer;
use crate::version::{parse_agent_version, wire_shape_for, WireShape};
use crate::ws_hub::WsConn;

/// Coordenadas de red de un System, suficientes para marcar un dial
/// SSH sin depender del registro completo del dominio.
#[derive(Debug, Clone)]
pub struct SystemEndpoint {
    pub host: String,
    pub port: u16,
}

/// Fachada única consumida por el System updater (C6): decide la ruta
/// de transporte y aplica el deadline, sin exponer a su llamador los
/// detalles de framing o de sesión SSH.
pub struct AgentRpc {
    ssh: SshDialer,
}

impl AgentRpc {
    pub fn new(ssh: SshDialer) -> Self {
        Self { ssh }
    }

    /// Llama a una acción con su presupuesto por defecto (§4.3).
    #[instrument(skip(self, ws, data))]
    pub async fn call(
        &self,
        endpoint: &SystemEndpoint,
        ws: Option<&WsConn>,
        action: RpcAction,
        data: RequestPayload,
    ) -> TransportResult<AgentResponsePayload> {
        self.call_with_budget(endpoint, ws, action, data, Duration::from_millis(action.default_timeout_ms())).await
    }

    /// Llama con un presupuesto explícito, para los llamadores que
    /// necesitan imponer un deadline más ajustado que el por defecto.
    pub async fn call_with_budget(
        &self,
        endpoint: &SystemEndpoint,
        ws: Option<&WsConn>,
        action: RpcAction,
        data: RequestPayload,
        budget: Duration,
    ) -> TransportResult<AgentResponsePayload> {
        if let Some(conn) = ws.filter(|c| c.is_connected()) {
            match timeout(budget, self.call_over_ws(conn, action, data.clone())).await {
                Ok(Ok(payload)) => return Ok(payload),
                Ok(Err(e)) => {
                    warn!("🔌 [AGENT_RPC]: websocket attempt failed, closing it and falling back to ssh -> {}", e);
                    conn.close().await;
                }
                Err(_) => {
                    warn!("⏱️ [AGENT_RPC]: websocket attempt timed out, closing it and falling back to ssh");
                    conn.close().await;
                }
            }
        }

        match timeout(budget, self.call_over_ssh(endpoint, action, data)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout { budget_ms: budget.as_millis() as u64 }),
        }
    }

    async fn call_over_ws(&self, conn: &WsConn, action: RpcAction, data: RequestPayload) -> TransportResult<AgentResponsePayload> {
        let rx = conn
            .send_and_wait(|id| {
                let request = AgentRequest { action, data: data.clone(), id: Some(id) };
                encode_frame(&request).expect("request encoding must not fail for well-formed domain types")
            })
            .await?;

        let body = rx.await.map_err(|_| TransportError::WsSendFailure("waiter dropped before a response arrived".into()))?;
        let response: AgentResponse = decode_frame(&body)?;
        Self::unwrap_response(response)
    }

    async fn call_over_ssh(&self, endpoint: &SystemEndpoint, action: RpcAction, data: RequestPayload) -> TransportResult<AgentResponsePayload> {
        let version = self.ssh.probe_version(&endpoint.host, endpoint.port).await.ok().flatten();
        let shape = wire_shape_for(version);

        let raw_request = match shape {
            WireShape::Framed => {
                let request = AgentRequest { action, data, id: None };
                encode_frame(&request)?
            }
            WireShape::EnvelopedJson => {
                let request = AgentRequest { action, data, id: None };
                encode_enveloped_json(&request)?
            }
            WireShape::LegacyJson => encode_legacy(&data)?,
        };

        let raw_response = self.ssh.call(&endpoint.host, endpoint.port, &raw_request).await?;

        match shape {
            WireShape::Framed => {
                let response: AgentResponse = decode_frame(&raw_response)?;
                Self::unwrap_response(response)
            }
            WireShape::EnvelopedJson => {
                let response: AgentResponse = decode_enveloped_json(&raw_response)?;
                Self::unwrap_response(response)
            }
            WireShape::LegacyJson => {
                let payload: AgentResponsePayload = decode_legacy(&raw_response)?;
                Ok(payload)
            }
        }
    }

    fn unwrap_response(response: AgentResponse) -> TransportResult<AgentResponsePayload> {
        if response.is_logical_error() {
            return Err(TransportError::AgentLogicalError(response.error.unwrap_or_default()));
        }

        response.payload.ok_or_else(|| TransportError::AgentLogicalError("response carried neither an error nor a payload".into()))
    }
}

#[allow(unused)]
fn assert_banner_parses(banner: &str) -> Option<(u32, u32, u32)> {
    parse_agent_version(banner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrap_response_surfaces_logical_errors() {
        let response = AgentResponse { id: Some(1), error: Some("disk not found".into()), payload: None };
        let err = AgentRpc::unwrap_response(response).expect_err("logical error must surface");
        assert!(matches!(err, TransportError::AgentLogicalError(_)));
    }

    #[test]
    fn unwrap_response_rejects_empty_success() {
        let response = AgentResponse { id: Some(1), error: None, payload: None };
        let err = AgentRpc::unwrap_response(response).expect_err("empty success must be rejected");
        assert!(matches!(err, TransportError::AgentLogicalError(_)));
    }

    #[test]
    fn unwrap_response_passes_through_a_populated_payload() {
        let response = AgentResponse { id: Some(1), error: None, payload: Some(AgentResponsePayload::Text("ok".into())) };
        let payload = AgentRpc::unwrap_response(response).expect("populated payload must pass through");
        assert!(matches!(payload, AgentResponsePayload::Text(s) if s == "ok"));
    }
}
