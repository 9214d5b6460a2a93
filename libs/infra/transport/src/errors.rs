// [libs/infra/transport/src/errors.rs]
/*!
 * =================================================================
 * APARATO: TRANSPORT ERROR CATALOG (C2+C3+C4+C5 / C11)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: TAXONOMÍA DE FALLOS DE FRAMING Y TRANSPORTE
 * =================================================================
 */

use thiserror::Error;

/// Fallos de codificación del frame binario (C2).
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("[CODEC_TOO_LARGE]: frame of {size} bytes exceeds the {limit} byte ceiling")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("[CODEC_HEADER]: malformed frame header -> {0}")]
    MalformedHeader(String),

    #[error("[CODEC_OPCODE]: unknown opcode byte {0}")]
    UnknownOpcode(u8),

    #[error("[CODEC_ENCODE]: serialization failed -> {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("[CODEC_DECODE]: deserialization failed -> {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("[CODEC_LEGACY]: legacy (pre-envelope) decode failed -> {0}")]
    LegacyDecodeFailure(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Fallos del plano de transporte (C3 SSH + C4 WebSocket + C5 RPC).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("[TRANSPORT_SSH_DIAL]: ssh dial to {host}:{port} failed -> {source}")]
    SshDial { host: String, port: u16, source: String },

    #[error("[TRANSPORT_WS_SEND]: websocket send failed -> {0}")]
    WsSendFailure(String),

    #[error("[TRANSPORT_WS_DECODE]: websocket frame decode failed -> {0}")]
    WsDecodeFailure(#[from] CodecError),

    #[error("[TRANSPORT_WS_CLOSED]: no websocket connection bound for this system")]
    WsNotConnected,

    #[error("[TRANSPORT_TIMEOUT]: call exceeded its {budget_ms}ms budget")]
    Timeout { budget_ms: u64 },

    /// Espejo del campo `error` no vacío de la respuesta del agente
    /// (§4.3/§7): el transporte tuvo éxito, la operación no.
    #[error("[TRANSPORT_AGENT_LOGICAL]: agent reported a logical failure -> {0}")]
    AgentLogicalError(String),

    #[error("[TRANSPORT_VERSION]: agent version {0} is below the minimum supported")]
    VersionUnsupported(String),

    #[error("[TRANSPORT_NO_ROUTE]: neither a websocket nor an ssh route is available for this system")]
    NoRouteAvailable,
}

pub type TransportResult<T> = Result<T, TransportError>;
