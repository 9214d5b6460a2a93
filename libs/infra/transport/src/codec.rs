// [libs/infra/transport/src/codec.rs]
/*!
 * =================================================================
 * APARATO: AGENT FRAME CODEC (C2)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: FRAMING BINARIO AUTODESCRIPTIVO DEL PROTOCOLO DE AGENTE
 *
 * Layout de un frame: encabezado de 4 bytes big-endian con la longitud
 * del cuerpo, seguido del cuerpo serializado en MessagePack
 * (`rmp-serde`, mapa por-nombre de campo vía `write_named`, el mismo
 * empaquetador binario que usa el Neural Packer del orquestador). A
 * diferencia de un layout posicional, el mapa de MessagePack trae sus
 * propias claves y permite omitir un campo ausente por completo en
 * vez de escribir un marcador nulo en su lugar (§6: "Requests and
 * responses omit absent/zero fields"). El encabezado de longitud hace
 * el framing autodescriptivo sobre un socket o un stdout de SSH sin
 * requerir un delimitador de línea. Un segundo camino en JSON
 * (`encode_legacy`/`decode_legacy`) sirve a los agentes anteriores al
 * umbral `MinVersionCbor` (§4.3), que hablan el payload desnudo sin
 * encabezado binario.
 * =================================================================
 */

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{CodecError, CodecResult};

/// Techo de tamaño de frame: agotamiento de memoria por un cuerpo
/// malicioso o corrupto no puede tumbar el Hub.
pub const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

const HEADER_BYTES: usize = 4;

/// Serializa un valor al cuerpo MessagePack (mapa por-nombre de campo)
/// y antepone su encabezado de longitud. Falla si el cuerpo resultante
/// excede `MAX_FRAME_BYTES`.
pub fn encode_frame<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    let mut body = Vec::new();
    rmp_serde::encode::write_named(&mut body, value)?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge { size: body.len(), limit: MAX_FRAME_BYTES });
    }

    let mut framed = Vec::with_capacity(HEADER_BYTES + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Decodifica un cuerpo MessagePack ya despojado de su encabezado.
pub fn decode_frame<T: DeserializeOwned>(body: &[u8]) -> CodecResult<T> {
    rmp_serde::from_slice(body).map_err(CodecError::Decode)
}

/// Lee un encabezado de 4 bytes y el cuerpo que anuncia desde un flujo
/// asíncrono arbitrario (socket WebSocket ya des-framed, stdout SSH).
/// Devuelve el cuerpo crudo sin decodificar para que el llamador elija
/// el tipo de destino.
pub async fn read_framed_body<R: AsyncRead + Unpin>(reader: &mut R) -> CodecResult<Vec<u8>> {
    let mut header = [0u8; HEADER_BYTES];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| CodecError::MalformedHeader(e.to_string()))?;

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge { size: len, limit: MAX_FRAME_BYTES });
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| CodecError::MalformedHeader(e.to_string()))?;
    Ok(body)
}

/// Escribe un valor ya encuadrado (encabezado + cuerpo) a un flujo
/// asíncrono arbitrario.
pub async fn write_framed<W: AsyncWrite + Unpin, T: Serialize>(writer: &mut W, value: &T) -> CodecResult<()> {
    let framed = encode_frame(value)?;
    writer.write_all(&framed).await.map_err(|e| CodecError::MalformedHeader(e.to_string()))?;
    writer.flush().await.map_err(|e| CodecError::MalformedHeader(e.to_string()))?;
    Ok(())
}

/// Codifica el payload desnudo esperado por un agente anterior al
/// umbral `MinVersionCbor` (§4.3): sin encabezado de longitud, sin
/// envoltura de respuesta, un único documento JSON.
pub fn encode_legacy<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CodecError::LegacyDecodeFailure(e.to_string()))
}

/// Decodifica el payload desnudo de un agente heredado.
pub fn decode_legacy<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::LegacyDecodeFailure(e.to_string()))
}

/// Codifica la envoltura `AgentRequest`/`AgentResponse` en JSON para el
/// nivel intermedio de §4.3 (`MinVersionCbor` <= versión < `MinVersionAgentResponse`):
/// el agente ya entiende la envoltura, pero todavía no habla MessagePack.
/// Sin encabezado de longitud, igual que `encode_legacy` — un único
/// documento JSON por llamada.
pub fn encode_enveloped_json<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CodecError::LegacyDecodeFailure(e.to_string()))
}

/// Decodifica una envoltura serializada como el nivel intermedio.
pub fn decode_enveloped_json<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::LegacyDecodeFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_domain_models::{AgentRequest, RequestPayload, RpcAction};

    fn sample_request() -> AgentRequest {
        AgentRequest {
            action: RpcAction::GetData,
            data: RequestPayload::GetData { cache_time_ms: 60_000, include_details: true },
            id: Some(42),
        }
    }

    #[test]
    fn encode_then_strip_header_round_trips_the_body() {
        let request = sample_request();
        let framed = encode_frame(&request).expect("encode should succeed");

        let declared_len = u32::from_be_bytes(framed[..4].try_into().unwrap()) as usize;
        assert_eq!(declared_len, framed.len() - 4);

        let decoded: AgentRequest = decode_frame(&framed[4..]).expect("decode should succeed");
        assert_eq!(decoded.id, Some(42));
        assert!(matches!(decoded.action, RpcAction::GetData));
    }

    #[test]
    fn oversized_body_is_rejected_before_allocation() {
        let huge = vec![0u8; MAX_FRAME_BYTES + 1];
        let err = encode_frame(&huge).expect_err("oversized body must fail");
        assert!(matches!(err, CodecError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn read_framed_body_recovers_the_exact_bytes_written() {
        let request = sample_request();
        let framed = encode_frame(&request).expect("encode should succeed");

        let mut cursor = std::io::Cursor::new(framed.clone());
        let body = read_framed_body(&mut cursor).await.expect("read should succeed");
        assert_eq!(body, framed[4..]);
    }

    #[test]
    fn legacy_json_round_trips_without_a_header() {
        let request = sample_request();
        let legacy = encode_legacy(&request).expect("legacy encode should succeed");
        let decoded: AgentRequest = decode_legacy(&legacy).expect("legacy decode should succeed");
        assert_eq!(decoded.id, Some(42));
    }

    #[test]
    fn enveloped_json_round_trips_the_full_envelope() {
        let request = sample_request();
        let enveloped = encode_enveloped_json(&request).expect("enveloped json encode should succeed");
        let decoded: AgentRequest = decode_enveloped_json(&enveloped).expect("enveloped json decode should succeed");
        assert_eq!(decoded.id, Some(42));
        assert!(matches!(decoded.action, RpcAction::GetData));
    }
}
