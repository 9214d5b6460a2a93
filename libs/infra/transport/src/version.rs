// [libs/infra/transport/src/version.rs]
/*!
 * =================================================================
 * APARATO: AGENT VERSION NEGOTIATION (adjunto a C3)
 * CLASIFICACIÓN: INFRASTRUCTURE SUPPORT (ESTRATO L3)
 * RESPONSABILIDAD: PARSEO DE LA VERSIÓN DEL AGENTE Y DECISIÓN DE RUTA
 *
 * La versión del agente viaja en el banner SSH identificador de
 * protocolo (`SSH-2.0-…_<semver>`), no en el intercambio de claves.
 * Se interpreta aquí para decidir qué forma del frame (§4.3) usar.
 * =================================================================
 */

use std::cmp::Ordering;

/// Versión semántica mínima que el release binario (framed + MessagePack)
/// del protocolo exige (§4.3). Por debajo (pero por encima de
/// `MIN_VERSION_CBOR`): envoltura de respuesta en JSON.
pub const MIN_VERSION_AGENT_RESPONSE: (u32, u32, u32) = (2, 0, 0);

/// Versión semántica mínima a partir de la cual el agente entiende la
/// envoltura `AgentRequest`/`AgentResponse`, aunque todavía la
/// serialice en JSON en vez de MessagePack. Por debajo: forma legado sin
/// envoltura (payload desnudo).
pub const MIN_VERSION_CBOR: (u32, u32, u32) = (1, 4, 0);

/// Extrae `<semver>` de un banner `SSH-2.0-…_<semver>`. Devuelve
/// `None` si el banner no trae sufijo de versión reconocible.
pub fn parse_agent_version(banner: &str) -> Option<(u32, u32, u32)> {
    let (_, suffix) = banner.rsplit_once('_')?;
    let mut parts = suffix.trim().splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor, patch))
}

fn compare(version: (u32, u32, u32), floor: (u32, u32, u32)) -> Ordering {
    version.cmp(&floor)
}

/// Decisión de forma de wire para una versión de agente dada (§4.3,
/// modelo de tres niveles).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    /// Envoltura binaria completa (frame encuadrado + MessagePack).
    Framed,
    /// Envoltura `AgentRequest`/`AgentResponse`, pero serializada en
    /// JSON en vez de MessagePack.
    EnvelopedJson,
    /// Payload desnudo en JSON, sin envoltura de respuesta.
    LegacyJson,
}

/// Decide la forma de wire para una versión de agente parseada.
/// Un agente sin versión reconocible se trata como legado por
/// seguridad (nunca asumir soporte que no se pudo confirmar).
pub fn wire_shape_for(version: Option<(u32, u32, u32)>) -> WireShape {
    match version {
        Some(v) if compare(v, MIN_VERSION_AGENT_RESPONSE) != Ordering::Less => WireShape::Framed,
        Some(v) if compare(v, MIN_VERSION_CBOR) != Ordering::Less => WireShape::EnvelopedJson,
        _ => WireShape::LegacyJson,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_semver_suffix_from_banner() {
        assert_eq!(parse_agent_version("SSH-2.0-aether-agent_2.3.1"), Some((2, 3, 1)));
    }

    #[test]
    fn missing_suffix_yields_none() {
        assert_eq!(parse_agent_version("SSH-2.0-dropbear"), None);
    }

    #[test]
    fn below_both_floors_selects_legacy_json() {
        assert_eq!(wire_shape_for(Some((1, 0, 0))), WireShape::LegacyJson);
        assert_eq!(wire_shape_for(None), WireShape::LegacyJson);
    }

    #[test]
    fn between_floors_selects_enveloped_json() {
        assert_eq!(wire_shape_for(Some((1, 4, 0))), WireShape::EnvelopedJson);
        assert_eq!(wire_shape_for(Some((1, 9, 9))), WireShape::EnvelopedJson);
    }

    #[test]
    fn at_or_above_the_binary_floor_selects_framed() {
        assert_eq!(wire_shape_for(Some((2, 0, 0))), WireShape::Framed);
        assert_eq!(wire_shape_for(Some((3, 0, 0))), WireShape::Framed);
    }

    #[test]
    fn cbor_floor_is_strictly_below_the_binary_floor() {
        assert!(MIN_VERSION_CBOR < MIN_VERSION_AGENT_RESPONSE);
    }
}
