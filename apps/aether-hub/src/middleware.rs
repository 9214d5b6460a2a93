// [apps/aether-hub/src/middleware.rs]
/*!
 * =================================================================
 * APARATO: GUARDIA DE AUTENTICACIÓN DE AGENTES
 * CLASIFICACIÓN: SECURITY STRATUM (ESTRATO L4)
 * RESPONSABILIDAD: VALIDACIÓN DEL PORTADOR COMPARTIDO DE UN AGENTE
 *
 * El núcleo no modela cuentas de usuario ni permisos (§1): consume
 * una identidad de llamador ya resuelta. Para la conexión entrante
 * de un Agente esa identidad resuelta es, en su totalidad, "posee el
 * secreto compartido configurado en `AGENT_AUTH_TOKEN`".
 * =================================================================
 */

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::state::AppState;

/// Rechaza cualquier conexión de Agente cuyo portador no coincida con
/// el token compartido configurado al arranque del Hub.
pub async fn agent_auth_guard(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header_value| header_value.to_str().ok())
        .and_then(|header_value| header_value.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == state.agent_auth_token.as_ref() => Ok(next.run(req).await),
        _ => {
            warn!("⛔ [AGENT_AUTH]: rejected connection with missing or mismatched bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
