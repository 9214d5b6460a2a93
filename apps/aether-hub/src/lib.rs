// [apps/aether-hub/src/lib.rs]
/*!
 * =================================================================
 * APARATO: RAÍZ DE LA LIBRERÍA DEL HUB
 * CLASIFICACIÓN: CRATE ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: DEFINICIÓN DEL ÁRBOL DE MÓDULOS DE LA APLICACIÓN
 * =================================================================
 */

/// Resolución de variables de entorno al arranque.
pub mod config;
/// Composición de infraestructura y arranque del núcleo.
pub mod kernel;
/// Guardia de autenticación perimetral de Agentes.
pub mod middleware;
/// Sincronización periódica entre el registro persistido y el Manager.
pub mod reconciler;
/// Topología HTTP/WS mínima expuesta por el Hub.
pub mod routes;
/// Estado compartido inyectado en los handlers de Axum.
pub mod state;
/// Puente entre el socket WebSocket de Axum y `WsConn` (C4).
pub mod ws_ingress;

pub mod prelude {
    pub use crate::config::HubConfig;
    pub use crate::kernel::HubKernel;
    pub use crate::state::AppState;
}
