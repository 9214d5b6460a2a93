// [apps/aether-hub/src/routes.rs]
/*!
 * =================================================================
 * APARATO: TOPOLOGÍA DE RUTAS DEL HUB
 * CLASIFICACIÓN: TRANSPORT ADAPTER (ESTRATO L1-APP)
 * RESPONSABILIDAD: SUPERFICIE HTTP/WS MÍNIMA EXPUESTA POR EL HUB
 *
 * Los manejadores REST/CRUD, GraphQL, i18n y el panel web quedan
 * explícitamente fuera del alcance de este núcleo (§1): la única
 * superficie de red que el Hub expone es la comprobación de salud y
 * el punto de ingreso WebSocket por el que los Agentes se conectan.
 * =================================================================
 */

use axum::{middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use std::time::Duration;

use crate::middleware::agent_auth_guard;
use crate::state::AppState;
use crate::ws_ingress::accept_agent_socket;

pub fn build_router(application_shared_state: AppState) -> Router {
    let network_security_shield = CorsLayer::new().allow_origin(Any).max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(|| async { "STATUS_OK" }))
        .route(
            "/agents/:system_id/ws",
            get(accept_agent_socket)
                .layer(middleware::from_fn_with_state(application_shared_state.clone(), agent_auth_guard)),
        )
        .layer(network_security_shield)
        .with_state(application_shared_state)
}
