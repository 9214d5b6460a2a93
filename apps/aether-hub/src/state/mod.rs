// [apps/aether-hub/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: ESTADO COMPARTIDO DEL HUB
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: COMPOSICIÓN DEL NÚCLEO DE DOMINIO PARA AXUM
 *
 * El Hub en sí no posee lógica de negocio: todo el ciclo de vida de
 * los Systems, el RPC de Agentes y el motor de alertas viven en
 * `aether-domain-engine`. Este estado sólo retiene las referencias
 * que los handlers HTTP/WS necesitan para delegar en ese núcleo.
 * =================================================================
 */

use std::sync::Arc;

use aether_domain_engine::{Notifier, SystemManager};

use crate::config::HubConfig;

/// Contenedor de estado compartido (barato de clonar, todo `Arc`)
/// inyectado como estado de Axum.
#[derive(Clone)]
pub struct AppState {
    /// Registro vivo de Systems y su ciclo de actualización (C7).
    pub manager: Arc<SystemManager>,
    /// Token compartido que valida la conexión entrante de un Agente.
    pub agent_auth_token: Arc<str>,
    /// Cadencia del ping de nivel transporte sobre el socket WS (§3.1).
    pub ws_keepalive_interval_s: u64,
}

impl AppState {
    pub fn new(manager: Arc<SystemManager>, config: &HubConfig) -> Self {
        Self {
            manager,
            agent_auth_token: Arc::from(config.agent_auth_token.as_str()),
            ws_keepalive_interval_s: config.ws_keepalive_interval_s,
        }
    }

    pub fn notifier(&self) -> Arc<Notifier> {
        self.manager.notifier()
    }
}
