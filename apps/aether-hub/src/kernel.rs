// [apps/aether-hub/src/kernel.rs]
/*!
 * =================================================================
 * APARATO: KERNEL SOBERANO DEL HUB
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: IGNICIÓN DE INFRAESTRUCTURA Y ARRANQUE DEL NÚCLEO
 *
 * Conecta el único punto de persistencia (C1), arma la fachada de RPC
 * de Agente (C3+C5), y entrega el resultado al Manager (C7). El
 * Kernel no conoce el contenido de ningún System: sólo sabe cómo
 * coserlos entre sí y, por último, cómo servir la topología HTTP/WS
 * mínima sobre ese núcleo ya en marcha.
 * =================================================================
 */

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing::{error, info, instrument};

use aether_domain_engine::{Notifier, SystemManager};
use aether_infra_store::{LibsqlRecordStore, RecordStore, StoreClient};
use aether_infra_transport::{AgentRpc, SshDialer};

use crate::config::HubConfig;
use crate::reconciler::spawn_reconciler;
use crate::routes::build_router;
use crate::state::AppState;

pub struct HubKernel {
    config: HubConfig,
    application_state: AppState,
    store: Arc<dyn RecordStore>,
}

impl HubKernel {
    /// Conecta el registro de persistencia, arma la fachada de
    /// transporte de Agente y el Manager, pero no arranca ningún
    /// System todavía: eso ocurre explícitamente en `launch`.
    #[instrument(skip(config))]
    pub async fn ignite(config: HubConfig) -> Self {
        let store_client = StoreClient::connect(&config.database_url, config.database_access_token.clone())
            .await
            .expect("FATAL: record store link collapse. Ignition aborted.");

        let store: Arc<dyn RecordStore> = Arc::new(LibsqlRecordStore::new(store_client));

        let ssh_dialer = SshDialer::new(config.ssh_credential());
        let rpc = Arc::new(AgentRpc::new(ssh_dialer));
        let notifier = Arc::new(Notifier::new());

        let manager = SystemManager::with_config(
            store.clone(),
            rpc,
            notifier,
            config.update_interval_ms,
            config.ssh_initial_delay_ms as i64,
            config.smart_fetch_enabled,
        );
        let application_state = AppState::new(manager, &config);

        Self { config, application_state, store }
    }

    /// Arranca todos los Systems ya persistidos (§4.1), activa el
    /// reconciliador de inventario, y sirve la topología HTTP/WS hasta
    /// que el proceso termine o el bind falle.
    pub async fn launch(self) {
        if let Err(e) = self.application_state.manager.start().await {
            error!(error = %e, "💀 [KERNEL_COLLAPSE]: fleet ignition failed");
            std::process::exit(1);
        }

        spawn_reconciler(self.application_state.manager.clone(), self.store.clone());

        let router = build_router(self.application_state);

        let bind_address = SocketAddr::new("0.0.0.0".parse::<IpAddr>().unwrap(), self.config.listening_port);

        info!("🚀 [KERNEL_ONLINE]: Aether Hub listening at {}", bind_address);

        let tcp_listener =
            tokio::net::TcpListener::bind(bind_address).await.expect("CRITICAL_FAULT: failed to bind network port.");

        if let Err(server_error) = axum::serve(tcp_listener, router).await {
            error!("💀 [KERNEL_COLLAPSE]: runtime failure: {}", server_error);
            std::process::exit(1);
        }
    }
}
