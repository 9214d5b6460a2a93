// [apps/aether-hub/src/main.rs]
/*!
 * =================================================================
 * APARATO: PUNTO DE ENTRADA DEL HUB
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE ENTORNO, OBSERVABILIDAD Y RUNTIME
 * =================================================================
 */

use aether_hub::prelude::*;

use dotenvy::dotenv;
use aether_shared_telemetry::init_tracing;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing("aether_hub");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().thread_stack_size(4 * 1024 * 1024).build()?;

    runtime.block_on(async {
        info!("🛰️  [AETHER_HUB]: ignition sequence starting...");

        let config = HubConfig::from_env();
        let listening_port = config.listening_port;

        let kernel = HubKernel::ignite(config).await;

        info!("🚀 [AETHER_HUB]: fleet core online, preparing to listen on port {}.", listening_port);
        kernel.launch().await;

        Ok(())
    })
}
