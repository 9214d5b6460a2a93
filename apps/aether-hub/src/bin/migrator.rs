// [apps/aether-hub/src/bin/migrator.rs]
/*!
 * =================================================================
 * APARATO: CLI DE MIGRACIÓN DEL REGISTRO (C1)
 * CLASIFICACIÓN: OPS INFRASTRUCTURE (ESTRATO L6)
 * RESPONSABILIDAD: APLICACIÓN DEL ESQUEMA CENTRAL FUERA DE LÍNEA
 *
 * `StoreClient::connect` ya aplica el esquema central en su propia
 * ignición (§9); este binario existe como una conveniencia de
 * operación para forzar esa nivelación sin tener que arrancar el Hub
 * completo, útil antes de un primer despliegue o tras restaurar un
 * volcado.
 * =================================================================
 */

use dotenvy::dotenv;
use aether_infra_store::StoreClient;
use aether_shared_telemetry::init_tracing;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing("aether_migrator");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().thread_stack_size(4 * 1024 * 1024).build()?;

    runtime.block_on(async {
        info!("🚀 [MIGRATOR]: verifying record store schema...");

        let database_url =
            std::env::var("DATABASE_URL").expect("CRITICAL_FAULT: DATABASE_URL undefined in terminal context.");
        let database_token = std::env::var("TURSO_AUTH_TOKEN").ok();

        match StoreClient::connect(&database_url, database_token).await {
            Ok(_) => {
                info!("✨ [MIGRATOR_SUCCESS]: record store schema is current.");
                Ok(())
            }
            Err(connection_error) => {
                error!("❌ [UPLINK_FAULT]: failed to establish or level the record store: {}", connection_error);
                Err(anyhow::anyhow!(connection_error))
            }
        }
    })
}
