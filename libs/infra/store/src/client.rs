// [libs/infra/store/src/client.rs]
/*!
 * =================================================================
 * APARATO: RECORD STORE CONNECTION CLIENT (C1)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GESTIÓN DE ENLACES Y PERSISTENCIA ACID
 *
 * Soporta tres topologías de libSQL: remota (Turso Cloud), local a
 * disco y en memoria. El modo memoria ancla una conexión viva para
 * que el esquema no desaparezca entre adquisiciones de conexión
 * (relevante sobre todo para los dobles de prueba de §4.10).
 * =================================================================
 */

use crate::errors::StoreError;
use crate::schema::apply_core_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Clone)]
pub struct StoreClient {
    driver: Arc<Database>,
    /// Mantiene la base de datos viva en modo memoria; `None` en disco/remoto.
    _memory_anchor: Option<Arc<Connection>>,
}

impl StoreClient {
    #[instrument(skip(access_token))]
    pub async fn connect(connection_url: &str, access_token: Option<String>) -> Result<Self, StoreError> {
        if connection_url.is_empty() {
            return Err(StoreError::Configuration("DATABASE_URL is empty".into()));
        }

        info!("🔌 [STORE]: connecting record store at [{}]", connection_url);

        let is_remote = connection_url.starts_with("libsql://") || connection_url.starts_with("https://");
        let is_memory = connection_url.contains(":memory:") || connection_url.contains("mode=memory");

        let driver = if is_remote {
            let token = access_token
                .ok_or_else(|| StoreError::Configuration("remote record store requires an access token".into()))?;
            Builder::new_remote(connection_url.to_string(), token).build().await
        } else {
            Builder::new_local(connection_url).build().await
        }
        .map_err(|e| StoreError::Connection(format!("driver ignition failed: {e}")))?;

        let driver = Arc::new(driver);
        let mut anchor = None;

        if is_memory {
            let anchor_conn = driver
                .connect()
                .map_err(|e| StoreError::Connection(format!("memory anchor failed: {e}")))?;
            apply_core_schema(&anchor_conn).await?;
            anchor = Some(Arc::new(anchor_conn));
            info!("⚓ [STORE]: in-memory schema anchored.");
        } else {
            let bootstrap_conn = driver
                .connect()
                .map_err(|e| StoreError::Connection(format!("bootstrap link failed: {e}")))?;
            apply_core_schema(&bootstrap_conn).await?;
        }

        Ok(Self { driver, _memory_anchor: anchor })
    }

    pub fn connection(&self) -> Result<Connection, StoreError> {
        self.driver.connect().map_err(|e| {
            error!("⚠️ [STORE]: connection allocation failed: {}", e);
            StoreError::Connection(e.to_string())
        })
    }
}
