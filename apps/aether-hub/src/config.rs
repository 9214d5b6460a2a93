// [apps/aether-hub/src/config.rs]
/*!
 * =================================================================
 * APARATO: CONFIGURACIÓN DE ENTORNO DEL HUB
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: RESOLUCIÓN ÚNICA DE VARIABLES DE ENTORNO AL ARRANQUE
 *
 * Todo acceso a `std::env` del binario vive aquí. El resto del árbol
 * recibe valores ya resueltos y tipados; ningún otro módulo llama a
 * `std::env::var` directamente.
 * =================================================================
 */

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use russh_keys::key::KeyPair;

use aether_infra_store::DataCleanupSecretCodec;
use aether_infra_transport::SshCredential;

/// Superficie de configuración resuelta al arranque, construida una
/// sola vez en `main` y consumida por el Kernel.
pub struct HubConfig {
    pub database_url: String,
    pub database_access_token: Option<String>,
    pub listening_port: u16,
    /// Token compartido que un Agente debe presentar como portador
    /// para que el ingreso WS acepte su conexión (§1: el núcleo no
    /// modela cuentas de usuario, sólo consume una identidad ya
    /// resuelta; para el Agente esa identidad resuelta es "posee el
    /// secreto compartido").
    pub agent_auth_token: String,
    pub ssh_username: String,
    pub ssh_key_pair: Arc<KeyPair>,

    // --- MODELO DE CONFIGURACIÓN AMBIENTAL (§3.1) ---
    pub update_interval_ms: u64,
    pub ssh_initial_delay_ms: u64,
    pub ws_keepalive_interval_s: u64,
    /// Interruptor de proceso para el fetch SMART en segundo plano
    /// (§4.2 paso 6). Activo por defecto.
    pub smart_fetch_enabled: bool,
    pub share_all_systems: bool,
    pub api_test_enable_ssrf_filter: bool,
    pub api_test_allowed_hosts: Vec<String>,
    pub api_test_allowed_cidrs: Vec<String>,

    /// Material crudo de `DATA_CLEANUP_KEY`, sin decodificar todavía
    /// (§3.1/§9): su ausencia o malformación nunca debe impedir que el
    /// Hub arranque, sólo falla al construir el codec bajo demanda.
    data_cleanup_key_material: Option<String>,
}

impl HubConfig {
    /// Hidrata la configuración desde el entorno del proceso. Falla de
    /// forma temprana y ruidosa (`expect`) ante cualquier variable
    /// obligatoria ausente: un Hub a medio configurar no debe llegar
    /// a aceptar tráfico de Agentes.
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").expect("CRITICAL_FAULT: DATABASE_URL not defined in runtime environment.");

        let database_access_token = std::env::var("TURSO_AUTH_TOKEN").ok();

        let listening_port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().unwrap_or(3000);

        let agent_auth_token = std::env::var("AGENT_AUTH_TOKEN")
            .expect("CRITICAL_FAULT: AGENT_AUTH_TOKEN not defined in runtime environment.");

        let ssh_username = std::env::var("AGENT_SSH_USERNAME").unwrap_or_else(|_| "aether".to_string());

        let ssh_private_key_pem = std::env::var("AGENT_SSH_PRIVATE_KEY")
            .expect("CRITICAL_FAULT: AGENT_SSH_PRIVATE_KEY not defined in runtime environment.");

        let ssh_key_pair = Arc::new(
            russh_keys::decode_secret_key(&ssh_private_key_pem, None)
                .expect("CRITICAL_FAULT: AGENT_SSH_PRIVATE_KEY is not a valid private key."),
        );

        let update_interval_ms = env_parsed_or("AETHER_UPDATE_INTERVAL_MS", 60_000);
        let ssh_initial_delay_ms = env_parsed_or("AETHER_SSH_INITIAL_DELAY_MS", 60_000);
        let ws_keepalive_interval_s = env_parsed_or("AETHER_WS_KEEPALIVE_INTERVAL_S", 25);
        let smart_fetch_enabled = env_bool_default("AETHER_SMART_FETCH_ENABLED", true);
        let share_all_systems = env_bool("SHARE_ALL_SYSTEMS");
        let api_test_enable_ssrf_filter = env_bool_default("API_TEST_ENABLE_SSRF_FILTER", true);
        let api_test_allowed_hosts = env_csv("API_TEST_ALLOWED_HOSTS");
        let api_test_allowed_cidrs = env_csv("API_TEST_ALLOWED_CIDRS");
        let data_cleanup_key_material = std::env::var("DATA_CLEANUP_KEY").ok();

        Self {
            database_url,
            database_access_token,
            listening_port,
            agent_auth_token,
            ssh_username,
            ssh_key_pair,
            update_interval_ms,
            ssh_initial_delay_ms,
            ws_keepalive_interval_s,
            smart_fetch_enabled,
            share_all_systems,
            api_test_enable_ssrf_filter,
            api_test_allowed_hosts,
            api_test_allowed_cidrs,
            data_cleanup_key_material,
        }
    }

    pub fn ssh_credential(&self) -> SshCredential {
        SshCredential { username: self.ssh_username.clone(), key_pair: self.ssh_key_pair.clone() }
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Construye el codec de secretos de data-cleanup bajo demanda
    /// (§9: "failure to load the key is a hard error for data-cleanup
    /// paths only — other subsystems must not refuse to start"). Nunca
    /// se llama desde `from_env`/`ignite`.
    pub fn data_cleanup_secret_codec(&self) -> anyhow::Result<DataCleanupSecretCodec> {
        let material = self
            .data_cleanup_key_material
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATA_CLEANUP_KEY is not set in the runtime environment"))?;

        let key_bytes = BASE64
            .decode(material)
            .or_else(|_| hex::decode(material))
            .map_err(|_| anyhow::anyhow!("DATA_CLEANUP_KEY is neither valid base64 nor valid hex"))?;

        Ok(DataCleanupSecretCodec::from_key_bytes(&key_bytes)?)
    }
}

fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str) -> bool {
    env_bool_default(key, false)
}

fn env_bool_default(key: &str, default: bool) -> bool {
    std::env::var(key).ok().map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(default)
}

fn env_csv(key: &str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_parsing_trims_and_drops_empty_segments() {
        std::env::set_var("AETHER_TEST_CSV_FIELD", " host-a ,, host-b,");
        assert_eq!(env_csv("AETHER_TEST_CSV_FIELD"), vec!["host-a".to_string(), "host-b".to_string()]);
        std::env::remove_var("AETHER_TEST_CSV_FIELD");
    }

    #[test]
    fn missing_data_cleanup_key_is_a_lazy_error_not_a_panic() {
        std::env::remove_var("DATA_CLEANUP_KEY");
        let config = HubConfig {
            database_url: "file::memory:".into(),
            database_access_token: None,
            listening_port: 3000,
            agent_auth_token: "token".into(),
            ssh_username: "aether".into(),
            ssh_key_pair: Arc::new(KeyPair::generate_ed25519().expect("keygen")),
            update_interval_ms: 60_000,
            ssh_initial_delay_ms: 60_000,
            ws_keepalive_interval_s: 25,
            smart_fetch_enabled: true,
            share_all_systems: false,
            api_test_enable_ssrf_filter: true,
            api_test_allowed_hosts: vec![],
            api_test_allowed_cidrs: vec![],
            data_cleanup_key_material: None,
        };

        assert!(config.data_cleanup_secret_codec().is_err());
    }
}
