// [libs/infra/store/src/contract.rs]
/*!
 * =================================================================
 * APARATO: RECORD STORE CONTRACT (C1 / §9 Design Notes)
 * CLASIFICACIÓN: INFRASTRUCTURE CONTRACT (ESTRATO L3)
 * RESPONSABILIDAD: CAPACIDAD DE PERSISTENCIA CONSUMIDA POR EL NÚCLEO
 *
 * El núcleo (Manager, System, Alert Engine, Docker Focus Watcher) sólo
 * conoce este trait. Ningún módulo fuera de `libsql_adapter` puede
 * nombrar un tipo de libSQL directamente (§9): el resto del workspace
 * programa contra `dyn RecordStore`, lo que permite un doble de
 * prueba en memoria sin tocar una base de datos real (§4.10).
 * =================================================================
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use aether_domain_models::{
    AlertRule, ContainerInfo, DockerFocusRule, FetchedSystemData, FocusAlertState, RegisteredContainerSnapshot,
    SmartDeviceRecord, System, SystemDetailsRecord, SystemStatsRecord, SystemdServiceRecord,
};

use crate::errors::StoreResult;

/// El resultado de `persist_sample`: lo que el resto del ciclo de
/// actualización necesita sin tener que releer el registro (§4.2.1,
/// invariante #2 de §8: `updated` >= `created` de la muestra).
#[derive(Debug, Clone)]
pub struct PersistedSample {
    pub system: System,
    pub sample_created: DateTime<Utc>,
}

/// Capacidad de persistencia consumida por el núcleo: find/save/delete,
/// consultas filtradas y la única transacción multi-fila del sistema
/// (§4.2.1). Cada operación tiene su propio método nominal en lugar de
/// un query-builder genérico, en línea con el estilo de repositorio
/// por entidad que usa el resto del corpus.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // --- Colección `systems` ---
    async fn list_systems(&self) -> StoreResult<Vec<System>>;
    async fn find_system(&self, id: &str) -> StoreResult<Option<System>>;
    async fn save_system(&self, system: &System) -> StoreResult<()>;
    async fn delete_system(&self, id: &str) -> StoreResult<()>;

    // --- Transacción de persistencia de muestra (§4.2.1) ---
    /// Ejecuta los cinco pasos de la transacción de persistencia en una
    /// sola unidad atómica y devuelve el registro `systems` ya
    /// actualizado junto con el timestamp de la muestra recién
    /// escrita, en el orden exigido por §4.2.1 (los hijos antes que el
    /// padre, para que la evaluación de alertas vea filas frescas).
    async fn persist_sample(
        &self,
        system_id: &str,
        data: &FetchedSystemData,
        now: DateTime<Utc>,
    ) -> StoreResult<PersistedSample>;

    // --- Colección `system_stats` (ventana de lectura del motor de alertas) ---
    async fn query_system_stats_window(
        &self,
        system_id: &str,
        sample_type: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<SystemStatsRecord>>;

    // --- Colección `containers` (inventario vivo para el Focus Watcher) ---
    async fn list_containers_for_system(&self, system_id: &str) -> StoreResult<Vec<ContainerInfo>>;
    async fn upsert_containers(&self, snapshots: &[RegisteredContainerSnapshot]) -> StoreResult<()>;

    // --- Colección `alerts` ---
    async fn list_sampled_alert_rules(&self, system_id: &str) -> StoreResult<Vec<AlertRule>>;
    async fn save_alert_rule(&self, rule: &AlertRule) -> StoreResult<()>;

    // --- Colecciones `docker_focus_services` / `docker_focus_alerts` ---
    async fn list_focus_rules_for_system(&self, system_id: &str) -> StoreResult<Vec<DockerFocusRule>>;
    async fn get_focus_alert_state(&self, system_id: &str, focus_rule_id: &str) -> StoreResult<Option<FocusAlertState>>;
    async fn save_focus_alert_state(&self, state: &FocusAlertState) -> StoreResult<()>;
    async fn purge_orphaned_focus_states(&self, system_id: &str, valid_rule_ids: &[String]) -> StoreResult<()>;

    // --- Colección `smart_devices` (§4.6) ---
    async fn list_smart_devices_for_system(&self, system_id: &str) -> StoreResult<Vec<SmartDeviceRecord>>;
    async fn upsert_smart_devices(&self, devices: &[SmartDeviceRecord]) -> StoreResult<()>;
    async fn purge_stale_smart_devices(&self, system_id: &str, valid_device_ids: &[String]) -> StoreResult<()>;

    // --- Colección `systemd_services` / `system_details` (inspección directa, rara vez usada fuera de persist_sample) ---
    async fn list_systemd_services_for_system(&self, system_id: &str) -> StoreResult<Vec<SystemdServiceRecord>>;
    async fn find_system_details(&self, system_id: &str) -> StoreResult<Option<SystemDetailsRecord>>;
}
