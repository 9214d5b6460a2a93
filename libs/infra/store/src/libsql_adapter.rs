// [libs/infra/store/src/libsql_adapter.rs]
/*!
 * =================================================================
 * APARATO: LIBSQL RECORD STORE ADAPTER (C1)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: IMPLEMENTACIÓN CONCRETA DE `RecordStore` SOBRE LIBSQL
 *
 * Único módulo del workspace autorizado a nombrar tipos de libSQL
 * directamente (§9). Todo lo demás programa contra `dyn RecordStore`.
 * =================================================================
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};
use uuid::Uuid;

use aether_domain_models::{
    stable_hash_id, AlertMetric, AlertRule, ContainerInfo, DockerFocusRule, FetchedSystemData, FocusAlertState,
    FocusMatchType, RegisteredContainerSnapshot, SmartDeviceData, SmartDeviceRecord, System, SystemDetails,
    SystemDetailsRecord, SystemInfo, SystemStats, SystemStatsRecord, SystemStatus, SystemdServiceInfo,
    SystemdServiceRecord,
};

use crate::client::StoreClient;
use crate::contract::{PersistedSample, RecordStore};
use crate::errors::{StoreError, StoreResult};

pub struct LibsqlRecordStore {
    client: StoreClient,
}

impl LibsqlRecordStore {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    fn connection(&self) -> StoreResult<Connection> {
        self.client.connection()
    }
}

// --- Serialización de timestamps: RFC3339 en columnas TEXT ---

fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn decode_timestamp(value: &str, context: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Mapping(format!("malformed timestamp in {context}: {e}")))
}

// --- (De)serialización de enums de valor único como texto plano (sin comillas JSON) ---

fn enum_to_str<T: serde::Serialize>(value: &T, context: &str) -> StoreResult<String> {
    let quoted = serde_json::to_string(value).map_err(|e| StoreError::Mapping(format!("{context}: {e}")))?;
    Ok(quoted.trim_matches('"').to_string())
}

fn enum_from_str<T: serde::de::DeserializeOwned>(raw: &str, context: &str) -> StoreResult<T> {
    let quoted = format!("\"{raw}\"");
    serde_json::from_str(&quoted).map_err(|e| StoreError::Mapping(format!("{context}: {e}")))
}

// --- Mapeo de filas ---

fn row_to_system(row: &Row) -> StoreResult<System> {
    let status_raw: String = row.get(3).map_err(|e| StoreError::Mapping(e.to_string()))?;
    let users_json: String = row.get(4).map_err(|e| StoreError::Mapping(e.to_string()))?;
    let info_json: String = row.get(5).map_err(|e| StoreError::Mapping(e.to_string()))?;
    let updated_raw: String = row.get(6).map_err(|e| StoreError::Mapping(e.to_string()))?;

    Ok(System {
        id: row.get(0).map_err(|e| StoreError::Mapping(e.to_string()))?,
        name: row.get(1).map_err(|e| StoreError::Mapping(e.to_string()))?,
        host: row.get(2).map_err(|e| StoreError::Mapping(e.to_string()))?,
        port: row.get::<i64>(7).map_err(|e| StoreError::Mapping(e.to_string()))? as u16,
        status: enum_from_str::<SystemStatus>(&status_raw, "systems.status")?,
        users: serde_json::from_str(&users_json).map_err(|e| StoreError::Mapping(format!("systems.users_json: {e}")))?,
        info: serde_json::from_str(&info_json).map_err(|e| StoreError::Mapping(format!("systems.info_json: {e}")))?,
        updated: decode_timestamp(&updated_raw, "systems.updated")?,
    })
}

#[async_trait]
impl RecordStore for LibsqlRecordStore {
    async fn list_systems(&self) -> StoreResult<Vec<System>> {
        let connection = self.connection()?;
        let mut rows = connection
            .query(
                "SELECT id, name, host, status, users_json, info_json, updated, port FROM systems ORDER BY id",
                (),
            )
            .await?;

        let mut systems = Vec::new();
        while let Some(row) = rows.next().await? {
            systems.push(row_to_system(&row)?);
        }
        Ok(systems)
    }

    async fn find_system(&self, id: &str) -> StoreResult<Option<System>> {
        let connection = self.connection()?;
        let mut rows = connection
            .query(
                "SELECT id, name, host, status, users_json, info_json, updated, port FROM systems WHERE id = ?1",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_system(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_system(&self, system: &System) -> StoreResult<()> {
        let connection = self.connection()?;
        let users_json = serde_json::to_string(&system.users).map_err(|e| StoreError::Mapping(e.to_string()))?;
        let info_json = serde_json::to_string(&system.info).map_err(|e| StoreError::Mapping(e.to_string()))?;
        let status = enum_to_str(&system.status, "systems.status")?;

        connection
            .execute(
                "INSERT INTO systems (id, name, host, port, status, users_json, info_json, updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name, host = excluded.host, port = excluded.port,
                   status = excluded.status, users_json = excluded.users_json,
                   info_json = excluded.info_json, updated = excluded.updated",
                params![
                    system.id.clone(),
                    system.name.clone(),
                    system.host.clone(),
                    system.port as i64,
                    status,
                    users_json,
                    info_json,
                    encode_timestamp(system.updated),
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete_system(&self, id: &str) -> StoreResult<()> {
        let connection = self.connection()?;
        connection.execute("DELETE FROM systems WHERE id = ?1", params![id]).await?;
        Ok(())
    }

    async fn persist_sample(
        &self,
        system_id: &str,
        data: &FetchedSystemData,
        now: DateTime<Utc>,
    ) -> StoreResult<PersistedSample> {
        let connection = self.connection()?;
        let tx = connection
            .transaction()
            .await
            .map_err(|e| StoreError::Transaction(format!("begin failed: {e}")))?;

        // 1. Muestra append-only `system_stats`.
        let stats_json = serde_json::to_string(&data.stats).map_err(|e| StoreError::Mapping(e.to_string()))?;
        tx.execute(
            "INSERT INTO system_stats (id, system, type, stats_json, created) VALUES (?1, ?2, '1m', ?3, ?4)",
            params![Uuid::new_v4().to_string(), system_id, stats_json, encode_timestamp(now)],
        )
        .await
        .map_err(|e| StoreError::Transaction(format!("system_stats insert failed: {e}")))?;

        // 2. Contenedores: upsert del inventario + snapshot append-only.
        if !data.containers.is_empty() {
            for container in &data.containers {
                let labels_json =
                    serde_json::to_string(&container.labels).map_err(|e| StoreError::Mapping(e.to_string()))?;
                tx.execute(
                    "INSERT INTO containers (id, system, name, image, status, uptime, cpu, memory, net, labels_json, created_by, updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT(id) DO UPDATE SET
                       system = excluded.system, name = excluded.name, image = excluded.image,
                       status = excluded.status, uptime = excluded.uptime, cpu = excluded.cpu,
                       memory = excluded.memory, net = excluded.net, labels_json = excluded.labels_json,
                       created_by = excluded.created_by, updated = excluded.updated",
                    params![
                        container.id.clone(),
                        system_id,
                        container.name.clone(),
                        container.image.clone(),
                        container.status.clone(),
                        container.uptime,
                        container.cpu,
                        container.memory,
                        container.net,
                        labels_json,
                        container.created_by.clone(),
                        encode_timestamp(now),
                    ],
                )
                .await
                .map_err(|e| StoreError::Transaction(format!("containers upsert failed: {e}")))?;
            }

            let containers_json = serde_json::to_string(&data.containers).map_err(|e| StoreError::Mapping(e.to_string()))?;
            tx.execute(
                "INSERT INTO container_stats (id, system, containers_json, created) VALUES (?1, ?2, ?3, ?4)",
                params![Uuid::new_v4().to_string(), system_id, containers_json, encode_timestamp(now)],
            )
            .await
            .map_err(|e| StoreError::Transaction(format!("container_stats insert failed: {e}")))?;
        }

        // 3. Servicios systemd: upsert keyed por hash estable (systemId, nombre).
        if !data.systemd_services.is_empty() {
            for service in &data.systemd_services {
                let id = stable_hash_id(&[system_id, &service.name]);
                tx.execute(
                    "INSERT INTO systemd_services (id, system, name, status, active, updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                       status = excluded.status, active = excluded.active, updated = excluded.updated",
                    params![
                        id,
                        system_id,
                        service.name.clone(),
                        service.status.clone(),
                        service.active as i64,
                        encode_timestamp(now),
                    ],
                )
                .await
                .map_err(|e| StoreError::Transaction(format!("systemd_services upsert failed: {e}")))?;
            }
        }

        // 4. Detalles expandidos: upsert singleton por System.
        if let Some(details) = &data.details {
            let details_json = serde_json::to_string(details).map_err(|e| StoreError::Mapping(e.to_string()))?;
            tx.execute(
                "INSERT INTO system_details (system, details_json, fetched_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(system) DO UPDATE SET details_json = excluded.details_json, fetched_at = excluded.fetched_at",
                params![system_id, details_json, encode_timestamp(now)],
            )
            .await
            .map_err(|e| StoreError::Transaction(format!("system_details upsert failed: {e}")))?;
        }

        // 5. El registro `systems` se actualiza último: la evaluación de
        // alertas se dispara a partir de esta escritura y debe observar
        // las filas hijas ya frescas (§4.2.1).
        let info_json = serde_json::to_string(&data.info).map_err(|e| StoreError::Mapping(e.to_string()))?;
        let status = enum_to_str(&SystemStatus::Up, "systems.status")?;
        tx.execute(
            "UPDATE systems SET info_json = ?2, status = ?3, updated = ?4 WHERE id = ?1",
            params![system_id, info_json, status, encode_timestamp(now)],
        )
        .await
        .map_err(|e| StoreError::Transaction(format!("systems update failed: {e}")))?;

        tx.commit().await.map_err(|e| StoreError::Transaction(format!("commit failed: {e}")))?;

        let system = self
            .find_system(system_id)
            .await?
            .ok_or(StoreError::NotFound { collection: "systems" })?;

        Ok(PersistedSample { system, sample_created: now })
    }

    async fn query_system_stats_window(
        &self,
        system_id: &str,
        sample_type: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<SystemStatsRecord>> {
        let connection = self.connection()?;
        let mut rows = connection
            .query(
                "SELECT system, type, stats_json, created FROM system_stats
                 WHERE system = ?1 AND type = ?2 AND created > ?3 ORDER BY created ASC",
                params![system_id, sample_type, encode_timestamp(since)],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let stats_json: String = row.get(2).map_err(|e| StoreError::Mapping(e.to_string()))?;
            let created_raw: String = row.get(3).map_err(|e| StoreError::Mapping(e.to_string()))?;
            records.push(SystemStatsRecord {
                system: row.get(0).map_err(|e| StoreError::Mapping(e.to_string()))?,
                sample_type: row.get(1).map_err(|e| StoreError::Mapping(e.to_string()))?,
                stats: serde_json::from_str::<SystemStats>(&stats_json)
                    .map_err(|e| StoreError::Mapping(format!("system_stats.stats_json: {e}")))?,
                created: decode_timestamp(&created_raw, "system_stats.created")?,
            });
        }
        Ok(records)
    }

    async fn list_containers_for_system(&self, system_id: &str) -> StoreResult<Vec<ContainerInfo>> {
        let connection = self.connection()?;
        let mut rows = connection
            .query(
                "SELECT id, name, image, status, uptime, cpu, memory, net, labels_json, created_by
                 FROM containers WHERE system = ?1",
                params![system_id],
            )
            .await?;

        let mut containers = Vec::new();
        while let Some(row) = rows.next().await? {
            let labels_json: String = row.get(8).map_err(|e| StoreError::Mapping(e.to_string()))?;
            containers.push(ContainerInfo {
                id: row.get(0).map_err(|e| StoreError::Mapping(e.to_string()))?,
                name: row.get(1).map_err(|e| StoreError::Mapping(e.to_string()))?,
                image: row.get(2).map_err(|e| StoreError::Mapping(e.to_string()))?,
                status: row.get(3).map_err(|e| StoreError::Mapping(e.to_string()))?,
                uptime: row.get(4).map_err(|e| StoreError::Mapping(e.to_string()))?,
                cpu: row.get(5).map_err(|e| StoreError::Mapping(e.to_string()))?,
                memory: row.get(6).map_err(|e| StoreError::Mapping(e.to_string()))?,
                net: row.get(7).map_err(|e| StoreError::Mapping(e.to_string()))?,
                labels: serde_json::from_str(&labels_json).map_err(|e| StoreError::Mapping(format!("containers.labels_json: {e}")))?,
                created_by: row.get(9).ok(),
            });
        }
        Ok(containers)
    }

    async fn upsert_containers(&self, snapshots: &[RegisteredContainerSnapshot]) -> StoreResult<()> {
        let connection = self.connection()?;
        for snapshot in snapshots {
            connection
                .execute(
                    "INSERT INTO containers (id, system, name, image, status, uptime, cpu, memory, net, labels_json, created_by, updated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, '{}', NULL, ?10)
                     ON CONFLICT(id) DO UPDATE SET
                       system = excluded.system, name = excluded.name, image = excluded.image,
                       status = excluded.status, uptime = excluded.uptime, cpu = excluded.cpu,
                       memory = excluded.memory, net = excluded.net, updated = excluded.updated",
                    params![
                        snapshot.id.clone(),
                        snapshot.system.clone(),
                        snapshot.name.clone(),
                        snapshot.image.clone(),
                        snapshot.status.clone(),
                        snapshot.uptime,
                        snapshot.cpu,
                        snapshot.memory,
                        snapshot.net,
                        encode_timestamp(snapshot.updated),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    async fn list_sampled_alert_rules(&self, system_id: &str) -> StoreResult<Vec<AlertRule>> {
        let connection = self.connection()?;
        let mut rows = connection
            .query(
                "SELECT id, system, user, name, value, min, triggered FROM alerts
                 WHERE system = ?1 AND name NOT IN ('Status', 'Smart')",
                params![system_id],
            )
            .await?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            let name_raw: String = row.get(3).map_err(|e| StoreError::Mapping(e.to_string()))?;
            rules.push(AlertRule {
                id: row.get(0).map_err(|e| StoreError::Mapping(e.to_string()))?,
                system: row.get(1).map_err(|e| StoreError::Mapping(e.to_string()))?,
                user: row.get(2).map_err(|e| StoreError::Mapping(e.to_string()))?,
                name: enum_from_str::<AlertMetric>(&name_raw, "alerts.name")?,
                value: row.get(4).map_err(|e| StoreError::Mapping(e.to_string()))?,
                min: row.get::<i64>(5).map_err(|e| StoreError::Mapping(e.to_string()))? as u8,
                triggered: row.get::<i64>(6).map_err(|e| StoreError::Mapping(e.to_string()))? != 0,
            });
        }
        Ok(rules)
    }

    async fn save_alert_rule(&self, rule: &AlertRule) -> StoreResult<()> {
        let connection = self.connection()?;
        let name = enum_to_str(&rule.name, "alerts.name")?;
        let changed = connection
            .execute(
                "UPDATE alerts SET value = ?2, min = ?3, triggered = ?4, name = ?5, system = ?6, user = ?7 WHERE id = ?1",
                params![
                    rule.id.clone(),
                    rule.value,
                    rule.min as i64,
                    rule.triggered as i64,
                    name.clone(),
                    rule.system.clone(),
                    rule.user.clone(),
                ],
            )
            .await?;

        if changed == 0 {
            connection
                .execute(
                    "INSERT INTO alerts (id, system, user, name, value, min, triggered) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        rule.id.clone(),
                        rule.system.clone(),
                        rule.user.clone(),
                        name,
                        rule.value,
                        rule.min as i64,
                        rule.triggered as i64,
                    ],
                )
                .await?;
        }
        Ok(())
    }

    async fn list_focus_rules_for_system(&self, system_id: &str) -> StoreResult<Vec<DockerFocusRule>> {
        let connection = self.connection()?;
        let mut rows = connection
            .query(
                "SELECT id, match_type, value, value2, description FROM docker_focus_services WHERE system = ?1",
                params![system_id],
            )
            .await?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            let match_type_raw: String = row.get(1).map_err(|e| StoreError::Mapping(e.to_string()))?;
            rules.push(DockerFocusRule {
                id: row.get(0).map_err(|e| StoreError::Mapping(e.to_string()))?,
                system: system_id.to_string(),
                match_type: enum_from_str::<FocusMatchType>(&match_type_raw, "docker_focus_services.match_type")?,
                value: row.get(2).map_err(|e| StoreError::Mapping(e.to_string()))?,
                value2: row.get(3).ok(),
                description: row.get(4).ok(),
            });
        }
        Ok(rules)
    }

    async fn get_focus_alert_state(&self, system_id: &str, focus_rule_id: &str) -> StoreResult<Option<FocusAlertState>> {
        let connection = self.connection()?;
        let mut rows = connection
            .query(
                "SELECT triggered, running_count, total_count, recovery_since FROM docker_focus_alerts
                 WHERE system = ?1 AND focus_rule = ?2",
                params![system_id, focus_rule_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let recovery_since: Option<String> = row.get(3).ok();
                Ok(Some(FocusAlertState {
                    system: system_id.to_string(),
                    focus_rule: focus_rule_id.to_string(),
                    triggered: row.get::<i64>(0).map_err(|e| StoreError::Mapping(e.to_string()))? != 0,
                    running_count: row.get::<i64>(1).map_err(|e| StoreError::Mapping(e.to_string()))? as u32,
                    total_count: row.get::<i64>(2).map_err(|e| StoreError::Mapping(e.to_string()))? as u32,
                    recovery_since: recovery_since.map(|raw| decode_timestamp(&raw, "docker_focus_alerts.recovery_since")).transpose()?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_focus_alert_state(&self, state: &FocusAlertState) -> StoreResult<()> {
        let connection = self.connection()?;
        connection
            .execute(
                "INSERT INTO docker_focus_alerts (system, focus_rule, triggered, running_count, total_count, recovery_since)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(system, focus_rule) DO UPDATE SET
                   triggered = excluded.triggered, running_count = excluded.running_count,
                   total_count = excluded.total_count, recovery_since = excluded.recovery_since",
                params![
                    state.system.clone(),
                    state.focus_rule.clone(),
                    state.triggered as i64,
                    state.running_count as i64,
                    state.total_count as i64,
                    state.recovery_since.map(encode_timestamp),
                ],
            )
            .await?;
        Ok(())
    }

    async fn purge_orphaned_focus_states(&self, system_id: &str, valid_rule_ids: &[String]) -> StoreResult<()> {
        let connection = self.connection()?;
        if valid_rule_ids.is_empty() {
            connection
                .execute("DELETE FROM docker_focus_alerts WHERE system = ?1", params![system_id])
                .await?;
            return Ok(());
        }

        let placeholders = (2..=valid_rule_ids.len() + 1).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let sql = format!("DELETE FROM docker_focus_alerts WHERE system = ?1 AND focus_rule NOT IN ({placeholders})");

        let mut call_params: Vec<libsql::Value> = vec![system_id.into()];
        call_params.extend(valid_rule_ids.iter().map(|id| libsql::Value::from(id.clone())));
        connection.execute(&sql, call_params).await?;
        Ok(())
    }

    async fn list_smart_devices_for_system(&self, system_id: &str) -> StoreResult<Vec<SmartDeviceRecord>> {
        let connection = self.connection()?;
        let mut rows = connection
            .query(
                "SELECT id, device_name, data_json, updated FROM smart_devices WHERE system = ?1",
                params![system_id],
            )
            .await?;

        let mut devices = Vec::new();
        while let Some(row) = rows.next().await? {
            let data_json: String = row.get(2).map_err(|e| StoreError::Mapping(e.to_string()))?;
            let updated_raw: String = row.get(3).map_err(|e| StoreError::Mapping(e.to_string()))?;
            devices.push(SmartDeviceRecord {
                id: row.get(0).map_err(|e| StoreError::Mapping(e.to_string()))?,
                system: system_id.to_string(),
                device_name: row.get(1).map_err(|e| StoreError::Mapping(e.to_string()))?,
                data: serde_json::from_str::<SmartDeviceData>(&data_json).map_err(|e| StoreError::Mapping(format!("smart_devices.data_json: {e}")))?,
                updated: decode_timestamp(&updated_raw, "smart_devices.updated")?,
            });
        }
        Ok(devices)
    }

    async fn upsert_smart_devices(&self, devices: &[SmartDeviceRecord]) -> StoreResult<()> {
        let connection = self.connection()?;
        for device in devices {
            let data_json = serde_json::to_string(&device.data).map_err(|e| StoreError::Mapping(e.to_string()))?;
            connection
                .execute(
                    "INSERT INTO smart_devices (id, system, device_name, data_json, updated)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET data_json = excluded.data_json, updated = excluded.updated",
                    params![device.id.clone(), device.system.clone(), device.device_name.clone(), data_json, encode_timestamp(device.updated)],
                )
                .await?;
        }
        Ok(())
    }

    async fn purge_stale_smart_devices(&self, system_id: &str, valid_device_ids: &[String]) -> StoreResult<()> {
        let connection = self.connection()?;
        if valid_device_ids.is_empty() {
            connection.execute("DELETE FROM smart_devices WHERE system = ?1", params![system_id]).await?;
            return Ok(());
        }

        let placeholders = (2..=valid_device_ids.len() + 1).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let sql = format!("DELETE FROM smart_devices WHERE system = ?1 AND id NOT IN ({placeholders})");

        let mut call_params: Vec<libsql::Value> = vec![system_id.into()];
        call_params.extend(valid_device_ids.iter().map(|id| libsql::Value::from(id.clone())));
        connection.execute(&sql, call_params).await?;
        Ok(())
    }

    async fn list_systemd_services_for_system(&self, system_id: &str) -> StoreResult<Vec<SystemdServiceRecord>> {
        let connection = self.connection()?;
        let mut rows = connection
            .query("SELECT id, name, status, active FROM systemd_services WHERE system = ?1", params![system_id])
            .await?;

        let mut services = Vec::new();
        while let Some(row) = rows.next().await? {
            services.push(SystemdServiceRecord {
                id: row.get(0).map_err(|e| StoreError::Mapping(e.to_string()))?,
                system: system_id.to_string(),
                service: SystemdServiceInfo {
                    name: row.get(1).map_err(|e| StoreError::Mapping(e.to_string()))?,
                    status: row.get(2).map_err(|e| StoreError::Mapping(e.to_string()))?,
                    active: row.get::<i64>(3).map_err(|e| StoreError::Mapping(e.to_string()))? != 0,
                },
            });
        }
        Ok(services)
    }

    async fn find_system_details(&self, system_id: &str) -> StoreResult<Option<SystemDetailsRecord>> {
        let connection = self.connection()?;
        let mut rows = connection
            .query("SELECT details_json, fetched_at FROM system_details WHERE system = ?1", params![system_id])
            .await?;

        match rows.next().await? {
            Some(row) => {
                let details_json: String = row.get(0).map_err(|e| StoreError::Mapping(e.to_string()))?;
                let fetched_raw: String = row.get(1).map_err(|e| StoreError::Mapping(e.to_string()))?;
                Ok(Some(SystemDetailsRecord {
                    system: system_id.to_string(),
                    details: serde_json::from_str::<SystemDetails>(&details_json).map_err(|e| StoreError::Mapping(format!("system_details.details_json: {e}")))?,
                    fetched_at: decode_timestamp(&fetched_raw, "system_details.fetched_at")?,
                }))
            }
            None => Ok(None),
        }
    }
}
