/**
 * =================================================================
 * APARATO: RECORD STORE SCHEMA (C1)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL DE LAS COLECCIONES DEL NÚCLEO
 *
 * Sólo las colecciones que el núcleo (C6-C9) realmente lee o escribe
 * (§6) tienen tabla aquí. Las colecciones periféricas (plantillas
 * compose, configuraciones de data-cleanup, pruebas de API, registro
 * de auditoría Docker, etc.) son responsabilidad de un estrato externo
 * no cubierto por esta especificación.
 * =================================================================
 */

use libsql::Connection;
use tracing::{debug, info, warn};

use crate::errors::{StoreError, StoreResult};

const CORE_TABLES: &[(&str, &str)] = &[
    ("TABLE_SYSTEMS", r#"
        CREATE TABLE IF NOT EXISTS systems (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            host TEXT NOT NULL,
            port INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            users_json TEXT NOT NULL DEFAULT '[]',
            info_json TEXT NOT NULL DEFAULT '{}',
            updated DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_SYSTEM_STATS", r#"
        CREATE TABLE IF NOT EXISTS system_stats (
            id TEXT PRIMARY KEY,
            system TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT '1m',
            stats_json TEXT NOT NULL,
            created DATETIME NOT NULL
        );
    "#),
    ("TABLE_CONTAINERS", r#"
        CREATE TABLE IF NOT EXISTS containers (
            id TEXT PRIMARY KEY,
            system TEXT NOT NULL,
            name TEXT NOT NULL,
            image TEXT NOT NULL,
            status TEXT NOT NULL,
            uptime INTEGER NOT NULL DEFAULT 0,
            cpu REAL NOT NULL DEFAULT 0,
            memory REAL NOT NULL DEFAULT 0,
            net REAL NOT NULL DEFAULT 0,
            labels_json TEXT NOT NULL DEFAULT '{}',
            created_by TEXT,
            updated DATETIME NOT NULL
        );
    "#),
    ("TABLE_CONTAINER_STATS", r#"
        CREATE TABLE IF NOT EXISTS container_stats (
            id TEXT PRIMARY KEY,
            system TEXT NOT NULL,
            containers_json TEXT NOT NULL,
            created DATETIME NOT NULL
        );
    "#),
    ("TABLE_SYSTEMD_SERVICES", r#"
        CREATE TABLE IF NOT EXISTS systemd_services (
            id TEXT PRIMARY KEY,
            system TEXT NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 0,
            updated DATETIME NOT NULL
        );
    "#),
    ("TABLE_SYSTEM_DETAILS", r#"
        CREATE TABLE IF NOT EXISTS system_details (
            system TEXT PRIMARY KEY,
            details_json TEXT NOT NULL,
            fetched_at DATETIME NOT NULL
        );
    "#),
    ("TABLE_SMART_DEVICES", r#"
        CREATE TABLE IF NOT EXISTS smart_devices (
            id TEXT PRIMARY KEY,
            system TEXT NOT NULL,
            device_name TEXT NOT NULL,
            data_json TEXT NOT NULL,
            updated DATETIME NOT NULL
        );
    "#),
    ("TABLE_ALERTS", r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id TEXT PRIMARY KEY,
            system TEXT NOT NULL,
            user TEXT NOT NULL,
            name TEXT NOT NULL,
            value REAL NOT NULL,
            min INTEGER NOT NULL DEFAULT 1,
            triggered INTEGER NOT NULL DEFAULT 0
        );
    "#),
    ("TABLE_DOCKER_FOCUS_SERVICES", r#"
        CREATE TABLE IF NOT EXISTS docker_focus_services (
            id TEXT PRIMARY KEY,
            system TEXT NOT NULL,
            match_type TEXT NOT NULL,
            value TEXT NOT NULL,
            value2 TEXT,
            description TEXT
        );
    "#),
    ("TABLE_DOCKER_FOCUS_ALERTS", r#"
        CREATE TABLE IF NOT EXISTS docker_focus_alerts (
            system TEXT NOT NULL,
            focus_rule TEXT NOT NULL,
            triggered INTEGER NOT NULL DEFAULT 0,
            running_count INTEGER NOT NULL DEFAULT 0,
            total_count INTEGER NOT NULL DEFAULT 0,
            recovery_since DATETIME,
            PRIMARY KEY (system, focus_rule)
        );
    "#),
];

const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_SYSTEM_STATS_WINDOW", "CREATE INDEX IF NOT EXISTS idx_system_stats_window ON system_stats(system, type, created);"),
    ("IDX_CONTAINERS_SYSTEM", "CREATE INDEX IF NOT EXISTS idx_containers_system ON containers(system);"),
    ("IDX_SYSTEMD_SYSTEM", "CREATE INDEX IF NOT EXISTS idx_systemd_system ON systemd_services(system);"),
    ("IDX_SMART_SYSTEM", "CREATE INDEX IF NOT EXISTS idx_smart_system ON smart_devices(system);"),
    ("IDX_ALERTS_SYSTEM", "CREATE INDEX IF NOT EXISTS idx_alerts_system ON alerts(system);"),
    ("IDX_FOCUS_SERVICES_SYSTEM", "CREATE INDEX IF NOT EXISTS idx_focus_services_system ON docker_focus_services(system);"),
];

/// Ejecuta la secuencia de sincronización del esquema estructural.
/// Idempotente: cada sentencia usa `IF NOT EXISTS`.
pub async fn apply_core_schema(connection: &Connection) -> StoreResult<()> {
    info!("🏗️ [SCHEMA]: synchronizing record store schema...");

    for (identifier, sql) in CORE_TABLES {
        debug!("  ↳ solidifying: {}", identifier);
        connection.execute(sql, ()).await.map_err(|e| {
            StoreError::Connection(format!("table '{identifier}' failed to solidify -> {e}"))
        })?;
    }

    for (identifier, sql) in ACCELERATION_INDEXES {
        match connection.execute(sql, ()).await {
            Ok(_) => debug!("  ↳ hardened: {}", identifier),
            Err(e) => warn!("  ⚠️ index '{}' could not be applied: {}", identifier, e),
        }
    }

    info!("✅ [SCHEMA]: record store schema level and certified.");
    Ok(())
}
