//! Entidad System y las formas de datos recolectadas en cada muestra.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Estado de ciclo de vida de un System, espejo fiel de la máquina de
/// estados descrita para el updater (pending -> up -> down, paused en
/// cualquier punto por acción del usuario).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Pending,
    Up,
    Down,
    Paused,
}

impl Default for SystemStatus {
    fn default() -> Self {
        SystemStatus::Pending
    }
}

/// Resumen táctico de una sola lectura, lo que queda plasmado en el
/// registro `systems.info` tras cada tick exitoso.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    pub cpu: f64,
    pub mem_pct: f64,
    pub bandwidth: f64,
    pub disk_pct: f64,
    pub dashboard_temp: f64,
    pub load_avg: [f64; 3],
    pub gpu_pct: f64,
}

/// Registro persistido de un System gestionado por el Hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub status: SystemStatus,
    pub users: Vec<String>,
    pub info: SystemInfo,
    pub updated: DateTime<Utc>,
}

impl System {
    pub fn is_authorized(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id)
    }
}

/// Uso de un sistema de archivos adicional (más allá del volumen raíz).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemUsage {
    pub used: f64,
    pub total: f64,
}

/// Uso reportado por un GPU individual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuUsage {
    pub usage: f64,
}

/// Payload opaco de una muestra `system_stats`. Append-only, nunca
/// mutado tras su escritura.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    pub disk_read_ps: f64,
    pub disk_write_ps: f64,
    pub bandwidth: f64,
    /// sensor -> grados Celsius.
    pub temperatures: HashMap<String, f64>,
    pub load_avg: [f64; 3],
    pub gpu: Vec<GpuUsage>,
    /// [porcentaje, voltaje, ciclos] según convención del agente; el
    /// motor de alertas sólo consulta `battery[0]`.
    pub battery: [f64; 3],
    /// clave del sistema de archivos -> uso.
    pub extra_fs: HashMap<String, FilesystemUsage>,
}

/// Snapshot de un contenedor Docker tal como lo reporta el agente.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub uptime: i64,
    pub cpu: f64,
    pub memory: f64,
    pub net: f64,
    pub labels: HashMap<String, String>,
    pub created_by: Option<String>,
}

/// Entrada de un servicio systemd reportado por el agente.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemdServiceInfo {
    pub name: String,
    pub status: String,
    pub active: bool,
}

/// Bloque de detalles expandidos, recolectado sólo en el primer tick o
/// bajo demanda explícita (`IncludeDetails`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemDetails {
    pub os: String,
    pub kernel: String,
    pub uptime: i64,
    pub cpu_model: String,
    pub cpu_cores: u32,
    pub smart_interval_minutes: Option<u32>,
}

/// El resultado combinado de una llamada `GetData`: lo que el updater
/// persiste en una sola transacción y lo que el motor de alertas
/// consulta sin tener que volver a golpear el agente.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchedSystemData {
    pub info: SystemInfo,
    pub stats: SystemStats,
    pub containers: Vec<ContainerInfo>,
    pub systemd_services: Vec<SystemdServiceInfo>,
    pub details: Option<SystemDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_authorization_checks_membership() {
        let system = System {
            id: "sys_1".into(),
            name: "edge-01".into(),
            host: "10.0.0.5".into(),
            port: 45876,
            status: SystemStatus::Up,
            users: vec!["user_a".into(), "user_b".into()],
            info: SystemInfo::default(),
            updated: Utc::now(),
        };

        assert!(system.is_authorized("user_a"));
        assert!(!system.is_authorized("user_z"));
    }

    #[test]
    fn system_status_defaults_to_pending() {
        assert_eq!(SystemStatus::default(), SystemStatus::Pending);
    }
}
