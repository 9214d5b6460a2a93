//! Formas de fila usadas en la frontera con el Record Store: lo que se
//! lee de vuelta de una colección, a diferencia de los DTOs de cable o
//! de dominio puro definidos en los demás módulos de este crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::system::{SmartDeviceData, SmartHealthStatus, SystemDetails, SystemStats, SystemdServiceInfo};

/// Fila `system_stats`: una muestra immutable append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatsRecord {
    pub system: String,
    /// Conjunto cerrado en la práctica a `"1m"`; se conserva como String
    /// porque el store no necesita interpretarlo, sólo filtrarlo.
    pub sample_type: String,
    pub stats: SystemStats,
    pub created: DateTime<Utc>,
}

/// Fila `systemd_services`, con su clave primaria sintética (hash
/// estable de `(system, name)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemdServiceRecord {
    pub id: String,
    pub system: String,
    pub service: SystemdServiceInfo,
}

/// Fila singleton `system_details` para un System.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemDetailsRecord {
    pub system: String,
    pub details: SystemDetails,
    pub fetched_at: DateTime<Utc>,
}

/// Fila `smart_devices`, con clave primaria sintética (hash estable de
/// `(system, device_name)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartDeviceRecord {
    pub id: String,
    pub system: String,
    pub device_name: String,
    pub data: SmartDeviceData,
    pub updated: DateTime<Utc>,
}

impl SmartDeviceRecord {
    /// Detecta la transición de salud que dispara la alerta SMART
    /// sintética de §4.6 (PASSED -> FAILED), sin requerir una regla de
    /// usuario.
    pub fn is_failure_transition(previous: Option<&SmartDeviceRecord>, current: &SmartDeviceRecord) -> bool {
        matches!(
            previous.map(|p| p.data.status),
            Some(SmartHealthStatus::Passed)
        ) && current.data.status == SmartHealthStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn device(status: SmartHealthStatus) -> SmartDeviceRecord {
        SmartDeviceRecord {
            id: "abc".into(),
            system: "sys_1".into(),
            device_name: "sda".into(),
            data: SmartDeviceData { status, attributes: HashMap::new() },
            updated: Utc::now(),
        }
    }

    #[test]
    fn failure_transition_requires_prior_passed() {
        let previous = device(SmartHealthStatus::Passed);
        let current = device(SmartHealthStatus::Failed);
        assert!(SmartDeviceRecord::is_failure_transition(Some(&previous), &current));

        let previous_unknown = device(SmartHealthStatus::Unknown);
        assert!(!SmartDeviceRecord::is_failure_transition(Some(&previous_unknown), &current));
        assert!(!SmartDeviceRecord::is_failure_transition(None, &current));
    }
}
