//! Eventos internos difundidos por el bus de eventos del Hub. Un
//! formateador externo (fuera de este núcleo) los consume para producir
//! notificaciones localizadas; este crate sólo transporta los campos
//! estructurados.

use serde::{Deserialize, Serialize};

use crate::system::SystemStatus;

/// Lado de una transición de alerta (de regla de umbral o de foco).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTransitionState {
    Triggered,
    Resolved,
}

/// Contrato de notificación para una transición de alerta de umbral
/// (§4.4). El motor sólo rellena campos estructurados; la localización
/// del mensaje es responsabilidad del consumidor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdAlertNotification {
    pub system_name: String,
    pub alert_type: String,
    pub descriptor: Option<String>,
    pub state: AlertTransitionState,
    pub current_value: f64,
    pub threshold: f64,
    pub duration_minutes: u8,
    pub details: Option<String>,
}

/// Eventos difundidos sobre el canal interno (`tokio::sync::broadcast`).
/// Discriminador de dos letras en el estilo del teacher para mantener
/// los frames JSON compactos cuando se reenvían al dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "p")]
pub enum AetherEvent {
    #[serde(rename = "ss")]
    SystemStatusChanged { system: String, status: SystemStatus },
    #[serde(rename = "at")]
    ThresholdAlert(ThresholdAlertNotification),
    #[serde(rename = "ft")]
    FocusAlert {
        system: String,
        focus_rule: String,
        state: AlertTransitionState,
        running_count: u32,
        total_count: u32,
    },
    #[serde(rename = "sa")]
    SmartAlert {
        system: String,
        device: String,
        state: AlertTransitionState,
        /// Siempre `"immediate"` (§4.6): una transición SMART no
        /// acumula ventana, a diferencia de `ThresholdAlertNotification`
        /// que trae `duration_minutes`. El campo existe para que el
        /// formateador externo distinga este caso sin tener que asumirlo.
        duration: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_alert_roundtrips_through_json() {
        let event = AetherEvent::ThresholdAlert(ThresholdAlertNotification {
            system_name: "edge-01".into(),
            alert_type: "CPU".into(),
            descriptor: None,
            state: AlertTransitionState::Triggered,
            current_value: 91.2,
            threshold: 80.0,
            duration_minutes: 1,
            details: None,
        });

        let encoded = serde_json::to_string(&event).expect("serialize");
        assert!(encoded.contains("\"t\":\"at\""));

        let decoded: AetherEvent = serde_json::from_str(&encoded).expect("deserialize");
        match decoded {
            AetherEvent::ThresholdAlert(n) => assert_eq!(n.alert_type, "CPU"),
            other => panic!("unexpected variant decoded: {other:?}"),
        }
    }

    #[test]
    fn smart_alert_always_carries_the_immediate_duration_marker() {
        let event = AetherEvent::SmartAlert {
            system: "edge-01".into(),
            device: "sda".into(),
            state: AlertTransitionState::Triggered,
            duration: "immediate",
        };

        match event {
            AetherEvent::SmartAlert { duration, .. } => assert_eq!(duration, "immediate"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
