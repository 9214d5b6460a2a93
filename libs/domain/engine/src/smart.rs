// [libs/domain/engine/src/smart.rs]
/*!
 * =================================================================
 * APARATO: FETCH DE DISPOSITIVOS SMART (§4.6, ADJUNTO A C6)
 * CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
 * RESPONSABILIDAD: REFRESCO PERIÓDICO DE SALUD DE DISCOS Y ALERTA
 *                   SINTÉTICA DE TRANSICIÓN PASSED -> FAILED
 *
 * Corre detrás de la puerta CAS de un solo vuelo de `SystemRuntime`
 * (§4.2 paso 6); este módulo sólo sabe pedir, upsertear y comparar.
 * =================================================================
 */

use std::sync::Arc;

use aether_domain_models::{stable_hash_id, AetherEvent, AlertTransitionState, RpcAction, SmartDeviceRecord, System};
use aether_infra_store::RecordStore;
use aether_infra_transport::{AgentRpc, SystemEndpoint, WsConn};
use chrono::Utc;
use tracing::{instrument, warn};

use crate::errors::{EngineError, EngineResult};
use crate::notifier::Notifier;

/// Ejecuta un único ciclo de fetch SMART para un System: pide el mapa
/// `deviceName -> smartData` vía RPC, upsertea por hash estable, purga
/// filas obsoletas y emite una alerta sintética por cada transición
/// `PASSED -> FAILED` (§4.6), a todos los usuarios del System.
#[instrument(skip(store, rpc, notifier, system, ws), fields(system = %system.id))]
pub async fn fetch_smart_devices(
    store: &Arc<dyn RecordStore>,
    rpc: &Arc<AgentRpc>,
    notifier: &Arc<Notifier>,
    system: &System,
    ws: Option<&WsConn>,
) -> EngineResult<()> {
    let endpoint = SystemEndpoint { host: system.host.clone(), port: system.port };
    let payload = rpc.call(&endpoint, ws, RpcAction::GetSmartData, aether_domain_models::RequestPayload::None).await?;

    let devices = match payload {
        aether_domain_models::AgentResponsePayload::SmartDevices(devices) => devices,
        other => return Err(EngineError::UnexpectedPayload(payload_kind(&other))),
    };

    let previous = store.list_smart_devices_for_system(&system.id).await?;
    let now = Utc::now();

    let mut records = Vec::with_capacity(devices.len());
    for (device_name, data) in devices {
        let id = stable_hash_id(&[system.id.as_str(), device_name.as_str()]);
        let prior = previous.iter().find(|p| p.id == id);

        let current = SmartDeviceRecord { id: id.clone(), system: system.id.clone(), device_name: device_name.clone(), data, updated: now };

        if SmartDeviceRecord::is_failure_transition(prior, &current) {
            warn!(device = %device_name, "💽 [SMART]: device transitioned PASSED -> FAILED");
            notifier.send(AetherEvent::SmartAlert {
                system: system.name.clone(),
                device: device_name.clone(),
                state: AlertTransitionState::Triggered,
                duration: "immediate",
            });
        }

        records.push(current);
    }

    store.upsert_smart_devices(&records).await?;

    let valid_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    store.purge_stale_smart_devices(&system.id, &valid_ids).await?;

    Ok(())
}

fn payload_kind(payload: &aether_domain_models::AgentResponsePayload) -> &'static str {
    use aether_domain_models::AgentResponsePayload::*;
    match payload {
        SystemData(_) => "system_data",
        Text(_) => "text",
        Containers(_) => "containers",
        SystemdServices(_) => "systemd_services",
        SmartDevices(_) => "smart_devices",
        Raw(_) => "raw",
    }
}

#[cfg(test)]
mod tests {
    use aether_domain_models::{SmartDeviceData, SmartHealthStatus};
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn failure_transition_is_detected_between_record_pairs() {
        let previous = SmartDeviceRecord {
            id: "d1".into(),
            system: "sys_1".into(),
            device_name: "sda".into(),
            data: SmartDeviceData { status: SmartHealthStatus::Passed, attributes: HashMap::new() },
            updated: Utc::now(),
        };
        let current = SmartDeviceRecord {
            id: "d1".into(),
            system: "sys_1".into(),
            device_name: "sda".into(),
            data: SmartDeviceData { status: SmartHealthStatus::Failed, attributes: HashMap::new() },
            updated: Utc::now(),
        };
        assert!(SmartDeviceRecord::is_failure_transition(Some(&previous), &current));
    }
}
