//! [libs/domain/models/src/tests_serialization.rs]
//!
//! Certificación de paridad binaria para las formas de cable del
//! protocolo de Agente: una petición codificada y decodificada debe
//! reconstruirse bit-perfecta, y el discriminador de acción debe
//! sobrevivir la ronda completa.

use crate::agent_protocol::{AgentRequest, ContainerOperation, RequestPayload, RpcAction};
use crate::system::{FetchedSystemData, SystemInfo, SystemStats};

#[test]
fn certify_get_data_request_roundtrip_through_bincode() {
    let request = AgentRequest {
        action: RpcAction::GetData,
        data: RequestPayload::GetData { cache_time_ms: 60_000, include_details: true },
        id: Some(42),
    };

    let encoded = bincode::serialize(&request).expect("serialization strata must not collapse");
    let recovered: AgentRequest = bincode::deserialize(&encoded).expect("decode must mirror encode");

    assert_eq!(recovered.action, RpcAction::GetData);
    assert_eq!(recovered.id, Some(42));
    match recovered.data {
        RequestPayload::GetData { cache_time_ms, include_details } => {
            assert_eq!(cache_time_ms, 60_000);
            assert!(include_details);
        }
        other => panic!("payload variant drifted across the wire: {other:?}"),
    }
}

#[test]
fn certify_container_operate_request_preserves_operation_tag() {
    let request = AgentRequest {
        action: RpcAction::OperateContainer,
        data: RequestPayload::ContainerOperate {
            container_id: "c_feedface".into(),
            operation: ContainerOperation::Restart,
        },
        id: Some(7),
    };

    let encoded = bincode::serialize(&request).unwrap();
    let recovered: AgentRequest = bincode::deserialize(&encoded).unwrap();

    match recovered.data {
        RequestPayload::ContainerOperate { container_id, operation } => {
            assert_eq!(container_id, "c_feedface");
            assert_eq!(operation, ContainerOperation::Restart);
        }
        other => panic!("unexpected payload after roundtrip: {other:?}"),
    }
}

#[test]
fn ssh_transport_requests_omit_correlation_id() {
    // Sesión por llamada: el id de correlación no tiene razón de ser
    // en SSH, a diferencia de WebSocket donde multiplexa el mapa en-vuelo.
    let request = AgentRequest { action: RpcAction::GetSmartData, data: RequestPayload::None, id: None };
    let encoded = bincode::serialize(&request).unwrap();
    let recovered: AgentRequest = bincode::deserialize(&encoded).unwrap();
    assert_eq!(recovered.id, None);
}

#[test]
fn fetched_system_data_survives_json_roundtrip_with_empty_collections() {
    // El caso de borde habitual: un agente recién arrancado que aún no
    // reporta contenedores ni servicios systemd.
    let data = FetchedSystemData {
        info: SystemInfo::default(),
        stats: SystemStats::default(),
        containers: vec![],
        systemd_services: vec![],
        details: None,
    };

    let encoded = serde_json::to_string(&data).expect("json encode");
    let recovered: FetchedSystemData = serde_json::from_str(&encoded).expect("json decode");

    assert!(recovered.containers.is_empty());
    assert!(recovered.systemd_services.is_empty());
    assert!(recovered.details.is_none());
}
