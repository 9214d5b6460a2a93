//! Contrato de cable entre el Hub y un Agente: el conjunto cerrado de
//! acciones, la forma de una petición y la unión etiquetada de una
//! respuesta. El framing binario en sí (longitud, claves enteras) vive
//! en `aether-infra-transport`; este módulo sólo define las formas que
//! ese framing serializa.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::collections::HashMap;

use crate::system::{ContainerInfo, FetchedSystemData, SystemdServiceInfo};

/// Opcode de una llamada RPC de Agente. Conjunto cerrado y estable: el
/// valor numérico es parte del contrato de cable y no puede reordenarse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum RpcAction {
    GetData = 0,
    CheckFingerprint = 1,
    GetContainerLogs = 2,
    GetContainerInfo = 3,
    GetSmartData = 4,
    GetSystemdInfo = 5,
    OperateContainer = 6,
    GetDockerOverview = 7,
    ListDockerContainers = 8,
    ListDockerImages = 9,
    PullDockerImage = 10,
    PushDockerImage = 11,
    RemoveDockerImage = 12,
    ListDockerNetworks = 13,
    CreateDockerNetwork = 14,
    RemoveDockerNetwork = 15,
    ListDockerVolumes = 16,
    CreateDockerVolume = 17,
    RemoveDockerVolume = 18,
    ListDockerComposeProjects = 19,
    CreateDockerComposeProject = 20,
    UpdateDockerComposeProject = 21,
    OperateDockerComposeProject = 22,
    DeleteDockerComposeProject = 23,
    GetDockerConfig = 24,
    UpdateDockerConfig = 25,
    GetRepoSources = 26,
    DataCleanupList = 27,
    DataCleanupRun = 28,
}

impl RpcAction {
    /// Presupuesto de tiempo por defecto de esta familia de acciones,
    /// en milisegundos (§4.3). El llamador puede imponer un deadline
    /// más ajustado; éste es sólo el valor por defecto razonable.
    pub fn default_timeout_ms(self) -> u64 {
        use RpcAction::*;
        match self {
            GetData | GetSmartData | GetContainerLogs | GetContainerInfo | GetSystemdInfo | GetDockerOverview
            | ListDockerContainers | ListDockerImages | ListDockerNetworks | ListDockerVolumes
            | ListDockerComposeProjects | GetRepoSources | CheckFingerprint => 10_000,
            OperateContainer => 12_000,
            GetDockerConfig | UpdateDockerConfig | CreateDockerNetwork | RemoveDockerNetwork | CreateDockerVolume
            | RemoveDockerVolume => 30_000,
            DataCleanupList => 20_000,
            PullDockerImage | PushDockerImage | RemoveDockerImage | CreateDockerComposeProject
            | UpdateDockerComposeProject | OperateDockerComposeProject | DeleteDockerComposeProject => 20 * 60_000,
            DataCleanupRun => 30 * 60_000,
        }
    }
}

/// Operación puntual de ciclo de vida de contenedor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerOperation {
    Start,
    Stop,
    Restart,
    Remove,
    Pause,
    Unpause,
}

/// Operación puntual sobre un proyecto docker-compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposeOperation {
    Up,
    Down,
    Restart,
    Pull,
}

/// Cuerpo variante de una petición, discriminado implícitamente por el
/// `action` que lo acompaña en `AgentRequest`. Las familias de acciones
/// de gestión Docker cuya forma exacta de parámetros no está fijada por
/// este núcleo (red/volumen/config/compose/data-cleanup) viajan como
/// `Raw`, un valor JSON de forma libre acordado fuera de banda con el
/// agente; todo lo que el Hub necesita interpretar tiene su propia
/// variante tipada.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RequestPayload {
    None,
    GetData { cache_time_ms: u64, include_details: bool },
    ContainerRef { container_id: String },
    ContainerOperate { container_id: String, operation: ContainerOperation },
    ComposeOperate { project: String, operation: ComposeOperation },
    Raw(serde_json::Value),
}

/// Petición enmarcada enviada sobre WebSocket o SSH.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub action: RpcAction,
    pub data: RequestPayload,
    /// Ausente en transporte SSH (sesión por llamada, no requiere
    /// correlación); presente en WebSocket para el mapa de en-vuelo.
    /// Omitido del frame cuando es `None` (§6: "absent fields are
    /// omitted").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
}

/// Estado reportado de un dispositivo SMART.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SmartHealthStatus {
    Passed,
    Failed,
    Unknown,
}

/// Datos SMART de un único dispositivo de almacenamiento.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartDeviceData {
    pub status: SmartHealthStatus,
    pub attributes: HashMap<String, String>,
}

/// Unión etiquetada de los posibles payloads de una respuesta. A lo
/// sumo uno está poblado por llamada, según qué `action` la originó.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AgentResponsePayload {
    SystemData(FetchedSystemData),
    Text(String),
    Containers(Vec<ContainerInfo>),
    SystemdServices(Vec<SystemdServiceInfo>),
    SmartDevices(HashMap<String, SmartDeviceData>),
    /// Familias de gestión Docker (overview/images/networks/volumes/
    /// compose/config) y data-cleanup cuyo esquema exacto de retorno
    /// es definido por el agente y consumido como JSON de forma libre.
    Raw(serde_json::Value),
}

/// Respuesta enmarcada recibida desde un Agente. Los tres campos son
/// omitidos del frame cuando están ausentes/vacíos (§6: "Absent fields
/// are omitted... strings default empty").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Ausente en el modo legado pre-`MinVersionAgentResponse`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    /// No vacío implica un fallo lógico: el transporte tuvo éxito pero
    /// la operación en sí no.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<AgentResponsePayload>,
}

impl AgentResponse {
    pub fn is_logical_error(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_error_detection_ignores_empty_string() {
        let ok = AgentResponse { id: Some(1), error: Some(String::new()), payload: None };
        assert!(!ok.is_logical_error());

        let failed = AgentResponse { id: Some(1), error: Some("disk not found".into()), payload: None };
        assert!(failed.is_logical_error());
    }

    #[test]
    fn default_timeouts_match_action_family_budgets() {
        assert_eq!(RpcAction::GetData.default_timeout_ms(), 10_000);
        assert_eq!(RpcAction::OperateContainer.default_timeout_ms(), 12_000);
        assert_eq!(RpcAction::DataCleanupRun.default_timeout_ms(), 30 * 60_000);
    }
}
