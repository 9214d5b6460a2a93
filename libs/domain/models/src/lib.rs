//! # Aether Domain Models
//!
//! Single Source of Truth para las entidades que atraviesan todos los
//! estratos del Hub: el registro de Systems, las muestras de métricas,
//! las reglas de alerta, las reglas de foco Docker y el contrato de
//! frames del protocolo de Agente.
//!
//! Este crate no contiene lógica de persistencia ni de red: únicamente
//! las formas de datos y las conversiones puras entre ellas.

pub mod agent_protocol;
pub mod alert;
pub mod docker_focus;
pub mod events;
pub mod hashing;
pub mod persistence;
pub mod system;

pub use agent_protocol::{
    AgentRequest, AgentResponse, AgentResponsePayload, ComposeOperation, ContainerOperation, RequestPayload,
    RpcAction, SmartDeviceData, SmartHealthStatus,
};
pub use alert::{AlertMetric, AlertRule};
pub use docker_focus::{
    count_matches, DockerFocusRule, FocusAlertState, FocusMatchCounts, FocusMatchType, RegisteredContainerSnapshot,
    FOCUS_RECOVERY_DEBOUNCE_SECONDS,
};
pub use events::{AetherEvent, AlertTransitionState, ThresholdAlertNotification};
pub use hashing::stable_hash_id;
pub use persistence::{SmartDeviceRecord, SystemDetailsRecord, SystemStatsRecord, SystemdServiceRecord};
pub use system::{
    ContainerInfo, FetchedSystemData, FilesystemUsage, GpuUsage, System, SystemDetails, SystemInfo, SystemStats,
    SystemStatus, SystemdServiceInfo,
};

#[cfg(test)]
mod tests_serialization;
