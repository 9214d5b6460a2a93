// [libs/domain/engine/src/lib.rs]
/*!
 * =================================================================
 * APARATO: NÚCLEO OPERATIVO DE AETHER
 * CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
 * RESPONSABILIDAD: SYSTEM MANAGER (C7), SYSTEM UPDATER (C6), MOTOR DE
 *                   ALERTAS (C8), DOCKER FOCUS WATCHER (C9) Y EL FETCH
 *                   PERIÓDICO DE DISPOSITIVOS SMART (§4.6)
 *
 * Este crate programa exclusivamente contra `dyn RecordStore` y
 * `AgentRpc`: no conoce libSQL ni los detalles de framing WS/SSH, sólo
 * sus contratos (estrato L3). El estrato que lo consume (la aplicación
 * Hub) le entrega un `Arc<dyn RecordStore>` ya conectado y un
 * `Arc<AgentRpc>` ya configurado, y a cambio recibe un `SystemManager`
 * listo para `start()`.
 * =================================================================
 */

mod alert_engine;
mod docker_focus;
mod errors;
mod manager;
mod notifier;
mod smart;
mod system;

pub use alert_engine::AlertEngine;
pub use docker_focus::DockerFocusWatcher;
pub use errors::{EngineError, EngineResult};
pub use manager::SystemManager;
pub use notifier::Notifier;
pub use system::{SystemRuntime, SystemRuntimeHandles, DEFAULT_UPDATE_INTERVAL_MS, SSH_STARTUP_GRACE_MS};
