// [libs/domain/engine/src/manager.rs]
/*!
 * =================================================================
 * APARATO: SYSTEM MANAGER (C7)
 * CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
 * RESPONSABILIDAD: REGISTRO DE SYSTEMS, ARRANQUE ESCALONADO, ENRUTADO
 *                   DE CONEXIONES WS ENTRANTES, TICKS DE FLOTA (§4.1)
 *
 * Dueño exclusivo del registro `id -> System` (§3 "Lifecycle &
 * ownership"). Crea y cancela Systems, encamina los binds de WS
 * entrantes hacia su System, y conduce los ticks de nivel-Hub
 * (sondeo de API, barrido de Docker Focus, muestreo de progreso de
 * limpieza de datos) cada uno tras su propia puerta de un solo vuelo
 * (§5, §9).
 * =================================================================
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use aether_domain_models::System;
use aether_infra_store::RecordStore;
use aether_infra_transport::{AgentRpc, WsConn};

use crate::alert_engine::AlertEngine;
use crate::docker_focus::DockerFocusWatcher;
use crate::errors::{EngineError, EngineResult};
use crate::notifier::Notifier;
use crate::system::{startup_jitter, SystemRuntime, SystemRuntimeHandles, DEFAULT_UPDATE_INTERVAL_MS, SSH_STARTUP_GRACE_MS};

/// Cadencia de los ticks de nivel-Hub (sondeo de API, barrido de
/// Docker Focus, muestreo de limpieza de datos). Más fina que el
/// intervalo de actualización por System porque arbitra varios
/// Systems a la vez en lugar de esperar a uno solo.
const HUB_TICK_INTERVAL_MS: u64 = 15_000;

/// Entrada de registro: el runtime del System junto con el handle de
/// su tarea de actualización, necesario para cancelación ordenada.
struct ManagedSystem {
    runtime: Arc<SystemRuntime>,
    task: JoinHandle<()>,
}

/// Puerta de un solo vuelo para un tick de nivel-Hub (§5, §9): un CAS
/// sobre una bandera de 32 bits, no un mutex, porque la semántica
/// buscada es "omitir si ya está corriendo", no "encolar".
struct TickGate {
    busy: AtomicBool,
    last_error: RwLock<Option<String>>,
    next_run_at: RwLock<DateTime<Utc>>,
}

impl TickGate {
    fn new() -> Self {
        Self { busy: AtomicBool::new(false), last_error: RwLock::new(None), next_run_at: RwLock::new(Utc::now()) }
    }

    /// Ejecuta `body` si la puerta está libre; si no, registra
    /// `"already running"` y adelanta `next_run_at` de todas formas
    /// (§4.1: "Skipped ticks set last_error=... and advance next_run_at").
    async fn run_gated<F, Fut>(&self, label: &str, cadence: Duration, body: F)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        if self.busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            *self.last_error.write().await = Some("already running".to_string());
            *self.next_run_at.write().await = Utc::now() + chrono::Duration::milliseconds(cadence.as_millis() as i64);
            debug!(tick = label, "⏭️ [HUB_TICK]: skipped, previous run still in flight");
            return;
        }

        body().await;

        *self.last_error.write().await = None;
        *self.next_run_at.write().await = Utc::now() + chrono::Duration::milliseconds(cadence.as_millis() as i64);
        self.busy.store(false, Ordering::Release);
    }
}

/// Registro de Systems del Hub (C7). Único dueño de cada
/// `SystemRuntime`; todo consumidor externo (handlers HTTP, el puente
/// WS entrante) habla con este tipo, nunca directamente con un
/// `SystemRuntime` ajeno.
pub struct SystemManager {
    store: Arc<dyn RecordStore>,
    handles: Arc<SystemRuntimeHandles>,
    registry: RwLock<HashMap<String, ManagedSystem>>,
    removal_tx: mpsc::UnboundedSender<String>,
    removal_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    api_probe_gate: TickGate,
    docker_focus_gate: TickGate,
    data_cleanup_gate: TickGate,
    /// Retraso tras el arranque del Hub durante el que los intentos SSH
    /// se posponen, resuelto desde `HubConfig::ssh_initial_delay_ms`
    /// (§4.1); por defecto `SSH_STARTUP_GRACE_MS`.
    ssh_initial_delay_ms: i64,
}

impl SystemManager {
    pub fn new(store: Arc<dyn RecordStore>, rpc: Arc<AgentRpc>, notifier: Arc<Notifier>) -> Arc<Self> {
        Self::with_config(store, rpc, notifier, DEFAULT_UPDATE_INTERVAL_MS, SSH_STARTUP_GRACE_MS, true)
    }

    /// Variante que hidrata la cadencia del ticker, el retraso de
    /// arranque SSH y el interruptor de fetch SMART desde `HubConfig`
    /// (§3.1) en lugar de los valores por defecto del núcleo.
    pub fn with_config(
        store: Arc<dyn RecordStore>,
        rpc: Arc<AgentRpc>,
        notifier: Arc<Notifier>,
        update_interval_ms: u64,
        ssh_initial_delay_ms: i64,
        smart_fetch_enabled: bool,
    ) -> Arc<Self> {
        let alert_engine = Arc::new(AlertEngine::new(store.clone(), notifier.clone()));
        let docker_focus = Arc::new(DockerFocusWatcher::new(store.clone(), rpc.clone(), notifier.clone()));
        let (removal_tx, removal_rx) = mpsc::unbounded_channel();

        let handles = Arc::new(SystemRuntimeHandles {
            store: store.clone(),
            rpc,
            alert_engine,
            docker_focus,
            notifier,
            ssh_grace_until_ms: Arc::new(AtomicI64::new(0)),
            update_interval_ms,
            smart_fetch_enabled,
        });

        Arc::new(Self {
            store,
            handles,
            registry: RwLock::new(HashMap::new()),
            removal_tx,
            removal_rx: Mutex::new(Some(removal_rx)),
            api_probe_gate: TickGate::new(),
            docker_focus_gate: TickGate::new(),
            data_cleanup_gate: TickGate::new(),
            ssh_initial_delay_ms,
        })
    }

    pub fn notifier(&self) -> Arc<Notifier> {
        self.handles.notifier.clone()
    }

    /// `Start()` (§4.1): enumera los Systems existentes, instancia un
    /// `SystemRuntime` por registro, y escalona el arranque de sus
    /// updaters con jitter uniforme dentro del intervalo de
    /// actualización. Arma además la ventana de gracia SSH de ~60s y
    /// lanza la tarea que drena las auto-remociones de Systems
    /// pausados-y-desconectados (§4.2 "garbage collection").
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> EngineResult<()> {
        self.handles
            .ssh_grace_until_ms
            .store(Utc::now().timestamp_millis() + self.ssh_initial_delay_ms, Ordering::Relaxed);

        let records = self.store.list_systems().await?;
        info!(count = records.len(), "🚀 [MANAGER]: staggering updater start-up across the fleet");

        for record in records {
            self.add(record).await?;
        }

        self.spawn_self_removal_drain();
        self.spawn_hub_ticks();

        Ok(())
    }

    /// `Add(record)` (§4.1): crea el runtime, lo registra, y lanza su
    /// tarea de actualización con jitter de arranque propio.
    #[instrument(skip(self, record), fields(system = %record.id))]
    pub async fn add(self: &Arc<Self>, record: System) -> EngineResult<()> {
        let runtime = SystemRuntime::new(&record, self.removal_tx.clone());
        let jitter = startup_jitter(Duration::from_millis(self.handles.update_interval_ms));

        let task_runtime = runtime.clone();
        let task_handles = self.handles.clone();
        let task = tokio::spawn(async move { task_runtime.run(task_handles, jitter).await });

        let mut registry = self.registry.write().await;
        if let Some(previous) = registry.insert(record.id.clone(), ManagedSystem { runtime, task }) {
            previous.task.abort();
        }

        Ok(())
    }

    /// `Remove(id)` (§4.1): idempotente — cancela el contexto del
    /// System, espera su salida y libera el registro. Retirar un id
    /// desconocido es un no-op, no un error.
    #[instrument(skip(self))]
    pub async fn remove(self: &Arc<Self>, id: &str) {
        let removed = self.registry.write().await.remove(id);
        if let Some(managed) = removed {
            managed.runtime.cancel_token().cancel();
            let _ = managed.task.await;
            debug!(system = id, "🗑️ [MANAGER]: system removed and handles released");
        }
    }

    /// `BindWs(systemId, wsConn)` (§4.1): encamina una conexión WS
    /// entrante hacia su System. Si el System aún no existe en el
    /// registro (carrera entre el registro de un nuevo record y la
    /// llegada de su primera conexión), lo crea a partir del record ya
    /// persistido antes de adjuntar.
    #[instrument(skip(self, conn), fields(system = system_id))]
    pub async fn bind_ws(self: &Arc<Self>, system_id: &str, conn: WsConn) -> EngineResult<()> {
        {
            let registry = self.registry.read().await;
            if let Some(managed) = registry.get(system_id) {
                managed.runtime.attach_ws(conn).await;
                return Ok(());
            }
        }

        let record = self
            .store
            .find_system(system_id)
            .await?
            .ok_or_else(|| EngineError::SystemNotFound(system_id.to_string()))?;

        self.add(record).await?;

        let registry = self.registry.read().await;
        if let Some(managed) = registry.get(system_id) {
            managed.runtime.attach_ws(conn).await;
        }

        Ok(())
    }

    pub async fn set_paused(&self, system_id: &str, paused: bool) -> EngineResult<()> {
        let registry = self.registry.read().await;
        match registry.get(system_id) {
            Some(managed) => {
                managed.runtime.set_paused(paused).await;
                Ok(())
            }
            None => Err(EngineError::SystemNotFound(system_id.to_string())),
        }
    }

    pub async fn status_of(&self, system_id: &str) -> Option<aether_domain_models::SystemStatus> {
        let registry = self.registry.read().await;
        match registry.get(system_id) {
            Some(managed) => Some(managed.runtime.status().await),
            None => None,
        }
    }

    pub async fn registered_ids(&self) -> Vec<String> {
        self.registry.read().await.keys().cloned().collect()
    }

    /// Drena las solicitudes de auto-remoción emitidas por Systems
    /// pausados-y-desconectados (§4.2) y las aplica sobre el registro.
    /// Sólo la tarea lanzada por `start()` es un consumidor legítimo;
    /// llamar a `start()` dos veces sobre el mismo Manager es un error
    /// de uso, no algo contra lo que haya que defenderse en runtime.
    fn spawn_self_removal_drain(self: &Arc<Self>) {
        let this = self.clone();
        let taken = self.removal_rx.try_lock().ok().and_then(|mut guard| guard.take());

        let Some(mut rx) = taken else { return };

        tokio::spawn(async move {
            while let Some(id) = rx.recv().await {
                this.remove(&id).await;
            }
        });
    }

    /// Conduce los ticks de nivel-Hub (§4.1): sondeo de API, barrido de
    /// Docker Focus, muestreo de progreso de limpieza de datos. Cada
    /// uno corre tras su propia puerta de un solo vuelo.
    fn spawn_hub_ticks(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(HUB_TICK_INTERVAL_MS));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                this.run_hub_tick_round().await;
            }
        });
    }

    async fn run_hub_tick_round(self: &Arc<Self>) {
        let cadence = Duration::from_millis(HUB_TICK_INTERVAL_MS);

        // El sondeo de API y el muestreo de progreso de limpieza de
        // datos son responsabilidad de un estrato externo (§1 "Non-
        // goals"); el núcleo sólo es dueño del mecanismo de ticker y
        // de la puerta de un solo vuelo que los dispara cuando ese
        // estrato está presente.
        self.api_probe_gate.run_gated("api_probe_scheduler", cadence, || async {
            debug!("📡 [HUB_TICK]: api-probe scheduler tick (delegated to the external probe runner)");
        }).await;

        self.data_cleanup_gate.run_gated("data_cleanup_progress_sampler", cadence, || async {
            debug!("🧹 [HUB_TICK]: data-cleanup progress sampler tick (delegated to the external cleanup runner)");
        }).await;

        let this = self.clone();
        self.docker_focus_gate.run_gated("docker_focus_sweeper", cadence, move || {
            let this = this.clone();
            async move { this.sweep_all_docker_focus().await }
        }).await;
    }

    /// Barre Docker Focus (C9) para todo System no pausado del
    /// registro, usando el WS adjunto si lo hay (§4.5).
    async fn sweep_all_docker_focus(&self) {
        let systems: Vec<(String, Arc<SystemRuntime>)> = {
            let registry = self.registry.read().await;
            registry.iter().map(|(id, managed)| (id.clone(), managed.runtime.clone())).collect()
        };

        for (id, runtime) in systems {
            if runtime.status().await == aether_domain_models::SystemStatus::Paused {
                continue;
            }

            let record = match self.store.find_system(&id).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(system = %id, error = %e, "⚠️ [FOCUS_SWEEP]: could not load system record");
                    continue;
                }
            };

            let ws = runtime.current_ws().await;
            if let Err(e) = self.handles.docker_focus.sweep_system(&record, ws).await {
                warn!(system = %id, error = %e, "⚠️ [FOCUS_SWEEP]: hub-level sweep failed for this tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use aether_domain_models::{
        AlertRule, ContainerInfo, DockerFocusRule, FetchedSystemData, FocusAlertState, RegisteredContainerSnapshot,
        SmartDeviceRecord, SystemDetailsRecord, SystemStatsRecord, SystemStatus, SystemdServiceRecord,
    };
    use aether_infra_store::{PersistedSample, StoreResult};
    use aether_infra_transport::{SshCredential, SshDialer};
    use std::sync::Mutex as StdMutex;

    struct EmptyStore {
        systems: StdMutex<Vec<System>>,
    }

    #[async_trait]
    impl RecordStore for EmptyStore {
        async fn list_systems(&self) -> StoreResult<Vec<System>> {
            Ok(self.systems.lock().unwrap().clone())
        }
        async fn find_system(&self, id: &str) -> StoreResult<Option<System>> {
            Ok(self.systems.lock().unwrap().iter().find(|s| s.id == id).cloned())
        }
        async fn save_system(&self, system: &System) -> StoreResult<()> {
            let mut systems = self.systems.lock().unwrap();
            systems.retain(|s| s.id != system.id);
            systems.push(system.clone());
            Ok(())
        }
        async fn delete_system(&self, id: &str) -> StoreResult<()> {
            self.systems.lock().unwrap().retain(|s| s.id != id);
            Ok(())
        }
        async fn persist_sample(&self, system_id: &str, _data: &FetchedSystemData, now: DateTime<Utc>) -> StoreResult<PersistedSample> {
            let mut system = self.find_system(system_id).await?.expect("system must exist");
            system.status = SystemStatus::Up;
            system.updated = now;
            self.save_system(&system).await?;
            Ok(PersistedSample { system, sample_created: now })
        }
        async fn query_system_stats_window(&self, _: &str, _: &str, _: DateTime<Utc>) -> StoreResult<Vec<SystemStatsRecord>> {
            Ok(vec![])
        }
        async fn list_containers_for_system(&self, _: &str) -> StoreResult<Vec<ContainerInfo>> {
            Ok(vec![])
        }
        async fn upsert_containers(&self, _: &[RegisteredContainerSnapshot]) -> StoreResult<()> {
            Ok(())
        }
        async fn list_sampled_alert_rules(&self, _: &str) -> StoreResult<Vec<AlertRule>> {
            Ok(vec![])
        }
        async fn save_alert_rule(&self, _: &AlertRule) -> StoreResult<()> {
            Ok(())
        }
        async fn list_focus_rules_for_system(&self, _: &str) -> StoreResult<Vec<DockerFocusRule>> {
            Ok(vec![])
        }
        async fn get_focus_alert_state(&self, _: &str, _: &str) -> StoreResult<Option<FocusAlertState>> {
            Ok(None)
        }
        async fn save_focus_alert_state(&self, _: &FocusAlertState) -> StoreResult<()> {
            Ok(())
        }
        async fn purge_orphaned_focus_states(&self, _: &str, _: &[String]) -> StoreResult<()> {
            Ok(())
        }
        async fn list_smart_devices_for_system(&self, _: &str) -> StoreResult<Vec<SmartDeviceRecord>> {
            Ok(vec![])
        }
        async fn upsert_smart_devices(&self, _: &[SmartDeviceRecord]) -> StoreResult<()> {
            Ok(())
        }
        async fn purge_stale_smart_devices(&self, _: &str, _: &[String]) -> StoreResult<()> {
            Ok(())
        }
        async fn list_systemd_services_for_system(&self, _: &str) -> StoreResult<Vec<SystemdServiceRecord>> {
            Ok(vec![])
        }
        async fn find_system_details(&self, _: &str) -> StoreResult<Option<SystemDetailsRecord>> {
            Ok(None)
        }
    }

    fn test_rpc() -> Arc<AgentRpc> {
        let credential = SshCredential {
            username: "aether".into(),
            key_pair: Arc::new(russh_keys::key::KeyPair::generate_ed25519().expect("keygen")),
        };
        Arc::new(AgentRpc::new(SshDialer::new(credential)))
    }

    fn sample_system(id: &str) -> System {
        System {
            id: id.into(),
            name: "edge-01".into(),
            host: "10.0.0.5".into(),
            port: 45_876,
            status: SystemStatus::Pending,
            users: vec!["root".into()],
            info: Default::default(),
            updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn adding_a_system_registers_it_and_removal_is_idempotent() {
        let store: Arc<dyn RecordStore> = Arc::new(EmptyStore { systems: StdMutex::new(vec![sample_system("sys-1")]) });
        let manager = SystemManager::new(store, test_rpc(), Arc::new(Notifier::new()));

        manager.add(sample_system("sys-1")).await.expect("add should succeed");
        assert_eq!(manager.registered_ids().await, vec!["sys-1".to_string()]);

        manager.remove("sys-1").await;
        assert!(manager.registered_ids().await.is_empty());

        // Idempotente: remover de nuevo un id ya ausente no debe entrar en pánico.
        manager.remove("sys-1").await;
    }

    #[tokio::test]
    async fn pausing_an_unknown_system_surfaces_not_found() {
        let store: Arc<dyn RecordStore> = Arc::new(EmptyStore { systems: StdMutex::new(vec![]) });
        let manager = SystemManager::new(store, test_rpc(), Arc::new(Notifier::new()));

        let err = manager.set_paused("ghost", true).await.expect_err("unknown system must error");
        assert!(matches!(err, EngineError::SystemNotFound(_)));
    }
}
