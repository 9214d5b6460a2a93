// [libs/domain/engine/src/system.rs]
/*!
 * =================================================================
 * APARATO: SYSTEM UPDATER (C6)
 * CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
 * RESPONSABILIDAD: MÁQUINA DE ESTADOS Y LOOP DE ACTUALIZACIÓN POR
 *                   SYSTEM (§4.2): TICKER, TRANSPORTE, PERSISTENCIA,
 *                   INVOCACIÓN SÍNCRONA DEL MOTOR DE ALERTAS Y DEL
 *                   FOCUS WATCHER, FETCH SMART EN SEGUNDO PLANO
 *
 * Una instancia por System, poseída en exclusiva por su entrada en el
 * registro del Manager (C7, §3 "Lifecycle & ownership"). El ticker, el
 * contexto de cancelación y el handle WS/SSH actuales viven aquí; el
 * Manager sólo retiene una referencia de lectura para enrutar binds
 * entrantes y solicitudes de pausa/remoción.
 * =================================================================
 */

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use aether_domain_models::{
    AetherEvent, AgentResponsePayload, RequestPayload, RpcAction, System, SystemStatus,
};
use aether_infra_store::RecordStore;
use aether_infra_transport::{AgentRpc, SystemEndpoint, WsConn};

use crate::alert_engine::AlertEngine;
use crate::docker_focus::DockerFocusWatcher;
use crate::notifier::Notifier;
use crate::smart;

/// Intervalo de actualización por defecto, constante de proceso (§4.2).
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 60_000;

/// Ventana de gracia tras el arranque del Hub durante la que los
/// intentos SSH se posponen para dar tiempo a que el WS llegue primero
/// (§4.1). Durante esta ventana, un System sin WS adjunto simplemente
/// salta el tick en lugar de marcar un fallo de transporte.
pub const SSH_STARTUP_GRACE_MS: i64 = 60_000;

/// Intervalo SMART asumido cuando el agente nunca reportó uno propio
/// en `SystemDetails.smart_interval_minutes` (§4.6).
const DEFAULT_SMART_INTERVAL_MINUTES: i64 = 60;

/// Colaboradores compartidos entre todos los Systems del Manager. Se
/// agrupan para no tener que pasar cinco `Arc` sueltos a cada tarea.
pub struct SystemRuntimeHandles {
    pub store: Arc<dyn RecordStore>,
    pub rpc: Arc<AgentRpc>,
    pub alert_engine: Arc<AlertEngine>,
    pub docker_focus: Arc<DockerFocusWatcher>,
    pub notifier: Arc<Notifier>,
    /// Instante (epoch ms) antes del cual un System sin WS adjunto no
    /// intenta SSH (§4.1). `0` significa "sin gracia activa".
    pub ssh_grace_until_ms: Arc<AtomicI64>,
    /// Cadencia del ticker de actualización, resuelta desde
    /// `HubConfig::update_interval_ms` (§3.1); por defecto
    /// `DEFAULT_UPDATE_INTERVAL_MS`.
    pub update_interval_ms: u64,
    /// Interruptor de proceso para el fetch SMART en segundo plano
    /// (§4.2 paso 6: "If background-SMART fetch is enabled..."). Con
    /// `false`, `maybe_spawn_smart_fetch` nunca dispara la tarea,
    /// independientemente de cuánto tiempo haya pasado desde el
    /// último fetch.
    pub smart_fetch_enabled: bool,
}

/// El par `WsConn` + su señal de caída, tomada una sola vez en el
/// momento del bind para que el loop pueda esperarla sin volver a
/// pedirla (`WsConn::take_down_signal` sólo entrega una vez).
struct WsSlot {
    conn: WsConn,
    down: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
}

/// Supervisor de un único System remoto (§4.2). Posee en exclusiva su
/// ticker, su handle de transporte y sus banderas de concurrencia; el
/// resto del núcleo sólo lo consulta a través de los métodos públicos.
pub struct SystemRuntime {
    pub id: String,
    endpoint: RwLock<SystemEndpoint>,
    status: RwLock<SystemStatus>,
    ws: RwLock<Option<Arc<WsSlot>>>,
    smart_fetching: AtomicBool,
    last_smart_fetch_ms: AtomicI64,
    smart_interval_minutes: AtomicI64,
    cancel: CancellationToken,
    /// Usado por `handle_paused` para pedirle al Manager que lo retire
    /// del registro cuando un System pausado pierde su WS (§4.2).
    self_remove: mpsc::UnboundedSender<String>,
}

impl SystemRuntime {
    pub fn new(record: &System, self_remove: mpsc::UnboundedSender<String>) -> Arc<Self> {
        Arc::new(Self {
            id: record.id.clone(),
            endpoint: RwLock::new(SystemEndpoint { host: record.host.clone(), port: record.port }),
            status: RwLock::new(record.status),
            ws: RwLock::new(None),
            smart_fetching: AtomicBool::new(false),
            last_smart_fetch_ms: AtomicI64::new(0),
            smart_interval_minutes: AtomicI64::new(DEFAULT_SMART_INTERVAL_MINUTES),
            cancel: CancellationToken::new(),
            self_remove,
        })
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn status(&self) -> SystemStatus {
        *self.status.read().await
    }

    /// Acción de pausa/reanudación iniciada por un actor externo (fuera
    /// de este núcleo: un handler HTTP resolviendo la orden de un
    /// usuario). El loop del updater sólo consulta el valor, nunca lo
    /// decide (§4.2: `* -> paused` es "user-initiated").
    pub async fn set_paused(&self, paused: bool) {
        let mut status = self.status.write().await;
        *status = if paused { SystemStatus::Paused } else { SystemStatus::Pending };
    }

    /// Adjunta una conexión WS entrante, reemplazando (y por tanto
    /// cerrando) cualquier conexión previa (§4.1 `BindWs`).
    pub async fn attach_ws(&self, conn: WsConn) {
        let down = conn.take_down_signal().await;
        let slot = Arc::new(WsSlot { conn, down: tokio::sync::Mutex::new(down) });
        *self.ws.write().await = Some(slot);
    }

    pub async fn current_ws(&self) -> Option<WsConn> {
        self.ws.read().await.as_ref().map(|slot| slot.conn.clone())
    }

    async fn endpoint(&self) -> SystemEndpoint {
        self.endpoint.read().await.clone()
    }

    pub async fn update_endpoint(&self, host: String, port: u16) {
        *self.endpoint.write().await = SystemEndpoint { host, port };
    }

    /// El loop de actualización completo del System (§4.2). Se corre
    /// como una única tarea de Tokio por System; `initial_jitter`
    /// disuelve el arranque simultáneo de toda la flota (§4.1, §9).
    #[instrument(skip(self, handles, initial_jitter), fields(system = %self.id))]
    pub async fn run(self: Arc<Self>, handles: Arc<SystemRuntimeHandles>, initial_jitter: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(initial_jitter) => {}
            _ = self.cancel.cancelled() => return,
        }

        let mut ticker = tokio::time::interval(Duration::from_millis(handles.update_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut first_run = true;
        let mut ws_down_pending = false;

        loop {
            let down_signal = self.wait_for_ws_down();

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(system = %self.id, "🛑 [SYSTEM]: updater cancelled, releasing transport handles");
                    *self.ws.write().await = None;
                    return;
                }
                fired = down_signal => {
                    if fired {
                        debug!(system = %self.id, "🔌 [SYSTEM]: websocket reported down, dropping handle");
                        *self.ws.write().await = None;
                        ws_down_pending = true;
                    }
                }
                _ = ticker.tick() => {
                    if ws_down_pending {
                        // Ventana de gracia: si nadie volvió a adjuntar un WS
                        // desde la caída, el siguiente tick es quien marca
                        // el System como down (Open Question §9: se fija
                        // explícitamente la ventana en "el siguiente tick").
                        if self.current_ws().await.is_none() {
                            self.set_down(&handles, Some("websocket connection closed")).await;
                        }
                        ws_down_pending = false;
                    }

                    if self.tick(&handles, &mut first_run).await {
                        return;
                    }
                }
            }
        }
    }

    /// Espera la señal de caída del WS actualmente adjunto, si existe.
    /// Se reconstruye en cada vuelta del `select!`; una vez consumida
    /// (por `take()`), las vueltas siguientes ven `None` y quedan
    /// pendientes para siempre en esta rama, lo que es correcto: la
    /// señal es de un solo uso por `WsConn` (§4.3).
    async fn wait_for_ws_down(&self) -> bool {
        let slot = self.ws.read().await.clone();
        match slot {
            Some(slot) => {
                let mut down_guard = slot.down.lock().await;
                match down_guard.take() {
                    Some(rx) => {
                        drop(down_guard);
                        let _ = rx.await;
                        true
                    }
                    None => std::future::pending::<bool>().await,
                }
            }
            None => std::future::pending::<bool>().await,
        }
    }

    /// Un único tick del loop (§4.2, pasos 1-6). Devuelve `true` cuando
    /// el System debe auto-eliminarse (GC de pausado+desconectado).
    async fn tick(&self, handles: &Arc<SystemRuntimeHandles>, first_run: &mut bool) -> bool {
        if self.status().await == SystemStatus::Paused {
            return self.handle_paused(handles).await;
        }

        let include_details = *first_run;
        *first_run = false;

        let endpoint = self.endpoint().await;
        let ws = self.current_ws().await;

        if ws.is_none() && !self.ssh_attempts_allowed(handles) {
            debug!(system = %self.id, "⏳ [SYSTEM]: ssh start-up grace still active, skipping tick without a websocket");
            return false;
        }

        let request = RequestPayload::GetData { cache_time_ms: handles.update_interval_ms, include_details };
        let payload = match handles.rpc.call(&endpoint, ws.as_ref(), RpcAction::GetData, request).await {
            Ok(payload) => payload,
            Err(e) => {
                self.set_down(handles, Some(&e)).await;
                return false;
            }
        };

        let data = match payload {
            AgentResponsePayload::SystemData(data) => data,
            _ => {
                self.set_down(handles, Some("agent replied with a payload shape other than SystemData")).await;
                return false;
            }
        };

        let persisted = match handles.store.persist_sample(&self.id, &data, Utc::now()).await {
            Ok(persisted) => persisted,
            Err(e) => {
                self.set_down(handles, Some(&e)).await;
                return false;
            }
        };

        *self.status.write().await = SystemStatus::Up;
        handles.notifier.send(AetherEvent::SystemStatusChanged { system: self.id.clone(), status: SystemStatus::Up });

        // §4.2 paso 5: fallos del motor de alertas se registran pero
        // nunca voltean el estado del System (fallo de alerta != fallo de fetch).
        if let Err(e) = handles.alert_engine.handle_system_alerts(&persisted.system, &data).await {
            warn!(system = %self.id, error = %e, "⚠️ [ALERT_ENGINE]: evaluation failed, leaving rule state unchanged");
        }

        if !data.containers.is_empty() {
            if let Err(e) = handles.docker_focus.sweep_system(&persisted.system, ws.clone()).await {
                warn!(system = %self.id, error = %e, "⚠️ [FOCUS_WATCHER]: sweep failed for this tick");
            }
        }

        if let Some(minutes) = data.details.as_ref().and_then(|d| d.smart_interval_minutes) {
            self.smart_interval_minutes.store(minutes as i64, Ordering::Relaxed);
        }

        self.maybe_spawn_smart_fetch(handles, persisted.system, ws);

        false
    }

    fn ssh_attempts_allowed(&self, handles: &Arc<SystemRuntimeHandles>) -> bool {
        let grace_until = handles.ssh_grace_until_ms.load(Ordering::Relaxed);
        grace_until == 0 || Utc::now().timestamp_millis() >= grace_until
    }

    /// `setDown(err)` (§4.2): marca el System `down` en memoria y en el
    /// registro persistido, y emite la transición sobre el notificador.
    async fn set_down(&self, handles: &Arc<SystemRuntimeHandles>, reason: Option<&dyn std::fmt::Display>) {
        if let Some(reason) = reason {
            warn!(system = %self.id, %reason, "📉 [SYSTEM]: marking system down");
        }

        *self.status.write().await = SystemStatus::Down;

        if let Ok(Some(mut record)) = handles.store.find_system(&self.id).await {
            record.status = SystemStatus::Down;
            record.updated = Utc::now();
            let _ = handles.store.save_system(&record).await;
        }

        handles.notifier.send(AetherEvent::SystemStatusChanged { system: self.id.clone(), status: SystemStatus::Down });
    }

    /// §4.2 "* -> paused": mientras está pausado el loop sólo envía un
    /// ping por tick si hay WS (removiendo el System si ese ping
    /// falla); si no hay WS, el System se recolecta a sí mismo.
    async fn handle_paused(&self, handles: &Arc<SystemRuntimeHandles>) -> bool {
        match self.current_ws().await {
            Some(ws) => {
                let endpoint = self.endpoint().await;
                match handles.rpc.call(&endpoint, Some(&ws), RpcAction::CheckFingerprint, RequestPayload::None).await {
                    Ok(_) => false,
                    Err(e) => {
                        warn!(system = %self.id, error = %e, "💀 [SYSTEM]: paused ping failed, self-removing");
                        let _ = self.self_remove.send(self.id.clone());
                        true
                    }
                }
            }
            None => {
                debug!(system = %self.id, "🗑️ [SYSTEM]: paused and disconnected, garbage-collecting");
                let _ = self.self_remove.send(self.id.clone());
                true
            }
        }
    }

    /// §4.2 paso 6 / §4.6: dispara el fetch SMART en segundo plano
    /// detrás de la puerta CAS de un solo vuelo. Un System sólo puede
    /// tener un fetch SMART en curso a la vez.
    fn maybe_spawn_smart_fetch(self: &Arc<Self>, handles: &Arc<SystemRuntimeHandles>, system: System, ws: Option<WsConn>) {
        if !handles.smart_fetch_enabled {
            return;
        }

        let interval_ms = self.smart_interval_minutes.load(Ordering::Relaxed).max(1) * 60_000;
        let now_ms = Utc::now().timestamp_millis();
        let last = self.last_smart_fetch_ms.load(Ordering::Relaxed);

        if now_ms - last < interval_ms {
            return;
        }

        if self.smart_fetching.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return;
        }

        self.last_smart_fetch_ms.store(now_ms, Ordering::Relaxed);

        let this = Arc::clone(self);
        let handles = Arc::clone(handles);

        tokio::spawn(async move {
            if let Err(e) = smart::fetch_smart_devices(&handles.store, &handles.rpc, &handles.notifier, &system, ws.as_ref()).await {
                warn!(system = %system.id, error = %e, "⚠️ [SMART]: background fetch failed, leaving rows unchanged");
            }
            this.smart_fetching.store(false, Ordering::Release);
        });
    }
}

/// Jitter uniforme en `[0, interval)`, distinto por System, usado al
/// arrancar la flota para evitar el "thundering herd" (§4.1, §9).
pub fn startup_jitter(interval: Duration) -> Duration {
    let millis = interval.as_millis().max(1) as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_jitter_stays_within_interval() {
        let interval = Duration::from_millis(60_000);
        for _ in 0..50 {
            let jitter = startup_jitter(interval);
            assert!(jitter < interval);
        }
    }
}
