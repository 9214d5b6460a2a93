// [libs/domain/engine/src/alert_engine.rs]
/*!
 * =================================================================
 * APARATO: MOTOR DE ALERTAS (C8)
 * CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
 * RESPONSABILIDAD: EVALUACIÓN DE REGLAS DE UMBRAL SOBRE MUESTRAS
 *                   INMEDIATAS Y VENTANAS DESLIZANTES
 *
 * CLASIFICACIÓN MATEMÁTICA (Prueba de Invariantes §8):
 *   - #3: min==1 produce exactamente un flip + una notificación.
 *   - #4: ventana ignora muestras con created - 10s < windowStart.
 *   - #5: Battery es la única métrica de comparación invertida.
 *   - #6: HandleSystemAlerts sobre un System sin reglas no escribe nada.
 *
 * La fórmula de densidad mínima (`ceil(min/1.2)`) y el divisor global
 * de Temperature/Disk en el promediado se conservan tal cual estaban
 * en la fuente original, ver DESIGN.md para la decisión registrada.
 * =================================================================
 */

use std::collections::HashMap;
use std::sync::Arc;

use aether_domain_models::{
    AlertMetric, AlertRule, FetchedSystemData, System, SystemStatsRecord, ThresholdAlertNotification,
};
use aether_infra_store::RecordStore;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument};

use crate::errors::EngineResult;
use crate::notifier::Notifier;

/// Colchón de lectura: la ventana pedida al store se amplía 90s hacia
/// atrás para absorber el jitter de escritura entre agentes (§4.4).
const WINDOW_READ_BUFFER_SECONDS: i64 = 90;

/// Guarda de jitter de escritura: una muestra sólo contribuye a una
/// regla si fue escrita al menos 10s después del inicio de su ventana.
const SAMPLE_WRITE_JITTER_SECONDS: i64 = 10;

const SAMPLE_TYPE_1M: &str = "1m";

/// Entrada ya resuelta a un valor numérico simple, o a un reductor por
/// clave (disco por filesystem, temperatura por sensor).
enum MetricSample {
    Simple(f64),
    /// Claves candidatas con su valor individual para esta muestra
    /// (ej.: filesystem -> % uso, sensor -> °C).
    Keyed(HashMap<String, f64>),
    /// La regla no aplica a esta muestra (ej.: temperatura <1 o batería
    /// en 0, que la fuente trata como lecturas ausentes).
    Absent,
}

pub struct AlertEngine {
    store: Arc<dyn RecordStore>,
    notifier: Arc<Notifier>,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Punto de entrada único del motor (§4.4). Lee todas las reglas no
    /// `Status`/`Smart` del System, decide para cada una si dispara,
    /// entra en evaluación ventaneada, resuelve o no hace nada.
    #[instrument(skip(self, system, data), fields(system = %system.id))]
    pub async fn handle_system_alerts(&self, system: &System, data: &FetchedSystemData) -> EngineResult<()> {
        let rules = self.store.list_sampled_alert_rules(&system.id).await?;
        let rules: Vec<AlertRule> = rules.into_iter().filter(|r| r.name.is_sampled_metric()).collect();

        if rules.is_empty() {
            // Invariante #6: ningún registro se escribe si no hay reglas.
            return Ok(());
        }

        let now = Utc::now();
        let (immediate, windowed): (Vec<_>, Vec<_>) = rules.into_iter().partition(|r| r.min == 1);

        for rule in immediate {
            self.evaluate_immediate(system, data, rule, now).await?;
        }

        if !windowed.is_empty() {
            self.evaluate_windowed(system, &windowed, now).await?;
        }

        Ok(())
    }

    async fn evaluate_immediate(
        &self,
        system: &System,
        data: &FetchedSystemData,
        mut rule: AlertRule,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let sample = immediate_value(rule.name, data);
        let value = match sample {
            MetricSample::Simple(v) => v,
            MetricSample::Keyed(by_key) => match reduce_max(&by_key) {
                Some((_, v)) => v,
                None => return Ok(()),
            },
            MetricSample::Absent => return Ok(()),
        };

        if rule.already_settled(value) {
            return Ok(());
        }

        let descriptor = sample_descriptor(rule.name, data);

        let should_trigger = !rule.triggered && rule.crosses_trigger(value);
        let should_resolve = rule.triggered && rule.crosses_resolve(value);

        if should_trigger || should_resolve {
            self.apply_transition(system, &mut rule, should_trigger, value, descriptor, 1, now).await?;
        }

        Ok(())
    }

    async fn evaluate_windowed(&self, system: &System, rules: &[AlertRule], now: DateTime<Utc>) -> EngineResult<()> {
        let oldest_window_minutes = rules.iter().map(|r| r.min).max().unwrap_or(1);
        let since = now
            - Duration::minutes(oldest_window_minutes as i64)
            - Duration::seconds(WINDOW_READ_BUFFER_SECONDS);

        let samples = self.store.query_system_stats_window(&system.id, SAMPLE_TYPE_1M, since).await?;
        let oldest_sample = samples.first().map(|s| s.created);

        for rule in rules {
            let mut rule = rule.clone();
            let window_start = now - Duration::minutes(rule.min as i64);

            // §4.4: sólo se evalúan reglas cuya ventana empieza después del
            // registro más antiguo disponible; de lo contrario la lectura es
            // corta y no representa la ventana completa pedida por la regla.
            let Some(oldest_sample) = oldest_sample else {
                continue;
            };
            if window_start < oldest_sample {
                continue;
            }

            let eligible: Vec<&SystemStatsRecord> = samples
                .iter()
                .filter(|s| s.created - Duration::seconds(SAMPLE_WRITE_JITTER_SECONDS) >= window_start)
                .collect();

            let global_count = eligible.len();
            if global_count < rule.minimum_sample_density() {
                // Densidad insuficiente: se salta en silencio (§4.4).
                continue;
            }

            let Some((value, descriptor)) = windowed_average(rule.name, &eligible, global_count) else {
                continue;
            };

            if rule.already_settled(value) {
                continue;
            }

            let should_trigger = !rule.triggered && rule.crosses_trigger(value);
            let should_resolve = rule.triggered && rule.crosses_resolve(value);

            if should_trigger || should_resolve {
                self.apply_transition(system, &mut rule, should_trigger, value, descriptor, rule.min, now).await?;
            }
        }

        Ok(())
    }

    async fn apply_transition(
        &self,
        system: &System,
        rule: &mut AlertRule,
        triggering: bool,
        value: f64,
        descriptor: Option<String>,
        duration_minutes: u8,
        _now: DateTime<Utc>,
    ) -> EngineResult<()> {
        rule.triggered = triggering;
        self.store.save_alert_rule(rule).await?;

        let state = if triggering {
            aether_domain_models::AlertTransitionState::Triggered
        } else {
            aether_domain_models::AlertTransitionState::Resolved
        };

        debug!(rule = %rule.id, metric = ?rule.name, %value, triggering, "⚡ [ALERT_ENGINE]: threshold transition");

        self.notifier.send(aether_domain_models::AetherEvent::ThresholdAlert(ThresholdAlertNotification {
            system_name: system.name.clone(),
            alert_type: metric_label(rule.name).to_string(),
            descriptor,
            state,
            current_value: value,
            threshold: rule.value,
            duration_minutes,
            details: None,
        }));

        Ok(())
    }
}

fn metric_label(metric: AlertMetric) -> &'static str {
    match metric {
        AlertMetric::Cpu => "CPU",
        AlertMetric::Memory => "Memory",
        AlertMetric::Bandwidth => "Bandwidth",
        AlertMetric::Disk => "Disk",
        AlertMetric::DiskIo => "DiskIO",
        AlertMetric::Temperature => "Temperature",
        AlertMetric::LoadAvg1 => "LoadAvg1",
        AlertMetric::LoadAvg5 => "LoadAvg5",
        AlertMetric::LoadAvg15 => "LoadAvg15",
        AlertMetric::Gpu => "GPU",
        AlertMetric::Battery => "Battery",
        AlertMetric::Status => "Status",
        AlertMetric::Smart => "SMART",
    }
}

/// Extrae el valor de una métrica de la muestra combinada más reciente
/// (§4.4 tabla de extracción).
fn immediate_value(metric: AlertMetric, data: &FetchedSystemData) -> MetricSample {
    match metric {
        AlertMetric::Cpu => MetricSample::Simple(data.info.cpu),
        AlertMetric::Memory => MetricSample::Simple(data.info.mem_pct),
        AlertMetric::Bandwidth => MetricSample::Simple(data.info.bandwidth),
        AlertMetric::Disk => {
            let mut by_key = HashMap::new();
            by_key.insert("root".to_string(), data.info.disk_pct);
            for (key, fs) in &data.stats.extra_fs {
                if fs.total > 0.0 {
                    by_key.insert(key.clone(), (fs.used / fs.total) * 100.0);
                }
            }
            MetricSample::Keyed(by_key)
        }
        AlertMetric::DiskIo => MetricSample::Simple(data.stats.disk_read_ps + data.stats.disk_write_ps),
        AlertMetric::Temperature => {
            // §4.4: el valor inmediato es sólo Info.DashboardTemp; la
            // reducción por sensor es exclusiva de la ventana (ver
            // `windowed_average`).
            if data.info.dashboard_temp < 1.0 {
                MetricSample::Absent
            } else {
                MetricSample::Simple(data.info.dashboard_temp)
            }
        }
        AlertMetric::LoadAvg1 => MetricSample::Simple(data.info.load_avg[0]),
        AlertMetric::LoadAvg5 => MetricSample::Simple(data.info.load_avg[1]),
        AlertMetric::LoadAvg15 => MetricSample::Simple(data.info.load_avg[2]),
        // §4.4: el valor inmediato es sólo Info.GpuPct; el máximo sobre
        // Stats.GPU[].Usage es exclusivo de la ventana.
        AlertMetric::Gpu => MetricSample::Simple(data.info.gpu_pct),
        AlertMetric::Battery => {
            if data.stats.battery[0] == 0.0 {
                MetricSample::Absent
            } else {
                MetricSample::Simple(data.stats.battery[0])
            }
        }
        AlertMetric::Status | AlertMetric::Smart => MetricSample::Absent,
    }
}

fn sample_descriptor(metric: AlertMetric, data: &FetchedSystemData) -> Option<String> {
    match metric {
        AlertMetric::Disk => {
            let mut by_key = HashMap::new();
            by_key.insert("root".to_string(), data.info.disk_pct);
            for (key, fs) in &data.stats.extra_fs {
                if fs.total > 0.0 {
                    by_key.insert(key.clone(), (fs.used / fs.total) * 100.0);
                }
            }
            reduce_max(&by_key).map(|(key, _)| format!("Usage of {key}"))
        }
        // Temperature's immediate value is the single dashboard reading
        // (no per-sensor reduction outside the windowed path, §4.4), so
        // there is no descriptor to attach here.
        _ => None,
    }
}

fn reduce_max(by_key: &HashMap<String, f64>) -> Option<(String, f64)> {
    by_key
        .iter()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, v)| (k.clone(), *v))
}

/// Promedia una métrica sobre la ventana elegible (§4.4). `global_count`
/// es el divisor para Temperature/Disk, tal como especifica la fuente:
/// la suma por clave se divide por el número *total* de muestras de la
/// ventana, no por cuántas muestras realmente reportaron esa clave.
fn windowed_average(
    metric: AlertMetric,
    eligible: &[&SystemStatsRecord],
    global_count: usize,
) -> Option<(f64, Option<String>)> {
    if global_count == 0 {
        return None;
    }
    let divisor = global_count as f64;

    match metric {
        AlertMetric::Cpu => Some((eligible.iter().map(|s| s.stats.cpu).sum::<f64>() / divisor, None)),
        AlertMetric::Memory => Some((eligible.iter().map(|s| s.stats.mem_pct).sum::<f64>() / divisor, None)),
        AlertMetric::Bandwidth => Some((eligible.iter().map(|s| s.stats.bandwidth).sum::<f64>() / divisor, None)),
        AlertMetric::DiskIo => {
            let sum: f64 = eligible.iter().map(|s| s.stats.disk_read_ps + s.stats.disk_write_ps).sum();
            Some((sum / divisor, None))
        }
        AlertMetric::LoadAvg1 => Some((eligible.iter().map(|s| s.stats.load_avg[0]).sum::<f64>() / divisor, None)),
        AlertMetric::LoadAvg5 => Some((eligible.iter().map(|s| s.stats.load_avg[1]).sum::<f64>() / divisor, None)),
        AlertMetric::LoadAvg15 => Some((eligible.iter().map(|s| s.stats.load_avg[2]).sum::<f64>() / divisor, None)),
        AlertMetric::Gpu => {
            let sum: f64 = eligible
                .iter()
                .map(|s| s.stats.gpu.iter().map(|g| g.usage).fold(0.0_f64, f64::max))
                .sum();
            Some((sum / divisor, None))
        }
        AlertMetric::Battery => Some((eligible.iter().map(|s| s.stats.battery[0]).sum::<f64>() / divisor, None)),
        AlertMetric::Disk => {
            let mut sums: HashMap<String, f64> = HashMap::new();
            sums.insert("root".to_string(), 0.0);
            for sample in eligible {
                *sums.entry("root".to_string()).or_insert(0.0) += sample.stats.disk_pct;
                for (key, fs) in &sample.stats.extra_fs {
                    if fs.total > 0.0 {
                        *sums.entry(key.clone()).or_insert(0.0) += (fs.used / fs.total) * 100.0;
                    }
                }
            }
            let averages: HashMap<String, f64> = sums.into_iter().map(|(k, v)| (k, v / divisor)).collect();
            reduce_max(&averages).map(|(key, value)| (value, Some(format!("Usage of {key}"))))
        }
        AlertMetric::Temperature => {
            let mut sums: HashMap<String, f64> = HashMap::new();
            for sample in eligible {
                if sample.stats.temperatures.is_empty() {
                    continue;
                }
                for (sensor, value) in &sample.stats.temperatures {
                    *sums.entry(sensor.clone()).or_insert(0.0) += value;
                }
            }
            if sums.is_empty() {
                return None;
            }
            let averages: HashMap<String, f64> = sums.into_iter().map(|(k, v)| (k, v / divisor)).collect();
            reduce_max(&averages).map(|(key, value)| (value, Some(format!("Highest sensor {key}"))))
        }
        AlertMetric::Status | AlertMetric::Smart => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_domain_models::{FilesystemUsage, SystemInfo, SystemStats, SystemStatus};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        rules: StdMutex<Vec<AlertRule>>,
        samples: StdMutex<Vec<SystemStatsRecord>>,
        saved: Mutex<Vec<AlertRule>>,
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn list_systems(&self) -> aether_infra_store::StoreResult<Vec<System>> {
            Ok(vec![])
        }
        async fn find_system(&self, _id: &str) -> aether_infra_store::StoreResult<Option<System>> {
            Ok(None)
        }
        async fn save_system(&self, _system: &System) -> aether_infra_store::StoreResult<()> {
            Ok(())
        }
        async fn delete_system(&self, _id: &str) -> aether_infra_store::StoreResult<()> {
            Ok(())
        }
        async fn persist_sample(
            &self,
            _system_id: &str,
            _data: &FetchedSystemData,
            _now: DateTime<Utc>,
        ) -> aether_infra_store::StoreResult<aether_infra_store::PersistedSample> {
            // Not exercised by the alert-engine suite: alerts are evaluated
            // against a `system` record handed in directly, never via a
            // round-trip through persistence.
            Ok(aether_infra_store::PersistedSample { system: sample_system(), sample_created: _now })
        }
        async fn query_system_stats_window(
            &self,
            _system_id: &str,
            _sample_type: &str,
            _since: DateTime<Utc>,
        ) -> aether_infra_store::StoreResult<Vec<SystemStatsRecord>> {
            Ok(self.samples.lock().unwrap().clone())
        }
        async fn list_containers_for_system(
            &self,
            _system_id: &str,
        ) -> aether_infra_store::StoreResult<Vec<aether_domain_models::ContainerInfo>> {
            Ok(vec![])
        }
        async fn upsert_containers(
            &self,
            _snapshots: &[aether_domain_models::RegisteredContainerSnapshot],
        ) -> aether_infra_store::StoreResult<()> {
            Ok(())
        }
        async fn list_sampled_alert_rules(&self, _system_id: &str) -> aether_infra_store::StoreResult<Vec<AlertRule>> {
            Ok(self.rules.lock().unwrap().clone())
        }
        async fn save_alert_rule(&self, rule: &AlertRule) -> aether_infra_store::StoreResult<()> {
            self.saved.lock().await.push(rule.clone());
            let mut rules = self.rules.lock().unwrap();
            if let Some(existing) = rules.iter_mut().find(|r| r.id == rule.id) {
                *existing = rule.clone();
            }
            Ok(())
        }
        async fn list_focus_rules_for_system(
            &self,
            _system_id: &str,
        ) -> aether_infra_store::StoreResult<Vec<aether_domain_models::DockerFocusRule>> {
            Ok(vec![])
        }
        async fn get_focus_alert_state(
            &self,
            _system_id: &str,
            _focus_rule_id: &str,
        ) -> aether_infra_store::StoreResult<Option<aether_domain_models::FocusAlertState>> {
            Ok(None)
        }
        async fn save_focus_alert_state(
            &self,
            _state: &aether_domain_models::FocusAlertState,
        ) -> aether_infra_store::StoreResult<()> {
            Ok(())
        }
        async fn purge_orphaned_focus_states(
            &self,
            _system_id: &str,
            _valid_rule_ids: &[String],
        ) -> aether_infra_store::StoreResult<()> {
            Ok(())
        }
        async fn list_smart_devices_for_system(
            &self,
            _system_id: &str,
        ) -> aether_infra_store::StoreResult<Vec<aether_domain_models::SmartDeviceRecord>> {
            Ok(vec![])
        }
        async fn upsert_smart_devices(
            &self,
            _devices: &[aether_domain_models::SmartDeviceRecord],
        ) -> aether_infra_store::StoreResult<()> {
            Ok(())
        }
        async fn purge_stale_smart_devices(
            &self,
            _system_id: &str,
            _valid_device_ids: &[String],
        ) -> aether_infra_store::StoreResult<()> {
            Ok(())
        }
        async fn list_systemd_services_for_system(
            &self,
            _system_id: &str,
        ) -> aether_infra_store::StoreResult<Vec<aether_domain_models::SystemdServiceRecord>> {
            Ok(vec![])
        }
        async fn find_system_details(
            &self,
            _system_id: &str,
        ) -> aether_infra_store::StoreResult<Option<aether_domain_models::SystemDetailsRecord>> {
            Ok(None)
        }
    }

    fn sample_system() -> System {
        System {
            id: "sys_1".into(),
            name: "edge-01".into(),
            host: "10.0.0.5".into(),
            port: 22,
            status: SystemStatus::Up,
            users: vec!["user_1".into()],
            info: SystemInfo::default(),
            updated: Utc::now(),
        }
    }

    fn rule(name: AlertMetric, value: f64, min: u8, triggered: bool) -> AlertRule {
        AlertRule { id: "rule_1".into(), system: "sys_1".into(), user: "user_1".into(), name, value, min, triggered }
    }

    // S1: immediate CPU alert.
    #[tokio::test]
    async fn immediate_cpu_alert_triggers_and_notifies() {
        let store = Arc::new(FakeStore::default());
        store.rules.lock().unwrap().push(rule(AlertMetric::Cpu, 80.0, 1, false));
        let notifier = Arc::new(Notifier::new());
        let mut rx = notifier.subscribe();
        let engine = AlertEngine::new(store.clone(), notifier);

        let mut data = FetchedSystemData::default();
        data.info.cpu = 90.0;

        engine.handle_system_alerts(&sample_system(), &data).await.unwrap();

        let saved = store.saved.lock().await;
        assert_eq!(saved.len(), 1);
        assert!(saved[0].triggered);
        drop(saved);

        let event = rx.recv().await.unwrap();
        match event {
            aether_domain_models::AetherEvent::ThresholdAlert(n) => {
                assert_eq!(n.alert_type, "CPU");
                assert_eq!(n.current_value, 90.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_rules_writes_nothing() {
        let store = Arc::new(FakeStore::default());
        let notifier = Arc::new(Notifier::new());
        let engine = AlertEngine::new(store.clone(), notifier);

        engine.handle_system_alerts(&sample_system(), &FetchedSystemData::default()).await.unwrap();

        assert!(store.saved.lock().await.is_empty());
    }

    // S3: low-alert battery.
    #[tokio::test]
    async fn battery_rule_inverts_and_skips_zero_reading() {
        let store = Arc::new(FakeStore::default());
        store.rules.lock().unwrap().push(rule(AlertMetric::Battery, 20.0, 1, false));
        let notifier = Arc::new(Notifier::new());
        let engine = AlertEngine::new(store.clone(), notifier);

        let mut data = FetchedSystemData::default();
        data.stats.battery = [15.0, 0.0, 0.0];
        engine.handle_system_alerts(&sample_system(), &data).await.unwrap();
        assert_eq!(store.saved.lock().await.len(), 1);
        assert!(store.saved.lock().await[0].triggered);

        store.saved.lock().await.clear();
        store.rules.lock().unwrap()[0].triggered = false;
        data.stats.battery = [0.0, 0.0, 0.0];
        engine.handle_system_alerts(&sample_system(), &data).await.unwrap();
        assert!(store.saved.lock().await.is_empty());
    }

    // S2: windowed DiskIO averaged trigger.
    #[tokio::test]
    async fn windowed_disk_io_triggers_on_sufficient_density() {
        let store = Arc::new(FakeStore::default());
        store.rules.lock().unwrap().push(rule(AlertMetric::DiskIo, 100.0, 2, false));
        let now = Utc::now();
        {
            let mut samples = store.samples.lock().unwrap();
            for offset in [180, 90, 60, 30] {
                let mut stats = SystemStats::default();
                stats.disk_read_ps = 60.0;
                stats.disk_write_ps = 70.0;
                samples.push(SystemStatsRecord {
                    system: "sys_1".into(),
                    sample_type: "1m".into(),
                    stats,
                    created: now - Duration::seconds(offset),
                });
            }
        }
        let notifier = Arc::new(Notifier::new());
        let engine = AlertEngine::new(store.clone(), notifier);

        engine.handle_system_alerts(&sample_system(), &FetchedSystemData::default()).await.unwrap();

        let saved = store.saved.lock().await;
        assert_eq!(saved.len(), 1);
        assert!(saved[0].triggered);
    }

    // S4: disk per-filesystem reduction.
    #[tokio::test]
    async fn disk_reduction_picks_max_filesystem_and_descriptor() {
        let store = Arc::new(FakeStore::default());
        store.rules.lock().unwrap().push(rule(AlertMetric::Disk, 90.0, 1, false));
        let notifier = Arc::new(Notifier::new());
        let mut rx = notifier.subscribe();
        let engine = AlertEngine::new(store.clone(), notifier);

        let mut data = FetchedSystemData::default();
        data.info.disk_pct = 10.0;
        data.stats.extra_fs.insert("sda1".into(), FilesystemUsage { used: 95.0, total: 100.0 });
        data.stats.extra_fs.insert("sdb1".into(), FilesystemUsage { used: 10.0, total: 100.0 });

        engine.handle_system_alerts(&sample_system(), &data).await.unwrap();

        let event = rx.recv().await.unwrap();
        match event {
            aether_domain_models::AetherEvent::ThresholdAlert(n) => {
                assert_eq!(n.descriptor.as_deref(), Some("Usage of sda1"));
                assert_eq!(n.current_value, 95.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
