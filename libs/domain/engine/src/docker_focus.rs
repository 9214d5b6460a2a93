// [libs/domain/engine/src/docker_focus.rs]
/*!
 * =================================================================
 * APARATO: DOCKER FOCUS WATCHER (C9)
 * CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
 * RESPONSABILIDAD: ALERTAS DE VIVACIDAD DE CONTENEDORES CONTRA REGLAS
 *                   DE FOCO DEFINIDAS POR EL USUARIO, CON DEBOUNCE
 *
 * Un sweep completo por System: limpia estados huérfanos, pide el
 * inventario vivo vía RPC, cuenta matches por regla y aplica la
 * máquina de estados de recuperación de §4.5 (invariantes #7/#8).
 * =================================================================
 */

use std::sync::Arc;

use aether_domain_models::{
    count_matches, AetherEvent, AlertTransitionState, ContainerInfo, DockerFocusRule, FocusAlertState, RpcAction,
    System,
};
use aether_infra_store::RecordStore;
use aether_infra_transport::{AgentRpc, SystemEndpoint, WsConn};
use chrono::{Duration, Utc};
use tracing::{debug, instrument};

use crate::errors::{EngineError, EngineResult};
use crate::notifier::Notifier;

pub struct DockerFocusWatcher {
    store: Arc<dyn RecordStore>,
    rpc: Arc<AgentRpc>,
    notifier: Arc<Notifier>,
}

impl DockerFocusWatcher {
    pub fn new(store: Arc<dyn RecordStore>, rpc: Arc<AgentRpc>, notifier: Arc<Notifier>) -> Self {
        Self { store, rpc, notifier }
    }

    /// Barre un único System: si no tiene reglas de foco, no hace nada
    /// (ni siquiera pide el inventario vía RPC).
    #[instrument(skip(self, system, ws), fields(system = %system.id))]
    pub async fn sweep_system(&self, system: &System, ws: Option<WsConn>) -> EngineResult<()> {
        let rules = self.store.list_focus_rules_for_system(&system.id).await?;
        if rules.is_empty() {
            return Ok(());
        }

        let valid_ids: Vec<String> = rules.iter().map(|r| r.id.clone()).collect();
        self.store.purge_orphaned_focus_states(&system.id, &valid_ids).await?;

        let endpoint = SystemEndpoint { host: system.host.clone(), port: system.port };
        let payload = self
            .rpc
            .call(&endpoint, ws.as_ref(), RpcAction::ListDockerContainers, aether_domain_models::RequestPayload::None)
            .await?;
        let containers = match payload {
            aether_domain_models::AgentResponsePayload::Containers(containers) => containers,
            other => {
                return Err(EngineError::UnexpectedPayload(payload_kind(&other)));
            }
        };

        for rule in &rules {
            self.evaluate_rule(system, rule, &containers).await?;
        }

        Ok(())
    }

    async fn evaluate_rule(
        &self,
        system: &System,
        rule: &DockerFocusRule,
        containers: &[ContainerInfo],
    ) -> EngineResult<()> {
        let counts = count_matches(rule, containers);
        let previous = self.store.get_focus_alert_state(&system.id, &rule.id).await?;
        let now = Utc::now();

        let mut state = previous.unwrap_or_else(|| FocusAlertState {
            system: system.id.clone(),
            focus_rule: rule.id.clone(),
            triggered: false,
            running_count: 0,
            total_count: 0,
            recovery_since: None,
        });

        let in_trouble = counts.is_in_trouble();
        let mut emit: Option<AlertTransitionState> = None;

        if !state.triggered && in_trouble {
            state.triggered = true;
            state.recovery_since = None;
            emit = Some(AlertTransitionState::Triggered);
        } else if state.triggered && !in_trouble {
            match state.recovery_since {
                None => {
                    state.recovery_since = Some(now);
                }
                Some(since) if now - since >= Duration::seconds(aether_domain_models::FOCUS_RECOVERY_DEBOUNCE_SECONDS) => {
                    state.triggered = false;
                    state.recovery_since = None;
                    emit = Some(AlertTransitionState::Resolved);
                }
                Some(_) => {}
            }
        } else if state.triggered && in_trouble {
            state.recovery_since = None;
        }

        state.running_count = counts.running;
        state.total_count = counts.total;

        self.store.save_focus_alert_state(&state).await?;

        if let Some(transition) = emit {
            debug!(rule = %rule.id, ?transition, running = counts.running, total = counts.total, "🐳 [FOCUS_WATCHER]: transition");
            self.notifier.send(AetherEvent::FocusAlert {
                system: system.name.clone(),
                focus_rule: rule.id.clone(),
                state: transition,
                running_count: counts.running,
                total_count: counts.total,
            });
        }

        Ok(())
    }
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
    use super::*;
    use aether_domain_models::FocusMatchType;
    use std::collections::HashMap as StdHashMap;

    fn container(name: &str, project: &str, service: &str, status: &str) -> ContainerInfo {
        let mut labels = StdHashMap::new();
        labels.insert("com.docker.compose.project".to_string(), project.to_string());
        labels.insert("com.docker.compose.service".to_string(), service.to_string());
        ContainerInfo {
            id: format!("c_{name}"),
            name: name.into(),
            image: "app:latest".into(),
            status: status.into(),
            uptime: 10,
            cpu: 1.0,
            memory: 1.0,
            net: 1.0,
            labels,
            created_by: None,
        }
    }

    fn rule() -> DockerFocusRule {
        DockerFocusRule {
            id: "rule_1".into(),
            system: "sys_1".into(),
            match_type: FocusMatchType::ComposeService,
            value: "web".into(),
            value2: Some("api".into()),
            description: None,
        }
    }

    // S5: focus rule compose-service, partial running then recovered.
    #[test]
    fn partial_running_is_in_trouble_and_recovery_requires_debounce() {
        let containers = vec![
            container("web_api_1", "web", "api", "running"),
            container("web_api_2", "web", "api", "exited"),
        ];
        let counts = count_matches(&rule(), &containers);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.total, 2);
        assert!(counts.is_in_trouble());

        let healthy = vec![
            container("web_api_1", "web", "api", "running"),
            container("web_api_2", "web", "api", "running"),
        ];
        let healthy_counts = count_matches(&rule(), &healthy);
        assert!(!healthy_counts.is_in_trouble());
    }
}
