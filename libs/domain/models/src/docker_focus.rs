//! Reglas de foco Docker y el estado de alerta derivado de ellas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::system::ContainerInfo;

/// Tipo de predicado que una regla de foco aplica contra el inventario
/// de contenedores vivo. Conjunto cerrado; cualquier otro valor no
/// hace match con nada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMatchType {
    ContainerName,
    Image,
    ComposeProject,
    ComposeService,
    Label,
    #[serde(other)]
    Unknown,
}

/// Regla de foco definida por el usuario sobre un System.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerFocusRule {
    pub id: String,
    pub system: String,
    pub match_type: FocusMatchType,
    pub value: String,
    pub value2: Option<String>,
    pub description: Option<String>,
}

impl DockerFocusRule {
    /// Evalúa la regla contra un contenedor concreto.
    pub fn matches(&self, container: &ContainerInfo) -> bool {
        match self.match_type {
            FocusMatchType::ContainerName => container.name == self.value,
            FocusMatchType::Image => container.image == self.value,
            FocusMatchType::ComposeProject => {
                container
                    .labels
                    .get("com.docker.compose.project")
                    .map(|v| v == &self.value)
                    .unwrap_or_else(|| container.created_by.as_deref() == Some(self.value.as_str()))
            }
            FocusMatchType::ComposeService => {
                let project_matches = container
                    .labels
                    .get("com.docker.compose.project")
                    .map(|v| v == &self.value)
                    .unwrap_or(false);
                let service_matches = self
                    .value2
                    .as_ref()
                    .and_then(|expected| container.labels.get("com.docker.compose.service").map(|v| v == expected))
                    .unwrap_or(false);
                project_matches && service_matches
            }
            FocusMatchType::Label => self
                .value2
                .as_ref()
                .map(|expected| container.labels.get(&self.value).map(|v| v == expected).unwrap_or(false))
                .unwrap_or(false),
            FocusMatchType::Unknown => false,
        }
    }
}

/// Resultado de aplicar una regla contra el inventario actual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusMatchCounts {
    pub running: u32,
    pub total: u32,
}

impl FocusMatchCounts {
    /// Una regla está "en problemas" si no matchea nada, o si algún
    /// contenedor que matchea no está corriendo.
    pub fn is_in_trouble(self) -> bool {
        self.total == 0 || self.running < self.total
    }
}

/// Estado persistido de alerta de foco para el par (system, regla).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusAlertState {
    pub system: String,
    pub focus_rule: String,
    pub triggered: bool,
    pub running_count: u32,
    pub total_count: u32,
    pub recovery_since: Option<DateTime<Utc>>,
}

/// Ventana de debounce entre la primera observación sana y la emisión
/// de "resolved" para una regla de foco.
pub const FOCUS_RECOVERY_DEBOUNCE_SECONDS: i64 = 15;

/// Snapshot de un contenedor registrado, upserted en bloque por
/// muestra (espejo de `ContainerInfo` con su clave de fila).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredContainerSnapshot {
    pub system: String,
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub uptime: i64,
    pub cpu: f64,
    pub memory: f64,
    pub net: f64,
    pub updated: DateTime<Utc>,
}

/// Construye el mapa `regla -> conteos` para un inventario completo de
/// contenedores en una sola pasada por regla.
pub fn count_matches(rule: &DockerFocusRule, containers: &[ContainerInfo]) -> FocusMatchCounts {
    let mut running = 0u32;
    let mut total = 0u32;
    for container in containers {
        if rule.matches(container) {
            total += 1;
            if container.status == "running" {
                running += 1;
            }
        }
    }
    FocusMatchCounts { running, total }
}

/// Reconstruye las etiquetas esperadas de un contenedor ficticio, usado
/// únicamente por las pruebas de este módulo.
#[cfg(test)]
fn test_container(name: &str, labels: &[(&str, &str)], status: &str) -> ContainerInfo {
    ContainerInfo {
        id: format!("c_{name}"),
        name: name.to_string(),
        image: "app:latest".into(),
        status: status.into(),
        uptime: 10,
        cpu: 1.0,
        memory: 1.0,
        net: 1.0,
        labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<HashMap<_, _>>(),
        created_by: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_service_requires_both_labels() {
        let rule = DockerFocusRule {
            id: "r1".into(),
            system: "sys_1".into(),
            match_type: FocusMatchType::ComposeService,
            value: "web".into(),
            value2: Some("api".into()),
            description: None,
        };

        let matching = test_container(
            "web_api_1",
            &[("com.docker.compose.project", "web"), ("com.docker.compose.service", "api")],
            "running",
        );
        let wrong_service = test_container(
            "web_db_1",
            &[("com.docker.compose.project", "web"), ("com.docker.compose.service", "db")],
            "running",
        );

        assert!(rule.matches(&matching));
        assert!(!rule.matches(&wrong_service));
    }

    #[test]
    fn empty_match_is_in_trouble() {
        let counts = FocusMatchCounts { running: 0, total: 0 };
        assert!(counts.is_in_trouble());
    }

    #[test]
    fn partial_running_is_in_trouble() {
        let counts = FocusMatchCounts { running: 1, total: 2 };
        assert!(counts.is_in_trouble());
        let all_up = FocusMatchCounts { running: 2, total: 2 };
        assert!(!all_up.is_in_trouble());
    }

    #[test]
    fn count_matches_tallies_running_vs_total() {
        let rule = DockerFocusRule {
            id: "r1".into(),
            system: "sys_1".into(),
            match_type: FocusMatchType::ComposeService,
            value: "web".into(),
            value2: Some("api".into()),
            description: None,
        };
        let containers = vec![
            test_container(
                "web_api_1",
                &[("com.docker.compose.project", "web"), ("com.docker.compose.service", "api")],
                "running",
            ),
            test_container(
                "web_api_2",
                &[("com.docker.compose.project", "web"), ("com.docker.compose.service", "api")],
                "exited",
            ),
        ];
        let counts = count_matches(&rule, &containers);
        assert_eq!(counts, FocusMatchCounts { running: 1, total: 2 });
    }
}
