//! Reglas de alerta definidas por el usuario y el conjunto cerrado de
//! métricas que el motor de alertas sabe evaluar.

use serde::{Deserialize, Serialize};

/// Familia de métrica de una regla de alerta. Conjunto cerrado: nada
/// fuera de esta lista puede ser nombre de una regla persistida.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertMetric {
    Cpu,
    Memory,
    Bandwidth,
    Disk,
    DiskIo,
    Temperature,
    LoadAvg1,
    LoadAvg5,
    LoadAvg15,
    Gpu,
    /// Única métrica de alerta baja: dispara cuando el valor cae por
    /// debajo del umbral en lugar de por encima.
    Battery,
    Status,
    Smart,
}

impl AlertMetric {
    /// Sólo `Battery` se evalúa con comparación invertida.
    pub fn is_low_alert(self) -> bool {
        matches!(self, AlertMetric::Battery)
    }

    /// `Status` y `Smart` tienen su propio camino de evaluación y nunca
    /// pasan por el ciclo de muestreo genérico del motor de alertas.
    pub fn is_sampled_metric(self) -> bool {
        !matches!(self, AlertMetric::Status | AlertMetric::Smart)
    }
}

/// Regla de alerta definida por un usuario sobre un System concreto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub system: String,
    pub user: String,
    pub name: AlertMetric,
    pub value: f64,
    /// Ventana en minutos. `1` implica evaluación inmediata (sin
    /// promediado); invariante: `min >= 1`.
    pub min: u8,
    pub triggered: bool,
}

impl AlertRule {
    /// Decide si la lectura actual cruza el umbral en la dirección que
    /// dispara la regla, respetando la inversión de Battery.
    pub fn crosses_trigger(&self, value: f64) -> bool {
        if self.name.is_low_alert() {
            value < self.value
        } else {
            value > self.value
        }
    }

    /// Decide si la lectura actual está del lado "resuelto" del umbral.
    pub fn crosses_resolve(&self, value: f64) -> bool {
        if self.name.is_low_alert() {
            value >= self.value
        } else {
            value <= self.value
        }
    }

    /// Filtro de paso temprano: si el estado actual ya concuerda con la
    /// lectura presente, no hay nada que evaluar en esta muestra.
    pub fn already_settled(&self, value: f64) -> bool {
        (self.triggered && self.crosses_trigger(value)) || (!self.triggered && self.crosses_resolve(value))
    }

    /// La densidad mínima de muestras que deben contribuir a la ventana
    /// para que la evaluación promediada sea válida. La fórmula se
    /// conserva tal cual, incluyendo su redondeo hacia arriba no trivial.
    pub fn minimum_sample_density(&self) -> usize {
        ((self.min as f64) / 1.2).ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: AlertMetric, value: f64, triggered: bool) -> AlertRule {
        AlertRule {
            id: "rule_1".into(),
            system: "sys_1".into(),
            user: "user_1".into(),
            name,
            value,
            min: 1,
            triggered,
        }
    }

    #[test]
    fn normal_rule_triggers_above_threshold() {
        let r = rule(AlertMetric::Cpu, 80.0, false);
        assert!(r.crosses_trigger(90.0));
        assert!(!r.crosses_trigger(80.0));
    }

    #[test]
    fn battery_rule_is_inverted() {
        let r = rule(AlertMetric::Battery, 20.0, false);
        assert!(r.crosses_trigger(15.0));
        assert!(!r.crosses_trigger(25.0));
        assert!(r.crosses_resolve(25.0));
    }

    #[test]
    fn already_settled_skips_unchanged_state() {
        let triggered = rule(AlertMetric::Cpu, 80.0, true);
        assert!(triggered.already_settled(95.0));
        assert!(!triggered.already_settled(10.0));

        let resolved = rule(AlertMetric::Cpu, 80.0, false);
        assert!(resolved.already_settled(10.0));
        assert!(!resolved.already_settled(95.0));
    }

    #[test]
    fn minimum_sample_density_uses_preserved_formula() {
        let mut r = rule(AlertMetric::Cpu, 80.0, false);
        r.min = 2;
        assert_eq!(r.minimum_sample_density(), 2); // ceil(2/1.2) = ceil(1.666) = 2
        r.min = 12;
        assert_eq!(r.minimum_sample_density(), 10); // ceil(12/1.2) = ceil(10.0) = 10
    }
}
