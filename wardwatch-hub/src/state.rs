/**
 * WORLD STATE - Vue "dernier état connu" de tous les patients
 *
 * RÔLE : Structure possédée exclusivement par le hub. Aucune synchronisation
 * ici : le hub la garde derrière un seul verrou (`Shared<T>`), chaque
 * méthode de mutation est donc appliquée en entier ou pas du tout.
 *
 * RÈGLES :
 * - Un seul échantillon courant par patient, le dernier arrivé gagne
 *   (même si son timestamp est plus ancien)
 * - Journal d'alertes dans l'ordre d'observation, borné, plus ancien évincé
 */

use crate::models::{Alert, CnInfo, ConnectionStats, PatientId, TelemetrySample};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

#[derive(Debug)]
pub struct WorldState {
    patients: HashMap<PatientId, TelemetrySample>,
    alerts: VecDeque<Alert>,
    alert_capacity: usize,
    stats: ConnectionStats,
}

/// Copie cohérente de l'état, jamais liée au verrou
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub patients: BTreeMap<PatientId, TelemetrySample>,
    pub alerts: Vec<Alert>,
    pub stats: ConnectionStats,
}

impl WorldState {
    pub fn new(ports: CnInfo, alert_capacity: usize) -> Self {
        Self {
            patients: HashMap::new(),
            alerts: VecDeque::new(),
            alert_capacity: alert_capacity.max(1),
            stats: ConnectionStats { ports, ..Default::default() },
        }
    }

    pub fn apply_telemetry(&mut self, sample: TelemetrySample) {
        self.patients.insert(sample.patient_id.clone(), sample);
    }

    pub fn apply_alert(&mut self, alert: Alert) {
        if let Some(sample) = alert.embedded_sample() {
            self.apply_telemetry(sample);
        }
        if self.alerts.len() == self.alert_capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    pub fn patient(&self, patient_id: &str) -> Option<&TelemetrySample> {
        self.patients.get(patient_id)
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut ConnectionStats {
        &mut self.stats
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            patients: self
                .patients
                .iter()
                .map(|(id, sample)| (id.clone(), sample.clone()))
                .collect(),
            alerts: self.alerts.iter().cloned().collect(),
            stats: self.stats,
        }
    }
}
