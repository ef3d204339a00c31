// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::supervisor::{BootReport, BootState, BootStep, StepOutcome};
use std::sync::Mutex;

/// Trait for observing bootstrap progress in a modular way.
pub trait BootObserver: std::fmt::Debug + Send + Sync {
    fn on_transition(&self, _from: BootState, _to: BootState) {}
    fn on_step(&self, _step: BootStep, _outcome: &StepOutcome) {}
    /// Last call before the host sleeps.
    fn on_sleep(&self, _report: &BootReport) {}
}

/// Records every state the supervisor passes through.
#[derive(Debug, Default)]
pub struct TransitionLog {
    states: Mutex<Vec<BootState>>,
    failures: Mutex<Vec<BootStep>>,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<BootState> {
        self.states.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn failed_steps(&self) -> Vec<BootStep> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn count(&self, state: BootState) -> usize {
        self.states
            .lock()
            .map(|s| s.iter().filter(|&&x| x == state).count())
            .unwrap_or(0)
    }
}

impl BootObserver for TransitionLog {
    fn on_transition(&self, from: BootState, to: BootState) {
        if let Ok(mut s) = self.states.lock() {
            if s.is_empty() {
                s.push(from);
            }
            s.push(to);
        }
    }

    fn on_step(&self, step: BootStep, outcome: &StepOutcome) {
        if matches!(outcome, StepOutcome::Failed { .. }) {
            if let Ok(mut f) = self.failures.lock() {
                f.push(step);
            }
        }
    }
}
