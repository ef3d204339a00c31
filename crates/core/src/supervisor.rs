// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! One-shot hand-off of control to the ULP co-processor.
//!
//! The supervisor reports platform diagnostics, loads the program image,
//! arms the wakeup timer, starts the co-processor and finally puts the host
//! into deep sleep. Setup failures are logged and the sequence moves on;
//! the host always ends up asleep. [`SupervisorConfig::abort_on_setup_failure`]
//! skips the remaining setup after the first failure instead.

use crate::diagnostics::DiagnosticsRecord;
use crate::memory::ProgramImage;
use crate::observer::BootObserver;
use crate::power::WakeSourceMask;
use crate::{
    ConfigError, CoprocessorControl, DiagnosticsService, Granularity, LoadError,
    PowerManagement, StartError, WakeupPeriod,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootState {
    Booting,
    DiagnosticsReported,
    ImageLoaded,
    LoadFailed,
    TimerConfigured,
    ConfigFailed,
    ProgramStarted,
    StartFailed,
    /// Only reachable with `abort_on_setup_failure`.
    Aborted,
    Sleeping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid boot transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: BootState,
    pub to: BootState,
}

impl BootState {
    pub fn can_advance_to(self, next: BootState) -> bool {
        use BootState::*;
        match (self, next) {
            (Sleeping, _) => false,
            (_, Sleeping) => true,
            (Booting, DiagnosticsReported) => true,
            (DiagnosticsReported, ImageLoaded | LoadFailed) => true,
            (ImageLoaded | LoadFailed, TimerConfigured | ConfigFailed) => true,
            (TimerConfigured | ConfigFailed, ProgramStarted | StartFailed) => true,
            (LoadFailed | ConfigFailed | StartFailed, Aborted) => true,
            _ => false,
        }
    }

    pub fn advance(self, next: BootState) -> Result<BootState, InvalidTransition> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            BootState::LoadFailed | BootState::ConfigFailed | BootState::StartFailed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootStep {
    Diagnostics,
    Load,
    Configure,
    Start,
}

impl BootStep {
    const SETUP: [BootStep; 3] = [BootStep::Load, BootStep::Configure, BootStep::Start];
}

impl fmt::Display for BootStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootStep::Diagnostics => "diagnostics",
            BootStep::Load => "load",
            BootStep::Configure => "configure",
            BootStep::Start => "start",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Ok,
    Failed { error: String },
    Skipped,
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StepRecord {
    pub step: BootStep,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Everything the supervisor did before going to sleep.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BootReport {
    pub diagnostics: DiagnosticsRecord,
    pub steps: Vec<StepRecord>,
    /// State right before the sleep transition.
    pub state: BootState,
    pub aborted: bool,
    pub image_len: usize,
    pub wakeup_period_us: u32,
    pub wake_sources_disabled: u32,
    pub coprocessor: serde_json::Value,
}

impl BootReport {
    pub fn outcome(&self, step: BootStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.outcome)
    }

    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|r| r.outcome.is_failed()).count()
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub image: ProgramImage,
    pub wakeup_period: WakeupPeriod,
    /// Entry point relative to the base of co-processor memory, in program
    /// units. Ignored by byte-addressed co-processors.
    pub entry_offset: u32,
    pub load_slot: u32,
    pub period_slot: u32,
    /// Wake sources disabled right before sleeping.
    pub wake_sources: WakeSourceMask,
    /// Skip the remaining setup after the first failure. Sleep is still entered.
    pub abort_on_setup_failure: bool,
}

impl SupervisorConfig {
    pub fn new(image: ProgramImage) -> Self {
        Self {
            image,
            wakeup_period: WakeupPeriod::MAX,
            entry_offset: 0,
            load_slot: 0,
            period_slot: 0,
            wake_sources: WakeSourceMask::ALL,
            abort_on_setup_failure: false,
        }
    }
}

pub struct Supervisor<C, P, D> {
    config: SupervisorConfig,
    coprocessor: C,
    power: P,
    diagnostics: D,
    state: BootState,
    pub observers: Vec<Arc<dyn BootObserver>>,
}

impl<C, P, D> Supervisor<C, P, D>
where
    C: CoprocessorControl,
    P: PowerManagement,
    D: DiagnosticsService,
{
    pub fn new(config: SupervisorConfig, coprocessor: C, power: P, diagnostics: D) -> Self {
        Self {
            config,
            coprocessor,
            power,
            diagnostics,
            state: BootState::Booting,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn BootObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn coprocessor(&self) -> &C {
        &self.coprocessor
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    fn transition(&mut self, next: BootState) {
        match self.state.advance(next) {
            Ok(next) => {
                for observer in &self.observers {
                    observer.on_transition(self.state, next);
                }
                debug!("Boot state {:?} -> {:?}", self.state, next);
                self.state = next;
            }
            Err(e) => warn!("Ignoring {}", e),
        }
    }

    pub fn report_diagnostics(&mut self) -> DiagnosticsRecord {
        let record = DiagnosticsRecord::collect(&self.diagnostics);
        info!("{}", record.chip_line());
        info!("{}", record.heap_line());
        self.transition(BootState::DiagnosticsReported);
        record
    }

    /// Whether the step settling in `next` may run now. Out-of-order steps
    /// leave the co-processor and the boot state untouched.
    fn in_sequence(&self, next: BootState) -> bool {
        if self.state.can_advance_to(next) {
            return true;
        }
        warn!("Refusing {:?} step in boot state {:?}", next, self.state);
        false
    }

    pub fn load_program(&mut self, image: &ProgramImage) -> Result<(), LoadError> {
        if !self.in_sequence(BootState::ImageLoaded) {
            return Err(LoadError::OutOfSequence(self.state));
        }
        let result = self.try_load(image);
        match &result {
            Ok(()) => self.transition(BootState::ImageLoaded),
            Err(e) => {
                warn!("ULP program load failed: {}", e);
                self.transition(BootState::LoadFailed);
            }
        }
        result
    }

    fn try_load(&mut self, image: &ProgramImage) -> Result<(), LoadError> {
        if image.is_empty() {
            return Err(LoadError::EmptyImage);
        }
        let units = self.coprocessor.granularity().unit_count(image.len())?;
        debug!(
            "Loading {} bytes ({} units) at slot {}",
            image.len(),
            units,
            self.config.load_slot
        );
        self.coprocessor
            .load(self.config.load_slot, image.bytes(), units)
    }

    pub fn configure_wakeup_period(&mut self, period: WakeupPeriod) -> Result<(), ConfigError> {
        if !self.in_sequence(BootState::TimerConfigured) {
            return Err(ConfigError::OutOfSequence(self.state));
        }
        let result = self
            .coprocessor
            .set_wakeup_period(self.config.period_slot, period);
        match &result {
            Ok(()) => self.transition(BootState::TimerConfigured),
            Err(e) => {
                warn!("ULP wakeup period not set: {}", e);
                self.transition(BootState::ConfigFailed);
            }
        }
        result
    }

    pub fn start_program(&mut self, entry_offset: u32) -> Result<(), StartError> {
        if !self.in_sequence(BootState::ProgramStarted) {
            return Err(StartError::OutOfSequence(self.state));
        }
        let entry = match self.coprocessor.granularity() {
            Granularity::Word => Some(entry_offset),
            Granularity::Byte => None,
        };
        let result = self.coprocessor.run(entry);
        match &result {
            Ok(()) => self.transition(BootState::ProgramStarted),
            Err(e) => {
                warn!("ULP program not started: {}", e);
                self.transition(BootState::StartFailed);
            }
        }
        result
    }

    /// Disables `wake_sources` and puts the host to sleep. A refused disable
    /// is logged; sleep is entered regardless.
    pub fn enter_deep_sleep(&mut self, wake_sources: WakeSourceMask) -> ! {
        if let Err(e) = self.power.disable_wake_sources(wake_sources) {
            error!("Failed to disable wake sources: {}", e);
        }
        self.transition(BootState::Sleeping);
        self.power.enter_deep_sleep()
    }

    fn settle<E: fmt::Display>(
        &mut self,
        steps: &mut Vec<StepRecord>,
        step: BootStep,
        result: Result<(), E>,
    ) -> bool {
        let outcome = match result {
            Ok(()) => StepOutcome::Ok,
            Err(e) => StepOutcome::Failed {
                error: e.to_string(),
            },
        };
        for observer in &self.observers {
            observer.on_step(step, &outcome);
        }
        let abort = outcome.is_failed() && self.config.abort_on_setup_failure;
        steps.push(StepRecord { step, outcome });
        if abort {
            warn!("Setup step '{}' failed, skipping the rest of co-processor setup", step);
            self.transition(BootState::Aborted);
        }
        abort
    }

    /// Runs every step up to, but not including, the sleep transition.
    pub fn bootstrap(&mut self) -> BootReport {
        let mut steps = Vec::with_capacity(4);

        let diagnostics = self.report_diagnostics();
        self.settle(&mut steps, BootStep::Diagnostics, Ok::<(), LoadError>(()));

        let image = self.config.image.clone();
        let period = self.config.wakeup_period;
        let entry = self.config.entry_offset;

        let loaded = self.load_program(&image);
        let mut aborted = self.settle(&mut steps, BootStep::Load, loaded);
        if !aborted {
            let configured = self.configure_wakeup_period(period);
            aborted = self.settle(&mut steps, BootStep::Configure, configured);
        }
        if !aborted {
            let started = self.start_program(entry);
            aborted = self.settle(&mut steps, BootStep::Start, started);
        }
        if aborted {
            for step in BootStep::SETUP {
                if !steps.iter().any(|r| r.step == step) {
                    for observer in &self.observers {
                        observer.on_step(step, &StepOutcome::Skipped);
                    }
                    steps.push(StepRecord {
                        step,
                        outcome: StepOutcome::Skipped,
                    });
                }
            }
        }

        BootReport {
            diagnostics,
            steps,
            state: self.state,
            aborted,
            image_len: image.len(),
            wakeup_period_us: period.as_micros(),
            wake_sources_disabled: self.config.wake_sources.bits(),
            coprocessor: self.coprocessor.snapshot(),
        }
    }

    /// The whole bring-up. Never returns.
    pub fn run(mut self) -> ! {
        let report = self.bootstrap();
        for observer in &self.observers {
            observer.on_sleep(&report);
        }
        info!("Entering deep sleep");
        let wake_sources = self.config.wake_sources;
        self.enter_deep_sleep(wake_sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use BootState::*;
        let path = [
            Booting,
            DiagnosticsReported,
            ImageLoaded,
            TimerConfigured,
            ProgramStarted,
            Sleeping,
        ];
        for pair in path.windows(2) {
            assert_eq!(pair[0].advance(pair[1]), Ok(pair[1]));
        }
    }

    #[test]
    fn test_failed_states_continue() {
        use BootState::*;
        assert!(LoadFailed.can_advance_to(TimerConfigured));
        assert!(LoadFailed.can_advance_to(ConfigFailed));
        assert!(ConfigFailed.can_advance_to(ProgramStarted));
        assert!(StartFailed.can_advance_to(Sleeping));
        assert!(StartFailed.is_failure());
        assert!(!Aborted.is_failure());
    }

    #[test]
    fn test_out_of_order_rejected() {
        use BootState::*;
        assert_eq!(
            Booting.advance(ImageLoaded),
            Err(InvalidTransition {
                from: Booting,
                to: ImageLoaded
            })
        );
        assert!(!ImageLoaded.can_advance_to(Aborted));
        assert!(!Sleeping.can_advance_to(Booting));
        assert!(!Sleeping.can_advance_to(Sleeping));
    }

    #[test]
    fn test_sleep_reachable_from_anywhere_awake() {
        use BootState::*;
        for s in [Booting, DiagnosticsReported, LoadFailed, Aborted, ProgramStarted] {
            assert!(s.can_advance_to(Sleeping), "{:?}", s);
        }
    }

    #[test]
    fn test_step_outcome_json() {
        let rec = StepRecord {
            step: BootStep::Load,
            outcome: StepOutcome::Failed {
                error: "program image is empty".to_string(),
            },
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["step"], "load");
        assert_eq!(v["status"], "failed");
        assert_eq!(v["error"], "program image is empty");
    }
}
