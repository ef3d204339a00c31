// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{PowerError, PowerManagement};
use bitflags::bitflags;
use std::sync::{Arc, Mutex};
use tracing::info;

bitflags! {
    /// Hardware signals able to end the host's deep sleep.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WakeSourceMask: u32 {
        const TIMER = 1 << 0;
        const EXT0 = 1 << 1;
        const EXT1 = 1 << 2;
        const TOUCHPAD = 1 << 3;
        const ULP = 1 << 4;
        const GPIO = 1 << 5;
        const UART = 1 << 6;
        const WIFI = 1 << 7;
        const COCPU = 1 << 8;
        const COCPU_TRAP_TRIG = 1 << 9;
        const BT = 1 << 10;
        const ALL = Self::TIMER.bits()
            | Self::EXT0.bits()
            | Self::EXT1.bits()
            | Self::TOUCHPAD.bits()
            | Self::ULP.bits()
            | Self::GPIO.bits()
            | Self::UART.bits()
            | Self::WIFI.bits()
            | Self::COCPU.bits()
            | Self::COCPU_TRAP_TRIG.bits()
            | Self::BT.bits();
    }
}

impl WakeSourceMask {
    /// Parses manifest source names; `all` selects every source.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let mut mask = WakeSourceMask::empty();
        for name in names {
            let upper = name.as_ref().trim().to_ascii_uppercase();
            let flag = WakeSourceMask::from_name(&upper)
                .ok_or_else(|| format!("unknown wake source '{}'", name.as_ref()))?;
            mask |= flag;
        }
        Ok(mask)
    }
}

/// What the simulated host does once it is "asleep".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepExit {
    /// Unwind with a [`DeepSleep`] payload so a test can catch it.
    Unwind,
    /// Terminate the process with the given code.
    Exit(i32),
}

/// Payload carried by a [`SleepExit::Unwind`] sleep entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepSleep {
    pub disabled: WakeSourceMask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerLog {
    pub disabled: WakeSourceMask,
    pub disable_calls: u32,
    pub sleep_entries: u32,
}

impl Default for PowerLog {
    fn default() -> Self {
        Self {
            disabled: WakeSourceMask::empty(),
            disable_calls: 0,
            sleep_entries: 0,
        }
    }
}

/// Host power controller that records every request in a shared [`PowerLog`].
#[derive(Debug)]
pub struct SimulatedPower {
    log: Arc<Mutex<PowerLog>>,
    exit: SleepExit,
    pub fail_disable: bool,
}

impl SimulatedPower {
    pub fn new(exit: SleepExit) -> Self {
        Self {
            log: Arc::new(Mutex::new(PowerLog::default())),
            exit,
            fail_disable: false,
        }
    }

    /// Handle that stays readable after the supervisor has diverged.
    pub fn log_handle(&self) -> Arc<Mutex<PowerLog>> {
        Arc::clone(&self.log)
    }

    pub fn log(&self) -> PowerLog {
        self.log
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }
}

impl PowerManagement for SimulatedPower {
    fn disable_wake_sources(&mut self, mask: WakeSourceMask) -> Result<(), PowerError> {
        if let Ok(mut log) = self.log.lock() {
            log.disable_calls += 1;
        }
        if self.fail_disable {
            return Err(PowerError::Rejected { mask: mask.bits() });
        }
        if let Ok(mut log) = self.log.lock() {
            log.disabled |= mask;
        }
        Ok(())
    }

    fn enter_deep_sleep(&mut self) -> ! {
        let disabled = match self.log.lock() {
            Ok(mut log) => {
                log.sleep_entries += 1;
                log.disabled
            }
            Err(_) => WakeSourceMask::empty(),
        };
        info!("Host in deep sleep (wake sources disabled: {:?})", disabled);

        match self.exit {
            SleepExit::Unwind => std::panic::resume_unwind(Box::new(DeepSleep { disabled })),
            SleepExit::Exit(code) => std::process::exit(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_wake_source_names() {
        assert_eq!(
            WakeSourceMask::from_names(&["all"]).unwrap(),
            WakeSourceMask::ALL
        );
        assert_eq!(
            WakeSourceMask::from_names(&["timer", "Ext1"]).unwrap(),
            WakeSourceMask::TIMER | WakeSourceMask::EXT1
        );
        assert!(WakeSourceMask::from_names(&["doorbell"]).is_err());
    }

    #[test]
    fn test_sleep_unwinds_with_payload() {
        let mut power = SimulatedPower::new(SleepExit::Unwind);
        let handle = power.log_handle();
        power.disable_wake_sources(WakeSourceMask::ALL).unwrap();

        let payload = catch_unwind(AssertUnwindSafe(|| power.enter_deep_sleep())).unwrap_err();
        let sleep = payload.downcast::<DeepSleep>().unwrap();
        assert_eq!(sleep.disabled, WakeSourceMask::ALL);

        let log = handle.lock().unwrap();
        assert_eq!(log.sleep_entries, 1);
        assert_eq!(log.disable_calls, 1);
    }

    #[test]
    fn test_failed_disable_is_counted_but_not_applied() {
        let mut power = SimulatedPower::new(SleepExit::Unwind);
        power.fail_disable = true;
        assert_eq!(
            power.disable_wake_sources(WakeSourceMask::TIMER),
            Err(PowerError::Rejected { mask: 1 })
        );
        let log = power.log();
        assert_eq!(log.disable_calls, 1);
        assert!(log.disabled.is_empty());
    }
}
