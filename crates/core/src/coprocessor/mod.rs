// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod fsm;
pub mod riscv;

pub use fsm::{UlpBinaryHeader, WordAddressedCoprocessor};
pub use riscv::ByteAddressedCoprocessor;

use crate::{
    ConfigError, CoprocessorControl, Granularity, LoadError, StartError, Target, WakeupPeriod,
};

/// Nominal RTC slow clock used to convert periods into timer ticks.
pub const DEFAULT_SLOW_CLOCK_HZ: u32 = 150_000;

pub(crate) fn period_to_ticks(period: WakeupPeriod, slow_clock_hz: u32) -> u64 {
    period.as_micros() as u64 * slow_clock_hz as u64 / 1_000_000
}

/// The ULP flavour present on a chip, selected once at startup.
#[derive(Debug)]
pub enum Coprocessor {
    Word(WordAddressedCoprocessor),
    Byte(ByteAddressedCoprocessor),
}

impl Coprocessor {
    pub fn for_target(target: Target, reserve_bytes: usize) -> Self {
        if target.has_riscv_ulp() {
            Coprocessor::Byte(ByteAddressedCoprocessor::new(reserve_bytes))
        } else {
            Coprocessor::Word(WordAddressedCoprocessor::new(reserve_bytes))
        }
    }

    fn inner(&self) -> &dyn CoprocessorControl {
        match self {
            Coprocessor::Word(c) => c,
            Coprocessor::Byte(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn CoprocessorControl {
        match self {
            Coprocessor::Word(c) => c,
            Coprocessor::Byte(c) => c,
        }
    }
}

impl CoprocessorControl for Coprocessor {
    fn granularity(&self) -> Granularity {
        self.inner().granularity()
    }

    fn load(&mut self, slot: u32, image: &[u8], unit_count: u32) -> Result<(), LoadError> {
        self.inner_mut().load(slot, image, unit_count)
    }

    fn set_wakeup_period(&mut self, slot: u32, period: WakeupPeriod) -> Result<(), ConfigError> {
        self.inner_mut().set_wakeup_period(slot, period)
    }

    fn run(&mut self, entry: Option<u32>) -> Result<(), StartError> {
        self.inner_mut().run(entry)
    }

    fn snapshot(&self) -> serde_json::Value {
        self.inner().snapshot()
    }
}
