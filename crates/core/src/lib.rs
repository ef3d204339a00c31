// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod builder;
pub mod coprocessor;
pub mod diagnostics;
pub mod memory;
pub mod observer;
pub mod power;
pub mod supervisor;

use std::time::Duration;

pub use diagnostics::{ChipFeatures, ChipInfo, DiagnosticsRecord};
pub use memory::ProgramImage;
pub use power::WakeSourceMask;
pub use supervisor::{BootReport, BootState, Supervisor, SupervisorConfig};
pub use ulpboot_config::Target;

/// Longest wakeup period the ULP timer can represent, in microseconds.
pub const MAX_PERIOD_US: u32 = ulpboot_config::MAX_WAKEUP_PERIOD_US;

/// Unit in which a co-processor counts its program memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// 32-bit instruction words (ESP32 FSM ULP).
    Word,
    /// Plain bytes (RISC-V ULP).
    Byte,
}

impl Granularity {
    pub fn for_target(target: Target) -> Self {
        if target.has_riscv_ulp() {
            Granularity::Byte
        } else {
            Granularity::Word
        }
    }

    pub fn unit_bytes(&self) -> usize {
        match self {
            Granularity::Word => 4,
            Granularity::Byte => 1,
        }
    }

    /// Number of addressing units covering `len` bytes.
    pub fn unit_count(&self, len: usize) -> Result<u32, LoadError> {
        let unit = self.unit_bytes();
        if len % unit != 0 {
            return Err(LoadError::Misaligned { len, unit });
        }
        u32::try_from(len / unit).map_err(|_| LoadError::CapacityExceeded {
            offset: 0,
            size: len,
            capacity: u32::MAX as usize,
        })
    }
}

/// Interval at which the co-processor timer re-triggers, in microseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct WakeupPeriod(u32);

impl WakeupPeriod {
    pub const MAX: WakeupPeriod = WakeupPeriod(MAX_PERIOD_US);

    pub const fn from_micros(us: u32) -> Self {
        Self(us)
    }

    /// Saturates at `u32::MAX` microseconds, which the timer then rejects.
    pub fn from_duration(d: Duration) -> Self {
        Self(u32::try_from(d.as_micros()).unwrap_or(u32::MAX))
    }

    pub fn as_micros(&self) -> u32 {
        self.0
    }

    pub fn is_representable(&self) -> bool {
        self.0 > 0 && self.0 <= MAX_PERIOD_US
    }
}

impl From<WakeupPeriod> for Duration {
    fn from(p: WakeupPeriod) -> Self {
        Duration::from_micros(p.0 as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("image end {end:#x} lies before its start {start:#x}")]
    Inverted { start: u64, end: u64 },
    #[error("image bounds {start:#x}..{end:#x} do not match its {len} bytes")]
    LengthMismatch { start: u64, end: u64, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("program image is empty")]
    EmptyImage,
    #[error("image length {len} is not a multiple of the {unit}-byte program unit")]
    Misaligned { len: usize, unit: usize },
    #[error("unit count {given} does not describe the {len}-byte image")]
    UnitCountMismatch { given: u32, len: usize },
    #[error("image of {len} bytes is shorter than the program header")]
    HeaderTooShort { len: usize },
    #[error("load slot {slot} is outside the {capacity}-byte program memory")]
    InvalidSlot { slot: u32, capacity: usize },
    #[error("{size} bytes at offset {offset:#x} exceed the {capacity}-byte program memory")]
    CapacityExceeded {
        offset: usize,
        size: usize,
        capacity: usize,
    },
    #[error("program header magic {0:#010x} is not a ULP binary")]
    BadMagic(u32),
    #[error("program header declares {declared} bytes but the image holds {actual}")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("cannot load a program in boot state {0:?}")]
    OutOfSequence(BootState),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("wakeup period of {period_us} us is outside 1..={max} us")]
    PeriodOutOfRange { period_us: u32, max: u32 },
    #[error("timer slot {slot} does not exist ({slots} available)")]
    InvalidSlot { slot: u32, slots: u32 },
    #[error("cannot set the wakeup period in boot state {0:?}")]
    OutOfSequence(BootState),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("no program has been loaded")]
    NotLoaded,
    #[error("co-processor is already running")]
    AlreadyRunning,
    #[error("entry word {entry} lies outside the loaded program text")]
    EntryOutOfRange { entry: u32 },
    #[error("cannot start the program in boot state {0:?}")]
    OutOfSequence(BootState),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PowerError {
    #[error("wake source mask {mask:#x} rejected")]
    Rejected { mask: u32 },
}

/// Read-only platform identification and heap statistics.
pub trait DiagnosticsService: std::fmt::Debug {
    fn chip_info(&self) -> ChipInfo;
    /// Lowest free heap observed since boot, in bytes.
    fn minimum_free_heap(&self) -> u32;
}

/// Load/configure/run interface of an auxiliary low-power core.
pub trait CoprocessorControl: std::fmt::Debug + Send {
    fn granularity(&self) -> Granularity;

    /// Copies `image` into program memory at `slot`; `unit_count` is in
    /// [`Granularity`] units.
    fn load(&mut self, slot: u32, image: &[u8], unit_count: u32) -> Result<(), LoadError>;

    fn set_wakeup_period(&mut self, slot: u32, period: WakeupPeriod) -> Result<(), ConfigError>;

    /// Starts execution. Word-addressed cores take the entry word offset,
    /// byte-addressed cores start at their reset vector.
    fn run(&mut self, entry: Option<u32>) -> Result<(), StartError>;

    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Host power control.
pub trait PowerManagement: std::fmt::Debug {
    fn disable_wake_sources(&mut self, mask: WakeSourceMask) -> Result<(), PowerError>;

    /// Puts the host into deep sleep. Execution resumes only through a reset.
    fn enter_deep_sleep(&mut self) -> !;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_unit_count() {
        assert_eq!(Granularity::Word.unit_count(16).unwrap(), 4);
        assert_eq!(
            Granularity::Word.unit_count(18),
            Err(LoadError::Misaligned { len: 18, unit: 4 })
        );
        assert_eq!(Granularity::Byte.unit_count(18).unwrap(), 18);
        assert_eq!(Granularity::for_target(Target::Esp32), Granularity::Word);
        assert_eq!(Granularity::for_target(Target::Esp32S2), Granularity::Byte);
    }

    #[test]
    fn test_wakeup_period_bounds() {
        assert!(WakeupPeriod::MAX.is_representable());
        assert!(!WakeupPeriod::from_micros(0).is_representable());
        assert!(!WakeupPeriod::from_micros(MAX_PERIOD_US + 1).is_representable());
        let p = WakeupPeriod::from_duration(Duration::from_millis(20));
        assert_eq!(p.as_micros(), 20_000);
        assert_eq!(Duration::from(p), Duration::from_millis(20));
        assert_eq!(
            WakeupPeriod::from_duration(Duration::from_secs(u64::MAX / 4)).as_micros(),
            u32::MAX
        );
    }
}
