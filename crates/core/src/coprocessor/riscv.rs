// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{period_to_ticks, DEFAULT_SLOW_CLOCK_HZ};
use crate::memory::RtcSlowMemory;
use crate::{ConfigError, CoprocessorControl, Granularity, LoadError, StartError, WakeupPeriod};
use tracing::debug;

/// ESP32-S2/S3 RISC-V ULP. The program is a flat byte image placed at the
/// start of RTC slow memory and always entered through the reset vector.
#[derive(Debug, serde::Serialize)]
pub struct ByteAddressedCoprocessor {
    #[serde(skip)]
    memory: RtcSlowMemory,
    slow_clock_hz: u32,
    timer_ticks: Option<u64>,
    loaded_len: Option<usize>,
    running: bool,
}

impl ByteAddressedCoprocessor {
    pub fn new(reserve_bytes: usize) -> Self {
        Self {
            memory: RtcSlowMemory::new(reserve_bytes),
            slow_clock_hz: DEFAULT_SLOW_CLOCK_HZ,
            timer_ticks: None,
            loaded_len: None,
            running: false,
        }
    }

    pub fn memory(&self) -> &RtcSlowMemory {
        &self.memory
    }

    pub fn timer_ticks(&self) -> Option<u64> {
        self.timer_ticks
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl CoprocessorControl for ByteAddressedCoprocessor {
    fn granularity(&self) -> Granularity {
        Granularity::Byte
    }

    fn load(&mut self, slot: u32, image: &[u8], unit_count: u32) -> Result<(), LoadError> {
        if unit_count as usize != image.len() {
            return Err(LoadError::UnitCountMismatch {
                given: unit_count,
                len: image.len(),
            });
        }
        if image.is_empty() {
            return Err(LoadError::EmptyImage);
        }
        let capacity = self.memory.size();
        if slot != 0 {
            return Err(LoadError::InvalidSlot { slot, capacity });
        }
        if image.len() > capacity {
            return Err(LoadError::CapacityExceeded {
                offset: 0,
                size: image.len(),
                capacity,
            });
        }

        // Stale data from a previous program must not leak into .bss.
        self.memory.clear();
        self.memory.write(0, image);
        self.loaded_len = Some(image.len());
        debug!("RISC-V ULP: loaded {} bytes", image.len());
        Ok(())
    }

    fn set_wakeup_period(&mut self, slot: u32, period: WakeupPeriod) -> Result<(), ConfigError> {
        if slot != 0 {
            return Err(ConfigError::InvalidSlot { slot, slots: 1 });
        }
        if !period.is_representable() {
            return Err(ConfigError::PeriodOutOfRange {
                period_us: period.as_micros(),
                max: WakeupPeriod::MAX.as_micros(),
            });
        }
        let ticks = period_to_ticks(period, self.slow_clock_hz);
        self.timer_ticks = Some(ticks);
        debug!("RISC-V ULP: timer = {} ticks", ticks);
        Ok(())
    }

    fn run(&mut self, entry: Option<u32>) -> Result<(), StartError> {
        if let Some(entry) = entry {
            debug!("RISC-V ULP: ignoring entry offset {}, starting at reset vector", entry);
        }
        if self.loaded_len.is_none() {
            return Err(StartError::NotLoaded);
        }
        if self.running {
            return Err(StartError::AlreadyRunning);
        }
        self.running = true;
        Ok(())
    }

    fn snapshot(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.insert("variant".to_string(), "byte".into());
            obj.insert("reserve_bytes".to_string(), self.memory.size().into());
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_clears_previous_program() {
        let mut ulp = ByteAddressedCoprocessor::new(16);
        ulp.load(0, &[0xFF; 10], 10).unwrap();
        ulp.load(0, &[0x11; 3], 3).unwrap();

        assert_eq!(ulp.memory().read(0, 3).unwrap(), &[0x11; 3]);
        assert_eq!(ulp.memory().read(3, 7).unwrap(), &[0u8; 7]);
    }

    #[test]
    fn test_load_limits() {
        let mut ulp = ByteAddressedCoprocessor::new(16);
        assert_eq!(ulp.load(0, &[], 0), Err(LoadError::EmptyImage));
        assert!(matches!(
            ulp.load(1, &[0; 4], 4),
            Err(LoadError::InvalidSlot { slot: 1, .. })
        ));
        assert_eq!(
            ulp.load(0, &[0; 17], 17),
            Err(LoadError::CapacityExceeded {
                offset: 0,
                size: 17,
                capacity: 16
            })
        );
        // Odd byte counts are fine on a byte-addressed core
        assert!(ulp.load(0, &[0; 7], 7).is_ok());
    }

    #[test]
    fn test_single_timer_slot() {
        let mut ulp = ByteAddressedCoprocessor::new(16);
        assert_eq!(
            ulp.set_wakeup_period(1, WakeupPeriod::MAX),
            Err(ConfigError::InvalidSlot { slot: 1, slots: 1 })
        );
        ulp.set_wakeup_period(0, WakeupPeriod::MAX).unwrap();
        assert_eq!(ulp.timer_ticks(), Some(480_000));
    }

    #[test]
    fn test_run_ignores_entry() {
        let mut ulp = ByteAddressedCoprocessor::new(16);
        assert_eq!(ulp.run(None), Err(StartError::NotLoaded));
        ulp.load(0, &[0x13, 0, 0, 0], 4).unwrap();
        ulp.run(Some(123)).unwrap();
        assert!(ulp.is_running());
        assert_eq!(ulp.run(None), Err(StartError::AlreadyRunning));

        let snap = ulp.snapshot();
        assert_eq!(snap["variant"], "byte");
        assert_eq!(snap["loaded_len"], 4);
    }
}
