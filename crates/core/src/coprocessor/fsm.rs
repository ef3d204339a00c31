// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{period_to_ticks, DEFAULT_SLOW_CLOCK_HZ};
use crate::memory::RtcSlowMemory;
use crate::{ConfigError, CoprocessorControl, Granularity, LoadError, StartError, WakeupPeriod};
use tracing::debug;

/// `SENS_ULP_CP_SLEEP_CYCx` registers available to the FSM timer.
pub const TIMER_SLOTS: u32 = 5;

/// Header the ULP toolchain prepends to an FSM program binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct UlpBinaryHeader {
    pub magic: u32,
    pub text_offset: u16,
    pub text_size: u16,
    pub data_size: u16,
    pub bss_size: u16,
}

impl UlpBinaryHeader {
    pub const SIZE: usize = 12;
    /// "ulp\0", little endian.
    pub const MAGIC: u32 = 0x0070_6c75;

    pub fn new(text_size: u16, data_size: u16, bss_size: u16) -> Self {
        Self {
            magic: Self::MAGIC,
            text_offset: Self::SIZE as u16,
            text_size,
            data_size,
            bss_size,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.len() < Self::SIZE {
            return Err(LoadError::HeaderTooShort { len: bytes.len() });
        }
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        Ok(Self {
            magic: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            text_offset: u16_at(4),
            text_size: u16_at(6),
            data_size: u16_at(8),
            bss_size: u16_at(10),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.text_offset.to_le_bytes());
        out[6..8].copy_from_slice(&self.text_size.to_le_bytes());
        out[8..10].copy_from_slice(&self.data_size.to_le_bytes());
        out[10..12].copy_from_slice(&self.bss_size.to_le_bytes());
        out
    }

    /// Bytes the header says follow it: text offset, text and data.
    pub fn declared_len(&self) -> usize {
        self.text_offset as usize + self.text_size as usize + self.data_size as usize
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
struct LoadedProgram {
    offset: usize,
    header: UlpBinaryHeader,
}

/// ESP32 finite-state-machine ULP. Program memory and entry points are
/// counted in 32-bit words from the start of RTC slow memory.
#[derive(Debug)]
pub struct WordAddressedCoprocessor {
    memory: RtcSlowMemory,
    slow_clock_hz: u32,
    timer_ticks: [Option<u64>; TIMER_SLOTS as usize],
    loaded: Option<LoadedProgram>,
    entry: Option<u32>,
    running: bool,
}

#[derive(serde::Serialize)]
struct FsmSnapshot<'a> {
    variant: &'static str,
    reserve_bytes: usize,
    loaded: Option<&'a LoadedProgram>,
    timer_ticks: &'a [Option<u64>],
    entry: Option<u32>,
    running: bool,
}

impl WordAddressedCoprocessor {
    pub fn new(reserve_bytes: usize) -> Self {
        Self {
            memory: RtcSlowMemory::new(reserve_bytes),
            slow_clock_hz: DEFAULT_SLOW_CLOCK_HZ,
            timer_ticks: [None; TIMER_SLOTS as usize],
            loaded: None,
            entry: None,
            running: false,
        }
    }

    pub fn memory(&self) -> &RtcSlowMemory {
        &self.memory
    }

    pub fn timer_ticks(&self, slot: u32) -> Option<u64> {
        self.timer_ticks.get(slot as usize).copied().flatten()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl CoprocessorControl for WordAddressedCoprocessor {
    fn granularity(&self) -> Granularity {
        Granularity::Word
    }

    fn load(&mut self, slot: u32, image: &[u8], unit_count: u32) -> Result<(), LoadError> {
        let capacity = self.memory.size();
        let program_size = unit_count as usize * 4;
        if program_size != image.len() {
            return Err(LoadError::UnitCountMismatch {
                given: unit_count,
                len: image.len(),
            });
        }
        if program_size < UlpBinaryHeader::SIZE {
            return Err(LoadError::HeaderTooShort { len: program_size });
        }

        let offset = slot as usize * 4;
        if offset > capacity {
            return Err(LoadError::InvalidSlot { slot, capacity });
        }
        if offset + program_size > capacity {
            return Err(LoadError::CapacityExceeded {
                offset,
                size: program_size,
                capacity,
            });
        }

        let header = UlpBinaryHeader::parse(image)?;
        if header.magic != UlpBinaryHeader::MAGIC {
            return Err(LoadError::BadMagic(header.magic));
        }
        if header.declared_len() != program_size {
            return Err(LoadError::SizeMismatch {
                declared: header.declared_len(),
                actual: program_size,
            });
        }

        let body = &image[header.text_offset as usize..];
        let bss = header.bss_size as usize;
        if offset + body.len() + bss > capacity {
            return Err(LoadError::CapacityExceeded {
                offset,
                size: body.len() + bss,
                capacity,
            });
        }

        self.memory.write(offset, body);
        self.memory.zero(offset + body.len(), bss);
        self.loaded = Some(LoadedProgram { offset, header });
        debug!(
            "FSM ULP: loaded {} text + {} data bytes at word {}, {} bss bytes zeroed",
            header.text_size, header.data_size, slot, bss
        );
        Ok(())
    }

    fn set_wakeup_period(&mut self, slot: u32, period: WakeupPeriod) -> Result<(), ConfigError> {
        if slot >= TIMER_SLOTS {
            return Err(ConfigError::InvalidSlot {
                slot,
                slots: TIMER_SLOTS,
            });
        }
        if !period.is_representable() {
            return Err(ConfigError::PeriodOutOfRange {
                period_us: period.as_micros(),
                max: WakeupPeriod::MAX.as_micros(),
            });
        }
        let ticks = period_to_ticks(period, self.slow_clock_hz);
        self.timer_ticks[slot as usize] = Some(ticks);
        debug!("FSM ULP: timer slot {} = {} ticks", slot, ticks);
        Ok(())
    }

    fn run(&mut self, entry: Option<u32>) -> Result<(), StartError> {
        let loaded = self.loaded.ok_or(StartError::NotLoaded)?;
        if self.running {
            return Err(StartError::AlreadyRunning);
        }
        let entry = entry.unwrap_or((loaded.offset / 4) as u32);
        let text_start = loaded.offset;
        let text_end = text_start + loaded.header.text_size as usize;
        let entry_byte = entry as usize * 4;
        if entry_byte < text_start || entry_byte >= text_end {
            return Err(StartError::EntryOutOfRange { entry });
        }
        self.entry = Some(entry);
        self.running = true;
        debug!("FSM ULP: running from word {}", entry);
        Ok(())
    }

    fn snapshot(&self) -> serde_json::Value {
        let snap = FsmSnapshot {
            variant: "word",
            reserve_bytes: self.memory.size(),
            loaded: self.loaded.as_ref(),
            timer_ticks: &self.timer_ticks,
            entry: self.entry,
            running: self.running,
        };
        serde_json::to_value(snap).unwrap_or(serde_json::Value::Null)
    }
}
