// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::DiagnosticsService;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Chip feature bits as reported by the ROM chip-info query.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChipFeatures: u32 {
        const EMB_FLASH = 1 << 0;
        const WIFI_BGN = 1 << 1;
        const BLE = 1 << 4;
        const BT = 1 << 5;
        const IEEE802154 = 1 << 6;
        const EMB_PSRAM = 1 << 7;
    }
}

impl ChipFeatures {
    /// Parses manifest feature names (`wifi`, `bt`, `ble`, `emb_flash`, ...).
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let mut features = ChipFeatures::empty();
        for name in names {
            let flag = match name.as_ref().to_ascii_lowercase().as_str() {
                "wifi" | "wifi_bgn" => ChipFeatures::WIFI_BGN,
                "bt" => ChipFeatures::BT,
                "ble" => ChipFeatures::BLE,
                "emb_flash" => ChipFeatures::EMB_FLASH,
                "ieee802154" => ChipFeatures::IEEE802154,
                "emb_psram" => ChipFeatures::EMB_PSRAM,
                other => return Err(format!("unknown chip feature '{}'", other)),
            };
            features |= flag;
        }
        Ok(features)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    pub model: String,
    pub cores: u8,
    pub features: ChipFeatures,
    pub revision: u16,
    pub flash_size: u64,
}

const MIB: u64 = 1024 * 1024;

/// Nearest whole MiB; decimal sizes such as 4 000 000 bytes still read as 4.
fn flash_size_mb(bytes: u64) -> u64 {
    bytes.saturating_add(MIB / 2) / MIB
}

/// One informational record combining chip identity and heap low-watermark.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiagnosticsRecord {
    pub model: String,
    pub cores: u8,
    pub features: u32,
    pub revision: u16,
    pub flash_size_mb: u64,
    pub embedded_flash: bool,
    pub min_free_heap: u32,
}

impl DiagnosticsRecord {
    pub fn collect<S: DiagnosticsService + ?Sized>(service: &S) -> Self {
        let info = service.chip_info();
        Self {
            model: info.model,
            cores: info.cores,
            features: info.features.bits(),
            revision: info.revision,
            flash_size_mb: flash_size_mb(info.flash_size),
            embedded_flash: info.features.contains(ChipFeatures::EMB_FLASH),
            min_free_heap: service.minimum_free_heap(),
        }
    }

    pub fn chip_line(&self) -> String {
        let features = ChipFeatures::from_bits_truncate(self.features);
        format!(
            "This is {} chip with {} CPU core(s), WiFi{}{}, silicon revision {}, {}MB {} flash.",
            self.model,
            self.cores,
            if features.contains(ChipFeatures::BT) { "/BT" } else { "" },
            if features.contains(ChipFeatures::BLE) { "/BLE" } else { "" },
            self.revision,
            self.flash_size_mb,
            if self.embedded_flash { "embedded" } else { "external" },
        )
    }

    pub fn heap_line(&self) -> String {
        format!("Minimum free heap size: {} bytes", self.min_free_heap)
    }
}

impl fmt::Display for DiagnosticsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.chip_line())?;
        write!(f, "{}", self.heap_line())
    }
}

/// Fixed answers for host-side runs.
#[derive(Debug, Clone)]
pub struct SimulatedDiagnostics {
    pub info: ChipInfo,
    pub min_free_heap: u32,
}

impl SimulatedDiagnostics {
    pub fn new(info: ChipInfo, min_free_heap: u32) -> Self {
        Self {
            info,
            min_free_heap,
        }
    }
}

impl DiagnosticsService for SimulatedDiagnostics {
    fn chip_info(&self) -> ChipInfo {
        self.info.clone()
    }

    fn minimum_free_heap(&self) -> u32 {
        self.min_free_heap
    }
}
