// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Default schema version for YAML manifests
fn default_schema_version() -> String {
    "1.0".to_string()
}

/// Longest interval the ULP timer accepts, in microseconds.
pub const MAX_WAKEUP_PERIOD_US: u32 = 3_200_000;

fn default_wakeup_period_us() -> u32 {
    MAX_WAKEUP_PERIOD_US
}

fn default_wake_sources() -> Vec<String> {
    vec!["all".to_string()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Esp32,
    #[serde(alias = "esp32-s2")]
    Esp32S2,
    #[serde(alias = "esp32-s3")]
    Esp32S3,
}

impl Target {
    pub fn name(&self) -> &'static str {
        match self {
            Target::Esp32 => "esp32",
            Target::Esp32S2 => "esp32s2",
            Target::Esp32S3 => "esp32s3",
        }
    }

    /// ESP32 carries the word-addressed FSM ULP; S2/S3 boot the RISC-V ULP.
    pub fn has_riscv_ulp(&self) -> bool {
        !matches!(self, Target::Esp32)
    }

    /// Size of RTC slow memory, the upper bound for the ULP reserve.
    pub fn rtc_slow_mem_bytes(&self) -> u64 {
        8 * 1024
    }

    pub fn default_reserve_mem(&self) -> u64 {
        match self {
            Target::Esp32 => 512,
            Target::Esp32S2 | Target::Esp32S3 => 8 * 1024,
        }
    }
}

/// Simulated silicon answering the diagnostics queries.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChipProfile {
    pub cores: u8,
    #[serde(default)]
    pub revision: u16,
    #[serde(default)]
    pub features: Vec<String>,
    pub flash_size: String, // e.g. "4MiB"
    pub min_free_heap: u32,
}

impl ChipProfile {
    pub fn default_for(target: Target) -> Self {
        let (cores, features) = match target {
            Target::Esp32 => (2, vec!["wifi", "bt", "ble"]),
            Target::Esp32S2 => (1, vec!["wifi"]),
            Target::Esp32S3 => (2, vec!["wifi", "ble"]),
        };
        Self {
            cores,
            revision: 0,
            features: features.into_iter().map(String::from).collect(),
            flash_size: "4MiB".to_string(),
            min_free_heap: 280_000,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Boot manifest describing one co-processor bring-up.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BootManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    pub target: Target,
    /// Program image path, relative to the manifest.
    pub image: String,
    /// Symbol stem of a blob embedded in a host ELF (`_binary_<stem>_start`).
    #[serde(default)]
    pub linked_blob: Option<String>,
    #[serde(default = "default_wakeup_period_us")]
    pub wakeup_period_us: u32,
    #[serde(default)]
    pub load_slot: u32,
    #[serde(default)]
    pub period_slot: u32,
    #[serde(default)]
    pub entry_offset: Option<u32>,
    #[serde(default)]
    pub reserve_mem: Option<String>,
    #[serde(default)]
    pub abort_on_setup_failure: bool,
    #[serde(
        default = "default_wake_sources",
        deserialize_with = "one_or_many"
    )]
    pub disable_wake_sources: Vec<String>,
    #[serde(default)]
    pub chip: Option<ChipProfile>,
}

impl BootManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open boot manifest at {:?}", path.as_ref()))?;
        let manifest: Self =
            serde_yaml::from_reader(f).context("Failed to parse Boot Manifest YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Boot Manifest YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.image.trim().is_empty() {
            anyhow::bail!("Input 'image' path cannot be empty");
        }

        if let Some(blob) = &self.linked_blob {
            if blob.trim().is_empty() {
                anyhow::bail!("'linked_blob' symbol stem cannot be empty");
            }
        }

        if self.disable_wake_sources.is_empty() {
            anyhow::bail!("'disable_wake_sources' must name at least one source (or \"all\")");
        }

        let reserve = self.reserve_mem_bytes()?;
        if reserve == 0 || reserve > self.target.rtc_slow_mem_bytes() {
            anyhow::bail!(
                "'reserve_mem' of {} bytes is outside the {} bytes of RTC slow memory on {}",
                reserve,
                self.target.rtc_slow_mem_bytes(),
                self.target.name()
            );
        }

        let chip = self.chip_profile();
        if chip.cores == 0 {
            anyhow::bail!("'chip.cores' must be greater than zero");
        }
        parse_size(&chip.flash_size).context("Invalid 'chip.flash_size'")?;

        if self.wakeup_period_us > MAX_WAKEUP_PERIOD_US {
            tracing::warn!(
                "wakeup_period_us {} exceeds the ULP timer maximum of {}",
                self.wakeup_period_us,
                MAX_WAKEUP_PERIOD_US
            );
        }

        Ok(())
    }

    pub fn reserve_mem_bytes(&self) -> Result<u64> {
        match &self.reserve_mem {
            Some(s) => parse_size(s).context("Invalid 'reserve_mem'"),
            None => Ok(self.target.default_reserve_mem()),
        }
    }

    pub fn chip_profile(&self) -> ChipProfile {
        self.chip
            .clone()
            .unwrap_or_else(|| ChipProfile::default_for(self.target))
    }

    /// Resolves the image path against the directory holding the manifest.
    pub fn image_path(&self, manifest_path: &Path) -> PathBuf {
        manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.image)
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
