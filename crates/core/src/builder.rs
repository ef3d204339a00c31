// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::coprocessor::Coprocessor;
use crate::diagnostics::{ChipFeatures, ChipInfo, SimulatedDiagnostics};
use crate::memory::ProgramImage;
use crate::power::{PowerLog, SimulatedPower, SleepExit, WakeSourceMask};
use crate::supervisor::{Supervisor, SupervisorConfig};
use crate::WakeupPeriod;
use anyhow::{anyhow, Context, Result};
use std::sync::{Arc, Mutex};
use tracing::info;
use ulpboot_config::{parse_size, BootManifest};

pub type SimulatedSupervisor = Supervisor<Coprocessor, SimulatedPower, SimulatedDiagnostics>;

pub struct SimulatedBoot {
    pub supervisor: SimulatedSupervisor,
    pub power_log: Arc<Mutex<PowerLog>>,
}

/// Translates a manifest into the supervisor's own configuration.
pub fn supervisor_config(
    manifest: &BootManifest,
    image: ProgramImage,
    entry_offset: u32,
) -> Result<SupervisorConfig> {
    let wake_sources = WakeSourceMask::from_names(&manifest.disable_wake_sources)
        .map_err(|e| anyhow!(e))
        .context("Invalid 'disable_wake_sources'")?;

    Ok(SupervisorConfig {
        image,
        wakeup_period: WakeupPeriod::from_micros(manifest.wakeup_period_us),
        entry_offset,
        load_slot: manifest.load_slot,
        period_slot: manifest.period_slot,
        wake_sources,
        abort_on_setup_failure: manifest.abort_on_setup_failure,
    })
}

pub fn simulated_diagnostics(manifest: &BootManifest) -> Result<SimulatedDiagnostics> {
    let chip = manifest.chip_profile();
    let features = ChipFeatures::from_names(&chip.features)
        .map_err(|e| anyhow!(e))
        .context("Invalid 'chip.features'")?;
    let flash_size = parse_size(&chip.flash_size).context("Invalid 'chip.flash_size'")?;

    Ok(SimulatedDiagnostics::new(
        ChipInfo {
            model: manifest.target.name().to_string(),
            cores: chip.cores,
            features,
            revision: chip.revision,
            flash_size,
        },
        chip.min_free_heap,
    ))
}

/// Builds a supervisor wired to simulated hardware for `manifest.target`.
pub fn build_simulated(
    manifest: &BootManifest,
    image: ProgramImage,
    entry_offset: u32,
    exit: SleepExit,
) -> Result<SimulatedBoot> {
    let reserve = manifest.reserve_mem_bytes()? as usize;
    let coprocessor = Coprocessor::for_target(manifest.target, reserve);
    info!(
        "Simulating {} with a {}-byte ULP reserve ({:?}-addressed)",
        manifest.target.name(),
        reserve,
        crate::CoprocessorControl::granularity(&coprocessor)
    );

    let config = supervisor_config(manifest, image, entry_offset)?;
    let diagnostics = simulated_diagnostics(manifest)?;
    let power = SimulatedPower::new(exit);
    let power_log = power.log_handle();

    Ok(SimulatedBoot {
        supervisor: Supervisor::new(config, coprocessor, power, diagnostics),
        power_log,
    })
}
