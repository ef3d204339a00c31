// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::error;
use ulpboot_core::observer::{BootObserver, TransitionLog};
use ulpboot_core::supervisor::StepOutcome;
use ulpboot_core::{BootReport, BootState};

pub const RESULT_SCHEMA_VERSION: &str = "1.0";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Serialize)]
struct RunResult<'a> {
    result_schema_version: &'static str,
    manifest: &'a str,
    target: &'a str,
    image_sha256: &'a str,
    transitions: Vec<BootState>,
    #[serde(flatten)]
    report: &'a BootReport,
}

/// Prints the boot report once the supervisor is about to sleep.
#[derive(Debug)]
pub struct ReportPrinter {
    pub json: bool,
    pub manifest_name: String,
    pub target: &'static str,
    pub image_sha256: String,
    pub transitions: Arc<TransitionLog>,
}

impl ReportPrinter {
    fn render_text(&self, report: &BootReport) -> String {
        let mut out = format!("== {} ({}) ==\n", self.manifest_name, self.target);
        out.push_str(&format!("{}\n", report.diagnostics));
        out.push_str(&format!(
            "image: {} bytes, sha256 {}\n",
            report.image_len, self.image_sha256
        ));
        for record in &report.steps {
            let status = match &record.outcome {
                StepOutcome::Ok => "ok".to_string(),
                StepOutcome::Failed { error } => format!("FAILED ({})", error),
                StepOutcome::Skipped => "skipped".to_string(),
            };
            out.push_str(&format!("  {:<12} {}\n", record.step, status));
        }
        out.push_str(&format!(
            "wakeup period: {} us, wake sources disabled: {:#x}\n",
            report.wakeup_period_us, report.wake_sources_disabled
        ));
        out.push_str(&format!(
            "state before sleep: {:?}{}",
            report.state,
            if report.aborted { " (setup aborted)" } else { "" }
        ));
        out
    }
}

impl BootObserver for ReportPrinter {
    fn on_sleep(&self, report: &BootReport) {
        if !self.json {
            println!("{}", self.render_text(report));
            return;
        }
        let result = RunResult {
            result_schema_version: RESULT_SCHEMA_VERSION,
            manifest: &self.manifest_name,
            target: self.target,
            image_sha256: &self.image_sha256,
            transitions: self.transitions.states(),
            report,
        };
        match serde_json::to_string(&result) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize boot report: {}", e),
        }
    }
}
