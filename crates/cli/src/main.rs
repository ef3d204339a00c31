// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod report;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use report::{sha256_hex, ReportPrinter};
use ulpboot_config::{BootManifest, Target};
use ulpboot_core::builder::build_simulated;
use ulpboot_core::coprocessor::UlpBinaryHeader;
use ulpboot_core::observer::TransitionLog;
use ulpboot_core::power::SleepExit;
use ulpboot_core::Granularity;
use ulpboot_loader::{load_image, load_linked_blob, LoadedImage};

const EXIT_PASS: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

fn parse_target(s: &str) -> Result<Target, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "esp32" => Ok(Target::Esp32),
        "esp32s2" | "esp32-s2" => Ok(Target::Esp32S2),
        "esp32s3" | "esp32-s3" => Ok(Target::Esp32S3),
        other => Err(format!(
            "Unsupported target '{}' (expected esp32, esp32s2 or esp32s3)",
            other
        )),
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Host-side runner for the ULP bootstrap supervisor",
    long_about = None
)]
struct Cli {
    /// Enable debug-level logging, including every boot state transition
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full bootstrap against simulated hardware, ending in deep sleep.
    Run(RunArgs),

    /// Describe a program image without booting it.
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the boot manifest (YAML)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Override the manifest's program image
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Override the wakeup period in microseconds
    #[arg(long)]
    period_us: Option<u32>,

    /// Skip the remaining setup after the first failed step
    #[arg(long)]
    abort_on_failure: bool,

    /// Print the boot report as a single JSON line
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Raw binary, co-processor ELF, or host ELF (with --blob)
    #[arg(short, long)]
    image: PathBuf,

    /// Symbol stem of a blob linked into a host ELF (e.g. ulp_main_bin)
    #[arg(long)]
    blob: Option<String>,

    /// Check the image against a target's loader rules
    #[arg(long, value_parser = parse_target)]
    target: Option<Target>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_boot(args),
        Commands::Inspect(args) => run_inspect(args),
    }
}

fn read_image(path: &std::path::Path, blob: Option<&str>) -> anyhow::Result<LoadedImage> {
    match blob {
        Some(stem) => load_linked_blob(path, stem),
        None => load_image(path),
    }
}

fn run_boot(args: RunArgs) -> ExitCode {
    let mut manifest = match BootManifest::from_file(&args.manifest) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to load manifest {:?}: {:#}", args.manifest, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if let Some(period) = args.period_us {
        manifest.wakeup_period_us = period;
    }
    if args.abort_on_failure {
        manifest.abort_on_setup_failure = true;
    }

    let image_path = args
        .image
        .clone()
        .unwrap_or_else(|| manifest.image_path(&args.manifest));
    let loaded = match read_image(&image_path, manifest.linked_blob.as_deref()) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to read program image {:?}: {:#}", image_path, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let granularity = Granularity::for_target(manifest.target);
    let entry_offset = manifest
        .entry_offset
        .or_else(|| {
            loaded
                .entry
                .as_ref()
                .map(|e| e.offset_at(granularity, manifest.load_slot))
        })
        .unwrap_or(0);

    info!("Manifest: {} ({})", manifest.name, manifest.target.name());
    info!(
        "Image: {:?} ({} bytes, entry offset {})",
        image_path,
        loaded.image.len(),
        entry_offset
    );

    let image_sha256 = sha256_hex(loaded.image.bytes());
    let mut boot = match build_simulated(
        &manifest,
        loaded.image,
        entry_offset,
        SleepExit::Exit(EXIT_PASS as i32),
    ) {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to configure simulation: {:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let transitions = Arc::new(TransitionLog::new());
    boot.supervisor.add_observer(transitions.clone());
    boot.supervisor.add_observer(Arc::new(ReportPrinter {
        json: args.json,
        manifest_name: manifest.name.clone(),
        target: manifest.target.name(),
        image_sha256,
        transitions,
    }));

    boot.supervisor.run()
}

fn run_inspect(args: InspectArgs) -> ExitCode {
    let loaded = match read_image(&args.image, args.blob.as_deref()) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to read program image {:?}: {:#}", args.image, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let image = &loaded.image;
    println!("image:   {:?}", args.image);
    println!(
        "range:   {:#010x}..{:#010x} ({} bytes)",
        image.start_addr(),
        image.end_addr(),
        image.len()
    );
    println!("sha256:  {}", sha256_hex(image.bytes()));
    match &loaded.entry {
        Some(entry) => println!(
            "entry:   '{}' at byte offset {:#x}",
            entry.symbol, entry.byte_offset
        ),
        None => println!("entry:   none"),
    }

    let Some(target) = args.target else {
        return ExitCode::from(EXIT_PASS);
    };

    let granularity = Granularity::for_target(target);
    let units = match granularity.unit_count(image.len()) {
        Ok(u) => u,
        Err(e) => {
            warn!("Image is not loadable on {}: {}", target.name(), e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };
    println!("target:  {} ({} {:?} units)", target.name(), units, granularity);

    if granularity == Granularity::Word {
        match UlpBinaryHeader::parse(image.bytes()) {
            Ok(header) if header.magic == UlpBinaryHeader::MAGIC => {
                println!(
                    "header:  text {} bytes at {}, data {} bytes, bss {} bytes",
                    header.text_size, header.text_offset, header.data_size, header.bss_size
                );
                if header.declared_len() != image.len() {
                    warn!(
                        "Header declares {} bytes but the image has {}",
                        header.declared_len(),
                        image.len()
                    );
                    return ExitCode::from(EXIT_RUNTIME_ERROR);
                }
            }
            Ok(header) => {
                warn!("Bad ULP binary magic {:#010x}", header.magic);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
            Err(e) => {
                warn!("{}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    }

    ExitCode::from(EXIT_PASS)
}
