//! Command Line Interface
//!
//! Operator access to the fingerprint engine. Every command prints JSON on
//! stdout; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use rl_core::{load_config, BiometricService, EngineConfig, JsonTemplateStore, TemplateStore};

#[derive(Parser)]
#[command(name = "ridgeline")]
#[command(version)]
#[command(about = "Ridgeline - fingerprint enrollment and matching")]
#[command(long_about = "Ridgeline - fingerprint enrollment and matching

Drives a ZKTeco scanner through the vendor SDK and matches templates against
a local JSON template store. Templates are passed as base64 text.

EXAMPLES:
    ridgeline status                       Driver and matcher diagnostics
    ridgeline device open                  Open the scanner and show geometry
    ridgeline capture --timeout-ms 10000   Capture one template
    ridgeline subjects add u1              Register a subject
    ridgeline enroll u1 <base64>           Enroll a template for u1
    ridgeline enroll-samples u1 <b64> <b64> <b64>
    ridgeline verify u1 <base64>           1:1 comparison
    ridgeline identify <base64>            1:N search

ENVIRONMENT VARIABLES:
    RIDGELINE_LOG=debug                    Log filter (default: info)
    RIDGELINE_MATCH_THRESHOLD=45           Accept threshold (0-100)
    RIDGELINE_FORCE_FALLBACK=false         Allow the native matcher
    RIDGELINE_DRIVER_PATH=/opt/libzkfp.so  Driver library override
    RIDGELINE_CAPTURE_TIMEOUT_MS=8000      Capture deadline
    RIDGELINE_STORE_PATH=./templates.json  Template store location

FILES:
    ~/.config/ridgeline/config.json        Engine configuration
    ~/.config/ridgeline/templates.json     Template store

Each invocation opens the scanner on demand and releases it on exit.")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to the config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Template store file, overriding the configuration
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Driver, device and matcher diagnostics
    Status,

    /// Show the resolved configuration
    Config,

    /// Scanner control
    #[command(subcommand, about = "Open the scanner")]
    Device(DeviceCommands),

    /// Capture one template from the scanner
    Capture {
        /// Capture deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Subject registry management
    #[command(subcommand, about = "Manage the subject registry")]
    Subjects(SubjectCommands),

    /// Enroll a single template for a subject
    Enroll { subject: String, template: String },

    /// Merge several samples and enroll the result
    EnrollSamples {
        subject: String,
        #[arg(required = true)]
        samples: Vec<String>,
    },

    /// Compare a template with a subject's enrolled template
    Verify { subject: String, template: String },

    /// Find the enrolled subject that best matches a template
    Identify { template: String },
}

#[derive(Subcommand)]
pub enum DeviceCommands {
    /// Open the scanner and report its geometry and capabilities.
    ///
    /// The scanner is released when the command exits.
    Open,
}

#[derive(Subcommand)]
pub enum SubjectCommands {
    /// Register a subject so templates can be enrolled for it
    Add { subject: String },
    /// List registered subjects
    List,
}

pub fn run_cli(cli: &Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(store) = &cli.store {
        config.store_path = Some(store.clone());
    }

    match &cli.command {
        Commands::Config => print_json(&config),
        Commands::Subjects(sub) => cmd_subjects(&config, sub),
        cmd => {
            let store = JsonTemplateStore::new(config.resolved_store_path());
            debug!(path = ?store.path(), "Using template store");
            let service = BiometricService::new(store, config);
            execute_command(&service, cmd)
        }
    }
}

fn execute_command(service: &BiometricService<JsonTemplateStore>, cmd: &Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Status => print_json(&service.diagnostics()),
        Commands::Device(sub) => cmd_device(service, sub),
        Commands::Capture { timeout_ms } => {
            let captured = service.capture(timeout_ms.map(Duration::from_millis))?;
            print_json(&captured)
        }
        Commands::Enroll { subject, template } => print_json(&service.enroll(subject, template)?),
        Commands::EnrollSamples { subject, samples } => {
            print_json(&service.enroll_samples(subject, samples)?)
        }
        Commands::Verify { subject, template } => print_json(&service.verify(subject, template)?),
        Commands::Identify { template } => print_json(&service.identify(template)?),
        Commands::Config | Commands::Subjects(_) => Ok(()),
    }
}

// ============================================================================
// Device Commands
// ============================================================================

fn cmd_device(
    service: &BiometricService<JsonTemplateStore>,
    cmd: &DeviceCommands,
) -> anyhow::Result<()> {
    match cmd {
        DeviceCommands::Open => {
            let status = service.open_device()?;
            service.terminate_device();
            print_json(&status)
        }
    }
}

// ============================================================================
// Subject Commands
// ============================================================================

fn cmd_subjects(config: &EngineConfig, cmd: &SubjectCommands) -> anyhow::Result<()> {
    let store = JsonTemplateStore::new(config.resolved_store_path());
    match cmd {
        SubjectCommands::Add { subject } => {
            let added = store.register_subject(subject)?;
            print_json(&serde_json::json!({ "subject_id": subject, "added": added }))
        }
        SubjectCommands::List => {
            let rows: Vec<SubjectRow> = store
                .subject_listing()?
                .into_iter()
                .map(|(subject_id, enrolled)| SubjectRow { subject_id, enrolled })
                .collect();
            print_json(&rows)
        }
    }
}

#[derive(Serialize)]
struct SubjectRow {
    subject_id: String,
    enrolled: bool,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
