//! kspart - kickstart partitioning pre-script
//!
//! Measures the target machine, computes a partition schema for the chosen
//! target, partitions the disk and writes the files the installer includes.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kspart::config::{KickstartConfig, Target};
use kspart::disk::detection::{FixedInspector, Firmware, SystemInspector};
use kspart::disk::layouts::print_schema_summary;
use kspart::install::Installer;
use kspart::utils::error::{InPhase, KickstartError, Phase, PhaseError};
use kspart::utils::signal;

#[derive(Parser)]
#[command(name = "kspart")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Dry run mode - log disk commands instead of running them
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "KSPART_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Default)]
struct Overrides {
    /// Partitioning target (hv, hv-stateless, stateless, generic, anssi, custom)
    #[arg(short, long)]
    target: Option<String>,

    /// Put everything but EFI and /boot in LVM
    #[arg(long)]
    lvm: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition the disk and write the installer files (default)
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Target disk device (e.g., /dev/vda); detected when omitted
        #[arg(short, long)]
        disk: Option<String>,
    },

    /// Compute and print the plan for a hypothetical machine
    Plan {
        #[command(flatten)]
        overrides: Overrides,

        /// Raw disk size in MB
        #[arg(long)]
        disk_size: u64,

        /// Memory in MB
        #[arg(long)]
        memory: u64,

        /// Partition table flavour
        #[arg(long, default_value = "gpt", value_parser = ["gpt", "mbr"])]
        firmware: String,

        /// Plan for a virtual machine (no physical reserve)
        #[arg(long = "virtual")]
        is_virtual: bool,

        /// Device name used in rendered commands
        #[arg(long, default_value = "/dev/vda")]
        device: String,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        config: String,
    },

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "kspart.toml")]
        output: String,
    },

    /// List built-in partitioning targets
    ListTargets,
}

fn init_logging(verbose: bool, log_file: Option<&str>) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let file_layer = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", path, e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                Phase::Target.exit_code()
            } else {
                0
            };
            std::process::exit(code);
        }
    };

    match cli.command {
        Some(Commands::Run { overrides, disk }) => {
            cmd_run(cli.config.as_deref(), &overrides, disk, cli.verbose, cli.dry_run)
        }
        None => cmd_run(
            cli.config.as_deref(),
            &Overrides::default(),
            None,
            cli.verbose,
            cli.dry_run,
        ),
        Some(Commands::Plan {
            overrides,
            disk_size,
            memory,
            firmware,
            is_virtual,
            device,
            json,
        }) => {
            init_logging(cli.verbose, None);
            let firmware = if firmware == "mbr" {
                Firmware::Mbr
            } else {
                Firmware::Gpt
            };
            let mut inspector =
                FixedInspector::new(disk_size, memory, firmware).with_disk(&device);
            if !is_virtual {
                inspector = inspector.physical();
            }
            cmd_plan(cli.config.as_deref(), &overrides, inspector, json)
        }
        Some(Commands::Validate { config }) => {
            init_logging(cli.verbose, None);
            cmd_validate(&config)
        }
        Some(Commands::GenerateConfig { output }) => {
            init_logging(cli.verbose, None);
            cmd_generate_config(&output)
        }
        Some(Commands::ListTargets) => {
            cmd_list_targets();
            Ok(())
        }
    }
}

/// Load the configuration and apply command line overrides
fn load_config(
    path: Option<&str>,
    overrides: &Overrides,
) -> kspart::utils::error::Result<KickstartConfig> {
    let mut config = match path {
        Some(path) => {
            info!("Loading configuration from {}", path);
            KickstartConfig::from_file(path)?
        }
        None => KickstartConfig::default(),
    };

    if let Some(ref target) = overrides.target {
        config.target = target.parse()?;
    }
    if overrides.lvm {
        config.lvm = true;
    }
    Ok(config)
}

/// Log the failure and leave with the phase's exit code
fn exit_with(err: PhaseError) -> ! {
    error!("{}", err);
    std::process::exit(err.exit_code());
}

fn cmd_run(
    config_path: Option<&str>,
    overrides: &Overrides,
    disk: Option<String>,
    verbose: bool,
    dry_run: bool,
) -> Result<()> {
    // The log file location lives in the config, so read it before logging
    let loaded = load_config(config_path, overrides);
    let log_file = loaded
        .as_ref()
        .map(|c| c.output.log_file.clone())
        .unwrap_or_else(|_| KickstartConfig::default().output.log_file);
    init_logging(verbose, Some(&log_file));

    let mut config = match loaded.in_phase(Phase::Target) {
        Ok(config) => config,
        Err(err) => exit_with(err),
    };
    if disk.is_some() {
        config.device = disk;
    }

    if !dry_run && !nix::unistd::geteuid().is_root() {
        exit_with(PhaseError {
            phase: Phase::ZeroDisk,
            source: KickstartError::NotRoot,
        });
    }

    signal::install_signal_handlers();

    let inspector = SystemInspector::new(config.device.clone());
    match Installer::new(config, inspector, dry_run).run() {
        Ok(_) => Ok(()),
        Err(err) => exit_with(err),
    }
}

fn cmd_plan(
    config_path: Option<&str>,
    overrides: &Overrides,
    inspector: FixedInspector,
    json: bool,
) -> Result<()> {
    let config = match load_config(config_path, overrides).in_phase(Phase::Target) {
        Ok(config) => config,
        Err(err) => exit_with(err),
    };

    let plan = match Installer::new(config, inspector, true).plan() {
        Ok(plan) => plan,
        Err(err) => exit_with(err),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    print_schema_summary(&plan.schema, plan.usable_mb);

    println!("Disk commands:");
    for command in plan.disk_commands() {
        println!("  {}", command);
    }
    if plan.filesystem_commands.is_empty() {
        warn!("No filesystem is left to set up outside the installer");
    }

    println!("\nPartitions file:");
    print!("{}", plan.partitions_file);
    Ok(())
}

fn cmd_validate(config_path: &str) -> Result<()> {
    let config = KickstartConfig::from_file(config_path)?;
    config.validate()?;
    println!(
        "✓ Configuration is valid (target {}, {} partition requests)",
        config.target,
        config.requests().len()
    );
    Ok(())
}

fn cmd_generate_config(output: &str) -> Result<()> {
    let sample = KickstartConfig::sample();
    let content = toml::to_string_pretty(&sample)?;
    std::fs::write(output, content)?;
    println!("✓ Sample configuration written to {}", output);
    Ok(())
}

fn cmd_list_targets() {
    println!("{:<14} {}", "TARGET", "DESCRIPTION");
    println!("{}", "-".repeat(60));
    for target in Target::ALL {
        println!("{:<14} {}", target.name(), target.description());
    }
}
