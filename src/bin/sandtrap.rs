//! `sandtrap`: submit a file to a disposable guest and print its verdict.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, warn};

use sandtrap::antivm::profiles;
use sandtrap::config::Config;
use sandtrap::error::Result;
use sandtrap::observe::init_logging;
use sandtrap::profile::{Arch, GuestProfile, HardwareMask};
use sandtrap::scorer::StaticEvidence;
use sandtrap::task::{AnalysisRequest, AnalysisTask};
use sandtrap::vmm::Supervisor;

#[derive(Parser)]
#[command(name = "sandtrap", version, about = "QEMU-backed malware analysis sandbox")]
struct Cli {
    /// Path to the YAML configuration document (§6).
    #[arg(long, env = "SANDTRAP_CONFIG")]
    config: PathBuf,

    /// Guest architecture key as it appears under `architectures` in the config.
    #[arg(long, default_value = "x64")]
    arch: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Boot the guest, submit a sample, print the resulting verdict.
    Analyze {
        sample_path: PathBuf,
        #[arg(long, default_value = "sandtrap-0")]
        instance: String,
    },
    /// Boot the guest and leave it running.
    Launch {
        #[arg(long, default_value = "sandtrap-0")]
        instance: String,
    },
    /// Stop a running instance.
    Stop {
        #[arg(long, default_value = "sandtrap-0")]
        instance: String,
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        let api_error = sandtrap::error::ApiError::from(&e);
        eprintln!("{}", api_error.to_json());
        error!(error = %e, "sandtrap exited with an error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let yaml = std::fs::read_to_string(&cli.config).map_err(sandtrap::error::Error::Io)?;
    let config = Config::from_yaml_str(&yaml)?;
    let supervisor = Arc::new(Supervisor::new(&config.sockets_dir));
    let _shutdown_guard = spawn_shutdown_watcher(supervisor.clone())?;

    match cli.command {
        Command::Analyze { sample_path, instance } => {
            let task = AnalysisTask::new(supervisor.as_ref(), &config);
            let profile = build_profile(&config, &cli.arch, &instance)?;
            let mask = build_mask(&config)?;
            task.ensure_launched(profile, mask).await?;

            let outcome = task
                .run(AnalysisRequest {
                    instance_name: instance,
                    sample_path,
                    static_evidence: StaticEvidence::empty(),
                })
                .await?;

            println!("{}", serde_json::to_string_pretty(&outcome.verdict).unwrap_or_default());
            println!("{}", serde_json::to_string_pretty(&outcome.report).unwrap_or_default());
        }
        Command::Launch { instance } => {
            let profile = build_profile(&config, &cli.arch, &instance)?;
            let timeout = profile.boot_timeout;
            let mask = build_mask(&config)?;
            supervisor.launch(profile, mask).await?;
            println!(
                "launched '{instance}' (boot timeout {})",
                humantime::format_duration(timeout)
            );
        }
        Command::Stop { instance, force } => {
            supervisor.stop(&instance, force).await?;
            println!("stopped '{instance}'");
        }
    }
    Ok(())
}

/// Watches for SIGINT/SIGTERM and powers down every tracked instance before
/// the process exits, so a killed CLI invocation never leaves an orphaned
/// QEMU child behind (§4.2: "no child survives the supervisor").
fn spawn_shutdown_watcher(supervisor: Arc<Supervisor>) -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(sig, flag.clone()).map_err(sandtrap::error::Error::Io)?;
    }
    let watch_flag = flag.clone();
    tokio::spawn(async move {
        loop {
            if watch_flag.load(Ordering::Relaxed) {
                warn!("received shutdown signal, stopping all instances");
                supervisor.stop_all().await;
                std::process::exit(130);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    });
    Ok(flag)
}

fn build_profile(config: &Config, arch_key: &str, instance: &str) -> Result<GuestProfile> {
    let arch: Arch = arch_key.parse()?;
    let arch_config = config
        .arch_config(arch)
        .ok_or_else(|| sandtrap::error::Error::InvalidProfile(format!("no configuration for architecture '{arch_key}'")))?;

    Ok(GuestProfile {
        name: instance.to_string(),
        arch,
        disk_image: arch_config.image.clone(),
        ram_mib: arch_config.ram,
        cpus: arch_config.cpus,
        snapshot_name: arch_config.snapshot.clone(),
        boot_timeout: Duration::from_secs(config.timeouts.boot_secs),
        analysis_timeout: Duration::from_secs(config.timeouts.analysis_secs),
    })
}

fn build_mask(config: &Config) -> Result<HardwareMask> {
    let vendor = profiles::lookup(&config.anti_vm.smbios_profile)
        .ok_or_else(|| sandtrap::error::Error::InvalidProfile(format!("unknown smbios profile '{}'", config.anti_vm.smbios_profile)))?;
    let mut rng = rand::thread_rng();
    let mut mask = sandtrap::antivm::build_mask(
        &mut rng,
        vendor,
        2_400_000_000,
        config.anti_vm.mac_prefix.as_deref(),
        config.anti_vm.disk_serial_prefix.as_deref(),
    )?;
    mask.hide_hypervisor_bit = config.anti_vm.hide_hypervisor;
    mask.hide_paravirt_features = config.anti_vm.hide_hypervisor;
    mask.stabilize_tsc = config.anti_vm.stabilize_tsc;
    mask.disable_hpet = config.anti_vm.stabilize_tsc;
    Ok(mask)
}
