//! sandtrap: QEMU-backed malware analysis sandbox.
//!
//! Boots a disguised guest, restores it to a clean snapshot, stages a
//! sample into it over an agent RPC channel, and folds the resulting
//! dynamic report into a deterministic verdict.
//!
//! # Example
//!
//! ```no_run
//! use sandtrap::config::Config;
//! use sandtrap::profile::{Arch, GuestProfile, HardwareMask};
//! use sandtrap::vmm::Supervisor;
//! use sandtrap::task::{AnalysisTask, AnalysisRequest};
//! use sandtrap::scorer::StaticEvidence;
//! use std::time::Duration;
//!
//! # async fn run() -> sandtrap::error::Result<()> {
//! let yaml = r#"
//! images_dir: /var/lib/sandtrap/images
//! sockets_dir: /tmp/sandtrap
//! architectures:
//!   x64:
//!     image: /var/lib/sandtrap/images/win10-x64.qcow2
//!     ram: 2048
//!     cpus: 2
//!     snapshot: clean
//! anti_vm:
//!   smbios_profile: dell_optiplex
//! "#;
//! let config = Config::from_yaml_str(yaml)?;
//! let supervisor = Supervisor::new(&config.sockets_dir);
//!
//! let profile = GuestProfile {
//!     name: "win10-x64".into(),
//!     arch: Arch::X64,
//!     disk_image: config.arch_config(Arch::X64).unwrap().image.clone(),
//!     ram_mib: 2048,
//!     cpus: 2,
//!     snapshot_name: "clean".into(),
//!     boot_timeout: Duration::from_secs(30),
//!     analysis_timeout: Duration::from_secs(60),
//! };
//! let vendor = sandtrap::antivm::profiles::lookup("dell_optiplex").unwrap();
//! let mask = sandtrap::antivm::mask::build_mask(&mut rand::thread_rng(), vendor, 2_400_000_000, None, None)?;
//!
//! let task = AnalysisTask::new(&supervisor, &config);
//! task.ensure_launched(profile, mask).await?;
//! let outcome = task
//!     .run(AnalysisRequest {
//!         instance_name: "win10-x64".into(),
//!         sample_path: "/tmp/sample.py".into(),
//!         static_evidence: StaticEvidence::empty(),
//!     })
//!     .await?;
//! println!("{:?}", outcome.verdict);
//! # Ok(())
//! # }
//! ```

pub mod agent_client;
pub mod antivm;
pub mod config;
pub mod control;
pub mod error;
pub mod observe;
pub mod profile;
pub mod scorer;
pub mod task;
pub mod vmm;

pub use error::{Error, Result};
