//! Pre-script orchestrator
//!
//! measure -> allocate -> validate -> render -> execute, stopping at the
//! first failure. Nothing touches the disk until the whole plan has been
//! computed and validated.

use crate::config::KickstartConfig;
use crate::disk::detection::{usable_disk_space, DiskInspector, Firmware};
use crate::disk::formatting::{prepare_unmanaged_filesystems, render_filesystem_commands};
use crate::disk::layouts::{compute_schema, AllocationParams, PartitionSchema};
use crate::disk::lvm::volume_group_shortfall_mib;
use crate::disk::partitioning::{
    apply_partitions, init_disk, label_command, render_partition_commands, zero_disk,
    zero_disk_commands,
};
use crate::disk::validation::validate_schema;
use crate::kickstart::network::{render_hostname_file, write_hostname_file};
use crate::kickstart::packages::{render_packages_file, write_packages_file};
use crate::kickstart::partitions::{render_partitions_file, write_partitions_file};
use crate::kickstart::users::{render_users_file, write_users_file};
use crate::utils::command::{CommandRunner, ShellCommand};
use crate::utils::deps::{ensure_dependencies, required_binaries};
use crate::utils::error::{InPhase, KickstartError, Phase, PhaseError};
use crate::utils::signal;
use serde::Serialize;
use tracing::{info, warn};

/// Everything needed to partition the disk and feed the installer
#[derive(Debug, Clone, Serialize)]
pub struct InstallPlan {
    pub device: String,
    pub firmware: Firmware,
    pub is_virtual: bool,
    pub disk_mb: u64,
    pub usable_mb: u64,
    pub schema: PartitionSchema,
    pub partition_commands: Vec<ShellCommand>,
    pub filesystem_commands: Vec<ShellCommand>,
    pub partitions_file: String,
    pub packages_file: String,
    pub hostname_file: String,
    pub users_file: String,
}

impl InstallPlan {
    /// Every destructive command in execution order
    pub fn disk_commands(&self) -> Vec<ShellCommand> {
        let mut commands = zero_disk_commands(&self.device);
        commands.push(label_command(&self.device, self.firmware));
        commands.extend(self.partition_commands.iter().cloned());
        commands.extend(self.filesystem_commands.iter().cloned());
        commands
    }
}

/// Main pre-script struct
pub struct Installer<I: DiskInspector> {
    config: KickstartConfig,
    inspector: I,
    cmd: CommandRunner,
}

impl<I: DiskInspector> Installer<I> {
    pub fn new(config: KickstartConfig, inspector: I, dry_run: bool) -> Self {
        Self {
            config,
            inspector,
            cmd: CommandRunner::new(dry_run),
        }
    }

    /// Measure the machine and compute the full plan without side effects
    pub fn plan(&self) -> Result<InstallPlan, PhaseError> {
        let config = &self.config;
        info!(
            "Planning target {} (LVM {})",
            config.target,
            if config.lvm { "enabled" } else { "disabled" }
        );

        config.validate().in_phase(Phase::Target)?;
        let requests = config.requests();

        let firmware = self.inspector.firmware();
        let is_virtual = self.inspector.is_virtual();
        let device = self.inspector.target_disk().in_phase(Phase::DiskDetection)?;
        let disk_mb = self
            .inspector
            .disk_size_mb(&device)
            .in_phase(Phase::DiskSize)?;
        let usable_mb =
            usable_disk_space(disk_mb, is_virtual, config.disk.physical_reserve_percent);

        let memory_mb = self.inspector.memory_mb().in_phase(Phase::Schema)?;
        let params = AllocationParams {
            usable_mb,
            firmware,
            memory_mb,
            lvm: config.lvm,
        };
        let schema = compute_schema(&requests, &params, &config.disk).in_phase(Phase::Schema)?;

        validate_schema(&schema, usable_mb).in_phase(Phase::Validation)?;

        let partition_commands = render_partition_commands(&device, &schema, usable_mb);
        let filesystem_commands =
            render_filesystem_commands(&device, &schema).in_phase(Phase::Filesystems)?;
        let partitions_file = render_partitions_file(&device, &schema, &config.disk);

        if schema.is_lvm() {
            let physical_mb: u64 = schema.partitions().iter().map(|p| p.size_mb).sum();
            let volumes_mb: u64 = schema.volumes().iter().map(|v| v.size_mb).sum();
            let pv_mb = usable_mb.saturating_sub(physical_mb);
            let shortfall = volume_group_shortfall_mib(volumes_mb, pv_mb, config.disk.pe_size);
            if let Some(over) = shortfall {
                warn!(
                    "Logical volumes need {} MiB more than volume group {} will hold",
                    over, config.disk.volume_group
                );
            }
        }

        Ok(InstallPlan {
            packages_file: render_packages_file(&config.packages, is_virtual),
            hostname_file: render_hostname_file(&config.hostname, is_virtual),
            users_file: render_users_file(&config.users),
            device,
            firmware,
            is_virtual,
            disk_mb,
            usable_mb,
            schema,
            partition_commands,
            filesystem_commands,
            partitions_file,
        })
    }

    /// Run the full pre-script
    pub fn run(self) -> Result<InstallPlan, PhaseError> {
        if self.cmd.is_dry_run() {
            info!("Running in dry-run mode - disk commands will only be logged");
        }

        let plan = self.plan()?;
        self.execute(&plan)?;

        info!("Pre-script finished for {}", plan.device);
        Ok(plan)
    }

    /// Apply a computed plan: disk changes first, installer files last
    pub fn execute(&self, plan: &InstallPlan) -> Result<(), PhaseError> {
        let device = plan.device.as_str();
        let output = &self.config.output;

        let required = required_binaries(&plan.disk_commands());
        ensure_dependencies(&self.cmd, &required).in_phase(Phase::ZeroDisk)?;

        // Last point where stopping leaves the disk untouched. A dry run
        // never touches it, so it stays interruptible throughout.
        let proceed = if self.cmd.is_dry_run() {
            !signal::is_interrupted()
        } else {
            signal::enter_destructive_phase()
        };
        if !proceed {
            return Err(KickstartError::Interrupted).in_phase(Phase::ZeroDisk);
        }

        info!("[1/4] Preparing {}", device);
        zero_disk(&self.cmd, device).in_phase(Phase::ZeroDisk)?;
        init_disk(&self.cmd, device, plan.firmware).in_phase(Phase::DiskLabel)?;

        info!("[2/4] Partitioning {}", device);
        apply_partitions(
            &self.cmd,
            device,
            &plan.partition_commands,
            self.config.disk.settle_seconds,
        )
        .in_phase(Phase::Partitioning)?;

        info!("[3/4] Creating filesystems not managed by the installer");
        prepare_unmanaged_filesystems(&self.cmd, &plan.filesystem_commands)
            .in_phase(Phase::Filesystems)?;

        info!("[4/4] Writing installer files");
        write_partitions_file(&output.partitions, &plan.partitions_file)
            .in_phase(Phase::PartitionsFile)?;
        write_packages_file(&output.packages, &plan.packages_file)
            .in_phase(Phase::PackagesFile)?;
        write_hostname_file(&output.hostname, &plan.hostname_file)
            .in_phase(Phase::HostnameFile)?;
        write_users_file(&output.users, &plan.users_file).in_phase(Phase::UsersFile)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PartitionRequest, RequestSize, Target};
    use crate::disk::detection::FixedInspector;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> KickstartConfig {
        let mut cfg = KickstartConfig::default();
        let path = |name: &str| dir.path().join(name).to_string_lossy().to_string();
        cfg.output.partitions = path("partitions");
        cfg.output.packages = path("packages");
        cfg.output.hostname = path("hostname");
        cfg.output.users = path("users");
        cfg.disk.settle_seconds = 0;
        cfg
    }

    fn data_config(dir: &TempDir) -> KickstartConfig {
        let mut cfg = config_in(dir);
        cfg.target = Target::Custom;
        cfg.partitions = vec![
            PartitionRequest::new(RequestSize::Fixed(5120), "xfs", Some("/")),
            PartitionRequest::new(RequestSize::Fill, "xfs", Some("/data")),
        ];
        cfg
    }

    #[test]
    fn dry_run_writes_installer_files() {
        let dir = TempDir::new().unwrap();
        let cfg = data_config(&dir);
        let inspector = FixedInspector::new(20002, 8192, Firmware::Gpt);

        let plan = Installer::new(cfg.clone(), inspector, true).run().unwrap();

        assert_eq!(plan.usable_mb, 20000);
        assert_eq!(plan.schema.total_mb(), 20000);

        let partitions = fs::read_to_string(&cfg.output.partitions).unwrap();
        assert!(partitions.contains("part /data --fstype xfs --onpart=/dev/vda4\n"));
        let packages = fs::read_to_string(&cfg.output.packages).unwrap();
        assert!(packages.starts_with("-linux-firmware\n"));
        let hostname = fs::read_to_string(&cfg.output.hostname).unwrap();
        assert_eq!(hostname, "network --hostname=vmv43.npf.local\n");
        let users = fs::read_to_string(&cfg.output.users).unwrap();
        assert!(users.starts_with("rootpw --iscrypted $6$"));

        assert!(!signal::in_destructive_phase());
    }

    #[test]
    fn plan_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let cfg = data_config(&dir);
        let installer = Installer::new(cfg, FixedInspector::new(20002, 8192, Firmware::Gpt), true);
        let a = installer.plan().unwrap();
        let b = installer.plan().unwrap();
        assert_eq!(a.partitions_file, b.partitions_file);
        assert_eq!(a.partition_commands, b.partition_commands);
        assert_eq!(a.filesystem_commands, b.filesystem_commands);
    }

    #[test]
    fn overcommitted_percentages_stop_before_rendering() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config_in(&dir);
        cfg.target = Target::Custom;
        cfg.partitions = vec![PartitionRequest::new(
            RequestSize::Percent(150),
            "xfs",
            Some("/"),
        )];
        let err = Installer::new(cfg.clone(), FixedInspector::new(20002, 8192, Firmware::Gpt), true)
            .run()
            .unwrap_err();
        assert_eq!(err.phase, Phase::Schema);
        assert_eq!(err.exit_code(), 4);
        assert!(!std::path::Path::new(&cfg.output.partitions).exists());
    }

    #[test]
    fn mbr_guard_exits_with_schema_code() {
        let dir = TempDir::new().unwrap();
        let cfg = config_in(&dir);
        // default anssi target has 7 requests
        let err = Installer::new(cfg, FixedInspector::new(500_000, 8192, Firmware::Mbr), true)
            .plan()
            .unwrap_err();
        assert!(matches!(
            err.source,
            KickstartError::MbrPartitionLimit { requested: 7 }
        ));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn disk_too_small_fails_allocation() {
        let dir = TempDir::new().unwrap();
        let cfg = data_config(&dir);
        let err = Installer::new(cfg, FixedInspector::new(8000, 8192, Firmware::Gpt), true)
            .plan()
            .unwrap_err();
        assert_eq!(err.phase, Phase::Schema);
    }

    #[test]
    fn absurd_configured_size_is_a_schema_error() {
        let dir = TempDir::new().unwrap();
        let mut cfg = KickstartConfig::from_toml(
            r#"
            target = "custom"

            [[partitions]]
            size = 9223372036854775807
            fs = "xfs"
            mountpoint = "/"

            [[partitions]]
            size = true
            fs = "xfs"
            mountpoint = "/data"
            "#,
        )
        .unwrap();
        cfg.output = config_in(&dir).output;
        let err = Installer::new(cfg, FixedInspector::new(20002, 8192, Firmware::Gpt), true)
            .plan()
            .unwrap_err();
        assert_eq!(err.phase, Phase::Schema);
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn oversized_fixed_schema_fails_validation() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config_in(&dir);
        cfg.target = Target::Custom;
        cfg.partitions = vec![PartitionRequest::new(
            RequestSize::Fixed(50_000),
            "xfs",
            Some("/"),
        )];
        let err = Installer::new(cfg, FixedInspector::new(20002, 8192, Firmware::Gpt), true)
            .plan()
            .unwrap_err();
        assert_eq!(err.phase, Phase::Validation);
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn unknown_disk_is_a_detection_error() {
        let dir = TempDir::new().unwrap();
        let cfg = data_config(&dir);
        let inspector = FixedInspector::new(20002, 8192, Firmware::Gpt);
        struct Missing(FixedInspector);
        impl DiskInspector for Missing {
            fn memory_mb(&self) -> crate::utils::error::Result<u64> {
                self.0.memory_mb()
            }
            fn firmware(&self) -> Firmware {
                self.0.firmware()
            }
            fn is_virtual(&self) -> bool {
                self.0.is_virtual()
            }
            fn target_disk(&self) -> crate::utils::error::Result<String> {
                Err(KickstartError::DeviceNotFound("no disk".to_string()))
            }
            fn disk_size_mb(&self, disk: &str) -> crate::utils::error::Result<u64> {
                self.0.disk_size_mb(disk)
            }
        }
        let err = Installer::new(cfg, Missing(inspector), true).plan().unwrap_err();
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn physical_machine_keeps_reserve_and_formats_state_partition() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config_in(&dir);
        cfg.target = Target::HvStateless;
        let inspector = FixedInspector::new(200_002, 32768, Firmware::Gpt)
            .physical()
            .with_disk("/dev/sda");
        let plan = Installer::new(cfg, inspector, true).plan().unwrap();

        assert_eq!(plan.usable_mb, 190_000);
        let fs: Vec<String> = plan
            .filesystem_commands
            .iter()
            .map(|c| c.to_string())
            .collect();
        // efi, boot, /, images, STATEFULRW -> 5th partition
        assert_eq!(
            fs,
            vec!["mkfs.xfs -f /dev/sda5", "xfs_admin -L STATEFULRW /dev/sda5"]
        );
        assert_eq!(plan.packages_file, "lm_sensors\nsmartmontools\n");
    }

    #[test]
    fn lvm_plan_uses_single_physical_volume() {
        let dir = TempDir::new().unwrap();
        let mut cfg = data_config(&dir);
        cfg.lvm = true;
        let plan = Installer::new(cfg, FixedInspector::new(20002, 8192, Firmware::Gpt), true)
            .plan()
            .unwrap();
        assert!(plan.schema.is_lvm());
        assert_eq!(plan.partition_commands.len(), 4);
        assert!(plan.partitions_file.contains("volgroup vg00 --pesize=4096 PVGroup\n"));
        assert!(plan.filesystem_commands.is_empty());
    }
}
