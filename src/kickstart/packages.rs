//! Package list adjustments

use crate::config::PackagesConfig;
use crate::kickstart::write_file;
use crate::utils::error::Result;
use tracing::info;

/// Render the package list
///
/// Virtual machines drop firmware and desktop bits (`-pkg`), physical
/// machines gain hardware monitoring tools (`pkg`). When neither applies
/// the file holds a single blank line so the `%include` stays valid.
pub fn render_packages_file(packages: &PackagesConfig, is_virtual: bool) -> String {
    let lines: Vec<String> = if is_virtual && packages.remove_virtual {
        packages
            .virtual_exclude
            .iter()
            .map(|p| format!("-{}", p))
            .collect()
    } else if !is_virtual && packages.add_physical {
        packages.physical.clone()
    } else {
        Vec::new()
    };

    if lines.is_empty() {
        return "\n".to_string();
    }
    lines.iter().map(|l| format!("{}\n", l)).collect()
}

pub fn write_packages_file(path: &str, content: &str) -> Result<()> {
    info!("Setting up package lists in {}", path);
    write_file(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_machines_exclude_firmware() {
        let text = render_packages_file(&PackagesConfig::default(), true);
        assert!(text.starts_with("-linux-firmware\n-a*-firmware\n"));
        assert!(text.ends_with("-pipewire\n"));
    }

    #[test]
    fn physical_machines_add_tools() {
        let text = render_packages_file(&PackagesConfig::default(), false);
        assert_eq!(text, "lm_sensors\nsmartmontools\n");
    }

    #[test]
    fn disabled_policy_writes_blank_line() {
        let packages = PackagesConfig {
            remove_virtual: false,
            ..PackagesConfig::default()
        };
        assert_eq!(render_packages_file(&packages, true), "\n");
    }
}
