//! Hostname directive

use crate::config::HostnameConfig;
use crate::kickstart::write_file;
use crate::utils::error::Result;
use tracing::info;

pub fn render_hostname_file(hostname: &HostnameConfig, is_virtual: bool) -> String {
    let name = if is_virtual {
        &hostname.virtual_machine
    } else {
        &hostname.physical
    };
    format!("network --hostname={}\n", name)
}

pub fn write_hostname_file(path: &str, content: &str) -> Result<()> {
    info!("Setting up hostname in {}", path);
    write_file(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_depends_on_machine_type() {
        let cfg = HostnameConfig::default();
        assert_eq!(
            render_hostname_file(&cfg, true),
            "network --hostname=vmv43.npf.local\n"
        );
        assert_eq!(
            render_hostname_file(&cfg, false),
            "network --hostname=pmv43.npf.local\n"
        );
    }
}
