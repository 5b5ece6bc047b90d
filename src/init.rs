use std::path::Path;

use crate::error::KvmError;

/// Starter declaration batch written by `kvmcli init`.
pub const TEMPLATE: &str = r#"version: 1.0
vms:
  - info:
      name: "<NODE NAME>"
      image: rocky9.1
      ram: 1536
      cpus: 1
      os: rocky9
    network:
      interface:
        bridge: virbr1
        mac_address: "02:A3:10:00:00:XX"
    storage:
      disk:
        size: 30
        type: SSD
        format: qcow2
"#;

/// Write the template to `path`. An existing file is left untouched and
/// `Ok(false)` is returned.
pub fn write_template(path: &Path) -> Result<bool, KvmError> {
    if path.exists() {
        tracing::warn!(path = %path.display(), "template already exists");
        return Ok(false);
    }
    std::fs::write(path, TEMPLATE).map_err(|e| KvmError::Io {
        context: format!("writing template {}", path.display()),
        source: e,
    })?;
    tracing::info!(path = %path.display(), "template created");
    Ok(true)
}

pub fn run(path: &Path) -> Result<(), KvmError> {
    if write_template(path)? {
        println!("Template file `{}` created.", path.display());
    } else {
        println!("`{}` already exists, left unchanged.", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::parse_batch;

    #[test]
    fn template_is_a_valid_batch() {
        let batch = parse_batch(TEMPLATE, Path::new("template.yml")).unwrap();
        assert_eq!(batch.vms.len(), 1);
        let vm = &batch.vms[0];
        assert_eq!(vm.info.image.as_deref(), Some("rocky9.1"));
        assert_eq!(vm.disk_format(), Some("qcow2"));
        assert_eq!(vm.network.interface.mac_address.as_deref(), Some("02:A3:10:00:00:XX"));
    }

    #[test]
    fn existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.yml");
        std::fs::write(&path, "vms: []\n").unwrap();

        assert!(!write_template(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "vms: []\n");
    }

    #[test]
    fn writes_new_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.yml");

        assert!(write_template(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), TEMPLATE);
    }
}
