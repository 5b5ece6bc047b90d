//! Merges one VM declaration with the global defaults into the argument set
//! handed to `virt-install`.
//!
//! Every optional field goes through [`layered`] exactly once: the declared
//! value wins, the configured default fills the gap. `os-variant` is the one
//! exception and falls back to the literal [`FALLBACK_OS_VARIANT`].

use std::path::PathBuf;

use facet_value::Value;

use crate::config::GlobalDefaults;
use crate::declaration::{VmDeclaration, scalar_text};
use crate::error::KvmError;

pub const FALLBACK_OS_VARIANT: &str = "generic";
pub const INTERFACE_MODEL: &str = "virtio";
pub const CONNECT_URI: &str = "qemu:///system";

/// Fully defaulted, invocation-ready description of one VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVmSpec {
    pub name: String,
    /// `bridge=<bridge>,model=virtio,mac=<mac>`
    pub network: String,
    /// `path=<images_path>/<name>.<format>,size=<size>`
    pub disk: String,
    pub disk_path: PathBuf,
    pub ram: String,
    pub vcpus: String,
    pub os_variant: String,
    pub bridge: String,
    pub mac_address: String,
    pub disk_size: String,
    pub sound: String,
    pub rng: String,
    pub virt_type: String,
}

impl ResolvedVmSpec {
    /// Named arguments in `virt-install` order. Empty values are bare flags.
    pub fn args(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("network", self.network.clone()),
            ("disk", self.disk.clone()),
            ("ram", self.ram.clone()),
            ("vcpus", self.vcpus.clone()),
            ("os-variant", self.os_variant.clone()),
            ("sound", self.sound.clone()),
            ("rng", self.rng.clone()),
            ("virt-type", self.virt_type.clone()),
            ("import", String::new()),
            ("wait", "0".into()),
            ("quiet", String::new()),
            ("connect", CONNECT_URI.into()),
        ]
    }

    /// `args()` rendered as command-line flags.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::new();
        for (key, value) in self.args() {
            argv.push(format!("--{key}"));
            if !value.is_empty() {
                argv.push(value);
            }
        }
        argv
    }
}

/// How an absent or malformed declared value is handled.
#[derive(Clone, Copy)]
enum Check {
    /// Any scalar is forwarded verbatim.
    Scalar,
    /// Must parse as a non-negative integer.
    Integer,
}

pub struct SpecResolver<'a> {
    defaults: &'a GlobalDefaults,
}

impl<'a> SpecResolver<'a> {
    pub fn new(defaults: &'a GlobalDefaults) -> Self {
        Self { defaults }
    }

    /// Name used for the VM at `index` (0-based) in its batch.
    ///
    /// Without an explicit `info.name` this is `<image_name>-<index+1>`, so
    /// such names shift when declarations are reordered or inserted.
    pub fn vm_name(&self, index: usize, decl: &VmDeclaration) -> String {
        match decl.explicit_name() {
            Some(name) => name.to_string(),
            None => format!("{}-{}", self.defaults.image_name, index + 1),
        }
    }

    pub fn resolve(&self, index: usize, decl: &VmDeclaration) -> Result<ResolvedVmSpec, KvmError> {
        let d = self.defaults;
        let name = self.vm_name(index, decl);

        let ram = layered(&name, "info.ram", decl.info.ram.as_ref(), &d.ram, Check::Integer)?;
        let vcpus = layered(&name, "info.cpus", decl.info.cpus.as_ref(), &d.cpus, Check::Integer)?;
        let disk_size = layered(
            &name,
            "storage.disk.size",
            decl.storage.disk.size.as_ref(),
            &d.disk_size,
            Check::Scalar,
        )?;
        let bridge = text_or(decl.network.interface.bridge.as_deref(), &d.bridge);
        let mac_address = text_or(decl.network.interface.mac_address.as_deref(), &d.mac_address);
        let os_variant = text_or(decl.info.os.as_deref(), FALLBACK_OS_VARIANT);

        let format = decl.disk_format().ok_or_else(|| KvmError::MissingField {
            vm: name.clone(),
            field: "storage.disk.format",
        })?;
        let disk_path = d.images_path()?.join(format!("{name}.{format}"));

        Ok(ResolvedVmSpec {
            network: format!("bridge={bridge},model={INTERFACE_MODEL},mac={mac_address}"),
            disk: format!("path={},size={disk_size}", disk_path.display()),
            disk_path,
            ram,
            vcpus,
            os_variant,
            bridge,
            mac_address,
            disk_size,
            sound: d.sound.clone(),
            rng: d.rng.clone(),
            virt_type: d.virt_type.clone(),
            name,
        })
    }
}

/// Declared text as written, else the fallback.
fn text_or(declared: Option<&str>, fallback: &str) -> String {
    declared.unwrap_or(fallback).to_string()
}

/// Declared value, else the default, then checked. Integers are rendered
/// back to canonical text.
fn layered(
    vm: &str,
    field: &'static str,
    declared: Option<&Value>,
    default: &str,
    check: Check,
) -> Result<String, KvmError> {
    let text = match declared {
        Some(value) => scalar_text(value).ok_or_else(|| KvmError::InvalidField {
            vm: vm.to_string(),
            field,
            value: "a non-scalar value".into(),
        })?,
        None => default.trim().to_string(),
    };

    match check {
        Check::Scalar => Ok(text),
        Check::Integer => text
            .parse::<u64>()
            .map(|n| n.to_string())
            .map_err(|_| KvmError::InvalidField {
                vm: vm.to_string(),
                field,
                value: format!("'{text}'"),
            }),
    }
}
