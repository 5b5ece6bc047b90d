//! Hand-off to the external `virt-install` tool.

use std::collections::BTreeMap;

use facet::Facet;
use facet_value::Value;

use crate::batch::{VmOutcome, VmStatus};
use crate::error::KvmError;
use crate::resolve::ResolvedVmSpec;

pub const VIRT_INSTALL: &str = "virt-install";

/// `<program> --name ... --connect qemu:///system`
pub fn virt_install_command(program: &str, spec: &ResolvedVmSpec) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(spec.argv());
    cmd
}

pub async fn run_virt_install(program: &str, spec: &ResolvedVmSpec) -> Result<(), KvmError> {
    tracing::info!(vm = %spec.name, disk = %spec.disk_path.display(), "running {program}");

    let output = virt_install_command(program, spec)
        .output()
        .await
        .map_err(|e| KvmError::Io {
            context: format!("running {program}"),
            source: e,
        })?;

    if !output.status.success() {
        return Err(KvmError::ExternalCommand {
            command: program.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    tracing::info!(vm = %spec.name, "domain created");
    Ok(())
}

/// What one VM hands to the downstream tools, as emitted by `apply --json`.
#[derive(Debug, Facet)]
pub struct Handoff {
    pub index: usize,
    pub name: String,
    pub status: String,
    pub args: BTreeMap<String, String>,
    pub disk: Option<String>,
    pub source_image_exists: bool,
    pub dest_existed_before: bool,
    pub dest_image_exists: bool,
    pub error: Option<String>,
    /// Opaque payload for the configuration-management step.
    pub provisioner: Option<Value>,
}

impl Handoff {
    pub fn new(outcome: &VmOutcome, provisioner: Option<Value>) -> Self {
        let args = outcome
            .spec()
            .map(|spec| {
                spec.args()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect()
            })
            .unwrap_or_default();
        let staging = outcome.staging().cloned().unwrap_or_default();

        Self {
            index: outcome.index,
            name: outcome.name.clone(),
            status: outcome.status.label().to_string(),
            args,
            disk: staging.dest_image.map(|p| p.display().to_string()),
            source_image_exists: staging.source_image_exists,
            dest_existed_before: staging.dest_existed_before,
            dest_image_exists: staging.dest_image_exists,
            error: outcome.error().map(ToString::to_string),
            provisioner: match outcome.status {
                VmStatus::Ignored => None,
                _ => provisioner,
            },
        }
    }
}
