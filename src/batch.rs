//! Drives a whole batch: resolve, stage, hand off, one VM at a time or a few
//! in parallel. A failure is scoped to its VM; only a missing images
//! directory stops the run.

use futures_util::{StreamExt, stream};
use indicatif::MultiProgress;

use crate::config::GlobalDefaults;
use crate::declaration::{Batch, VmDeclaration};
use crate::error::KvmError;
use crate::provision;
use crate::resolve::{ResolvedVmSpec, SpecResolver};
use crate::stage::{ImageStager, StageOutcome, StagingResult};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// VMs processed concurrently. Output order is batch order regardless.
    pub jobs: usize,
    /// Run the provisioning tool once the image is staged.
    pub provision: bool,
    pub virt_install: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            provision: true,
            virt_install: provision::VIRT_INSTALL.into(),
        }
    }
}

#[derive(Debug)]
pub struct VmOutcome {
    pub index: usize,
    pub name: String,
    pub status: VmStatus,
}

#[derive(Debug)]
pub enum VmStatus {
    /// `info.ignore` was set.
    Ignored,
    Unresolved(KvmError),
    /// Image not staged; the provisioning step was skipped.
    StagingSkipped {
        spec: ResolvedVmSpec,
        staging: StagingResult,
        reason: KvmError,
    },
    /// Image in place, provisioning not requested.
    Staged {
        spec: ResolvedVmSpec,
        staging: StagingResult,
    },
    Provisioned {
        spec: ResolvedVmSpec,
        staging: StagingResult,
    },
    ProvisionFailed {
        spec: ResolvedVmSpec,
        staging: StagingResult,
        error: KvmError,
    },
}

impl VmStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Unresolved(_) => "unresolved",
            Self::StagingSkipped {
                reason: KvmError::Exists { .. },
                ..
            } => "already staged",
            Self::StagingSkipped { .. } => "not staged",
            Self::Staged { .. } => "staged",
            Self::Provisioned { .. } => "provisioned",
            Self::ProvisionFailed { .. } => "provision failed",
        }
    }
}

impl VmOutcome {
    pub fn spec(&self) -> Option<&ResolvedVmSpec> {
        match &self.status {
            VmStatus::StagingSkipped { spec, .. }
            | VmStatus::Staged { spec, .. }
            | VmStatus::Provisioned { spec, .. }
            | VmStatus::ProvisionFailed { spec, .. } => Some(spec),
            VmStatus::Ignored | VmStatus::Unresolved(_) => None,
        }
    }

    pub fn staging(&self) -> Option<&StagingResult> {
        match &self.status {
            VmStatus::StagingSkipped { staging, .. }
            | VmStatus::Staged { staging, .. }
            | VmStatus::Provisioned { staging, .. }
            | VmStatus::ProvisionFailed { staging, .. } => Some(staging),
            VmStatus::Ignored | VmStatus::Unresolved(_) => None,
        }
    }

    pub fn error(&self) -> Option<&KvmError> {
        match &self.status {
            VmStatus::Unresolved(e)
            | VmStatus::StagingSkipped { reason: e, .. }
            | VmStatus::ProvisionFailed { error: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Counts against the run. An already staged image does not: re-running
    /// a partially provisioned batch is normal.
    pub fn is_failure(&self) -> bool {
        match &self.status {
            VmStatus::Unresolved(_) | VmStatus::ProvisionFailed { .. } => true,
            VmStatus::StagingSkipped { reason, .. } => !matches!(reason, KvmError::Exists { .. }),
            _ => false,
        }
    }
}

pub async fn run_batch(
    batch: &Batch,
    defaults: &GlobalDefaults,
    opts: &BatchOptions,
    progress: Option<MultiProgress>,
) -> Result<Vec<VmOutcome>, KvmError> {
    defaults.images_path()?;

    let resolver = SpecResolver::new(defaults);
    let mut stager = ImageStager::new(defaults);
    if let Some(multi) = progress {
        stager = stager.with_progress(multi);
    }

    let outcomes = stream::iter(batch.vms.iter().enumerate())
        .map(|(index, decl)| process_vm(&resolver, &stager, opts, index, decl))
        .buffered(opts.jobs.max(1))
        .collect::<Vec<_>>()
        .await;

    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    tracing::info!(total = outcomes.len(), failed, "batch finished");
    Ok(outcomes)
}

async fn process_vm(
    resolver: &SpecResolver<'_>,
    stager: &ImageStager<'_>,
    opts: &BatchOptions,
    index: usize,
    decl: &VmDeclaration,
) -> VmOutcome {
    let name = resolver.vm_name(index, decl);
    let outcome = |status| VmOutcome {
        index,
        name: name.clone(),
        status,
    };

    if decl.is_ignored() {
        tracing::info!(vm = %name, "ignored");
        return outcome(VmStatus::Ignored);
    }

    let spec = match resolver.resolve(index, decl) {
        Ok(spec) => spec,
        Err(e) => {
            tracing::error!(vm = %name, index, "{e}");
            return outcome(VmStatus::Unresolved(e));
        }
    };

    let StageOutcome { result, error } = stager.stage(&spec.name, decl).await;
    if let Some(reason) = error {
        return outcome(VmStatus::StagingSkipped {
            spec,
            staging: result,
            reason,
        });
    }

    if !opts.provision {
        return outcome(VmStatus::Staged {
            spec,
            staging: result,
        });
    }

    match provision::run_virt_install(&opts.virt_install, &spec).await {
        Ok(()) => outcome(VmStatus::Provisioned {
            spec,
            staging: result,
        }),
        Err(error) => {
            tracing::error!(vm = %name, "{error}");
            outcome(VmStatus::ProvisionFailed {
                spec,
                staging: result,
                error,
            })
        }
    }
}
