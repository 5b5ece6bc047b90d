//! Places a VM's disk image in the images directory, copying it from the
//! artifact store at most once.
//!
//! The decision ([`plan`]) is pure and works on a [`StagingProbe`] snapshot of
//! the filesystem; [`ImageStager::stage`] gathers the probe, acts on the plan
//! and re-reads the filesystem afterwards for the reported flags.

use std::path::{Path, PathBuf};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::GlobalDefaults;
use crate::declaration::VmDeclaration;
use crate::error::KvmError;

const COPY_BUF_SIZE: usize = 1024 * 1024;

/// Reported to the caller after every staging attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingResult {
    /// Set only when the image is in place and usable.
    pub dest_image: Option<PathBuf>,
    pub source_image_exists: bool,
    pub dest_existed_before: bool,
    pub dest_image_exists: bool,
}

#[derive(Debug)]
pub struct StageOutcome {
    pub result: StagingResult,
    pub error: Option<KvmError>,
}

impl StageOutcome {
    fn failed(error: KvmError) -> Self {
        Self {
            result: StagingResult::default(),
            error: Some(error),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.error.is_none() && self.result.dest_image.is_some()
    }
}

/// Filesystem state relevant to one staging decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingProbe {
    pub source_exists: bool,
    pub dest_exists: bool,
    /// Source and destination are the same filesystem entry.
    pub same_entry: bool,
}

impl StagingProbe {
    pub fn observe(source: &Path, dest: &Path) -> Self {
        Self {
            source_exists: source.exists(),
            dest_exists: dest.exists(),
            same_entry: same_entry(source, dest),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingAction {
    /// Destination already present; never overwritten.
    SkipExisting,
    /// Nothing to copy from.
    MissingSource,
    /// Source already is the destination.
    AlreadyInPlace,
    Copy,
}

/// Decide what to do, checked in order: existing destination, missing
/// source, self-copy, copy.
pub fn plan(probe: &StagingProbe) -> StagingAction {
    if probe.dest_exists {
        StagingAction::SkipExisting
    } else if !probe.source_exists {
        StagingAction::MissingSource
    } else if probe.same_entry {
        StagingAction::AlreadyInPlace
    } else {
        StagingAction::Copy
    }
}

/// Compares canonical locations. `dest` usually does not exist yet, so its
/// parent is canonicalized instead.
fn same_entry(source: &Path, dest: &Path) -> bool {
    let Ok(source) = source.canonicalize() else {
        return false;
    };
    if let Ok(dest) = dest.canonicalize() {
        return source == dest;
    }
    match (dest.parent(), dest.file_name()) {
        (Some(parent), Some(file)) => parent
            .canonicalize()
            .map(|p| p.join(file) == source)
            .unwrap_or(false),
        _ => false,
    }
}

pub struct ImageStager<'a> {
    defaults: &'a GlobalDefaults,
    progress: Option<MultiProgress>,
}

impl<'a> ImageStager<'a> {
    pub fn new(defaults: &'a GlobalDefaults) -> Self {
        Self {
            defaults,
            progress: None,
        }
    }

    /// Draw a progress bar per copy.
    pub fn with_progress(mut self, multi: MultiProgress) -> Self {
        self.progress = Some(multi);
        self
    }

    pub fn source_path(&self, decl: &VmDeclaration, format: &str) -> Option<PathBuf> {
        let image = decl.info.image.as_deref()?.trim();
        (!image.is_empty()).then(|| self.defaults.artifacts_path.join(format!("{image}.{format}")))
    }

    /// Stage the image for the VM called `name`.
    ///
    /// Expected conditions (image already staged, source missing) come back
    /// in [`StageOutcome::error`]; this never panics or aborts the batch.
    pub async fn stage(&self, name: &str, decl: &VmDeclaration) -> StageOutcome {
        let images_path = match self.defaults.images_path() {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(vm = name, "{e}");
                return StageOutcome::failed(e);
            }
        };
        let Some(format) = decl.disk_format() else {
            return StageOutcome::failed(KvmError::MissingField {
                vm: name.to_string(),
                field: "storage.disk.format",
            });
        };
        let dest = images_path.join(format!("{name}.{format}"));
        let dest_existed_before = dest.exists();

        let (error, source) = if dest_existed_before {
            tracing::warn!(vm = name, path = %dest.display(), "image already exists, skipping copy");
            let e = KvmError::Exists {
                vm: name.to_string(),
                path: dest.display().to_string(),
            };
            (Some(e), self.source_path(decl, format))
        } else {
            match self.source_path(decl, format) {
                Some(source) => (self.stage_from(name, &source, &dest).await, Some(source)),
                None => {
                    let e = KvmError::MissingField {
                        vm: name.to_string(),
                        field: "info.image",
                    };
                    (Some(e), None)
                }
            }
        };

        let dest_image_exists = dest.exists();
        let result = StagingResult {
            dest_image: (error.is_none() && dest_image_exists).then(|| dest.clone()),
            source_image_exists: source.as_deref().is_some_and(Path::exists),
            dest_existed_before,
            dest_image_exists,
        };
        if let Some(e) = &error
            && !e.is_expected()
        {
            tracing::error!(vm = name, "{e}");
        }
        StageOutcome { result, error }
    }

    /// Act on the plan for a destination that was absent when checked.
    async fn stage_from(&self, name: &str, source: &Path, dest: &Path) -> Option<KvmError> {
        match plan(&StagingProbe::observe(source, dest)) {
            StagingAction::SkipExisting => {
                // Appeared since the first check, e.g. another process
                tracing::warn!(vm = name, path = %dest.display(), "image already exists, skipping copy");
                Some(KvmError::Exists {
                    vm: name.to_string(),
                    path: dest.display().to_string(),
                })
            }
            StagingAction::MissingSource => {
                tracing::error!(vm = name, path = %source.display(), "source image not found");
                Some(KvmError::NotFound {
                    vm: name.to_string(),
                    path: source.display().to_string(),
                })
            }
            StagingAction::AlreadyInPlace => {
                tracing::warn!(vm = name, path = %dest.display(), "source is the destination, skipping copy");
                None
            }
            StagingAction::Copy => {
                tracing::info!(vm = name, from = %source.display(), to = %dest.display(), "copying image");
                self.copy_image(source, dest).await.err()
            }
        }
    }

    /// Copy through `<dest>.part` and rename into place, so an interrupted
    /// copy never leaves a file at `dest`.
    async fn copy_image(&self, source: &Path, dest: &Path) -> Result<(), KvmError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| KvmError::Io {
                    context: format!("creating directory {}", parent.display()),
                    source: e,
                })?;
        }

        let reader = tokio::fs::File::open(source)
            .await
            .map_err(|e| KvmError::Io {
                context: format!("opening {}", source.display()),
                source: e,
            })?;
        let meta = reader.metadata().await.map_err(|e| KvmError::Io {
            context: format!("reading metadata for {}", source.display()),
            source: e,
        })?;

        copy_through_part(reader, &meta, source, dest, self.progress_bar(meta.len())).await
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        let Some(multi) = &self.progress else {
            return ProgressBar::hidden();
        };
        let pb = multi.add(ProgressBar::new(len));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// Copy `reader` into `<dest>.part`, then rename onto `dest`.
async fn copy_through_part(
    mut reader: tokio::fs::File,
    meta: &std::fs::Metadata,
    source: &Path,
    dest: &Path,
    bar: ProgressBar,
) -> Result<(), KvmError> {
    let mut part_name = dest.as_os_str().to_owned();
    part_name.push(".part");
    let part = PartFile::new(PathBuf::from(part_name), bar);

    let mut writer = tokio::fs::File::create(&part.path)
        .await
        .map_err(|e| KvmError::Io {
            context: format!("creating temp file {}", part.path.display()),
            source: e,
        })?;

    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await.map_err(|e| KvmError::Io {
            context: format!("reading {}", source.display()),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await.map_err(|e| KvmError::Io {
            context: format!("writing {}", part.path.display()),
            source: e,
        })?;
        part.bar.inc(n as u64);
    }
    writer.sync_all().await.map_err(|e| KvmError::Io {
        context: format!("flushing {}", part.path.display()),
        source: e,
    })?;
    drop(writer);

    tokio::fs::set_permissions(&part.path, meta.permissions())
        .await
        .map_err(|e| KvmError::Io {
            context: format!("setting permissions on {}", part.path.display()),
            source: e,
        })?;
    tokio::fs::rename(&part.path, dest)
        .await
        .map_err(|e| KvmError::Io {
            context: format!("renaming {} to {}", part.path.display(), dest.display()),
            source: e,
        })?;
    part.keep();

    tracing::info!(path = %dest.display(), bytes = meta.len(), "image staged");
    Ok(())
}

/// Removes the temp file on drop unless [`PartFile::keep`] was called,
/// covering both copy errors and a cancelled staging future. The copy's
/// progress bar is cleared on drop either way.
struct PartFile {
    path: PathBuf,
    bar: ProgressBar,
    armed: bool,
}

impl PartFile {
    fn new(path: PathBuf, bar: ProgressBar) -> Self {
        // Leftover from an earlier interrupted run
        let _ = std::fs::remove_file(&path);
        Self {
            path,
            bar,
            armed: true,
        }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
