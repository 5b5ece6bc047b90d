//! Typed VM declarations, loaded from the YAML batch file.
//!
//! Groups the author may omit (`network`, `storage`, the fields inside them)
//! default to empty here; deciding what an absent field means is left
//! entirely to [`crate::resolve`].

use std::path::Path;

use facet::Facet;
use facet_value::Value;

use crate::error::KvmError;

/// One batch document: `version` plus the ordered `vms` sequence.
#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct Batch {
    pub version: Option<Value>,
    #[facet(default)]
    pub vms: Vec<VmDeclaration>,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct VmDeclaration {
    #[facet(default)]
    pub info: InfoDecl,
    #[facet(default)]
    pub network: NetworkDecl,
    #[facet(default)]
    pub storage: StorageDecl,
    /// Forwarded verbatim to the provisioning tool.
    pub provisioner: Option<Value>,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct InfoDecl {
    pub name: Option<String>,
    pub image: Option<String>,
    pub ram: Option<Value>,
    pub cpus: Option<Value>,
    pub os: Option<String>,
    pub ignore: Option<bool>,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct NetworkDecl {
    #[facet(default)]
    pub interface: InterfaceDecl,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct InterfaceDecl {
    pub bridge: Option<String>,
    pub mac_address: Option<String>,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct StorageDecl {
    #[facet(default)]
    pub disk: DiskDecl,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct DiskDecl {
    pub format: Option<String>,
    pub size: Option<Value>,
    #[facet(rename = "type")]
    pub disk_type: Option<String>,
}

impl VmDeclaration {
    pub fn is_ignored(&self) -> bool {
        self.info.ignore.unwrap_or(false)
    }

    /// Explicit, non-empty name if the author gave one.
    pub fn explicit_name(&self) -> Option<&str> {
        self.info
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// Disk container format, e.g. `qcow2`. Also the image file extension.
    pub fn disk_format(&self) -> Option<&str> {
        self.storage
            .disk
            .format
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

/// Text of a scalar YAML value (number or string). `None` for null,
/// sequences and mappings.
pub fn scalar_text(value: &Value) -> Option<String> {
    if let Some(n) = value.as_number() {
        let float = n.to_f64();
        // Keep the fraction visible so `1.5` cpus is rejected, not truncated
        if float.is_some_and(|f| f.fract() != 0.0) {
            return float.map(|f| f.to_string());
        }
        return n
            .to_i64()
            .map(|v| v.to_string())
            .or_else(|| n.to_u64().map(|v| v.to_string()))
            .or_else(|| float.map(|f| f.to_string()));
    }
    value.as_string().map(|s| s.as_str().to_string())
}

// ── loading ───────────────────────────────────────────────

pub fn parse_batch(contents: &str, origin: &Path) -> Result<Batch, KvmError> {
    facet_yaml::from_str(contents).map_err(|e| KvmError::Parse {
        path: origin.display().to_string(),
        message: e.to_string(),
    })
}

pub fn load_batch(path: &Path) -> Result<Batch, KvmError> {
    let contents = std::fs::read_to_string(path).map_err(|source| KvmError::BatchLoad {
        path: path.display().to_string(),
        source,
    })?;
    let batch = parse_batch(&contents, path)?;
    tracing::debug!(path = %path.display(), vms = batch.vms.len(), "loaded declarations");
    Ok(batch)
}
