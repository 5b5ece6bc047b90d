use std::path::{Path, PathBuf};

use facet::Facet;

use crate::error::KvmError;

#[derive(Debug, Clone, Facet)]
pub struct Config {
    #[facet(default)]
    pub yaml_path: String,
    #[facet(default)]
    pub template_name: String,
    pub image: ImageConfig,
    pub hardware: HardwareConfig,
    pub network: NetworkConfig,
    pub disk: DiskConfig,
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Facet)]
pub struct ImageConfig {
    pub artifacts_path: String,
    #[facet(default)]
    pub images_path: String,
    pub image_name: String,
}

#[derive(Debug, Clone, Facet)]
pub struct HardwareConfig {
    pub ram: u64,
    pub cpus: u32,
    pub sound_type: String,
    pub rng_device: String,
}

#[derive(Debug, Clone, Facet)]
pub struct NetworkConfig {
    pub mac_address: String,
    pub bridge_name: String,
}

#[derive(Debug, Clone, Facet)]
pub struct DiskConfig {
    pub size_gb: u64,
}

#[derive(Debug, Clone, Facet)]
pub struct PlatformConfig {
    pub virtualization_type: String,
}

// ── GlobalDefaults ────────────────────────────────────────

/// Process-wide defaults, built once from the config file and passed by
/// reference into the resolver and the stager.
///
/// Numeric values are kept in their textual form: the hypervisor tool's
/// argument surface is textual, and the resolver validates them on use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDefaults {
    pub image_name: String,
    pub ram: String,
    pub cpus: String,
    pub disk_size: String,
    pub bridge: String,
    pub mac_address: String,
    pub sound: String,
    pub rng: String,
    pub virt_type: String,
    pub artifacts_path: PathBuf,
    /// `None` when the config leaves `images_path` unset.
    pub images_path: Option<PathBuf>,
}

impl GlobalDefaults {
    pub fn from_config(config: &Config) -> Self {
        Self {
            image_name: config.image.image_name.clone(),
            ram: config.hardware.ram.to_string(),
            cpus: config.hardware.cpus.to_string(),
            disk_size: config.disk.size_gb.to_string(),
            bridge: config.network.bridge_name.clone(),
            mac_address: config.network.mac_address.clone(),
            sound: config.hardware.sound_type.clone(),
            rng: config.hardware.rng_device.clone(),
            virt_type: config.platform.virtualization_type.clone(),
            artifacts_path: PathBuf::from(&config.image.artifacts_path),
            images_path: optional_path(&config.image.images_path),
        }
    }

    /// The images output directory, or a `Config` error when unset.
    pub fn images_path(&self) -> Result<&Path, KvmError> {
        self.images_path.as_deref().ok_or_else(|| KvmError::Config {
            message: "image.images_path is not set".into(),
        })
    }
}

// ── Settings ──────────────────────────────────────────────

/// Loaded config file: the defaults plus the file-level paths.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    /// Declaration batch used when no file is given on the command line.
    pub yaml_path: Option<PathBuf>,
    /// Where `init` writes the starter template.
    pub template_name: Option<PathBuf>,
    pub defaults: GlobalDefaults,
}

// ── validation ────────────────────────────────────────────

fn validate_config(config: &Config) -> Result<(), KvmError> {
    let required = [
        ("image.artifacts_path", &config.image.artifacts_path),
        ("image.image_name", &config.image.image_name),
        ("hardware.sound_type", &config.hardware.sound_type),
        ("hardware.rng_device", &config.hardware.rng_device),
        ("network.mac_address", &config.network.mac_address),
        ("network.bridge_name", &config.network.bridge_name),
        ("platform.virtualization_type", &config.platform.virtualization_type),
    ];
    for (key, value) in required {
        if value.trim().is_empty() {
            return Err(KvmError::Validation {
                message: format!("{key} must not be empty"),
            });
        }
    }

    if config.hardware.cpus < 1 {
        return Err(KvmError::Validation {
            message: "hardware.cpus must be at least 1".into(),
        });
    }
    if config.hardware.ram < 1 {
        return Err(KvmError::Validation {
            message: "hardware.ram must be at least 1".into(),
        });
    }
    if config.disk.size_gb < 1 {
        return Err(KvmError::Validation {
            message: "disk.size_gb must be at least 1".into(),
        });
    }

    Ok(())
}

fn optional_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}

// ── public API ────────────────────────────────────────────

pub fn parse_config(contents: &str, origin: &Path) -> Result<Config, KvmError> {
    let config: Config = facet_toml::from_str(contents).map_err(|e| KvmError::ConfigParse {
        path: origin.display().to_string(),
        message: e.to_string(),
    })?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Settings, KvmError> {
    let contents = std::fs::read_to_string(path).map_err(|source| KvmError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let config = parse_config(&contents, path)?;
    tracing::debug!(path = %path.display(), "loaded config");

    Ok(Settings {
        config_path: path.to_path_buf(),
        yaml_path: optional_path(&config.yaml_path),
        template_name: optional_path(&config.template_name),
        defaults: GlobalDefaults::from_config(&config),
    })
}
