use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "kvmcli.toml";

/// Declaration batch used when neither the command line nor the config names one.
pub const DEFAULT_BATCH: &str = "servers.yml";

/// Per-user config: `~/.config/kvmcli/kvmcli.toml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kvmcli").join(CONFIG_FILE))
}

/// Config file to load: the explicit one, else `./kvmcli.toml`, else the
/// per-user file if it exists.
pub fn find_config(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    user_config_path()
        .filter(|p| p.exists())
        .unwrap_or(local)
}
