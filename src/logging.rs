use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::KvmError;

/// Install the global subscriber.
///
/// Terminal output goes to stderr (`kvmcli=info`, `debug` with `--verbose`,
/// `RUST_LOG` honoured). With `log_file`, everything at debug level is also
/// appended there without ANSI codes.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<(), KvmError> {
    let terminal_filter = if verbose {
        EnvFilter::new("kvmcli=debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("kvmcli=info".parse().expect("valid log directive"))
    };
    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(terminal_filter);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(|e| KvmError::Io {
                    context: format!("creating log directory {}", parent.display()),
                    source: e,
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| KvmError::Io {
                    context: format!("opening log file {}", path.display()),
                    source: e,
                })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new("kvmcli=debug")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .init();
    Ok(())
}
