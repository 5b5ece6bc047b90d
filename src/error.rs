use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KvmError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("configuration error: {message}")]
    #[diagnostic(help("set the missing key in the [image] section of the config file"))]
    Config { message: String },

    #[error("failed to read declarations from {path}")]
    BatchLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse declarations from {path}: {message}")]
    Parse { path: String, message: String },

    #[error("{vm}: missing required field `{field}`")]
    MissingField { vm: String, field: &'static str },

    #[error("{vm}: field `{field}` must be an integer (got {value})")]
    InvalidField {
        vm: String,
        field: &'static str,
        value: String,
    },

    #[error("{vm}: image already exists at {path}, skipping copy")]
    Exists { vm: String, path: String },

    #[error("{vm}: source image not found at {path}")]
    NotFound { vm: String, path: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed: {message}")]
    ExternalCommand { command: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{failed} of {total} VMs were not provisioned")]
    Incomplete { failed: usize, total: usize },
}

impl KvmError {
    /// Errors after which the run cannot meaningfully continue.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. }
                | Self::ConfigParse { .. }
                | Self::Config { .. }
                | Self::BatchLoad { .. }
                | Self::Parse { .. }
                | Self::Validation { .. }
        )
    }

    /// Steady-state conditions, e.g. re-running against a partially
    /// provisioned cluster.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::Exists { .. } | Self::NotFound { .. })
    }
}
