use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] tickguard_core::ConfigError),

    #[error(transparent)]
    Route(#[from] tickguard_core::RouteError),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Route(tickguard_core::RouteError::AllProvidersUnavailable { .. }) => 3,
            Self::Route(_) => 2,
            Self::Argument(_) => 2,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

impl From<tickguard_warehouse::WarehouseError> for CliError {
    fn from(error: tickguard_warehouse::WarehouseError) -> Self {
        Self::Argument(error.to_string())
    }
}
