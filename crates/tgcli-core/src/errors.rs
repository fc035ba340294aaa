/// Core error type for tgcli.
///
/// Adapters map their specific failures into this type so the CLI can tell
/// "not found" and "not authenticated" apart from everything else.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot find chat \"{reference}\"; use `tg chats --filter` to find exact names")]
    NotFound { reference: String },

    #[error("not authenticated: {0}")]
    Unauthorized(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn not_found(reference: impl Into<String>) -> Self {
        Self::NotFound {
            reference: reference.into(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
