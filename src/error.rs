use thiserror::Error;

/// VK error code for "Access denied". `likes.getList` answers with it when the
/// post owner has hidden the list of likers.
pub const VK_ACCESS_DENIED: i64 = 15;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Expected {0} in the environment")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum VkError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Access denied (code {code}): {message}")]
    PermissionDenied { code: i64, message: String },

    #[error("[{code}] {message}")]
    Api { code: i64, message: String },

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl VkError {
    pub fn from_api(code: i64, message: String) -> Self {
        if code == VK_ACCESS_DENIED {
            VkError::PermissionDenied { code, message }
        } else {
            VkError::Api { code, message }
        }
    }
}

impl From<reqwest::Error> for VkError {
    fn from(err: reqwest::Error) -> Self {
        VkError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for VkError {
    fn from(err: serde_json::Error) -> Self {
        VkError::Parse(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("screen name not found")]
    NotFound,

    #[error("expected a {expected}, found a {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("VK request failed: {0}")]
    Upstream(#[from] VkError),
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to write document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Chat platform error: {0}")]
    Platform(String),
}

impl From<serenity::Error> for ChannelError {
    fn from(err: serenity::Error) -> Self {
        ChannelError::Platform(err.to_string())
    }
}
