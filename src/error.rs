use thiserror::Error;

#[derive(Error, Debug)]
pub enum CamwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Classifier fault: {details}")]
    Classifier { details: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl CamwatchError {
    pub fn classifier<S: Into<String>>(details: S) -> Self {
        Self::Classifier {
            details: details.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors produced by a single upload attempt.
///
/// `InvalidDestination` is user-correctable and never touches the network;
/// `TransferFailed` covers transport errors, non-2xx responses and unparsable
/// bodies uniformly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Invalid destination address: {url}")]
    InvalidDestination { url: String },

    #[error("Transfer failed: {details}")]
    TransferFailed { details: String },
}

impl UploadError {
    pub fn transfer<S: Into<String>>(details: S) -> Self {
        Self::TransferFailed {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CamwatchError>;
