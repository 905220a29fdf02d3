use thiserror::Error;

#[derive(Error, Debug)]
pub enum HetznerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Hetzner API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unknown location: {0}")]
    UnknownLocation(String),

    #[error("failed to read public key {path}: {message}")]
    PublicKey { path: String, message: String },
}

impl From<HetznerError> for clusterflow_cloud::CloudError {
    fn from(e: HetznerError) -> Self {
        clusterflow_cloud::CloudError::ApiError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HetznerError>;
