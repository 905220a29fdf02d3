use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("invalid cluster config: {0}")]
    InvalidConfig(String),

    #[error("template render error: {0}")]
    TemplateRender(String),

    #[error("unknown template: {0}")]
    UnknownTemplate(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
