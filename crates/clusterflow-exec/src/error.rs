use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("command on {host} exited with status {status}: {stderr}")]
    RemoteFailed {
        host: String,
        status: i32,
        stderr: String,
    },

    #[error("{program} exited with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },
}

pub type Result<T> = std::result::Result<T, ExecError>;
