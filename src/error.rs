use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    /// A required input file or directory does not exist.
    #[error("required input not found: {}", path.display())]
    MissingInput { path: PathBuf },
    /// A directory scan matched nothing.
    #[error("no files matching '{pattern}' in {}", dir.display())]
    NoInputs { dir: PathBuf, pattern: String },
    /// An external tool exited with a non-zero status.
    #[error("{program} {}", describe_exit(code))]
    ToolFailed { program: String, code: Option<i32> },
    /// An external tool could not be started at all.
    #[error("failed to start {program}: {msg}")]
    Spawn { program: String, msg: String },
    /// Malformed input content (whitelists, call tables, read names).
    #[error("parse error: {msg}")]
    Parse { msg: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("failed with exit code {}", c),
        None => "was terminated by a signal".to_string(),
    }
}

pub type StageResult<T> = Result<T, StageError>;

impl StageError {
    /// Exit code the process should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            StageError::ToolFailed {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}
