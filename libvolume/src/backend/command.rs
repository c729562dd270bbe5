//! Helper for running the storage CLI tools (`rbd`, `blkid`, `mkfs.*`).

use std::ffi::OsStr;
use std::fmt;
use std::process::Output;

use tracing::{debug, warn};

/// Why an external command did not succeed.
#[derive(Debug)]
pub(crate) enum CommandFailure {
    /// The binary could not be started at all.
    Spawn(std::io::Error),
    /// The process ran and exited unsuccessfully.
    Exit { code: Option<i32>, stderr: String },
}

impl CommandFailure {
    pub(crate) fn code(&self) -> Option<i32> {
        match self {
            Self::Spawn(_) => None,
            Self::Exit { code, .. } => *code,
        }
    }

    pub(crate) fn stderr(&self) -> &str {
        match self {
            Self::Spawn(_) => "",
            Self::Exit { stderr, .. } => stderr,
        }
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to spawn: {e}"),
            Self::Exit {
                code: Some(code),
                stderr,
            } => write!(f, "exit status {code}: {}", stderr.trim()),
            Self::Exit { code: None, stderr } => {
                write!(f, "terminated by signal: {}", stderr.trim())
            }
        }
    }
}

/// Run `program` with `args` and return its trimmed stdout on success.
pub(crate) async fn run<I, S>(program: &str, args: I) -> Result<String, CommandFailure>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args);
    debug!(?cmd, "running command");

    let Output {
        status,
        stdout,
        stderr,
    } = cmd.output().await.map_err(CommandFailure::Spawn)?;

    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        warn!(program, code = ?status.code(), stderr = %stderr.trim(), "command failed");
        return Err(CommandFailure::Exit {
            code: status.code(),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&stdout).trim_end().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let out = run("sh", ["-c", "echo /dev/rbd0"]).await.unwrap();
        assert_eq!(out, "/dev/rbd0");
    }

    #[tokio::test]
    async fn reports_exit_code_and_stderr() {
        let err = run("sh", ["-c", "echo nope >&2; exit 2"]).await.unwrap_err();
        assert_eq!(err.code(), Some(2));
        assert_eq!(err.stderr().trim(), "nope");
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_failure() {
        let err = run("/nonexistent/definitely-not-here", Vec::<&str>::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandFailure::Spawn(_)));
    }
}
