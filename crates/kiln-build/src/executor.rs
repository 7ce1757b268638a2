use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::docker::DockerError;

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 40;

/// Abstraction over docker CLI execution for testability.
///
/// Production code uses [`RealExecutor`]; tests substitute fakes that record
/// invocations. Futures are `Send` so build workers can run on the
/// multi-threaded runtime.
pub trait DockerExecutor: Send + Sync + 'static {
    /// Run docker with `args` in `cwd`, with `env` added to the inherited
    /// environment, and return its stdout.
    ///
    /// With `stream`, stdout goes to the terminal and stderr is echoed while
    /// still being captured. A non-zero exit is [`DockerError::CommandFailed`].
    fn run(
        &self,
        args: &[String],
        cwd: &Path,
        env: &[(String, String)],
        stream: bool,
    ) -> impl Future<Output = Result<String, DockerError>> + Send;
}

/// Real docker CLI executor.
pub struct RealExecutor;

impl DockerExecutor for RealExecutor {
    async fn run(
        &self,
        args: &[String],
        cwd: &Path,
        env: &[(String, String)],
        stream: bool,
    ) -> Result<String, DockerError> {
        tracing::debug!(?args, ?env, cwd = %cwd.display(), "running docker");

        let mut child = tokio::process::Command::new("docker")
            .args(args)
            .current_dir(cwd)
            .envs(env.iter().cloned())
            .stdin(Stdio::null())
            .stdout(if stream {
                Stdio::inherit()
            } else {
                Stdio::piped()
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DockerError::NotFound { source: e })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, stdout, stderr) = tokio::join!(
            child.wait(),
            read_stdout(stdout),
            read_stderr(stderr, stream)
        );

        let status = status.map_err(|e| DockerError::Output { source: e })?;
        let stdout = stdout.map_err(|e| DockerError::Output { source: e })?;
        let stderr = stderr.map_err(|e| DockerError::Output { source: e })?;

        if status.success() {
            Ok(stdout)
        } else {
            Err(DockerError::CommandFailed {
                args: args.to_vec(),
                code: status.code(),
                stderr,
            })
        }
    }
}

async fn read_stdout<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<String> {
    let mut out = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut out).await?;
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Keeps the tail of stderr, echoing each line when streaming. Invalid
/// UTF-8 is replaced rather than failing the read.
async fn read_stderr<R: AsyncRead + Unpin>(pipe: Option<R>, echo: bool) -> std::io::Result<String> {
    let Some(pipe) = pipe else {
        return Ok(String::new());
    };

    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(pipe).split(b'\n');
    while let Some(raw) = lines.next_segment().await? {
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches('\r').to_owned();
        if echo {
            eprintln!("{line}");
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Ok(tail.into_iter().collect::<Vec<_>>().join("\n"))
}
