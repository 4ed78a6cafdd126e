//! Child processes with a hard timeout and bounded output capture.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes discarded beyond the capture limit (stdout + stderr).
    pub truncated_bytes: usize,
    pub timed_out: bool,
}

impl CapturedOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stdout followed by stderr, with notices for truncation and timeout.
    pub fn render(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&self.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        if self.truncated_bytes > 0 {
            text.push_str(&format!("\n[output truncated {} bytes]", self.truncated_bytes));
        }
        if self.timed_out {
            text.push_str("\n[process killed after timeout]");
        }
        text
    }
}

/// How long output readers may keep draining after the child has exited.
pub const READER_GRACE: Duration = Duration::from_secs(1);
const READER_POLL: Duration = Duration::from_millis(10);

/// Run a command with a timeout, feeding optional stdin and capturing output
/// without risking pipe deadlocks.
///
/// Output is drained concurrently while the child runs; bytes beyond
/// `output_limit_bytes` per stream are counted and discarded. On timeout the
/// child's whole process group is killed and whatever it produced so far is
/// returned. Readers get [`READER_GRACE`] after exit to reach end of stream;
/// a reader still blocked after that (a descendant escaped the group and holds
/// the pipe) is left detached and its buffered bytes are used.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CapturedOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_reader = StreamReader::spawn(stdout, output_limit_bytes);
    let stderr_reader = StreamReader::spawn(stderr, output_limit_bytes);

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // A child that exits without reading stdin closes the pipe early.
        if let Err(e) = child_stdin.write_all(input) {
            warn!(err = %e, "child closed stdin before reading all input");
        }
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            kill_tree(&mut child).context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let deadline = Instant::now() + READER_GRACE;
    let (stdout, stdout_truncated) = stdout_reader.finish(deadline).context("join stdout")?;
    let (stderr, stderr_truncated) = stderr_reader.finish(deadline).context("join stderr")?;
    let truncated_bytes = stdout_truncated + stderr_truncated;
    if truncated_bytes > 0 {
        warn!(truncated_bytes, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
        truncated_bytes,
        timed_out,
    })
}

/// Kill the child and every process in its group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) -> Result<()> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let group = i32::try_from(child.id()).context("process id out of range")?;
    if let Err(errno) = killpg(Pid::from_raw(group), Signal::SIGKILL) {
        debug!(err = %errno, "killpg failed, killing direct child only");
        child.kill()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> Result<()> {
    child.kill()?;
    Ok(())
}

#[derive(Default)]
struct StreamCapture {
    bytes: Vec<u8>,
    truncated: usize,
}

/// A background thread draining one pipe into a shared, capped buffer.
struct StreamReader {
    capture: Arc<Mutex<StreamCapture>>,
    handle: thread::JoinHandle<Result<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let capture = Arc::new(Mutex::new(StreamCapture::default()));
        let sink = Arc::clone(&capture);
        let handle = thread::spawn(move || read_stream_limited(reader, limit, &sink));
        Self { capture, handle }
    }

    /// Wait for end of stream until `deadline`, then take what was captured.
    fn finish(self, deadline: Instant) -> Result<(Vec<u8>, usize)> {
        while !self.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(READER_POLL);
        }
        if self.handle.is_finished() {
            match self.handle.join() {
                Ok(result) => result?,
                Err(_) => return Err(anyhow!("output reader thread panicked")),
            }
        } else {
            warn!("output pipe still held open after exit; detaching reader");
        }
        let mut capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
        Ok((std::mem::take(&mut capture.bytes), capture.truncated))
    }
}

fn read_stream_limited<R: Read>(
    mut reader: R,
    limit: usize,
    sink: &Mutex<StreamCapture>,
) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut capture = sink.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = limit.saturating_sub(capture.bytes.len());
        let keep = n.min(remaining);
        capture.bytes.extend_from_slice(&chunk[..keep]);
        capture.truncated += n - keep;
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_stdin() {
        let out = run_with_timeout(sh("cat"), Some(b"hello"), Duration::from_secs(10), 1024)
            .expect("run");
        assert!(out.status.success());
        assert_eq!(out.stdout_text(), "hello");
    }

    #[test]
    fn truncates_beyond_limit() {
        let out = run_with_timeout(sh("printf 0123456789"), None, Duration::from_secs(10), 4)
            .expect("run");
        assert_eq!(out.stdout_text(), "0123");
        assert_eq!(out.truncated_bytes, 6);
        assert!(out.render().contains("[output truncated 6 bytes]"));
    }

    #[test]
    fn kills_on_timeout() {
        let out = run_with_timeout(sh("echo early; exec sleep 5"), None, Duration::from_millis(200), 1024)
            .expect("run");
        assert!(out.timed_out);
        assert!(out.render().contains("[process killed after timeout]"));
    }

    #[test]
    fn timeout_kills_grandchildren_holding_the_pipes() {
        let started = Instant::now();
        let out = run_with_timeout(
            sh("echo early; sh -c 'sleep 6'; echo late"),
            None,
            Duration::from_millis(300),
            1024,
        )
        .expect("run");
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
        assert!(out.timed_out);
        assert!(out.stdout_text().contains("early"));
        assert!(!out.stdout_text().contains("late"));
    }

    #[test]
    fn exit_does_not_wait_for_background_writers_holding_the_pipes() {
        let started = Instant::now();
        let out = run_with_timeout(
            sh("echo done; sleep 6 &"),
            None,
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
        assert!(!out.timed_out);
        assert!(out.stdout_text().contains("done"));
    }
}
