//! Shell command execution for `RUN_TEST_COMMAND`.

use std::future::Future;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tracing::{info, instrument};

use super::config::ShellConfig;
use super::process::run_with_timeout;

/// Chaining, piping, sequencing, substitution and redirection are refused.
const FORBIDDEN: [&str; 10] = ["&&", "||", ";", "|", "&", "`", "$(", ">", "<", "\n"];

pub trait ShellRunner {
    /// Run `command` and return its rendered output; never fails.
    fn run(&self, command: &str) -> impl Future<Output = String>;
}

/// Reject commands containing shell metacharacters. Returns the offending token.
pub fn check_command(command: &str) -> Result<(), &'static str> {
    if command.trim().is_empty() {
        return Err("empty command");
    }
    match FORBIDDEN.iter().find(|token| command.contains(**token)) {
        Some(token) => Err(*token),
        None => Ok(()),
    }
}

/// Runs commands with `sh -c` inside the workspace, with a fixed timeout.
#[derive(Debug, Clone)]
pub struct SystemShell {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl SystemShell {
    pub fn new(config: &ShellConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn run_blocking(&self, command: &str) -> String {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&self.workdir);
        match run_with_timeout(cmd, None, self.timeout, self.output_limit_bytes) {
            Ok(output) => {
                let mut text = output.render();
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                match output.status.code() {
                    Some(code) => text.push_str(&format!("[exit status {code}]")),
                    None => text.push_str("[terminated by signal]"),
                }
                text
            }
            Err(err) => format!("Command failed to start: {err:#}"),
        }
    }
}

impl ShellRunner for SystemShell {
    #[instrument(skip(self))]
    async fn run(&self, command: &str) -> String {
        if let Err(token) = check_command(command) {
            info!(token, "command rejected");
            return format!("Command rejected: {token:?} is not allowed");
        }
        let shell = self.clone();
        let command = command.to_string();
        tokio::task::spawn_blocking(move || shell.run_blocking(&command))
            .await
            .unwrap_or_else(|err| format!("Command task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metacharacters_are_rejected() {
        for command in [
            "make && rm -rf /",
            "a || b",
            "a; b",
            "cat x | sh",
            "sleep 1 &",
            "echo `id`",
            "echo $(id)",
            "echo hi > out",
            "sh < in",
            "a\nb",
        ] {
            assert!(check_command(command).is_err(), "{command:?}");
        }
        assert!(check_command("cargo test --all").is_ok());
        assert!(check_command("   ").is_err());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_in_workdir_and_reports_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "present").expect("write");
        let shell = SystemShell::new(&ShellConfig::default(), temp.path());

        let output = shell.run("cat marker.txt").await;
        assert_eq!(output, "present\n[exit status 0]");

        let rejected = shell.run("cat marker.txt | wc").await;
        assert!(rejected.starts_with("Command rejected"));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timeout_returns_partial_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let shell = SystemShell {
            workdir: temp.path().to_path_buf(),
            timeout: Duration::from_millis(200),
            output_limit_bytes: 1024,
        };
        let output = shell.run("exec sleep 5").await;
        assert!(output.contains("[process killed after timeout]"), "{output}");
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timeout_also_kills_processes_spawned_by_the_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let shell = SystemShell {
            workdir: temp.path().to_path_buf(),
            timeout: Duration::from_millis(300),
            output_limit_bytes: 1024,
        };
        let started = std::time::Instant::now();
        let output = shell
            .run("find . -maxdepth 0 -exec sh -c \"sleep 6\" {} +")
            .await;
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
        assert!(output.contains("[process killed after timeout]"), "{output}");
    }
}
