//! External tool invocation.
//!
//! Every backend (NiftyReg, ANTs, HD-BET) is driven through [`ToolCommand`]. The child's
//! stdout and stderr are appended to a per-step log file, preceded by a timestamped header
//! naming the command line, so a failed step can be diagnosed after the batch aborts.

use crate::constants::CUDA_VISIBLE_DEVICES;
use crate::{PreprocessError, PreprocessResult};
use std::ffi::{OsStr, OsString};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Environment handed to external tools spawned during a run.
///
/// Values here are set on the child process only; the current process environment is never
/// modified.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolEnv {
    /// Value for `CUDA_VISIBLE_DEVICES`, e.g. `"0"` or `"0,1"`.
    pub cuda_visible_devices: Option<String>,
}

impl ToolEnv {
    pub fn with_cuda_visible_devices(devices: impl Into<String>) -> Self {
        Self {
            cuda_visible_devices: Some(devices.into()),
        }
    }

    fn vars(&self) -> Vec<(&'static str, String)> {
        self.cuda_visible_devices
            .iter()
            .map(|devices| (CUDA_VISIBLE_DEVICES, devices.clone()))
            .collect()
    }
}

/// A command line for an external tool, built before it is run so it can be inspected.
#[derive(Clone, Debug)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(String, String)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Applies a [`ToolEnv`] to the child process.
    pub fn tool_env(mut self, env: &ToolEnv) -> Self {
        self.envs.extend(
            env.vars()
                .into_iter()
                .map(|(key, value)| (key.to_string(), value)),
        );
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The arguments rendered lossily, mainly for logging and tests.
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    /// Human readable command line.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in self.arg_strings() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Runs the command to completion, appending its output to `log_file`.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `LogFile` if the log file cannot be created or written,
    /// - `ToolSpawn` if the binary cannot be started (e.g. not installed),
    /// - `ToolFailed` if the tool exits with a non-zero status.
    pub fn run_logged(&self, log_file: &Path) -> PreprocessResult<()> {
        let log_err = |source| PreprocessError::LogFile {
            path: log_file.to_path_buf(),
            source,
        };

        if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(log_err)?;
        }

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(log_err)?;
        writeln!(
            log,
            "# {} {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.display()
        )
        .map_err(log_err)?;

        let stdout = log.try_clone().map_err(log_err)?;
        let stderr = log.try_clone().map_err(log_err)?;

        tracing::debug!("running {}", self.display());

        let status = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|source| PreprocessError::ToolSpawn {
                tool: self.tool_name(),
                source,
            })?;

        if !status.success() {
            return Err(PreprocessError::ToolFailed {
                tool: self.tool_name(),
                status,
                log: log_file.to_path_buf(),
            });
        }

        Ok(())
    }
}

/// Check if an external tool can be started.
///
/// Returns `true` if the binary is found and runs with `probe_arg`, regardless of its exit
/// status, and `false` when it cannot be spawned at all.
pub fn tool_available(program: &Path, probe_arg: &str) -> bool {
    Command::new(program)
        .arg(probe_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Fail with `MissingToolOutput` when a tool exited cleanly without producing `path`.
pub(crate) fn ensure_output(tool: &str, path: &Path) -> PreprocessResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PreprocessError::MissingToolOutput {
            tool: tool.to_string(),
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn display_joins_program_and_args() {
        let cmd = ToolCommand::new("reg_aladin")
            .arg("-ref")
            .arg(Path::new("/data/fixed.nii.gz"))
            .args(["-rigOnly"]);
        assert_eq!(cmd.display(), "reg_aladin -ref /data/fixed.nii.gz -rigOnly");
        assert_eq!(cmd.arg_strings().len(), 3);
    }

    #[test]
    fn tool_env_sets_cuda_devices_on_child_only() {
        let cmd = ToolCommand::new("hd-bet").tool_env(&ToolEnv::with_cuda_visible_devices("1"));
        assert_eq!(
            cmd.envs(),
            &[("CUDA_VISIBLE_DEVICES".to_string(), "1".to_string())]
        );

        let cmd = ToolCommand::new("hd-bet").tool_env(&ToolEnv::default());
        assert!(cmd.envs().is_empty());
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let dir = TempDir::new().expect("tempdir");
        let log = dir.path().join("logs").join("missing.log");

        let err = ToolCommand::new("nonexistent_brainles_tool_xyz")
            .run_logged(&log)
            .expect_err("spawn should fail");

        assert!(matches!(
            err,
            PreprocessError::ToolSpawn { ref tool, .. } if tool == "nonexistent_brainles_tool_xyz"
        ));
        // The header line is written before the spawn attempt.
        let contents = fs::read_to_string(&log).expect("log written");
        assert!(contents.contains("nonexistent_brainles_tool_xyz"));
    }

    #[test]
    fn tool_available_is_false_for_missing_binary() {
        assert!(!tool_available(
            Path::new("nonexistent_brainles_tool_xyz"),
            "--help"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn output_and_failures_are_logged() {
        let dir = TempDir::new().expect("tempdir");
        let log = dir.path().join("step.log");

        ToolCommand::new("sh")
            .args(["-c", "echo registered; echo warning >&2"])
            .run_logged(&log)
            .expect("command succeeds");

        let err = ToolCommand::new("sh")
            .args(["-c", "exit 3"])
            .run_logged(&log)
            .expect_err("non-zero exit");
        match err {
            PreprocessError::ToolFailed { tool, status, log: logged } => {
                assert_eq!(tool, "sh");
                assert_eq!(status.code(), Some(3));
                assert_eq!(logged, log);
            }
            other => panic!("unexpected error: {other}"),
        }

        let contents = fs::read_to_string(&log).expect("log written");
        assert!(contents.contains("registered"));
        assert!(contents.contains("warning"));
        assert_eq!(contents.lines().filter(|l| l.starts_with("# ")).count(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn child_receives_tool_env() {
        let dir = TempDir::new().expect("tempdir");
        let log = dir.path().join("env.log");

        ToolCommand::new("sh")
            .args(["-c", "echo devices=$CUDA_VISIBLE_DEVICES"])
            .tool_env(&ToolEnv::with_cuda_visible_devices("0,1"))
            .run_logged(&log)
            .expect("command succeeds");

        let contents = fs::read_to_string(&log).expect("log written");
        assert!(contents.contains("devices=0,1"));
    }
}
