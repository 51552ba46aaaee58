use super::error::{StageError, StageResult};
use colored::Colorize;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::process::Command;

/// Paths (or `PATH` names) of the external binaries the pipeline drives.
#[derive(Debug, Clone)]
pub struct Tools {
    pub cutadapt: String,
    pub fastp: String,
    pub bismark: String,
    pub samtools: String,
    pub deduplicate_bismark: String,
    pub methylation_extractor: String,
}

impl Default for Tools {
    fn default() -> Self {
        Tools {
            cutadapt: "cutadapt".to_string(),
            fastp: "fastp".to_string(),
            bismark: "bismark".to_string(),
            samtools: "samtools".to_string(),
            deduplicate_bismark: "deduplicate_bismark".to_string(),
            methylation_extractor: "bismark_methylation_extractor".to_string(),
        }
    }
}

/// A single external tool invocation: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: &str) -> Self {
        ToolCommand {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for a in args {
            self = self.arg(a);
        }
        self
    }

    /// Short name of the program used in log lines and errors.
    pub fn name(&self) -> &str {
        Path::new(&self.program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.program)
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Quote a word for a POSIX shell only when it needs it.
/// # Example
/// ```
/// use scemtools::runner::shell_quote;
/// assert_eq!(shell_quote("cell_A.bam"), "cell_A.bam");
/// assert_eq!(shell_quote("my file.bam"), "'my file.bam'");
/// assert_eq!(shell_quote("it's"), "'it'\\''s'");
/// assert_eq!(shell_quote(""), "''");
/// ```
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for a in &self.args {
            write!(f, " {}", shell_quote(&a.to_string_lossy()))?;
        }
        Ok(())
    }
}

/// Something that can run tool invocations, one at a time, to completion.
pub trait Executor {
    fn execute(&mut self, cmd: &ToolCommand) -> StageResult<()>;

    /// True when commands are only logged, so their outputs will not appear.
    fn dry_run(&self) -> bool {
        false
    }
}

/// Runs commands as blocking child processes.
#[derive(Debug, Default)]
pub struct SystemExecutor {
    pub dry_run: bool,
}

impl SystemExecutor {
    pub fn new(dry_run: bool) -> Self {
        SystemExecutor { dry_run }
    }
}

impl Executor for SystemExecutor {
    fn dry_run(&self) -> bool {
        self.dry_run
    }

    fn execute(&mut self, cmd: &ToolCommand) -> StageResult<()> {
        if self.dry_run {
            log::info!("{} {}", "[dry-run]".bright_yellow(), cmd);
            return Ok(());
        }
        log::info!("{} {}", "Running:".bright_green().bold(), cmd);
        let status = cmd
            .to_command()
            .status()
            .map_err(|e| StageError::Spawn {
                program: cmd.program.clone(),
                msg: e.to_string(),
            })?;
        if status.success() {
            log::debug!("{} finished", cmd.name());
            Ok(())
        } else {
            Err(StageError::ToolFailed {
                program: cmd.name().to_string(),
                code: status.code(),
            })
        }
    }
}

/// Run commands in order, stopping at the first failure.
pub fn run_steps(exec: &mut dyn Executor, steps: &[ToolCommand]) -> StageResult<()> {
    for (idx, step) in steps.iter().enumerate() {
        log::info!("Step {}/{}: {}", idx + 1, steps.len(), step.name());
        exec.execute(step)?;
    }
    Ok(())
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Records every command and optionally fails on the n-th (0-based) call.
    #[derive(Default)]
    pub struct RecordingExecutor {
        pub calls: Vec<ToolCommand>,
        pub fail_at: Option<usize>,
        pub dry_run: bool,
    }

    impl RecordingExecutor {
        pub fn failing_at(n: usize) -> Self {
            RecordingExecutor {
                fail_at: Some(n),
                ..Default::default()
            }
        }

        pub fn rendered(&self) -> Vec<String> {
            self.calls.iter().map(|c| c.to_string()).collect()
        }
    }

    impl Executor for RecordingExecutor {
        fn dry_run(&self) -> bool {
            self.dry_run
        }

        fn execute(&mut self, cmd: &ToolCommand) -> StageResult<()> {
            let idx = self.calls.len();
            self.calls.push(cmd.clone());
            if self.fail_at == Some(idx) {
                return Err(StageError::ToolFailed {
                    program: cmd.name().to_string(),
                    code: Some(2),
                });
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_command() {
        let cmd = ToolCommand::new("/opt/bin/samtools")
            .arg("sort")
            .args(["-@", "4"])
            .arg(Path::new("out dir/a.bam"));
        assert_eq!(cmd.to_string(), "/opt/bin/samtools sort -@ 4 'out dir/a.bam'");
        assert_eq!(cmd.name(), "samtools");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_argument_reaches_the_tool_unchanged() {
        use std::os::unix::ffi::OsStrExt;
        let raw = OsStr::from_bytes(b"cell_\xff.bam");
        let cmd = ToolCommand::new("samtools").arg("index").arg(raw);
        let command = cmd.to_command();
        let passed: Vec<&OsStr> = command.get_args().collect();
        assert_eq!(passed, vec![OsStr::new("index"), raw]);
    }

    #[test]
    fn test_system_executor_reports_exit_code() {
        let mut exec = SystemExecutor::new(false);
        let ok = ToolCommand::new("sh").args(["-c", "exit 0"]);
        assert!(exec.execute(&ok).is_ok());
        let bad = ToolCommand::new("sh").args(["-c", "exit 7"]);
        match exec.execute(&bad) {
            Err(StageError::ToolFailed { code, .. }) => assert_eq!(code, Some(7)),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_dry_run_does_not_spawn() {
        let mut exec = SystemExecutor::new(true);
        let missing = ToolCommand::new("definitely-not-a-real-binary-xyz");
        assert!(exec.execute(&missing).is_ok());
        let mut real = SystemExecutor::new(false);
        assert!(matches!(
            real.execute(&missing),
            Err(StageError::Spawn { .. })
        ));
    }
}
