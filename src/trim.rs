use super::myio;
use super::naming::{self, TrimOutputs};
use super::runner::{run_steps, Executor, ToolCommand, Tools};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct TrimOptions {
    pub r1: PathBuf,
    pub r2: PathBuf,
    /// Explicit sample id; derived from `r1` when absent.
    pub sample: Option<String>,
    pub out_dir: PathBuf,
    /// Fixed number of bases cutadapt removes from R1 (`-u`, negative cuts the 3' end).
    pub cut_r1: i32,
    /// Same for R2 (`-U`).
    pub cut_r2: i32,
    pub quality: u8,
    pub min_len: usize,
    pub threads: usize,
}

impl TrimOptions {
    pub fn sample_id(&self) -> String {
        self.sample
            .clone()
            .unwrap_or_else(|| naming::sample_id_from_reads(&self.r1))
    }
}

pub fn cutadapt_command(tools: &Tools, opts: &TrimOptions, out: &TrimOutputs) -> ToolCommand {
    ToolCommand::new(&tools.cutadapt)
        .arg("-u")
        .arg(opts.cut_r1.to_string())
        .arg("-U")
        .arg(opts.cut_r2.to_string())
        .arg("-j")
        .arg(opts.threads.to_string())
        .arg("-o")
        .arg(&out.trimmed_r1)
        .arg("-p")
        .arg(&out.trimmed_r2)
        .arg(&opts.r1)
        .arg(&opts.r2)
}

pub fn fastp_command(tools: &Tools, opts: &TrimOptions, out: &TrimOutputs) -> ToolCommand {
    ToolCommand::new(&tools.fastp)
        .arg("-i")
        .arg(&out.trimmed_r1)
        .arg("-I")
        .arg(&out.trimmed_r2)
        .arg("-o")
        .arg(&out.clean_r1)
        .arg("-O")
        .arg(&out.clean_r2)
        .arg("-q")
        .arg(opts.quality.to_string())
        .arg("-l")
        .arg(opts.min_len.to_string())
        .arg("-w")
        .arg(opts.threads.to_string())
        .arg("-h")
        .arg(&out.html)
        .arg("-j")
        .arg(&out.json)
}

/// Fixed-length trimming followed by fastp QC of one read pair.
pub fn run_trim(
    opts: &TrimOptions,
    tools: &Tools,
    exec: &mut dyn Executor,
) -> anyhow::Result<TrimOutputs> {
    myio::require(&opts.r1)?;
    myio::require(&opts.r2)?;

    let sample = opts.sample_id();
    fs::create_dir_all(&opts.out_dir)?;
    let out = naming::trim_outputs(&opts.out_dir, &sample);
    log::info!("Trimming sample {} into {}", sample, opts.out_dir.display());

    run_steps(
        exec,
        &[
            cutadapt_command(tools, opts, &out),
            fastp_command(tools, opts, &out),
        ],
    )?;
    log::info!("QC reports: {} {}", out.html.display(), out.json.display());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::runner::testing::RecordingExecutor;
    use std::fs::File;
    use std::path::Path;

    fn opts(dir: &Path) -> TrimOptions {
        let r1 = dir.join("S1_R1.fq.gz");
        let r2 = dir.join("S1_R2.fq.gz");
        File::create(&r1).unwrap();
        File::create(&r2).unwrap();
        TrimOptions {
            r1,
            r2,
            sample: None,
            out_dir: dir.join("trimmed"),
            cut_r1: 29,
            cut_r2: 10,
            quality: 20,
            min_len: 36,
            threads: 4,
        }
    }

    #[test]
    fn test_trim_commands_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let o = opts(dir.path());
        let mut exec = RecordingExecutor::default();
        let out = run_trim(&o, &Tools::default(), &mut exec).unwrap();
        assert!(o.out_dir.is_dir());
        assert_eq!(exec.calls.len(), 2);
        assert_eq!(exec.calls[0].program, "cutadapt");
        assert_eq!(&exec.calls[0].args[..6], ["-u", "29", "-U", "10", "-j", "4"]);
        assert!(exec.calls[0]
            .args
            .contains(&out.trimmed_r1.clone().into_os_string()));
        assert_eq!(exec.calls[1].program, "fastp");
        assert_eq!(
            out.clean_r1.file_name().unwrap().to_string_lossy(),
            "S1_R1.clean.fq.gz"
        );
        assert!(exec.rendered()[1].contains("S1.fastp.json"));
    }

    #[test]
    fn test_explicit_sample_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = opts(dir.path());
        o.sample = Some("cellX".to_string());
        let mut exec = RecordingExecutor::default();
        let out = run_trim(&o, &Tools::default(), &mut exec).unwrap();
        assert!(out.html.ends_with("cellX.fastp.html"));
    }

    #[test]
    fn test_missing_read_invokes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = opts(dir.path());
        o.r2 = dir.path().join("absent_R2.fq.gz");
        let mut exec = RecordingExecutor::default();
        let err = run_trim(&o, &Tools::default(), &mut exec).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StageError>(),
            Some(StageError::MissingInput { .. })
        ));
        assert!(exec.calls.is_empty());
    }

    #[test]
    fn test_cutadapt_failure_stops_fastp() {
        let dir = tempfile::tempdir().unwrap();
        let o = opts(dir.path());
        let mut exec = RecordingExecutor::failing_at(0);
        let err = run_trim(&o, &Tools::default(), &mut exec).unwrap_err();
        assert_eq!(exec.calls.len(), 1);
        assert_eq!(err.downcast_ref::<StageError>().unwrap().exit_code(), 2);
    }
}
