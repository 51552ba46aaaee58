use super::error::StageError;
use super::myio;
use super::naming::{self, MergeOutputs};
use super::runner::{run_steps, Executor, ToolCommand, Tools};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AlignOptions {
    /// Bismark-prepared reference genome folder.
    pub genome: PathBuf,
    /// Working directory scanned for read files.
    pub reads_dir: PathBuf,
    /// Only read files whose name ends with this are aligned.
    pub reads_suffix: String,
    /// Where Bismark writes its BAMs and reports.
    pub bismark_dir: PathBuf,
    /// Directories whose BAMs are merged; defaults to `bismark_dir` when empty.
    pub merge_dirs: Vec<PathBuf>,
    pub out_dir: PathBuf,
    pub prefix: String,
    pub non_directional: bool,
    pub skip_align: bool,
    pub threads: usize,
}

impl AlignOptions {
    fn merge_dirs(&self) -> Vec<PathBuf> {
        if self.merge_dirs.is_empty() {
            vec![self.bismark_dir.clone()]
        } else {
            self.merge_dirs.clone()
        }
    }
}

pub fn bismark_command(tools: &Tools, opts: &AlignOptions, read: &Path) -> ToolCommand {
    let mut cmd = ToolCommand::new(&tools.bismark)
        .arg("--genome")
        .arg(&opts.genome);
    if opts.non_directional {
        cmd = cmd.arg("--non_directional");
    }
    cmd.arg("-p")
        .arg(opts.threads.to_string())
        .arg("-o")
        .arg(&opts.bismark_dir)
        .arg(read)
}

/// merge, sort by name, sort by coordinate, index.
pub fn merge_commands(
    tools: &Tools,
    bams: &[PathBuf],
    out: &MergeOutputs,
    threads: usize,
) -> Vec<ToolCommand> {
    let t = threads.to_string();
    let merge = ToolCommand::new(&tools.samtools)
        .args(["merge", "-f", "-@", t.as_str()])
        .arg(&out.merged)
        .args(bams);
    let sort_name = ToolCommand::new(&tools.samtools)
        .args(["sort", "-n", "-@", t.as_str(), "-o"])
        .arg(&out.name_sorted)
        .arg(&out.merged);
    let sort_coord = ToolCommand::new(&tools.samtools)
        .args(["sort", "-@", t.as_str(), "-o"])
        .arg(&out.coord_sorted)
        .arg(&out.merged);
    let index = ToolCommand::new(&tools.samtools)
        .arg("index")
        .arg(&out.coord_sorted);
    vec![merge, sort_name, sort_coord, index]
}

/// Bismark over every read file in the working directory, then merge and sort.
pub fn run_align(
    opts: &AlignOptions,
    tools: &Tools,
    exec: &mut dyn Executor,
) -> anyhow::Result<MergeOutputs> {
    // BAMs the alignments below will write
    let mut expected = Vec::new();
    if !opts.skip_align {
        myio::require(&opts.genome)?;
        let pattern = format!("*{}", opts.reads_suffix);
        let reads = myio::list_files_nonempty(&opts.reads_dir, &pattern, |p| {
            naming::is_read_file(p) && myio::name_ends_with(p, &opts.reads_suffix)
        })?;
        fs::create_dir_all(&opts.bismark_dir)?;
        log::info!(
            "Aligning {} read files against {}",
            reads.len(),
            opts.genome.display()
        );
        for read in &reads {
            let bam = naming::bismark_bam(&opts.bismark_dir, read);
            log::info!("Bismark: {} -> {}", read.display(), bam.display());
            exec.execute(&bismark_command(tools, opts, read))?;
            expected.push(bam);
        }
    }

    // listed only now so the BAMs written above are included
    let mut bams = Vec::new();
    for dir in opts.merge_dirs() {
        if exec.dry_run() && !dir.is_dir() {
            log::info!("{} does not exist yet", dir.display());
            continue;
        }
        let found = myio::list_files(&dir, "*.bam", |p| myio::name_ends_with(p, ".bam"))?;
        log::info!("{} BAM files in {}", found.len(), dir.display());
        bams.extend(found);
    }
    // a dry run wrote nothing, so merge what bismark would have written
    if exec.dry_run() && opts.merge_dirs().contains(&opts.bismark_dir) {
        for bam in expected {
            if !bams.contains(&bam) {
                bams.push(bam);
            }
        }
    }
    if bams.is_empty() {
        return Err(StageError::NoInputs {
            dir: opts.merge_dirs()[0].clone(),
            pattern: "*.bam".to_string(),
        }
        .into());
    }

    fs::create_dir_all(&opts.out_dir)?;
    let out = naming::merge_outputs(&opts.out_dir, &opts.prefix);
    log::info!("Merging {} BAM files into {}", bams.len(), out.merged.display());
    run_steps(exec, &merge_commands(tools, &bams, &out, opts.threads))?;
    Ok(out)
}
