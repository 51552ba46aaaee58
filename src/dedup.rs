use super::myio;
use super::naming::{self, CellOutputs};
use super::runner::{run_steps, Executor, ToolCommand, Tools};
use anyhow::Context;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DedupOptions {
    /// Folder of per-cell SAM files (output of `split`).
    pub sam_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Output folder written into every extractor command.
    pub extract_dir: PathBuf,
    /// Command-list file, one extractor invocation per line.
    pub commands_file: PathBuf,
    pub genome: Option<PathBuf>,
    pub paired: bool,
    pub gzip: bool,
    pub bedgraph: bool,
    pub comprehensive: bool,
    /// Only write the command list, do not run the per-cell tools.
    pub commands_only: bool,
    pub threads: usize,
}

impl DedupOptions {
    fn end_flag(&self) -> &'static str {
        if self.paired {
            "-p"
        } else {
            "-s"
        }
    }
}

pub fn cell_commands(
    tools: &Tools,
    opts: &DedupOptions,
    sam: &Path,
    cell: &CellOutputs,
) -> Vec<ToolCommand> {
    let t = opts.threads.to_string();
    let to_bam = ToolCommand::new(&tools.samtools)
        .args(["view", "-b", "-@", t.as_str(), "-o"])
        .arg(&cell.bam)
        .arg(sam);
    let dedup = ToolCommand::new(&tools.deduplicate_bismark)
        .arg(opts.end_flag())
        .arg("--bam")
        .arg("--output_dir")
        .arg(&opts.out_dir)
        .arg(&cell.bam);
    let sort = ToolCommand::new(&tools.samtools)
        .args(["sort", "-@", t.as_str(), "-o"])
        .arg(&cell.sorted)
        .arg(&cell.deduplicated);
    let index = ToolCommand::new(&tools.samtools)
        .arg("index")
        .arg(&cell.sorted);
    vec![to_bam, dedup, sort, index]
}

pub fn extractor_command(tools: &Tools, opts: &DedupOptions, cell: &CellOutputs) -> ToolCommand {
    let mut cmd = ToolCommand::new(&tools.methylation_extractor).arg(opts.end_flag());
    if opts.gzip {
        cmd = cmd.arg("--gzip");
    }
    if opts.bedgraph {
        cmd = cmd.arg("--bedGraph");
    }
    if opts.comprehensive {
        cmd = cmd.arg("--comprehensive");
    }
    if let Some(genome) = &opts.genome {
        cmd = cmd.arg("--genome_folder").arg(genome);
    }
    cmd.arg("-o").arg(&opts.extract_dir).arg(&cell.deduplicated)
}

#[derive(Debug)]
pub struct DedupReport {
    pub cells: Vec<CellOutputs>,
    pub commands: Vec<ToolCommand>,
}

/// Per-cell SAM→BAM, deduplication, sort and index, then the extractor command list.
pub fn run_dedup(
    opts: &DedupOptions,
    tools: &Tools,
    exec: &mut dyn Executor,
) -> anyhow::Result<DedupReport> {
    let sams = myio::list_files_nonempty(&opts.sam_dir, "*.sam", |p| {
        myio::name_ends_with(p, ".sam")
    })?;
    fs::create_dir_all(&opts.out_dir)?;
    log::info!("Processing {} cells from {}", sams.len(), opts.sam_dir.display());

    let cells: Vec<CellOutputs> = sams
        .iter()
        .map(|sam| naming::cell_outputs(&opts.out_dir, sam))
        .collect();

    if !opts.commands_only {
        for (n, (sam, cell)) in sams.iter().zip(&cells).enumerate() {
            log::info!("Cell {}/{}: {}", n + 1, sams.len(), sam.display());
            run_steps(exec, &cell_commands(tools, opts, sam, cell))?;
        }
    }

    let commands: Vec<ToolCommand> = cells
        .iter()
        .map(|cell| extractor_command(tools, opts, cell))
        .collect();
    write_command_list(&opts.commands_file, &commands)?;
    log::info!(
        "Wrote {} methylation extraction commands to {}",
        commands.len(),
        opts.commands_file.display()
    );
    Ok(DedupReport { cells, commands })
}

pub fn write_command_list(path: &Path, commands: &[ToolCommand]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut out = myio::writer(path)?;
    for cmd in commands {
        writeln!(out, "{}", cmd)
            .with_context(|| format!("failed writing {}", path.display()))?;
    }
    out.finish()?;
    Ok(())
}
