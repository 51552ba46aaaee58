use clap::IntoApp;
use clap::{AppSettings, Parser, Subcommand};
use std::path::PathBuf;

use crate::runner::Tools;
use crate::split;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    propagate_version = true,
    subcommand_required = true,
    infer_subcommands = true,
    arg_required_else_help = true,
    help_expected = true
)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
pub struct Cli {
    /// Threads handed to external tools and used for BAM decompression.
    #[clap(short, long, default_value_t = 8, global = true)]
    pub threads: usize,

    /// Logging level [-v: Info, -vv: Debug, -vvv: Trace].
    #[clap(
        short,
        long,
        parse(from_occurrences),
        global = true,
        help_heading = "DEBUG"
    )]
    pub verbose: usize,

    /// Log the external commands without running them.
    #[clap(long, global = true, help_heading = "DEBUG")]
    pub dry_run: bool,

    /// cutadapt executable.
    #[clap(
        long,
        env = "SCEM_CUTADAPT",
        default_value = "cutadapt",
        global = true,
        help_heading = "TOOLS"
    )]
    pub cutadapt: String,
    /// fastp executable.
    #[clap(
        long,
        env = "SCEM_FASTP",
        default_value = "fastp",
        global = true,
        help_heading = "TOOLS"
    )]
    pub fastp: String,
    /// bismark executable.
    #[clap(
        long,
        env = "SCEM_BISMARK",
        default_value = "bismark",
        global = true,
        help_heading = "TOOLS"
    )]
    pub bismark: String,
    /// samtools executable.
    #[clap(
        long,
        env = "SCEM_SAMTOOLS",
        default_value = "samtools",
        global = true,
        help_heading = "TOOLS"
    )]
    pub samtools: String,
    /// deduplicate_bismark executable.
    #[clap(
        long,
        env = "SCEM_DEDUPLICATE_BISMARK",
        default_value = "deduplicate_bismark",
        global = true,
        help_heading = "TOOLS"
    )]
    pub deduplicate_bismark: String,
    /// bismark_methylation_extractor executable.
    #[clap(
        long,
        env = "SCEM_METHYLATION_EXTRACTOR",
        default_value = "bismark_methylation_extractor",
        global = true,
        help_heading = "TOOLS"
    )]
    pub methylation_extractor: String,

    #[clap(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn tools(&self) -> Tools {
        Tools {
            cutadapt: self.cutadapt.clone(),
            fastp: self.fastp.clone(),
            bismark: self.bismark.clone(),
            samtools: self.samtools.clone(),
            deduplicate_bismark: self.deduplicate_bismark.clone(),
            methylation_extractor: self.methylation_extractor.clone(),
        }
    }
}

///
/// This structure contains all the subcommands for scemtools and their help descriptions.
///
/// Subcommands are listed in the order the pipeline runs them.
/// For example, the `AddCbUmi` enum is invoked using `scem add-cb-umi`
/// and the `CountUmi` command with `scem count-umi`.
///
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Tag paired FASTQ reads with the cell barcode and UMI found at the start of R1.
    ///
    /// Reads whose barcode is not in the whitelist are dropped from both files.
    /// Kept headers become `@<id>_<CB>_<UMI> 1:N:0:<UMI>` (`2:N:0:` for R2) and a
    /// `<prefix>_cell_barcode_info.txt` table of reads per barcode is written.
    #[clap(visible_aliases = &["tag", "cb"])]
    AddCbUmi {
        /// Input FASTQ(.gz) for read 1.
        #[clap(short = 'i', long)]
        in1: PathBuf,
        /// Input FASTQ(.gz) for read 2.
        #[clap(short = 'I', long)]
        in2: PathBuf,
        /// Output FASTQ for read 1 (gzipped if it ends in .gz).
        #[clap(short = 'o', long)]
        out1: PathBuf,
        /// Output FASTQ for read 2 (gzipped if it ends in .gz).
        #[clap(short = 'O', long)]
        out2: PathBuf,
        /// Plain-text file with one valid cell barcode per line.
        #[clap(short = 'c', long)]
        cb: PathBuf,
        /// Prefix for the cell-barcode summary file.
        #[clap(short, long)]
        prefix: String,
        /// Length of the cell barcode at the start of R1.
        #[clap(long, default_value_t = 17)]
        cb_len: usize,
        /// Length of the UMI immediately following the barcode.
        #[clap(long, default_value_t = 12)]
        umi_len: usize,
    },
    /// Fixed-length trimming (cutadapt) then quality filtering (fastp) of one read pair.
    Trim {
        /// Read 1 file.
        r1: PathBuf,
        /// Read 2 file.
        r2: PathBuf,
        /// Sample id used for output names, derived from R1 when omitted.
        sample: Option<String>,
        /// Output directory.
        #[clap(short, long, default_value = ".")]
        out_dir: PathBuf,
        /// Bases cutadapt removes from read 1 (negative values cut the 3' end).
        #[clap(long, default_value_t = 29, allow_hyphen_values = true)]
        cut_r1: i32,
        /// Bases cutadapt removes from read 2.
        #[clap(long, default_value_t = 10, allow_hyphen_values = true)]
        cut_r2: i32,
        /// fastp qualified base quality (-q).
        #[clap(short, long, default_value_t = 20)]
        quality: u8,
        /// fastp minimum read length (-l).
        #[clap(short, long, default_value_t = 36)]
        min_len: usize,
    },
    /// Run Bismark on every read file in a directory, then merge BAMs and sort them by name and coordinate.
    #[clap(visible_aliases = &["map"])]
    Align {
        /// Bismark-prepared genome folder.
        #[clap(short, long)]
        genome: PathBuf,
        /// Directory scanned for read files (*.fq.gz, *.fastq.gz).
        #[clap(short, long, default_value = ".")]
        reads_dir: PathBuf,
        /// Align only read files ending with this (trim writes *.trimmed.fq.gz intermediates next to them).
        #[clap(long, default_value = ".clean.fq.gz")]
        reads_suffix: String,
        /// Bismark output directory.
        #[clap(short, long, default_value = "bismark_out")]
        bismark_dir: PathBuf,
        /// Directories whose BAMs are merged (repeatable, e.g. the R1 and R2 alignment folders).
        /// Defaults to the Bismark output directory.
        #[clap(short, long, multiple_occurrences = true)]
        merge_dir: Vec<PathBuf>,
        /// Directory for the merged and sorted BAMs.
        #[clap(short, long, default_value = ".")]
        out_dir: PathBuf,
        /// Prefix of the merged BAMs (<prefix>.bam, <prefix>_srtn.bam, <prefix>_srt.bam).
        #[clap(short, long)]
        prefix: String,
        /// Run Bismark in directional mode instead of --non_directional.
        #[clap(long)]
        directional: bool,
        /// Skip alignment and only merge and sort existing BAMs.
        #[clap(long)]
        skip_align: bool,
    },
    /// Split a name-sorted BAM into one SAM per cell barcode taken from the read name.
    #[clap(visible_aliases = &["split-bam"])]
    Split {
        /// Input BAM (read names like <id>_<CB>_<UMI>, as written by add-cb-umi).
        bam: PathBuf,
        /// Output directory for the per-cell SAM files.
        #[clap(short, long, default_value = "split_bam_files_sam")]
        out_dir: PathBuf,
        /// 0-based `_`-separated read-name field holding the barcode.
        #[clap(long, default_value_t = split::DEFAULT_CB_FIELD)]
        cb_field: usize,
        /// Skip reads whose names have fewer `_`-separated fields.
        #[clap(long, default_value_t = split::DEFAULT_MIN_FIELDS)]
        min_fields: usize,
        /// Most per-cell SAM files held open at once; keep it below `ulimit -n`.
        #[clap(long, default_value_t = split::DEFAULT_MAX_OPEN)]
        max_open: usize,
    },
    /// Per-cell SAM to BAM, deduplicate_bismark, sort and index, and write methylation-extraction commands.
    ///
    /// The command list holds one bismark_methylation_extractor call per cell and is not executed.
    #[clap(visible_aliases = &["dd"])]
    Dedup {
        /// Directory of per-cell SAM files.
        #[clap(short, long, default_value = "split_bam_files_sam")]
        sam_dir: PathBuf,
        /// Directory for the per-cell BAMs.
        #[clap(short, long, default_value = "dedup_bam")]
        out_dir: PathBuf,
        /// Output directory written into every extractor command.
        #[clap(short, long, default_value = "methylation_calls")]
        extract_dir: PathBuf,
        /// Command-list file.
        #[clap(short, long, default_value = "methylation_extract_commands.sh")]
        commands: PathBuf,
        /// Genome folder passed to the extractor (--genome_folder).
        #[clap(short, long)]
        genome: Option<PathBuf>,
        /// Reads are paired-end (-p instead of -s).
        #[clap(long)]
        paired: bool,
        /// Do not add --gzip to the extractor commands.
        #[clap(long)]
        no_gzip: bool,
        /// Add --bedGraph to the extractor commands.
        #[clap(long)]
        bedgraph: bool,
        /// Add --comprehensive to the extractor commands.
        #[clap(long)]
        comprehensive: bool,
        /// Only write the command list.
        #[clap(long)]
        commands_only: bool,
    },
    /// Count UMI-like read-name tags (last `_` field) in every *srt.bam of a folder.
    #[clap(visible_aliases = &["umi"])]
    CountUmi {
        /// Folder with per-cell *srt.bam files.
        bam_dir: PathBuf,
        /// Output summary TSV.
        summary: PathBuf,
        /// Directory for the per-BAM <bam>.reads.info.txt tables.
        #[clap(short, long, default_value = ".")]
        detail_dir: PathBuf,
        /// Regex whose first group extracts the barcode from a BAM file name.
        #[clap(short, long, default_value = r"_srtn_(.*?)\.deduplicated")]
        barcode_regex: String,
    },
    /// Per-cell CpG coverage and call consistency from *cpg.txt tables.
    ///
    /// A site is a (chromosome, position) pair, so the same coordinate on two
    /// chromosomes counts as two sites. Tools that key sites by position alone
    /// report lower Detect_pos and different ratios on multi-chromosome data.
    #[clap(visible_aliases = &["mcpg-consistency"])]
    Mcpg {
        /// Folder with *cpg.txt files (chr, pos, status; tab separated).
        input_dir: PathBuf,
        /// Output summary TSV.
        summary: PathBuf,
        /// Regex whose first group extracts the barcode from a file name.
        #[clap(short, long, default_value = r"_srtn_(.*?)\.deduplicated")]
        barcode_regex: String,
    },
}

pub fn make_cli_parse() -> Cli {
    Cli::parse()
}

pub fn make_cli_app() -> clap::Command<'static> {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_trim_with_sample() {
        let cli = Cli::try_parse_from([
            "scem", "-t", "4", "trim", "a_R1.fq.gz", "a_R2.fq.gz", "cell1", "--cut-r1", "-5",
        ])
        .unwrap();
        assert_eq!(cli.threads, 4);
        match cli.command {
            Some(Commands::Trim { sample, cut_r1, .. }) => {
                assert_eq!(sample.as_deref(), Some("cell1"));
                assert_eq!(cut_r1, -5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_split_defaults_follow_tagged_names() {
        let cli = Cli::try_parse_from(["scem", "split", "run_srtn.bam"]).unwrap();
        match cli.command {
            Some(Commands::Split {
                cb_field,
                min_fields,
                max_open,
                ..
            }) => {
                assert_eq!((cb_field, min_fields), (1, 3));
                assert_eq!(max_open, 512);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_tool_override_after_subcommand() {
        let cli = Cli::try_parse_from([
            "scem",
            "align",
            "-g",
            "hg38",
            "-p",
            "run",
            "-m",
            "r1",
            "-m",
            "r2",
            "--samtools",
            "/opt/samtools",
        ])
        .unwrap();
        assert_eq!(cli.tools().samtools, "/opt/samtools");
        match cli.command {
            Some(Commands::Align { merge_dir, .. }) => assert_eq!(merge_dir.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
