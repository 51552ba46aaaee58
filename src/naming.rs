use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    /// Default pattern for recovering a cell barcode from per-cell file names.
    pub static ref CELL_FROM_FILE_RE: Regex = Regex::new(r"_srtn_(.*?)\.deduplicated").unwrap();
}

const FASTQ_SUFFIXES: [&str; 4] = [".fq.gz", ".fastq.gz", ".fq", ".fastq"];
const MATE_SUFFIXES: [&str; 4] = ["_R1_001", "_R1", "_1", ".R1"];

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Strip a known FASTQ suffix, `None` if the name is not a read file.
/// # Example
/// ```
/// use scemtools::naming::fastq_stem;
/// assert_eq!(fastq_stem("cellA_R1.fq.gz"), Some("cellA_R1"));
/// assert_eq!(fastq_stem("cellA_R1.fastq"), Some("cellA_R1"));
/// assert_eq!(fastq_stem("cellA.bam"), None);
/// ```
pub fn fastq_stem(name: &str) -> Option<&str> {
    FASTQ_SUFFIXES
        .iter()
        .find_map(|s| name.strip_suffix(s))
        .filter(|stem| !stem.is_empty())
}

pub fn is_read_file(path: &Path) -> bool {
    fastq_stem(&file_name(path)).is_some()
}

/// Sample id of a read pair, taken from the R1 file name.
/// # Example
/// ```
/// use std::path::Path;
/// use scemtools::naming::sample_id_from_reads;
/// assert_eq!(sample_id_from_reads(Path::new("raw/S1_R1.fq.gz")), "S1");
/// assert_eq!(sample_id_from_reads(Path::new("S1_L001_R1_001.fastq.gz")), "S1_L001");
/// assert_eq!(sample_id_from_reads(Path::new("S2_1.fq.gz")), "S2");
/// assert_eq!(sample_id_from_reads(Path::new("S3.fq")), "S3");
/// ```
pub fn sample_id_from_reads(r1: &Path) -> String {
    let name = file_name(r1);
    let stem = fastq_stem(&name).unwrap_or(&name);
    MATE_SUFFIXES
        .iter()
        .find_map(|s| stem.strip_suffix(s))
        .filter(|s| !s.is_empty())
        .unwrap_or(stem)
        .to_string()
}

/// Everything the trim stage writes for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimOutputs {
    pub trimmed_r1: PathBuf,
    pub trimmed_r2: PathBuf,
    pub clean_r1: PathBuf,
    pub clean_r2: PathBuf,
    pub html: PathBuf,
    pub json: PathBuf,
}

pub fn trim_outputs(dir: &Path, sample: &str) -> TrimOutputs {
    TrimOutputs {
        trimmed_r1: dir.join(format!("{}_R1.trimmed.fq.gz", sample)),
        trimmed_r2: dir.join(format!("{}_R2.trimmed.fq.gz", sample)),
        clean_r1: dir.join(format!("{}_R1.clean.fq.gz", sample)),
        clean_r2: dir.join(format!("{}_R2.clean.fq.gz", sample)),
        html: dir.join(format!("{}.fastp.html", sample)),
        json: dir.join(format!("{}.fastp.json", sample)),
    }
}

/// The BAM Bismark writes for a single-end read file.
/// # Example
/// ```
/// use std::path::Path;
/// use scemtools::naming::bismark_bam;
/// assert_eq!(
///     bismark_bam(Path::new("out"), Path::new("reads/S1_R1.clean.fq.gz")),
///     Path::new("out/S1_R1.clean_bismark_bt2.bam")
/// );
/// ```
pub fn bismark_bam(out_dir: &Path, read: &Path) -> PathBuf {
    let name = file_name(read);
    let stem = fastq_stem(&name).unwrap_or(&name);
    out_dir.join(format!("{}_bismark_bt2.bam", stem))
}

/// Merged and sorted alignment files of the align stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutputs {
    pub merged: PathBuf,
    pub name_sorted: PathBuf,
    pub coord_sorted: PathBuf,
    pub coord_index: PathBuf,
}

pub fn merge_outputs(dir: &Path, prefix: &str) -> MergeOutputs {
    MergeOutputs {
        merged: dir.join(format!("{}.bam", prefix)),
        name_sorted: dir.join(format!("{}_srtn.bam", prefix)),
        coord_sorted: dir.join(format!("{}_srt.bam", prefix)),
        coord_index: dir.join(format!("{}_srt.bam.bai", prefix)),
    }
}

/// Name of the file without its final `.bam`/`.sam` extension.
pub fn alignment_stem(path: &Path) -> String {
    let name = file_name(path);
    name.strip_suffix(".bam")
        .or_else(|| name.strip_suffix(".sam"))
        .unwrap_or(&name)
        .to_string()
}

/// Per-cell SAM written by the split step.
/// # Example
/// ```
/// use std::path::Path;
/// use scemtools::naming::split_output;
/// assert_eq!(
///     split_output(Path::new("cells"), Path::new("run_srtn.bam"), "ACGT"),
///     Path::new("cells/run_srtn_ACGT.sam")
/// );
/// ```
pub fn split_output(dir: &Path, bam: &Path, cb: &str) -> PathBuf {
    dir.join(format!("{}_{}.sam", alignment_stem(bam), cb))
}

/// Per-cell files produced by the dedup stage from `X.sam`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellOutputs {
    pub bam: PathBuf,
    pub deduplicated: PathBuf,
    pub sorted: PathBuf,
    pub sorted_index: PathBuf,
}

pub fn cell_outputs(dir: &Path, sam: &Path) -> CellOutputs {
    let stem = alignment_stem(sam);
    CellOutputs {
        bam: dir.join(format!("{}.bam", stem)),
        deduplicated: dir.join(format!("{}.deduplicated.bam", stem)),
        sorted: dir.join(format!("{}.deduplicated.srt.bam", stem)),
        sorted_index: dir.join(format!("{}.deduplicated.srt.bam.bai", stem)),
    }
}

/// Per-BAM tag table written by `count-umi`.
pub fn umi_detail_output(dir: &Path, bam: &Path) -> PathBuf {
    dir.join(format!("{}.reads.info.txt", file_name(bam)))
}

/// Cell barcode from a file name using the first capture group of `re`,
/// falling back to the file name without its last extension.
/// # Example
/// ```
/// use std::path::Path;
/// use scemtools::naming::{barcode_from_filename, CELL_FROM_FILE_RE};
/// let p = Path::new("x/run_cc3_srtn_AAAC.deduplicated.srt.bam");
/// assert_eq!(barcode_from_filename(p, &CELL_FROM_FILE_RE), "AAAC");
/// let q = Path::new("x/other.bam");
/// assert_eq!(barcode_from_filename(q, &CELL_FROM_FILE_RE), "other");
/// ```
pub fn barcode_from_filename(path: &Path, re: &Regex) -> String {
    let name = file_name(path);
    if let Some(m) = re.captures(&name).and_then(|c| c.get(1)) {
        return m.as_str().to_string();
    }
    match name.rfind('.') {
        Some(i) if i > 0 => name[..i].to_string(),
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lineage_trim_to_dedup() {
        let out = Path::new("work");
        let trim = trim_outputs(out, "S1");
        assert_eq!(trim.trimmed_r1, Path::new("work/S1_R1.trimmed.fq.gz"));
        assert_eq!(trim.clean_r2, Path::new("work/S1_R2.clean.fq.gz"));
        assert_eq!(trim.html, Path::new("work/S1.fastp.html"));
        assert_eq!(trim.json, Path::new("work/S1.fastp.json"));

        let merged = merge_outputs(out, "run_cc3");
        assert_eq!(merged.name_sorted, Path::new("work/run_cc3_srtn.bam"));
        assert_eq!(merged.coord_index, Path::new("work/run_cc3_srt.bam.bai"));

        let sam = split_output(Path::new("cells"), &merged.name_sorted, "AAAC");
        assert_eq!(sam, Path::new("cells/run_cc3_srtn_AAAC.sam"));

        let cell = cell_outputs(Path::new("dedup"), &sam);
        assert_eq!(cell.bam, Path::new("dedup/run_cc3_srtn_AAAC.bam"));
        assert_eq!(
            cell.deduplicated,
            Path::new("dedup/run_cc3_srtn_AAAC.deduplicated.bam")
        );
        assert_eq!(
            cell.sorted,
            Path::new("dedup/run_cc3_srtn_AAAC.deduplicated.srt.bam")
        );
        // the sorted per-cell BAM feeds count-umi, whose default regex must find the cell
        assert_eq!(barcode_from_filename(&cell.sorted, &CELL_FROM_FILE_RE), "AAAC");
        assert_eq!(
            umi_detail_output(Path::new("."), &cell.sorted),
            Path::new("./run_cc3_srtn_AAAC.deduplicated.srt.bam.reads.info.txt")
        );
    }

    #[test]
    fn test_read_file_detection() {
        assert!(is_read_file(Path::new("a/b_R2.fastq.gz")));
        assert!(!is_read_file(Path::new("a/b.fastp.json")));
        assert!(!is_read_file(Path::new(".fq.gz")));
        // a bare mate suffix is kept rather than producing an empty id
        assert_eq!(sample_id_from_reads(Path::new("_R1.fq.gz")), "_R1");
    }
}
