use super::myio;
use super::naming;
use anyhow::{Context, Result};
use itertools::Itertools;
use rayon::prelude::*;
use regex::Regex;
use rust_htslib::bam::{self, Read};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct UmiOptions {
    pub bam_dir: PathBuf,
    pub summary: PathBuf,
    /// Where the per-BAM `<bam>.reads.info.txt` tables go.
    pub detail_dir: PathBuf,
    pub barcode_re: Regex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UmiCounts {
    pub bam: PathBuf,
    pub barcode: String,
    /// Reads per tag, in first-seen order.
    pub tags: Vec<(String, u64)>,
}

impl UmiCounts {
    pub fn umi_count(&self) -> usize {
        self.tags.len()
    }

    pub fn reads_count(&self) -> u64 {
        self.tags.iter().map(|(_, n)| n).sum()
    }
}

/// The last `_`-separated field of a read name.
/// # Example
/// ```
/// use scemtools::umi::tag_from_read_name;
/// assert_eq!(tag_from_read_name("CB_UMI_001_R1"), "R1");
/// assert_eq!(tag_from_read_name("plain"), "plain");
/// ```
pub fn tag_from_read_name(name: &str) -> &str {
    name.rsplit('_').next().unwrap_or(name)
}

pub fn count_bam_tags(path: &Path, threads: usize) -> Result<Vec<(String, u64)>> {
    let mut reader = bam::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    reader.set_threads(threads)?;
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut tags: Vec<(String, u64)> = Vec::new();
    for rec in reader.records() {
        let rec = rec?;
        let qname = String::from_utf8_lossy(rec.qname());
        let tag = tag_from_read_name(&qname);
        match index.get(tag) {
            Some(&i) => tags[i].1 += 1,
            None => {
                index.insert(tag.to_string(), tags.len());
                tags.push((tag.to_string(), 1));
            }
        }
    }
    Ok(tags)
}

pub fn write_detail(path: &Path, counts: &UmiCounts) -> Result<()> {
    let mut out = myio::writer(path)?;
    writeln!(out, "tag\tcount")?;
    for (tag, n) in &counts.tags {
        writeln!(out, "{}\t{}", tag, n)?;
    }
    out.finish()?;
    Ok(())
}

pub fn write_summary(path: &Path, all: &[UmiCounts]) -> Result<()> {
    let mut out = myio::writer(path)?;
    writeln!(out, "barcode\tumi_count\treads_count")?;
    for c in all {
        writeln!(out, "{}\t{}\t{}", c.barcode, c.umi_count(), c.reads_count())?;
    }
    out.finish()?;
    Ok(())
}

/// Count read-name tags in every `*srt.bam` of a folder, one cell per BAM.
/// Returns `None` when the folder holds no such BAM.
pub fn run_count_umi(opts: &UmiOptions) -> Result<Option<Vec<UmiCounts>>> {
    let bams = myio::list_files(&opts.bam_dir, "*srt.bam", |p| {
        myio::name_ends_with(p, "srt.bam")
    })?;
    if bams.is_empty() {
        log::warn!("No '*srt.bam' files found in: {}", opts.bam_dir.display());
        return Ok(None);
    }
    std::fs::create_dir_all(&opts.detail_dir)?;

    // one decompression thread per BAM, files in parallel
    let all: Vec<UmiCounts> = bams
        .par_iter()
        .map(|bam| -> Result<UmiCounts> {
            let tags = count_bam_tags(bam, 1)?;
            Ok(UmiCounts {
                bam: bam.clone(),
                barcode: naming::barcode_from_filename(bam, &opts.barcode_re),
                tags,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    for counts in &all {
        log::info!(
            "{}\t{}\t{}\t{}",
            counts.bam.file_name().unwrap_or_default().to_string_lossy(),
            counts.barcode,
            counts.umi_count(),
            counts.reads_count()
        );
        write_detail(&naming::umi_detail_output(&opts.detail_dir, &counts.bam), counts)?;
    }
    let distinct = all.iter().map(|c| &c.barcode).unique().count();
    if distinct < all.len() {
        log::warn!("{} BAM files share a barcode", all.len() - distinct);
    }
    write_summary(&opts.summary, &all)?;
    log::info!("Summary written to: {}", opts.summary.display());
    Ok(Some(all))
}
