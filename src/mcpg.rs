use super::error::StageError;
use super::myio;
use super::naming;
use anyhow::Result;
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct McpgOptions {
    pub input_dir: PathBuf,
    pub summary: PathBuf,
    pub barcode_re: Regex,
}

/// Coverage and call-consistency metrics of one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellMcpg {
    pub barcode: String,
    /// Distinct CpG positions observed.
    pub detect_pos: u64,
    /// Positions covered by at least two calls.
    pub rep_pos: u64,
    /// Positions whose calls disagree.
    pub ins_pos: u64,
}

impl CellMcpg {
    pub fn rep_pro(&self) -> f64 {
        ratio(self.rep_pos, self.detect_pos)
    }

    pub fn ins_pro(&self) -> f64 {
        ratio(self.ins_pos, self.detect_pos)
    }
}

fn ratio(n: u64, d: u64) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 / d as f64
    }
}

#[derive(Default)]
struct Site {
    calls: u64,
    first: String,
    mixed: bool,
}

/// One call as `(chr, pos, status)`.
/// Accepts `chr pos status` or Bismark's raw `read strand chr pos call` rows.
fn parse_call(line: &str) -> Option<(&str, u64, &str)> {
    let cols: Vec<&str> = line.split('\t').collect();
    let (chr, pos, status) = match cols.len() {
        3 | 4 => (cols[0], cols[1], cols[2]),
        n if n >= 5 => (cols[2], cols[3], cols[4]),
        _ => return None,
    };
    pos.trim().parse().ok().map(|p| (chr, p, status.trim()))
}

/// Compute the metrics of a single call table.
pub fn cell_mcpg(path: &Path, barcode_re: &Regex) -> Result<CellMcpg> {
    let mut sites: HashMap<(String, u64), Site> = HashMap::new();
    for (idx, line) in myio::reader(path)?.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with("Bismark methylation extractor") {
            continue;
        }
        let (chr, pos, status) = parse_call(&line).ok_or_else(|| StageError::Parse {
            msg: format!("{} line {}: {:?}", path.display(), idx + 1, line),
        })?;
        let site = sites.entry((chr.to_string(), pos)).or_default();
        if site.calls == 0 {
            site.first = status.to_string();
        } else if site.first != status {
            site.mixed = true;
        }
        site.calls += 1;
    }

    let barcode = naming::barcode_from_filename(path, barcode_re);
    if sites.is_empty() {
        log::warn!("No positions found in file: {}", path.display());
    }
    Ok(CellMcpg {
        barcode,
        detect_pos: sites.len() as u64,
        rep_pos: sites.values().filter(|s| s.calls >= 2).count() as u64,
        ins_pos: sites.values().filter(|s| s.mixed).count() as u64,
    })
}

pub fn write_summary(path: &Path, cells: &[CellMcpg]) -> Result<()> {
    let mut out = myio::writer(path)?;
    writeln!(out, "Barcode\tDetect_pos\tRep_pos\tIns_pos\tRep_pro\tIns_pro")?;
    for c in cells {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{:.6}\t{:.6}",
            c.barcode,
            c.detect_pos,
            c.rep_pos,
            c.ins_pos,
            c.rep_pro(),
            c.ins_pro()
        )?;
    }
    out.finish()?;
    Ok(())
}

fn is_call_table(p: &Path) -> bool {
    myio::name_ends_with(p, "cpg.txt") || myio::name_ends_with(p, "cpg.txt.gz")
}

/// Summarise every `*cpg.txt` in a folder. `None` when there is nothing to do.
pub fn run_mcpg(opts: &McpgOptions) -> Result<Option<Vec<CellMcpg>>> {
    let files = myio::list_files(&opts.input_dir, "*cpg.txt", is_call_table)?;
    if files.is_empty() {
        log::warn!("No files matching '*cpg.txt' in: {}", opts.input_dir.display());
        return Ok(None);
    }
    let cells = files
        .par_iter()
        .map(|f| cell_mcpg(f, &opts.barcode_re))
        .collect::<Result<Vec<_>>>()?;
    for c in &cells {
        log::info!(
            "{} | Detect_pos={} | Rep_pos={} ({:.4}) | Ins_pos={} ({:.4})",
            c.barcode,
            c.detect_pos,
            c.rep_pos,
            c.rep_pro(),
            c.ins_pos,
            c.ins_pro()
        );
    }
    write_summary(&opts.summary, &cells)?;
    log::info!("Summary written to: {}", opts.summary.display());
    Ok(Some(cells))
}
