use super::error::StageError;
use super::myio;
use anyhow::{Context, Result};
use itertools::Itertools;
use needletail::parse_fastx_file;
use num_format::{Locale, ToFormattedString};
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TagOptions {
    pub in1: PathBuf,
    pub in2: PathBuf,
    pub out1: PathBuf,
    pub out2: PathBuf,
    pub whitelist: PathBuf,
    /// Prefix of the `<prefix>_cell_barcode_info.txt` table.
    pub prefix: String,
    pub cb_len: usize,
    pub umi_len: usize,
}

#[derive(Debug, Default)]
pub struct TagSummary {
    pub total_reads: u64,
    pub invalid_cb_reads: u64,
    pub missing_r2: u64,
    pub cb_counts: HashMap<String, u64>,
}

impl TagSummary {
    pub fn kept_reads(&self) -> u64 {
        self.cb_counts.values().sum()
    }

    /// `(barcode, count)` by decreasing count, ties by barcode.
    pub fn sorted_counts(&self) -> Vec<(&String, &u64)> {
        self.cb_counts
            .iter()
            .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
            .collect()
    }
}

/// Read a barcode whitelist, one per line; blank lines are ignored.
pub fn read_whitelist(path: &Path) -> Result<HashSet<String>> {
    myio::require(path)?;
    let mut cbs = HashSet::new();
    for line in myio::reader(path)?.lines() {
        let line = line?;
        let cb = line.trim();
        if !cb.is_empty() {
            cbs.insert(cb.to_string());
        }
    }
    if cbs.is_empty() {
        return Err(StageError::Parse {
            msg: format!("no barcodes found in {}", path.display()),
        }
        .into());
    }
    log::info!("{} whitelisted barcodes", cbs.len());
    Ok(cbs)
}

/// Read id: the header up to the first whitespace.
fn read_id(header: &[u8]) -> &[u8] {
    header
        .split(|b| b.is_ascii_whitespace())
        .next()
        .unwrap_or(header)
}

fn write_fastq(out: &mut dyn Write, header: &str, seq: &[u8], qual: Option<&[u8]>) -> Result<()> {
    out.write_all(b"@")?;
    out.write_all(header.as_bytes())?;
    out.write_all(b"\n")?;
    out.write_all(seq)?;
    out.write_all(b"\n+\n")?;
    match qual {
        Some(q) => out.write_all(q)?,
        None => out.write_all(&vec![b'I'; seq.len()])?,
    }
    out.write_all(b"\n")?;
    Ok(())
}

/// Tag R1 with `_<CB>_<UMI>` taken from its first bases and keep only whitelisted cells.
/// Returns the new header of each kept read keyed by its original id.
pub fn tag_read1(
    opts: &TagOptions,
    whitelist: &HashSet<String>,
    summary: &mut TagSummary,
) -> Result<HashMap<Vec<u8>, String>> {
    let mut headers = HashMap::new();
    let mut reader = parse_fastx_file(&opts.in1)
        .with_context(|| format!("cannot parse {}", opts.in1.display()))?;
    let mut out = myio::writer(&opts.out1)?;
    let need = opts.cb_len + opts.umi_len;

    while let Some(record) = reader.next() {
        let rec = record?;
        summary.total_reads += 1;
        let seq = rec.seq();
        if seq.len() < need {
            summary.invalid_cb_reads += 1;
            continue;
        }
        let cb = String::from_utf8_lossy(&seq[..opts.cb_len]).into_owned();
        if !whitelist.contains(&cb) {
            summary.invalid_cb_reads += 1;
            continue;
        }
        let umi = String::from_utf8_lossy(&seq[opts.cb_len..need]);
        let id = read_id(rec.id());
        let header = format!("{}_{}_{} 1:N:0:{}", String::from_utf8_lossy(id), cb, umi, umi);
        write_fastq(&mut out, &header, &seq, rec.qual())?;
        headers.insert(id.to_vec(), header);
        *summary.cb_counts.entry(cb).or_insert(0) += 1;
    }
    out.finish()?;
    Ok(headers)
}

/// Copy R2 reads whose mate survived R1 tagging, reusing the mate's header.
pub fn tag_read2(
    opts: &TagOptions,
    headers: &HashMap<Vec<u8>, String>,
    summary: &mut TagSummary,
) -> Result<()> {
    let mut reader = parse_fastx_file(&opts.in2)
        .with_context(|| format!("cannot parse {}", opts.in2.display()))?;
    let mut out = myio::writer(&opts.out2)?;
    while let Some(record) = reader.next() {
        let rec = record?;
        match headers.get(read_id(rec.id())) {
            Some(h1) => {
                let h2 = h1.replace(" 1:N:0:", " 2:N:0:");
                write_fastq(&mut out, &h2, &rec.seq(), rec.qual())?;
            }
            None => summary.missing_r2 += 1,
        }
    }
    out.finish()?;
    Ok(())
}

pub fn write_cb_table(path: &Path, summary: &TagSummary) -> Result<()> {
    let mut out = myio::writer(path)?;
    for (cb, count) in summary.sorted_counts() {
        writeln!(out, "{}\t{}", cb, count)?;
    }
    out.finish()?;
    Ok(())
}

pub fn cb_table_path(prefix: &str) -> PathBuf {
    PathBuf::from(format!("{}_cell_barcode_info.txt", prefix))
}

pub fn run_add_cb_umi(opts: &TagOptions) -> Result<TagSummary> {
    myio::require(&opts.in1)?;
    myio::require(&opts.in2)?;
    let whitelist = read_whitelist(&opts.whitelist)?;

    let mut summary = TagSummary::default();
    let headers = tag_read1(opts, &whitelist, &mut summary)?;
    tag_read2(opts, &headers, &mut summary)?;

    let kept = summary.kept_reads();
    let frac = if summary.total_reads > 0 {
        kept as f64 / summary.total_reads as f64
    } else {
        0.0
    };
    log::info!(
        "Total R1 reads: {}",
        summary.total_reads.to_formatted_string(&Locale::en)
    );
    log::info!(
        "Reads with valid CB: {} ({:.4} of total)",
        kept.to_formatted_string(&Locale::en),
        frac
    );
    log::info!(
        "Reads with invalid/absent CB: {}",
        summary.invalid_cb_reads.to_formatted_string(&Locale::en)
    );
    log::info!(
        "R2 reads without matching R1 (dropped): {}",
        summary.missing_r2.to_formatted_string(&Locale::en)
    );

    let table = cb_table_path(&opts.prefix);
    write_cb_table(&table, &summary)?;
    log::info!("Per-barcode counts written to {}", table.display());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    const CB_A: &str = "AAAACCCCGGGGTTTTA";
    const CB_B: &str = "CCCCAAAAGGGGTTTTC";
    const UMI: &str = "ACGTACGTACGT";

    fn fq(records: &[(&str, String)]) -> String {
        records
            .iter()
            .map(|(id, seq)| format!("@{}\n{}\n+\n{}\n", id, seq, "F".repeat(seq.len())))
            .collect()
    }

    #[test]
    fn test_tagging_filters_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        let r1 = fq(&[
            ("r1 1:N:0:1", format!("{}{}TTTT", CB_A, UMI)),
            ("r2 1:N:0:1", format!("{}{}GGGG", "T".repeat(17), UMI)),
            ("r3 1:N:0:1", "ACGT".to_string()),
            ("r4 1:N:0:1", format!("{}{}", CB_B, UMI)),
            ("r5 1:N:0:1", format!("{}{}AA", CB_A, UMI)),
        ]);
        let r2 = fq(&[
            ("r1 2:N:0:1", "GATTACA".to_string()),
            ("r2 2:N:0:1", "GATTACA".to_string()),
            ("r4 2:N:0:1", "CATTAG".to_string()),
            ("r9 2:N:0:1", "CATTAG".to_string()),
        ]);
        fs::write(p.join("in1.fq"), r1).unwrap();
        fs::write(p.join("in2.fq"), r2).unwrap();
        fs::write(p.join("wl.txt"), format!("{}\n\n{}\n", CB_A, CB_B)).unwrap();

        let opts = TagOptions {
            in1: p.join("in1.fq"),
            in2: p.join("in2.fq"),
            out1: p.join("out1.fq.gz"),
            out2: p.join("out2.fq"),
            whitelist: p.join("wl.txt"),
            prefix: p.join("sample").to_string_lossy().into_owned(),
            cb_len: 17,
            umi_len: 12,
        };
        let summary = run_add_cb_umi(&opts).unwrap();
        assert_eq!(summary.total_reads, 5);
        assert_eq!(summary.invalid_cb_reads, 2);
        assert_eq!(summary.kept_reads(), 3);
        assert_eq!(summary.missing_r2, 2);

        let mut out1 = String::new();
        myio::reader(&opts.out1)
            .unwrap()
            .read_to_string(&mut out1)
            .unwrap();
        let first: Vec<&str> = out1.lines().take(4).collect();
        assert_eq!(first[0], format!("@r1_{}_{} 1:N:0:{}", CB_A, UMI, UMI));
        assert_eq!(first[1], format!("{}{}TTTT", CB_A, UMI));
        assert_eq!(first[3].len(), first[1].len());

        let out2 = fs::read_to_string(&opts.out2).unwrap();
        let headers: Vec<&str> = out2.lines().step_by(4).collect();
        assert_eq!(
            headers,
            vec![
                format!("@r1_{}_{} 2:N:0:{}", CB_A, UMI, UMI),
                format!("@r4_{}_{} 2:N:0:{}", CB_B, UMI, UMI),
            ]
        );

        let table = fs::read_to_string(cb_table_path(&opts.prefix)).unwrap();
        assert_eq!(table, format!("{}\t2\n{}\t1\n", CB_A, CB_B));
    }

    #[test]
    fn test_tagged_names_split_with_default_fields() {
        use crate::split::{cb_from_read_name, DEFAULT_CB_FIELD, DEFAULT_MIN_FIELDS};
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        let id = "A00123:8:HXXX:1:1101:1000:2000";
        let header = format!("{} 1:N:0:1", id);
        fs::write(
            p.join("in1.fq"),
            fq(&[(header.as_str(), format!("{}{}TT", CB_A, UMI))]),
        )
        .unwrap();
        fs::write(p.join("in2.fq"), fq(&[(id, "GATTACA".to_string())])).unwrap();
        fs::write(p.join("wl.txt"), CB_A).unwrap();
        let opts = TagOptions {
            in1: p.join("in1.fq"),
            in2: p.join("in2.fq"),
            out1: p.join("out1.fq"),
            out2: p.join("out2.fq"),
            whitelist: p.join("wl.txt"),
            prefix: p.join("s").to_string_lossy().into_owned(),
            cb_len: 17,
            umi_len: 12,
        };
        run_add_cb_umi(&opts).unwrap();

        // aligners keep the header up to the first space as the read name
        let out1 = fs::read_to_string(&opts.out1).unwrap();
        let name = out1.lines().next().unwrap()[1..]
            .split(' ')
            .next()
            .unwrap()
            .to_string();
        assert_eq!(
            cb_from_read_name(&name, DEFAULT_CB_FIELD, DEFAULT_MIN_FIELDS),
            Some(CB_A)
        );
    }

    #[test]
    fn test_empty_whitelist_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let wl = dir.path().join("wl.txt");
        fs::write(&wl, "\n  \n").unwrap();
        assert!(read_whitelist(&wl).is_err());
    }
}
