use super::myio;
use super::naming;
use anyhow::{Context, Result};
use rust_htslib::bam::{self, Read};
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Read names from `add-cb-umi` look like `<id>_<CB>_<UMI>`.
pub const DEFAULT_CB_FIELD: usize = 1;
pub const DEFAULT_MIN_FIELDS: usize = 3;
/// Per-cell SAM files kept open at once.
pub const DEFAULT_MAX_OPEN: usize = 512;

#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub bam: PathBuf,
    pub out_dir: PathBuf,
    /// Index of the `_`-separated read-name field holding the cell barcode.
    pub cb_field: usize,
    /// Names with fewer fields are skipped.
    pub min_fields: usize,
    pub max_open: usize,
    pub threads: usize,
}

/// Cell barcode from an `_`-separated read name.
/// # Example
/// ```
/// use scemtools::split::cb_from_read_name;
/// assert_eq!(cb_from_read_name("M1:2:FC:1:1101:10:20_AAAC_GGTT", 1, 3), Some("AAAC"));
/// assert_eq!(cb_from_read_name("AAAC_GGTT_001_R1", 0, 4), Some("AAAC"));
/// assert_eq!(cb_from_read_name("AAAC_GGTT", 0, 4), None);
/// ```
pub fn cb_from_read_name(name: &str, cb_field: usize, min_fields: usize) -> Option<&str> {
    let fields: Vec<&str> = name.split('_').collect();
    if fields.len() < min_fields {
        return None;
    }
    fields.get(cb_field).copied().filter(|cb| !cb.is_empty())
}

#[derive(Debug, Default)]
pub struct SplitSummary {
    pub records: u64,
    pub unparsed: u64,
    /// Records written per cell barcode.
    pub cells: HashMap<String, u64>,
}

fn part_path(main: &Path, n: usize) -> PathBuf {
    let mut name = OsString::from(main.as_os_str());
    name.push(format!(".part{}", n));
    PathBuf::from(name)
}

/// Per-cell SAM writers, at most `max_open` of them open at a time.
///
/// A cell closed to make room gets a fresh `.partN` file when it shows up
/// again; [`CellWriters::finish`] appends the records of those parts to the
/// cell's first file.
struct CellWriters<'a> {
    header: &'a bam::Header,
    input: &'a Path,
    out_dir: &'a Path,
    max_open: usize,
    open: HashMap<String, bam::Writer>,
    order: VecDeque<String>,
    files: HashMap<String, Vec<PathBuf>>,
}

impl<'a> CellWriters<'a> {
    fn new(header: &'a bam::Header, opts: &'a SplitOptions) -> Self {
        CellWriters {
            header,
            input: &opts.bam,
            out_dir: &opts.out_dir,
            max_open: opts.max_open.max(1),
            open: HashMap::new(),
            order: VecDeque::new(),
            files: HashMap::new(),
        }
    }

    fn write(&mut self, cb: &str, rec: &bam::Record) -> Result<()> {
        if !self.open.contains_key(cb) {
            self.open_cell(cb)?;
        }
        if let Some(w) = self.open.get_mut(cb) {
            w.write(rec)?;
        }
        Ok(())
    }

    fn open_cell(&mut self, cb: &str) -> Result<()> {
        while self.open.len() >= self.max_open {
            match self.order.pop_front() {
                Some(old) => {
                    log::trace!("Closing {} to stay under {} open files", old, self.max_open);
                    self.open.remove(&old);
                }
                None => break,
            }
        }
        let main = naming::split_output(self.out_dir, self.input, cb);
        let files = self.files.entry(cb.to_string()).or_default();
        let path = if files.is_empty() {
            log::debug!("New cell {} -> {}", cb, main.display());
            main
        } else {
            part_path(&main, files.len())
        };
        let w = bam::Writer::from_path(&path, self.header, bam::Format::Sam)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        files.push(path);
        self.open.insert(cb.to_string(), w);
        self.order.push_back(cb.to_string());
        Ok(())
    }

    /// Close every writer and fold the `.partN` files back into their cell.
    fn finish(mut self) -> Result<()> {
        // dropping a writer closes its file
        self.open.clear();
        for paths in self.files.values().filter(|p| p.len() > 1) {
            let first = fs::OpenOptions::new()
                .append(true)
                .open(&paths[0])
                .with_context(|| format!("Failed to reopen {}", paths[0].display()))?;
            let mut out = BufWriter::new(first);
            for part in &paths[1..] {
                for line in myio::reader(part)?.split(b'\n') {
                    let line = line?;
                    if line.is_empty() || line.starts_with(b"@") {
                        continue;
                    }
                    out.write_all(&line)?;
                    out.write_all(b"\n")?;
                }
                fs::remove_file(part)?;
            }
            out.flush()?;
        }
        Ok(())
    }
}

/// Write every record of `opts.bam` into `<out_dir>/<stem>_<CB>.sam`, each with the input header.
pub fn split_bam_by_cb(opts: &SplitOptions) -> Result<SplitSummary> {
    myio::require(&opts.bam)?;
    fs::create_dir_all(&opts.out_dir)?;

    let mut reader = bam::Reader::from_path(&opts.bam)
        .with_context(|| format!("Failed to open {}", opts.bam.display()))?;
    reader.set_threads(opts.threads)?;
    let header = bam::Header::from_template(reader.header());
    log::info!("Reading BAM: {}", opts.bam.display());

    let mut writers = CellWriters::new(&header, opts);
    let mut summary = SplitSummary::default();
    for rec in reader.records() {
        let rec = rec?;
        summary.records += 1;
        let qname = String::from_utf8_lossy(rec.qname()).into_owned();
        let cb = match cb_from_read_name(&qname, opts.cb_field, opts.min_fields) {
            Some(cb) => cb,
            None => {
                log::warn!("Failed to parse CB from read: {}", qname);
                summary.unparsed += 1;
                continue;
            }
        };
        writers.write(cb, &rec)?;
        *summary.cells.entry(cb.to_string()).or_insert(0) += 1;
    }
    writers.finish()?;

    log::info!(
        "Split {} records into {} cells ({} unparsed) under {}",
        summary.records,
        summary.cells.len(),
        summary.unparsed,
        opts.out_dir.display()
    );
    Ok(summary)
}
