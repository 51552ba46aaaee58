use super::error::{StageError, StageResult};
use anyhow::{Context, Result};
use flate2::read;
use flate2::write;
use flate2::Compression;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Output file that is either plain or gzip compressed.
pub enum OutFile {
    Plain(BufWriter<File>),
    Gz(BufWriter<write::GzEncoder<File>>),
}

impl OutFile {
    /// Flush and, for gzip, write the trailer. Errors the drop path would swallow surface here.
    pub fn finish(self) -> Result<()> {
        match self {
            OutFile::Plain(mut w) => w.flush()?,
            OutFile::Gz(w) => {
                let encoder = w.into_inner().map_err(|e| e.into_error())?;
                encoder.finish()?;
            }
        }
        Ok(())
    }
}

impl Write for OutFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            OutFile::Plain(w) => w.write(buf),
            OutFile::Gz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OutFile::Plain(w) => w.flush(),
            OutFile::Gz(w) => w.flush(),
        }
    }
}

/// Write normal or compressed files seamlessly
/// Uses the presence of a `.gz` extension to decide
pub fn writer(path: &Path) -> Result<OutFile> {
    let file =
        File::create(path).with_context(|| format!("couldn't create {}", path.display()))?;

    if path.extension() == Some(OsStr::new("gz")) {
        Ok(OutFile::Gz(BufWriter::with_capacity(
            128 * 1024,
            write::GzEncoder::new(file, Compression::default()),
        )))
    } else {
        Ok(OutFile::Plain(BufWriter::with_capacity(128 * 1024, file)))
    }
}

/// Read normal or compressed files seamlessly
/// Uses the presence of a `.gz` extension to decide
pub fn reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("couldn't open {}", path.display()))?;

    if path.extension() == Some(OsStr::new("gz")) {
        Ok(Box::new(BufReader::with_capacity(
            128 * 1024,
            read::MultiGzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(128 * 1024, file)))
    }
}

/// Fail with `MissingInput` unless `path` exists.
pub fn require(path: &Path) -> StageResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(StageError::MissingInput {
            path: path.to_path_buf(),
        })
    }
}

/// Files directly inside `dir` accepted by `keep`, in natural order.
/// `pattern` only describes the filter for error messages.
pub fn list_files<F>(dir: &Path, pattern: &str, keep: F) -> StageResult<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    if !dir.is_dir() {
        return Err(StageError::MissingInput {
            path: dir.to_path_buf(),
        });
    }
    let entries = fs::read_dir(dir).map_err(|e| StageError::Parse {
        msg: format!("cannot list {}: {}", dir.display(), e),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && keep(p))
        .collect();
    files.sort_by(|a, b| natord::compare(&a.to_string_lossy(), &b.to_string_lossy()));
    log::debug!(
        "{} files matching '{}' in {}",
        files.len(),
        pattern,
        dir.display()
    );
    Ok(files)
}

/// Like [`list_files`] but an empty result is an error.
pub fn list_files_nonempty<F>(dir: &Path, pattern: &str, keep: F) -> StageResult<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    let files = list_files(dir, pattern, keep)?;
    if files.is_empty() {
        return Err(StageError::NoInputs {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }
    Ok(files)
}

/// True when the file name ends with `suffix`.
pub fn name_ends_with(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(suffix))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_gz_round_trip_and_plain() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "a.txt.gz"] {
            let p = dir.path().join(name);
            {
                let mut w = writer(&p).unwrap();
                writeln!(w, "hello").unwrap();
                w.finish().unwrap();
            }
            let mut s = String::new();
            reader(&p).unwrap().read_to_string(&mut s).unwrap();
            assert_eq!(s, "hello\n");
        }
    }

    #[test]
    fn test_finished_gz_has_a_complete_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("reads.fq.gz");
        let mut w = writer(&p).unwrap();
        w.write_all(b"@r1\nACGT\n+\nIIII\n").unwrap();
        w.finish().unwrap();
        let bytes = fs::read(&p).unwrap();
        // gzip trailer ends with ISIZE, the uncompressed length
        let isize = u32::from_le_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
        assert_eq!(isize, 16);
        let mut s = String::new();
        read::GzDecoder::new(&bytes[..]).read_to_string(&mut s).unwrap();
        assert_eq!(s, "@r1\nACGT\n+\nIIII\n");
    }

    #[test]
    fn test_list_files_natural_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c10.sam", "c2.sam", "c1.sam", "notes.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("sub.sam")).unwrap();
        let files = list_files(dir.path(), "*.sam", |p| name_ends_with(p, ".sam")).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["c1.sam", "c2.sam", "c10.sam"]);

        let err = list_files_nonempty(dir.path(), "*.bam", |p| name_ends_with(p, ".bam"));
        assert!(matches!(err, Err(StageError::NoInputs { .. })));
        let missing = list_files(&dir.path().join("nope"), "*", |_| true);
        assert!(matches!(missing, Err(StageError::MissingInput { .. })));
    }
}
