//! Line-oriented, append-only log file.
//!
//! Each record occupies one `\n`-terminated UTF-8 line. A trailing fragment
//! without a newline is a torn write: readers ignore it and the tail reports
//! it so appenders can refuse to extend a damaged chain.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LogFileError;

const TAIL_CHUNK: usize = 4096;

/// How an append reaches stable storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Copy to a temp file, append, fsync, rename over the log. A crash never
    /// exposes a partial line; cost grows with log size.
    #[default]
    AtomicReplace,
    /// `O_APPEND` write followed by fsync. A crash may leave a torn trailing
    /// fragment, which readers skip and appenders refuse to extend.
    AppendFsync,
}

/// One complete line read from the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    /// Position among non-blank lines, starting at 0.
    pub index: usize,
    /// Byte offset of the first byte of the line.
    pub offset: u64,
    pub text: String,
}

/// State of the end of the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tail {
    Empty,
    Line { offset: u64, text: String },
    Torn { offset: u64, len: u64 },
}

pub struct LogFile {
    path: PathBuf,
    durability: Durability,
}

impl LogFile {
    /// Open (without creating) the log at `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>, durability: Durability) -> Result<Self, LogFileError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(LogFileError::io(parent))?;
            }
        }
        Ok(Self { path, durability })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    /// Current length in bytes; a missing file has length 0.
    pub fn len(&self) -> Result<u64, LogFileError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(LogFileError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    pub fn is_empty(&self) -> Result<bool, LogFileError> {
        Ok(self.len()? == 0)
    }

    /// Read every complete, non-blank line in order.
    pub fn read_lines(&self) -> Result<Vec<LogLine>, LogFileError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LogFileError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let mut lines = Vec::new();
        let mut start = 0usize;
        for (pos, byte) in bytes.iter().enumerate() {
            if *byte != b'\n' {
                continue;
            }
            let raw = &bytes[start..pos];
            if !raw.iter().all(u8::is_ascii_whitespace) {
                lines.push(LogLine {
                    index: lines.len(),
                    offset: start as u64,
                    text: String::from_utf8_lossy(raw).into_owned(),
                });
            }
            start = pos + 1;
        }
        if start < bytes.len() {
            warn!(
                path = %self.path.display(),
                offset = start,
                len = bytes.len() - start,
                "Ignoring torn trailing fragment"
            );
        }
        Ok(lines)
    }

    /// Read the complete line starting at `offset`, if there is one.
    pub fn read_line_at(&self, offset: u64) -> Result<Option<String>, LogFileError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LogFileError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        let len = file.metadata().map_err(LogFileError::io(&self.path))?.len();
        if offset >= len {
            return Ok(None);
        }
        file.seek(SeekFrom::Start(offset))
            .map_err(LogFileError::io(&self.path))?;

        let mut line = Vec::new();
        let mut chunk = [0u8; TAIL_CHUNK];
        loop {
            let n = file.read(&mut chunk).map_err(LogFileError::io(&self.path))?;
            if n == 0 {
                // No terminating newline: torn fragment.
                return Ok(None);
            }
            if let Some(end) = chunk[..n].iter().position(|b| *b == b'\n') {
                line.extend_from_slice(&chunk[..end]);
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            line.extend_from_slice(&chunk[..n]);
        }
    }

    /// Inspect the end of the log without reading the whole file.
    pub fn tail(&self) -> Result<Tail, LogFileError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Tail::Empty),
            Err(e) => {
                return Err(LogFileError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        let len = file.metadata().map_err(LogFileError::io(&self.path))?.len();
        if len == 0 {
            return Ok(Tail::Empty);
        }

        let mut last = [0u8; 1];
        read_at(&mut file, len - 1, &mut last).map_err(LogFileError::io(&self.path))?;
        if last[0] != b'\n' {
            let start = find_line_start(&mut file, len).map_err(LogFileError::io(&self.path))?;
            return Ok(Tail::Torn {
                offset: start,
                len: len - start,
            });
        }

        // Walk back over blank lines to the last line with content.
        let mut end = len - 1;
        loop {
            let start = find_line_start(&mut file, end).map_err(LogFileError::io(&self.path))?;
            let mut buf = vec![0u8; (end - start) as usize];
            read_at(&mut file, start, &mut buf).map_err(LogFileError::io(&self.path))?;
            if !buf.iter().all(u8::is_ascii_whitespace) {
                return Ok(Tail::Line {
                    offset: start,
                    text: String::from_utf8_lossy(&buf).into_owned(),
                });
            }
            if start == 0 {
                return Ok(Tail::Empty);
            }
            end = start - 1;
        }
    }

    /// Durably append one line. Returns the byte offset it was written at.
    pub fn append_line(&self, line: &str) -> Result<u64, LogFileError> {
        let mut payload = Vec::with_capacity(line.len() + 1);
        push_line(&mut payload, line)?;
        let offset = self.write_payload(&payload)?;
        debug!(path = %self.path.display(), offset, "Line appended");
        Ok(offset)
    }

    /// Durably append several lines in one write. Returns each line's offset.
    ///
    /// Nothing is written if any line is invalid. Under
    /// [`Durability::AtomicReplace`] the whole batch becomes visible at once.
    pub fn append_lines<S: AsRef<str>>(&self, lines: &[S]) -> Result<Vec<u64>, LogFileError> {
        let mut payload = Vec::new();
        let mut starts = Vec::with_capacity(lines.len());
        for line in lines {
            starts.push(payload.len() as u64);
            push_line(&mut payload, line.as_ref())?;
        }
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        let base = self.write_payload(&payload)?;
        debug!(path = %self.path.display(), offset = base, lines = lines.len(), "Lines appended");
        Ok(starts.into_iter().map(|start| base + start).collect())
    }

    fn write_payload(&self, payload: &[u8]) -> Result<u64, LogFileError> {
        match self.durability {
            Durability::AtomicReplace => self.append_atomic(payload),
            Durability::AppendFsync => self.append_fsync(payload),
        }
    }

    /// Move the log aside as `<stem>.<label>.<ext>`. Returns the new path.
    pub fn archive(&self, label: &str) -> Result<Option<PathBuf>, LogFileError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".into());
        let ext = self
            .path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "jsonl".into());
        let dest = self.path.with_file_name(format!("{stem}.{label}.{ext}"));
        fs::rename(&self.path, &dest).map_err(LogFileError::io(&self.path))?;
        sync_parent_dir(&self.path).map_err(LogFileError::io(&self.path))?;
        Ok(Some(dest))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn append_atomic(&self, payload: &[u8]) -> Result<u64, LogFileError> {
        let tmp = self.temp_path();
        let result = (|| -> io::Result<u64> {
            let mut out = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            let offset = match File::open(&self.path) {
                Ok(mut src) => io::copy(&mut src, &mut out)?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
                Err(e) => return Err(e),
            };
            out.write_all(payload)?;
            out.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            sync_parent_dir(&self.path)?;
            Ok(offset)
        })();

        result.map_err(|source| {
            let _ = fs::remove_file(&tmp);
            LogFileError::Io {
                path: self.path.clone(),
                source,
            }
        })
    }

    fn append_fsync(&self, payload: &[u8]) -> Result<u64, LogFileError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(LogFileError::io(&self.path))?;
        let offset = file.metadata().map_err(LogFileError::io(&self.path))?.len();
        file.write_all(payload).map_err(LogFileError::io(&self.path))?;
        file.sync_data().map_err(LogFileError::io(&self.path))?;
        Ok(offset)
    }
}

fn push_line(payload: &mut Vec<u8>, line: &str) -> Result<(), LogFileError> {
    if line.contains('\n') || line.trim().is_empty() {
        return Err(LogFileError::InvalidLine(
            "line must be non-blank and must not contain a newline".into(),
        ));
    }
    payload.extend_from_slice(line.as_bytes());
    payload.push(b'\n');
    Ok(())
}

/// Replace `path` with `data` via temp file, fsync, and rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), LogFileError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(LogFileError::io(parent))?;
        }
    }
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let result = (|| -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        sync_parent_dir(path)
    })();

    result.map_err(|source| {
        let _ = fs::remove_file(&tmp);
        LogFileError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn read_at(file: &mut File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

/// Offset just past the last `\n` strictly before `end`, or 0.
fn find_line_start(file: &mut File, end: u64) -> io::Result<u64> {
    let mut pos = end;
    let mut chunk = [0u8; TAIL_CHUNK];
    while pos > 0 {
        let size = (pos as usize).min(TAIL_CHUNK);
        let start = pos - size as u64;
        read_at(file, start, &mut chunk[..size])?;
        if let Some(i) = chunk[..size].iter().rposition(|b| *b == b'\n') {
            return Ok(start + i as u64 + 1);
        }
        pos = start;
    }
    Ok(0)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(dir: &tempfile::TempDir, durability: Durability) -> LogFile {
        LogFile::open(dir.path().join("nested/log.jsonl"), durability).unwrap()
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = log(&dir, Durability::AtomicReplace);
        assert!(file.read_lines().unwrap().is_empty());
        assert_eq!(file.tail().unwrap(), Tail::Empty);
        assert_eq!(file.len().unwrap(), 0);
    }

    #[test]
    fn append_then_read_in_both_modes() {
        for durability in [Durability::AtomicReplace, Durability::AppendFsync] {
            let dir = tempfile::tempdir().unwrap();
            let file = log(&dir, durability);
            let first = file.append_line(r#"{"n":1}"#).unwrap();
            let second = file.append_line(r#"{"n":2}"#).unwrap();
            assert_eq!(first, 0);
            assert_eq!(second, 8);

            let lines = file.read_lines().unwrap();
            assert_eq!(lines.len(), 2);
            assert_eq!(lines[1].offset, second);
            assert_eq!(lines[1].text, r#"{"n":2}"#);
            assert_eq!(
                file.read_line_at(second).unwrap().as_deref(),
                Some(r#"{"n":2}"#)
            );
            assert_eq!(
                file.tail().unwrap(),
                Tail::Line {
                    offset: second,
                    text: r#"{"n":2}"#.into()
                }
            );
            assert!(!dir.path().join("nested/log.jsonl.tmp").exists());
        }
    }

    #[test]
    fn torn_fragment_is_skipped_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = log(&dir, Durability::AppendFsync);
        file.append_line("first").unwrap();
        let mut raw = OpenOptions::new().append(true).open(file.path()).unwrap();
        raw.write_all(b"{\"half").unwrap();

        let lines = file.read_lines().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(file.tail().unwrap(), Tail::Torn { offset: 6, len: 6 });
        assert_eq!(file.read_line_at(6).unwrap(), None);
    }

    #[test]
    fn tail_skips_trailing_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = log(&dir, Durability::AtomicReplace);
        fs::write(file.path(), "a\nbb\n\n  \n").unwrap();
        assert_eq!(
            file.tail().unwrap(),
            Tail::Line {
                offset: 2,
                text: "bb".into()
            }
        );
        assert_eq!(file.read_lines().unwrap().len(), 2);
    }

    #[test]
    fn tail_finds_long_lines_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let file = log(&dir, Durability::AppendFsync);
        let long = "x".repeat(TAIL_CHUNK * 3 + 17);
        file.append_line("short").unwrap();
        file.append_line(&long).unwrap();
        match file.tail().unwrap() {
            Tail::Line { offset, text } => {
                assert_eq!(offset, 6);
                assert_eq!(text, long);
            }
            other => panic!("unexpected tail {other:?}"),
        }
    }

    #[test]
    fn rejects_multi_line_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let file = log(&dir, Durability::AtomicReplace);
        assert!(matches!(
            file.append_line("a\nb"),
            Err(LogFileError::InvalidLine(_))
        ));
        assert!(file.append_line("   ").is_err());
    }

    #[test]
    fn batch_append_is_all_or_nothing() {
        for durability in [Durability::AtomicReplace, Durability::AppendFsync] {
            let dir = tempfile::tempdir().unwrap();
            let file = log(&dir, durability);
            file.append_line(r#"{"n":0}"#).unwrap();

            assert!(file.append_lines(&[r#"{"n":1}"#, "bad\nline"]).is_err());
            assert_eq!(file.read_lines().unwrap().len(), 1);

            let offsets = file.append_lines(&[r#"{"n":1}"#, r#"{"n":2}"#]).unwrap();
            assert_eq!(offsets, vec![8, 16]);
            let lines = file.read_lines().unwrap();
            assert_eq!(lines.len(), 3);
            assert_eq!(lines[2].offset, 16);
            assert!(file.append_lines::<&str>(&[]).unwrap().is_empty());
        }
    }

    #[test]
    fn archive_moves_log_aside() {
        let dir = tempfile::tempdir().unwrap();
        let file = log(&dir, Durability::AtomicReplace);
        assert_eq!(file.archive("broken-1").unwrap(), None);
        file.append_line("x").unwrap();
        let dest = file.archive("broken-1").unwrap().unwrap();
        assert!(dest.ends_with("log.broken-1.jsonl"));
        assert!(!file.path().exists());
    }

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }
}
