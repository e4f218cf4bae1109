//! File-backed hash-chained log.
//!
//! One [`HashChainLog`] owns one `<root>/<name>.jsonl` file. Appends are
//! serialized by a per-log mutex held across tail lookup, hashing, the
//! durable write, and the cache update. Readers work from the file without
//! taking that mutex and always observe a complete prefix of the chain.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{SubsecRound, Utc};
use compliance_core::{
    apply_window, link_record, ChainRecord, Durability, LogFile, QueryWindow, RecordFilter, Tail,
    GENESIS_HASH,
};
use tracing::{debug, error, info, warn};

#[cfg(feature = "encryption")]
use crate::codec::EnvelopeCodec;
use crate::codec::{JsonLineCodec, RecordCodec};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{BackendKind, ComplianceLog, QueryFailure, QueryPage};
use crate::verifier::{verify_lines, IntegrityReport, VerifyMode};

/// Plaintext JSON-line log.
pub type PlainChainLog<R> = HashChainLog<R, JsonLineCodec>;

/// Envelope-encrypted log.
#[cfg(feature = "encryption")]
pub type EncryptedChainLog<R> = HashChainLog<R, EnvelopeCodec>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChainTail {
    /// Hash the next record links to.
    Head(String),
    /// The persisted tail cannot be linked to.
    Broken(String),
}

#[derive(Debug)]
struct WriterState {
    tail: ChainTail,
    /// File length after our last write; a mismatch means the tail must be
    /// re-derived from disk.
    file_len: u64,
}

pub struct HashChainLog<R, C> {
    name: &'static str,
    file: LogFile,
    codec: C,
    writer: Mutex<WriterState>,
    index: RwLock<HashMap<String, u64>>,
    _record: PhantomData<fn() -> R>,
}

impl<R, C> HashChainLog<R, C>
where
    R: ChainRecord,
    C: RecordCodec<R>,
{
    /// Open `<root>/<log name>.jsonl`, deriving the tail hash and id index
    /// from what is on disk.
    pub fn open(root: &Path, codec: C, durability: Durability) -> LedgerResult<Self> {
        let path = root.join(format!("{}.jsonl", R::KIND.log_name()));
        Self::open_path(path, codec, durability)
    }

    pub fn open_path(path: PathBuf, codec: C, durability: Durability) -> LedgerResult<Self> {
        let file = LogFile::open(path, durability).map_err(LedgerError::StorageWrite)?;
        let log = Self {
            name: R::KIND.log_name(),
            file,
            codec,
            writer: Mutex::new(WriterState {
                tail: ChainTail::Head(GENESIS_HASH.to_string()),
                file_len: 0,
            }),
            index: RwLock::new(HashMap::new()),
            _record: PhantomData,
        };

        {
            let mut state = log.lock_writer()?;
            log.reload(&mut state)?;
            match &state.tail {
                ChainTail::Head(hash) => info!(
                    log = log.name,
                    path = %log.file.path().display(),
                    backend = %log.codec.backend(),
                    ?durability,
                    latest_hash = %hash,
                    "Compliance log opened"
                ),
                ChainTail::Broken(reason) => error!(
                    log = log.name,
                    path = %log.file.path().display(),
                    reason = %reason,
                    "Compliance log opened with a broken tail; appends refused until reset"
                ),
            }
        }
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn lock_writer(&self) -> LedgerResult<MutexGuard<'_, WriterState>> {
        self.writer
            .lock()
            .map_err(|_| LedgerError::Backend(format!("{} writer lock poisoned", self.name)))
    }

    fn read_index(&self) -> LedgerResult<RwLockReadGuard<'_, HashMap<String, u64>>> {
        self.index
            .read()
            .map_err(|_| LedgerError::Backend(format!("{} index lock poisoned", self.name)))
    }

    fn write_index(&self) -> LedgerResult<RwLockWriteGuard<'_, HashMap<String, u64>>> {
        self.index
            .write()
            .map_err(|_| LedgerError::Backend(format!("{} index lock poisoned", self.name)))
    }

    /// Re-derive the tail hash and the id index from disk.
    fn reload(&self, state: &mut WriterState) -> LedgerResult<()> {
        let file_len = self.file.len().map_err(LedgerError::StorageRead)?;
        state.tail = match self.file.tail().map_err(LedgerError::StorageRead)? {
            Tail::Empty => ChainTail::Head(GENESIS_HASH.to_string()),
            Tail::Torn { offset, len } => ChainTail::Broken(format!(
                "torn trailing write of {len} bytes at offset {offset}"
            )),
            Tail::Line { offset, text } => match self.codec.header(&text) {
                Ok(header) if is_hex_hash(&header.record_hash) => {
                    ChainTail::Head(header.record_hash)
                }
                Ok(_) => ChainTail::Broken(format!(
                    "last record at offset {offset} carries an invalid record_hash"
                )),
                Err(e) => ChainTail::Broken(format!(
                    "last record at offset {offset} is unreadable: {e}"
                )),
            },
        };

        let lines = self.file.read_lines().map_err(LedgerError::StorageRead)?;
        let mut index = HashMap::with_capacity(lines.len());
        for line in &lines {
            match self.codec.header(&line.text) {
                Ok(header) => {
                    index.entry(header.record_id).or_insert(line.offset);
                }
                Err(e) => warn!(
                    log = self.name,
                    index = line.index,
                    error = %e,
                    "Skipping unreadable line while indexing"
                ),
            }
        }
        *self.write_index()? = index;
        state.file_len = file_len;
        Ok(())
    }

    fn find_line(&self, id: &str) -> LedgerResult<Option<String>> {
        let cached = self.read_index()?.get(id).copied();
        if let Some(offset) = cached {
            if let Some(text) = self
                .file
                .read_line_at(offset)
                .map_err(LedgerError::StorageRead)?
            {
                if matches!(self.codec.header(&text), Ok(header) if header.record_id == id) {
                    return Ok(Some(text));
                }
            }
        }

        debug!(log = self.name, record_id = id, "Index miss; scanning log");
        for line in self.file.read_lines().map_err(LedgerError::StorageRead)? {
            if matches!(self.codec.header(&line.text), Ok(header) if header.record_id == id) {
                return Ok(Some(line.text));
            }
        }
        Ok(None)
    }
}

impl<R, C> ComplianceLog<R> for HashChainLog<R, C>
where
    R: ChainRecord,
    C: RecordCodec<R>,
{
    fn backend(&self) -> BackendKind {
        self.codec.backend()
    }

    fn append(&self, mut record: R) -> LedgerResult<R> {
        record.validate().map_err(LedgerError::InvalidInput)?;

        let mut state = self.lock_writer()?;
        let on_disk = self.file.len().map_err(LedgerError::StorageRead)?;
        if on_disk != state.file_len {
            debug!(
                log = self.name,
                cached = state.file_len,
                on_disk,
                "Log length changed; re-deriving tail"
            );
            self.reload(&mut state)?;
        }

        let prev_hash = match &state.tail {
            ChainTail::Head(hash) => hash.clone(),
            ChainTail::Broken(reason) => {
                error!(log = self.name, reason = %reason, "Append refused: chain discontinuity");
                return Err(LedgerError::ChainDiscontinuity {
                    log: self.name.to_string(),
                    reason: reason.clone(),
                });
            }
        };

        if record.record_id().is_empty() {
            record.set_record_id(R::KIND.generate_id());
        } else if self.read_index()?.contains_key(record.record_id()) {
            return Err(LedgerError::InvalidInput(format!(
                "record id {} already exists in {}",
                record.record_id(),
                self.name
            )));
        }
        record.set_created_at(record.created_at().trunc_subsecs(6));
        link_record(&mut record, &prev_hash)?;

        let line = self.codec.encode(&record)?;
        let offset = self.file.append_line(&line).map_err(|e| {
            error!(log = self.name, record_id = record.record_id(), error = %e, "Append failed");
            LedgerError::StorageWrite(e)
        })?;

        state.file_len = offset + line.len() as u64 + 1;
        state.tail = ChainTail::Head(record.record_hash().to_owned());
        self.write_index()?
            .insert(record.record_id().to_owned(), offset);

        debug!(
            log = self.name,
            record_id = record.record_id(),
            record_hash = record.record_hash(),
            offset,
            "Record appended"
        );
        Ok(record)
    }

    fn get_by_id(&self, id: &str) -> LedgerResult<R> {
        match self.find_line(id)? {
            Some(text) => self.codec.decode(&text),
            None => Err(LedgerError::NotFound(id.to_owned())),
        }
    }

    fn query(&self, filter: &RecordFilter, window: QueryWindow) -> LedgerResult<QueryPage<R>> {
        let lines = self.file.read_lines().map_err(LedgerError::StorageRead)?;
        let mut page = QueryPage::default();
        for line in &lines {
            match self.codec.decode(&line.text) {
                Ok(record) => {
                    if record.matches(filter) {
                        page.records.push(record);
                    }
                }
                Err(e) => {
                    let record_id = self.codec.header(&line.text).ok().map(|h| h.record_id);
                    warn!(
                        log = self.name,
                        index = line.index,
                        record_id = ?record_id,
                        error = %e,
                        "Skipping undecodable record in query"
                    );
                    page.failures.push(QueryFailure {
                        index: line.index,
                        record_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        if filter.newest_first {
            page.records.reverse();
        }
        page.records = apply_window(page.records, window);
        Ok(page)
    }

    fn verify(&self) -> LedgerResult<IntegrityReport> {
        let lines = self.file.read_lines().map_err(LedgerError::StorageRead)?;
        Ok(verify_lines::<R, C>(self.name, &lines, &self.codec, VerifyMode::Full))
    }

    fn verify_chain_only(&self) -> LedgerResult<IntegrityReport> {
        let lines = self.file.read_lines().map_err(LedgerError::StorageRead)?;
        Ok(verify_lines::<R, C>(
            self.name,
            &lines,
            &self.codec,
            VerifyMode::ChainOnly,
        ))
    }

    fn latest_hash(&self) -> LedgerResult<Option<String>> {
        match self.file.tail().map_err(LedgerError::StorageRead)? {
            Tail::Empty => Ok(None),
            Tail::Line { text, .. } => Ok(Some(self.codec.header(&text)?.record_hash)),
            Tail::Torn { offset, len } => Err(LedgerError::ChainDiscontinuity {
                log: self.name.to_string(),
                reason: format!("torn trailing write of {len} bytes at offset {offset}"),
            }),
        }
    }

    fn len(&self) -> LedgerResult<usize> {
        Ok(self
            .file
            .read_lines()
            .map_err(LedgerError::StorageRead)?
            .len())
    }

    fn reset_chain(&self, reason: &str) -> LedgerResult<Option<PathBuf>> {
        let mut state = self.lock_writer()?;
        let label = format!("broken-{}", Utc::now().format("%Y%m%dT%H%M%S%6fZ"));
        let archived = self
            .file
            .archive(&label)
            .map_err(LedgerError::StorageWrite)?;

        state.tail = ChainTail::Head(GENESIS_HASH.to_string());
        state.file_len = 0;
        self.write_index()?.clear();

        warn!(
            log = self.name,
            reason = %reason,
            archived = ?archived,
            "Chain reset; new records link to genesis"
        );
        Ok(archived)
    }
}

fn is_hex_hash(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
