//! Write-Ahead Log for durability
//!
//! Every committed record (insert or value update) is appended as a full
//! record. Replaying the log in order and letting later entries for the same
//! (key, timestamp) overwrite earlier ones rebuilds the committed state.

use crate::core::record::VersionedRecord;
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc32fast::Hasher as Crc32Hasher;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Frame header: payload length, payload CRC32, header CRC32 (4 bytes each)
pub const FRAME_HEADER_SIZE: usize = 12;

/// Write-Ahead Log trait
pub trait WriteAheadLog: Send + Sync {
    /// Append records as one unit: either all of them become durable or none
    fn append(&mut self, records: &[VersionedRecord]) -> Result<()>;

    /// Read back every record in append order
    fn replay(&self) -> Result<Vec<VersionedRecord>>;
}

/// WAL for the memory backend: nothing to recover, so nothing is kept
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWal;

impl WriteAheadLog for NullWal {
    fn append(&mut self, _records: &[VersionedRecord]) -> Result<()> {
        Ok(())
    }

    fn replay(&self) -> Result<Vec<VersionedRecord>> {
        Ok(Vec::new())
    }
}

/// Append-only log file of checksummed, bincode-encoded records.
///
/// Frame layout: `[len: u32 BE][payload crc32: u32 BE][header crc32: u32 BE][payload]`.
/// The header checksum covers the first eight bytes, so a damaged length is
/// detected instead of being mistaken for the end of the log.
pub struct FileWal {
    path: PathBuf,
    file: File,
    /// Length of the valid, fully written prefix
    len: u64,
    sync_on_append: bool,
    /// Set when a failed append could not be cut back off the file
    poisoned: bool,
    #[cfg(test)]
    fail_next_write_after: Option<usize>,
}

impl FileWal {
    /// Open (or create) the log at `path`.
    ///
    /// A torn trailing frame left by an interrupted append is cut off so new
    /// frames start on a clean boundary. Damage anywhere else is an error and
    /// the file is left untouched.
    pub fn open<P: AsRef<Path>>(path: P, sync_on_append: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let data = fs::read(&path)?;
        let (_, valid_len) = decode_frames(&data)?;
        if valid_len < data.len() {
            warn!(
                path = %path.display(),
                valid_len,
                file_len = data.len(),
                "discarding torn frame at end of log"
            );
            file.set_len(valid_len as u64)?;
        }

        Ok(Self {
            path,
            file,
            len: valid_len as u64,
            sync_on_append,
            poisoned: false,
            #[cfg(test)]
            fail_next_write_after: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_batch(&mut self, batch: &[u8]) -> io::Result<()> {
        if let Some(limit) = self.take_injected_failure() {
            self.file.write_all(&batch[..limit.min(batch.len())])?;
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        self.file.write_all(batch)?;
        self.file.flush()?;
        if self.sync_on_append {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Make the next append write only `bytes` bytes and then fail
    #[cfg(test)]
    pub(crate) fn fail_next_write_after(&mut self, bytes: usize) {
        self.fail_next_write_after = Some(bytes);
    }

    #[cfg(test)]
    fn take_injected_failure(&mut self) -> Option<usize> {
        self.fail_next_write_after.take()
    }

    #[cfg(not(test))]
    fn take_injected_failure(&mut self) -> Option<usize> {
        None
    }
}

impl WriteAheadLog for FileWal {
    fn append(&mut self, records: &[VersionedRecord]) -> Result<()> {
        if self.poisoned {
            return Err(Error::Storage(format!(
                "log {} holds a partial append that could not be removed; reopen to recover",
                self.path.display()
            )));
        }
        if records.is_empty() {
            return Ok(());
        }

        let mut batch = BytesMut::new();
        for record in records {
            batch.extend_from_slice(&encode_frame(record)?);
        }

        match self.write_batch(&batch) {
            Ok(()) => {
                self.len += batch.len() as u64;
                debug!(records = records.len(), bytes = batch.len(), "appended to log");
                Ok(())
            }
            Err(write_err) => {
                match self.file.set_len(self.len) {
                    Ok(()) => warn!(error = %write_err, "append failed, partial frames removed"),
                    Err(truncate_err) => {
                        self.poisoned = true;
                        error!(
                            error = %write_err,
                            truncate_error = %truncate_err,
                            "append failed and partial frames could not be removed"
                        );
                    }
                }
                Err(write_err.into())
            }
        }
    }

    fn replay(&self) -> Result<Vec<VersionedRecord>> {
        let data = fs::read(&self.path)?;
        let (records, _) = decode_frames(&data)?;
        Ok(records)
    }
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Encode one record as a log frame
pub fn encode_frame(record: &VersionedRecord) -> Result<Bytes> {
    let payload = bincode::serialize(record)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::Storage(format!("record too large: {} bytes", payload.len())))?;

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32(len);
    buf.put_u32(crc32(&payload));
    let header_crc = crc32(&buf[..8]);
    buf.put_u32(header_crc);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Decode consecutive frames, returning the records and the length of the
/// valid prefix.
///
/// Only the final frame may be incomplete (an interrupted append): either
/// fewer bytes than a header remain, or a verified header declares more
/// payload than the file holds. Any checksum mismatch is corruption and fails.
pub fn decode_frames(data: &[u8]) -> Result<(Vec<VersionedRecord>, usize)> {
    let mut buf = data;
    let mut records = Vec::new();
    let mut offset = 0;

    while buf.remaining() >= FRAME_HEADER_SIZE {
        let mut header = &buf[..FRAME_HEADER_SIZE];
        let len = header.get_u32() as usize;
        let payload_crc = header.get_u32();
        let header_crc = header.get_u32();

        if crc32(&buf[..8]) != header_crc {
            return Err(Error::Storage(format!(
                "log frame header corrupt at offset {offset}"
            )));
        }
        if buf.remaining() < FRAME_HEADER_SIZE + len {
            break;
        }

        let payload = &buf[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len];
        let actual_crc = crc32(payload);
        if actual_crc != payload_crc {
            return Err(Error::Storage(format!(
                "log checksum mismatch at offset {offset}: expected {payload_crc:#010x}, got {actual_crc:#010x}"
            )));
        }

        records.push(bincode::deserialize(payload)?);
        buf.advance(FRAME_HEADER_SIZE + len);
        offset += FRAME_HEADER_SIZE + len;
    }

    Ok((records, offset))
}
