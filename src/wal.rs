use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode one record as `[len][bincode][crc32]`.
fn encode_record<E: Serialize>(writer: &mut impl Write, record: &E) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` on a clean or torn end of file.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only write-ahead log of `E` records.
///
/// Format per entry: `[u32: len][bincode: E][u32: crc32]`, little endian.
/// A torn or corrupt tail (crash mid-write) is dropped on replay.
pub struct Wal<E> {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    _record: PhantomData<fn(E)>,
}

impl<E: Serialize + DeserializeOwned> Wal<E> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            _record: PhantomData,
        })
    }

    /// Append and fsync a single record.
    #[cfg(test)]
    pub fn append(&mut self, record: &E) -> io::Result<()> {
        self.append_batch(std::slice::from_ref(record))
    }

    /// Append `records` and commit them with one fsync. All or nothing: on
    /// failure the log is cut back to its length before the batch.
    pub fn append_batch(&mut self, records: &[E]) -> io::Result<()> {
        let committed = self.writer.get_ref().metadata()?.len();
        let result = records
            .iter()
            .try_for_each(|record| encode_record(&mut self.writer, record))
            .and_then(|()| self.flush_sync());

        match result {
            Ok(()) => {
                self.appends_since_compact += records.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(cut) = self.truncate_to(committed) {
                    tracing::error!(
                        "WAL {}: could not cut failed batch back to {committed} bytes: {cut}",
                        self.path.display()
                    );
                }
                Err(e)
            }
        }
    }

    fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Discard buffered bytes and shrink the file to `len`.
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let (file, _unwritten) = std::mem::replace(&mut self.writer, BufWriter::new(file)).into_parts();
        file.set_len(len)?;
        file.sync_all()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn compact_path(&self) -> PathBuf {
        self.path.with_extension("wal.tmp")
    }

    /// Replace the log with `records`: write a synced temp file, then rename it over the log.
    pub fn compact(&mut self, records: &[E]) -> io::Result<()> {
        let tmp_path = self.compact_path();
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for record in records {
                encode_record(&mut tmp, record)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Every intact record in the log, in append order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<E>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut len_buf)? {
                break;
            }
            let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
            if !read_or_eof(&mut reader, &mut payload)? {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!("WAL {}: checksum mismatch, dropping tail", path.display());
                break;
            }
            match bincode::deserialize::<E>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("WAL {}: undecodable record ({e}), dropping tail", path.display());
                    break;
                }
            }
        }

        Ok(records)
    }
}
