use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{DedupError, Result};

/// Files are flat runs of little-endian `u32` records with no header.
pub const RECORD_SIZE: usize = 4;

/// Values decoded per refill while streaming a file.
pub const BATCH_SIZE: usize = 1024;

const WRITE_BUFFER_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempRole {
    ChunkOutput,
    MergeOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempFile {
    pub path: PathBuf,
    pub role: TempRole,
    /// 0 for chunk outputs, the merge round (1-based) for merge outputs.
    pub generation: usize,
}

impl TempFile {
    pub fn chunk(dir: &Path, index: usize) -> Self {
        Self {
            path: dir.join(format!("chunk_{}.tmp", index)),
            role: TempRole::ChunkOutput,
            generation: 0,
        }
    }

    pub fn merged(dir: &Path, generation: usize, index: usize) -> Self {
        Self {
            path: dir.join(format!("merged_{}.tmp", index)),
            role: TempRole::MergeOutput,
            generation,
        }
    }

    pub fn len_records(&self) -> Result<u64> {
        let len = fs::metadata(&self.path)
            .map_err(|e| DedupError::io(&self.path, e))?
            .len();
        if len % RECORD_SIZE as u64 != 0 {
            return Err(DedupError::TruncatedRecord {
                path: self.path.clone(),
                offset: len - len % RECORD_SIZE as u64,
            });
        }
        Ok(len / RECORD_SIZE as u64)
    }

    pub fn remove(&self) -> Result<()> {
        fs::remove_file(&self.path).map_err(|e| DedupError::io(&self.path, e))
    }
}

/// Buffered record sink. Nothing is guaranteed on disk until `finish`.
pub struct RecordWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl RecordWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| DedupError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            written: 0,
        })
    }

    pub fn push(&mut self, value: u32) -> Result<()> {
        self.writer
            .write_u32::<LittleEndian>(value)
            .map_err(|e| DedupError::io(&self.path, e))?;
        self.written += 1;
        Ok(())
    }

    /// Flushes once and returns the number of records written.
    pub fn finish(mut self) -> Result<u64> {
        self.writer
            .flush()
            .map_err(|e| DedupError::io(&self.path, e))?;
        Ok(self.written)
    }
}

pub fn write_records(path: &Path, values: &[u32]) -> Result<u64> {
    let mut writer = RecordWriter::create(path)?;
    for &value in values {
        writer.push(value)?;
    }
    writer.finish()
}

/// Streams a record file through a fixed window of decoded values.
///
/// A refill keeps reading until the window is full or the file ends, so a
/// short read from the OS is never mistaken for end of stream. A trailing
/// partial record is reported as `TruncatedRecord`.
pub struct RecordBatchReader {
    path: PathBuf,
    file: File,
    bytes: Vec<u8>,
    values: Vec<u32>,
    cursor: usize,
    offset: u64,
    eof: bool,
}

impl RecordBatchReader {
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_batch_size(path, BATCH_SIZE)
    }

    pub fn with_batch_size(path: &Path, batch_size: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| DedupError::io(path, e))?;
        let batch_size = batch_size.max(1);
        let mut reader = Self {
            path: path.to_path_buf(),
            file,
            bytes: vec![0; batch_size * RECORD_SIZE],
            values: Vec::with_capacity(batch_size),
            cursor: 0,
            offset: 0,
            eof: false,
        };
        reader.refill()?;
        Ok(reader)
    }

    /// Current head of the stream, `None` once exhausted.
    pub fn peek(&self) -> Option<u32> {
        self.values.get(self.cursor).copied()
    }

    pub fn advance(&mut self) -> Result<()> {
        self.cursor += 1;
        if self.cursor >= self.values.len() {
            self.refill()?;
        }
        Ok(())
    }

    fn refill(&mut self) -> Result<()> {
        self.values.clear();
        self.cursor = 0;
        if self.eof {
            return Ok(());
        }

        let mut filled = 0;
        while filled < self.bytes.len() {
            match self.file.read(&mut self.bytes[filled..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DedupError::io(&self.path, e)),
            }
        }

        let whole = filled - filled % RECORD_SIZE;
        if whole != filled {
            return Err(DedupError::TruncatedRecord {
                path: self.path.clone(),
                offset: self.offset + whole as u64,
            });
        }

        self.values.resize(whole / RECORD_SIZE, 0);
        LittleEndian::read_u32_into(&self.bytes[..whole], &mut self.values);
        self.offset += whole as u64;
        Ok(())
    }
}

pub fn read_records(path: &Path) -> Result<Vec<u32>> {
    let mut reader = RecordBatchReader::open(path)?;
    let mut values = Vec::new();
    while let Some(value) = reader.peek() {
        values.push(value);
        reader.advance()?;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_are_little_endian() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("le.tmp");
        write_records(&path, &[0x0102_0304, 0xAABB_CCDD]).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes, vec![0x04, 0x03, 0x02, 0x01, 0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn batch_reader_crosses_refill_boundaries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("many.tmp");
        let values: Vec<u32> = (0..2500).map(|v| v * 3).collect();
        write_records(&path, &values).unwrap();

        let mut reader = RecordBatchReader::with_batch_size(&path, 7).unwrap();
        let mut seen = Vec::new();
        while let Some(value) = reader.peek() {
            seen.push(value);
            reader.advance().unwrap();
        }
        assert_eq!(seen, values);
        assert_eq!(read_records(&path).unwrap(), values);
    }

    #[test]
    fn empty_file_has_no_head() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.tmp");
        write_records(&path, &[]).unwrap();

        let reader = RecordBatchReader::open(&path).unwrap();
        assert_eq!(reader.peek(), None);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn truncated_tail_is_reported_with_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("truncated.tmp");
        fs::write(&path, [1, 0, 0, 0, 2, 0, 0, 0, 9, 9]).unwrap();

        match read_records(&path) {
            Err(DedupError::TruncatedRecord { offset, .. }) => assert_eq!(offset, 8),
            other => panic!("expected truncated record, got {:?}", other),
        }

        let file = TempFile {
            path,
            role: TempRole::ChunkOutput,
            generation: 0,
        };
        assert!(matches!(
            file.len_records(),
            Err(DedupError::TruncatedRecord { offset: 8, .. })
        ));
    }

    #[test]
    fn temp_file_names_follow_role() {
        let dir = Path::new("/work");
        let chunk = TempFile::chunk(dir, 3);
        assert_eq!(chunk.path, PathBuf::from("/work/chunk_3.tmp"));
        assert_eq!(chunk.role, TempRole::ChunkOutput);

        let merged = TempFile::merged(dir, 2, 7);
        assert_eq!(merged.path, PathBuf::from("/work/merged_7.tmp"));
        assert_eq!(merged.generation, 2);
    }

    #[test]
    fn missing_file_is_io_failure_with_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.tmp");
        match RecordBatchReader::open(&path) {
            Err(DedupError::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected io failure, got {:?}", other.err()),
        }
    }
}
