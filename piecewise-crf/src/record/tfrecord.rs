//! TFRecord container reading and writing.
//!
//! Each record is framed as
//!
//! ```text
//! u64 LE  length
//! u32 LE  masked crc32c(length bytes)
//! [u8]    data
//! u32 LE  masked crc32c(data)
//! ```

use std::{
    fs::File,
    io::{self, BufReader, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{PiecewiseError, PiecewiseResult};

/// File extension of record files in a dataset directory.
pub const TFRECORD_EXTENSION: &str = "tfrecords";

const MASK_DELTA: u32 = 0xa282_ead8;

fn masked_crc(data: &[u8]) -> u32 {
    crc32c::crc32c(data).rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Streams raw records out of a TFRecord byte source.
pub struct TfRecordReader<R> {
    reader: R,
    path: PathBuf,
}

impl TfRecordReader<BufReader<File>> {
    /// Opens a TFRecord file.
    ///
    /// # Errors
    ///
    /// Returns [`PiecewiseError::Io`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> PiecewiseResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| PiecewiseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: Read> TfRecordReader<R> {
    /// Wraps a reader; `path` is only used in error messages.
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
        }
    }

    /// Reads the next record, or `None` at a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`PiecewiseError::CorruptRecordFile`] on a truncated frame or a
    /// checksum mismatch, and [`PiecewiseError::Io`] on read failures.
    pub fn read_record(&mut self) -> PiecewiseResult<Option<Vec<u8>>> {
        let mut header = [0u8; 8];
        match self.fill(&mut header)? {
            0 => return Ok(None),
            8 => {}
            n => return Err(self.corrupt(format!("truncated length header ({n} of 8 bytes)"))),
        }

        let header_crc = self.read_u32()?;
        if masked_crc(&header) != header_crc {
            return Err(self.corrupt("length checksum mismatch".to_owned()));
        }

        let len = LittleEndian::read_u64(&header);
        let mut data = Vec::new();
        let read = (&mut self.reader).take(len).read_to_end(&mut data);
        read.map_err(|source| self.io(source))?;
        if data.len() as u64 != len {
            return Err(self.corrupt(format!(
                "truncated record ({} of {len} bytes)",
                data.len()
            )));
        }

        let data_crc = self.read_u32()?;
        if masked_crc(&data) != data_crc {
            return Err(self.corrupt("data checksum mismatch".to_owned()));
        }

        Ok(Some(data))
    }

    /// Reads into `buf` until it is full or the stream ends, returning the count.
    fn fill(&mut self, buf: &mut [u8]) -> PiecewiseResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => return Err(self.io(source)),
            }
        }
        Ok(filled)
    }

    fn read_u32(&mut self) -> PiecewiseResult<u32> {
        match self.reader.read_u32::<LittleEndian>() {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(self.corrupt("truncated checksum".to_owned()))
            }
            Err(source) => Err(self.io(source)),
        }
    }

    fn corrupt(&self, reason: String) -> PiecewiseError {
        PiecewiseError::CorruptRecordFile {
            path: self.path.clone(),
            reason,
        }
    }

    fn io(&self, source: io::Error) -> PiecewiseError {
        PiecewiseError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl<R: Read> Iterator for TfRecordReader<R> {
    type Item = PiecewiseResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Writes raw records in TFRecord framing.
pub struct TfRecordWriter<W> {
    writer: W,
}

impl<W: Write> TfRecordWriter<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Appends one framed record.
    pub fn write_record(&mut self, data: &[u8]) -> io::Result<()> {
        let mut header = [0u8; 8];
        LittleEndian::write_u64(&mut header, data.len() as u64);
        self.writer.write_all(&header)?;
        self.writer.write_u32::<LittleEndian>(masked_crc(&header))?;
        self.writer.write_all(data)?;
        self.writer.write_u32::<LittleEndian>(masked_crc(data))
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Reads every record of a TFRecord file into memory.
///
/// # Errors
///
/// Fails on the first unreadable or corrupt record.
pub fn read_tfrecord_file(path: impl AsRef<Path>) -> PiecewiseResult<Vec<Vec<u8>>> {
    TfRecordReader::open(path)?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(records: &[&[u8]]) -> Vec<u8> {
        let mut writer = TfRecordWriter::new(Vec::new());
        for record in records {
            writer.write_record(record).unwrap();
        }
        writer.into_inner()
    }

    fn read_all(bytes: &[u8]) -> PiecewiseResult<Vec<Vec<u8>>> {
        TfRecordReader::new(bytes, "memory").collect()
    }

    #[test]
    fn masked_crc_matches_reference_value() {
        // crc32c("123456789") = 0xe3069283
        let expected = 0xe306_9283u32.rotate_right(15).wrapping_add(MASK_DELTA);
        assert_eq!(masked_crc(b"123456789"), expected);
    }

    #[test]
    fn records_come_back_in_order() {
        let bytes = framed(&[b"first", b"", b"third record"]);
        let records = read_all(&bytes).unwrap();
        assert_eq!(
            records,
            vec![b"first".to_vec(), Vec::new(), b"third record".to_vec()]
        );
    }

    #[test]
    fn empty_stream_has_no_records() {
        assert!(read_all(&[]).unwrap().is_empty());
    }

    #[test]
    fn flipped_data_byte_is_a_checksum_error() {
        let mut bytes = framed(&[b"payload"]);
        bytes[12] ^= 0x01;
        let err = read_all(&bytes).unwrap_err();
        assert!(err.to_string().contains("data checksum mismatch"), "{err}");
    }

    #[test]
    fn flipped_length_byte_is_a_checksum_error() {
        let mut bytes = framed(&[b"payload"]);
        bytes[0] ^= 0x01;
        let err = read_all(&bytes).unwrap_err();
        assert!(err.to_string().contains("length checksum mismatch"), "{err}");
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let bytes = framed(&[b"payload"]);
        for cut in [3, 10, 14, bytes.len() - 1] {
            let err = read_all(&bytes[..cut]).unwrap_err();
            assert!(
                matches!(err, PiecewiseError::CorruptRecordFile { .. }),
                "cut at {cut}: {err}"
            );
        }
    }

    #[test]
    fn records_survive_a_file() {
        let path = std::env::temp_dir().join(format!("crf-{}.tfrecords", std::process::id()));
        std::fs::write(&path, framed(&[b"a", b"bc"])).unwrap();
        let records = read_tfrecord_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(records, vec![b"a".to_vec(), b"bc".to_vec()]);
    }
}
