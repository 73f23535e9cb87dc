use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use ipd_core::{parse_address, AddressError, DedupError, Result};

use super::{AddressLine, AddressReader};

const READ_BUFFER_SIZE: usize = 1 << 20;

/// Newline-delimited dotted-decimal addresses, one per line.
///
/// A trailing `\r` is dropped along with the `\n`; anything else that does
/// not parse aborts with `MalformedInput`.
pub struct TextAddressReader<R> {
    source: PathBuf,
    reader: R,
    line: Vec<u8>,
    line_number: u64,
}

impl TextAddressReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| DedupError::io(path, e))?;
        Ok(Self::new(
            path,
            BufReader::with_capacity(READ_BUFFER_SIZE, file),
        ))
    }
}

impl<R: BufRead> TextAddressReader<R> {
    /// `source` only labels errors; the bytes come from `reader`.
    pub fn new(source: impl Into<PathBuf>, reader: R) -> Self {
        Self {
            source: source.into(),
            reader,
            line: Vec::new(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> AddressReader for TextAddressReader<R> {
    fn next_address(&mut self) -> Result<Option<AddressLine>> {
        self.line.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.line)
            .map_err(|e| DedupError::io(&self.source, e))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        let bytes = self
            .line
            .strip_suffix(b"\n")
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
            .unwrap_or(&self.line);

        let line_number = self.line_number;
        let malformed = |source| DedupError::MalformedInput {
            line_number,
            line: String::from_utf8_lossy(bytes).into_owned(),
            source,
        };
        let content = std::str::from_utf8(bytes).map_err(|_| malformed(AddressError::NotUtf8))?;
        let value = parse_address(content).map_err(malformed)?;

        Ok(Some(AddressLine {
            value,
            weight: content.len() as u64 + 1,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(text: &str) -> Result<Vec<AddressLine>> {
        let mut reader = TextAddressReader::new("mem", Cursor::new(text.as_bytes().to_vec()));
        let mut lines = Vec::new();
        while let Some(line) = reader.next_address()? {
            lines.push(line);
        }
        Ok(lines)
    }

    #[test]
    fn reads_values_and_weights() {
        let lines = read_all("1.2.3.4\n10.0.0.1\r\n255.255.255.255").unwrap();
        assert_eq!(
            lines,
            vec![
                AddressLine {
                    value: 0x0102_0304,
                    weight: 8
                },
                AddressLine {
                    value: 0x0A00_0001,
                    weight: 9
                },
                AddressLine {
                    value: u32::MAX,
                    weight: 16
                },
            ]
        );
    }

    #[test]
    fn malformed_line_reports_position() {
        match read_all("1.2.3.4\n1.2.3\n") {
            Err(DedupError::MalformedInput {
                line_number, line, ..
            }) => {
                assert_eq!(line_number, 2);
                assert_eq!(line, "1.2.3");
            }
            other => panic!("expected malformed input, got {:?}", other),
        }
    }

    #[test]
    fn blank_line_is_malformed() {
        assert!(matches!(
            read_all("1.2.3.4\n\n5.6.7.8\n"),
            Err(DedupError::MalformedInput { line_number: 2, .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_malformed_with_position() {
        let mut reader = TextAddressReader::new("mem", Cursor::new(b"1.2.3.4\n\xff\xfe\n".to_vec()));
        assert!(reader.next_address().unwrap().is_some());
        match reader.next_address() {
            Err(DedupError::MalformedInput {
                line_number,
                line,
                source,
            }) => {
                assert_eq!(line_number, 2);
                assert_eq!(line, "\u{fffd}\u{fffd}");
                assert_eq!(source, AddressError::NotUtf8);
            }
            other => panic!("expected malformed input, got {:?}", other),
        }
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(read_all("").unwrap().is_empty());
    }
}
