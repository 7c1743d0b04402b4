use crate::{error::VarannoError, utils::util::Result};
use flate2::read::MultiGzDecoder;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::Path,
};

pub type TextReader = BufReader<Box<dyn Read + Send>>;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn has_gzip_magic(path: &Path) -> Result<bool> {
    let mut file = File::open(path)
        .map_err(|e| crate::varanno_error!("Failed to open {}: {e}", path.display()))?;
    let mut magic = [0u8; 2];
    let n = file
        .read(&mut magic)
        .map_err(|e| crate::varanno_error!("Failed to read {}: {e}", path.display()))?;
    Ok(n == 2 && magic == GZIP_MAGIC)
}

/// Opens a plain or gzip/BGZF compressed text file, detected by its magic bytes.
pub fn open_text_reader(path: &Path) -> Result<TextReader> {
    let is_gzipped = has_gzip_magic(path)?;
    let file = File::open(path)
        .map_err(|error| crate::varanno_error!("Failed to open file {}: {error}", path.display()))?;
    if is_gzipped {
        let gz_decoder = MultiGzDecoder::new(file);
        if gz_decoder.header().is_some() {
            Ok(BufReader::new(Box::new(gz_decoder)))
        } else {
            Err(VarannoError::InvalidGzipHeader {
                path: path.to_path_buf(),
            })
        }
    } else {
        Ok(BufReader::new(Box::new(file)))
    }
}

/// Opens `path`, or standard input when no path (or `-`) is given.
pub fn open_input(path: Option<&Path>) -> Result<TextReader> {
    match path {
        Some(path) if path != Path::new("-") => open_text_reader(path),
        _ => Ok(BufReader::new(Box::new(io::stdin()))),
    }
}

/// Reads one line without its terminator. Returns `false` at end of input.
pub fn read_trimmed_line<R: BufRead>(reader: &mut R, line: &mut String) -> Result<bool> {
    line.clear();
    if reader.read_line(line)? == 0 {
        return Ok(false);
    }
    let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed_len);
    Ok(true)
}

/// Byte-level [`read_trimmed_line`] for input whose encoding is checked per line.
pub fn read_trimmed_bytes<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> Result<bool> {
    line.clear();
    if reader.read_until(b'\n', line)? == 0 {
        return Ok(false);
    }
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn open_text_reader_reads_plain_and_gzip() {
        let dir = tempdir().expect("temp dir should be created");
        let plain = dir.path().join("genes.txt");
        std::fs::write(&plain, "BRCA1\nTP53\r\n").unwrap();

        let gz = dir.path().join("genes");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(b"BRCA1\nTP53\r\n").unwrap();
        encoder.finish().unwrap();

        for path in [&plain, &gz] {
            let mut reader = open_text_reader(path).unwrap();
            let mut line = String::new();
            let mut lines = Vec::new();
            while read_trimmed_line(&mut reader, &mut line).unwrap() {
                lines.push(line.clone());
            }
            assert_eq!(lines, ["BRCA1", "TP53"], "{}", path.display());
        }
    }

    #[test]
    fn open_text_reader_reports_missing_file() {
        let dir = tempdir().expect("temp dir should be created");
        let result = open_text_reader(&dir.path().join("absent.txt"));
        assert!(result.is_err());
    }
}
