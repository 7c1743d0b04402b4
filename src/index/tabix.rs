//! Tabix (`.tbi`) index: the binning and linear index of a sorted BGZF text file.

use crate::{error::VarannoError, io::readers::read_trimmed_bytes, utils::util::Result};
use flate2::read::MultiGzDecoder;
use noodles::bgzf::{self, VirtualPosition};
use std::{
    collections::HashMap,
    fs::File,
    io::{Read, Seek},
    path::{Path, PathBuf},
};

const TABIX_MAGIC: &[u8; 4] = b"TBI\x01";
const TABIX_EXTENSION: &str = "tbi";
/// Pseudo-bin holding per-contig metadata rather than record chunks.
const METADATA_BIN: u32 = 37450;
const LINEAR_SHIFT: u32 = 14;
const MAX_BIN: u32 = 37449;
const FLAG_UCSC: i32 = 0x10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Generic,
    Sam,
    Vcf,
}

/// How rows of the indexed file map onto intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabixConfig {
    pub preset: Preset,
    /// Begin column holds 0-based positions.
    pub zero_based: bool,
    /// 1-based column numbers; an end column of 0 means "same as begin".
    pub sequence_column: usize,
    pub begin_column: usize,
    pub end_column: usize,
    pub meta_char: Option<char>,
    pub skip_lines: usize,
}

/// Closed 1-based interval covered by one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowInterval {
    pub begin: i64,
    pub end: i64,
}

impl TabixConfig {
    pub fn is_meta(&self, line: &str) -> bool {
        self.meta_char.is_some_and(|c| line.starts_with(c))
    }

    /// Interval of one data row, following the preset's column rules.
    pub fn row_interval(&self, columns: &[&str]) -> std::result::Result<RowInterval, String> {
        let begin_raw: i64 = parse_column(columns, self.begin_column, "begin")?;
        let begin = if self.zero_based {
            begin_raw + 1
        } else {
            begin_raw
        };

        let end = match self.preset {
            Preset::Vcf => {
                let reference = columns
                    .get(3)
                    .ok_or_else(|| "missing REF column".to_string())?;
                let info_end = columns.get(7).and_then(|info| {
                    info.split(';')
                        .find_map(|entry| entry.strip_prefix("END="))
                        .and_then(|value| value.parse::<i64>().ok())
                });
                info_end.unwrap_or(begin + reference.len().max(1) as i64 - 1)
            }
            Preset::Generic if self.end_column > 0 => {
                parse_column(columns, self.end_column, "end")?
            }
            Preset::Generic => begin,
            Preset::Sam => return Err("SAM-preset sources are not supported".to_string()),
        };
        Ok(RowInterval {
            begin,
            end: end.max(begin),
        })
    }
}

fn parse_column(columns: &[&str], column: usize, what: &str) -> std::result::Result<i64, String> {
    let raw = columns
        .get(column.saturating_sub(1))
        .ok_or_else(|| format!("missing {what} column {column}"))?;
    raw.parse::<i64>()
        .map_err(|e| format!("invalid {what} '{raw}' in column {column}: {e}"))
}

/// A run of the compressed file that may contain matching records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub begin: VirtualPosition,
    pub end: VirtualPosition,
}

#[derive(Debug)]
struct Bin {
    id: u32,
    chunks: Vec<Chunk>,
}

#[derive(Debug, Default)]
struct ReferenceIndex {
    /// Sorted by bin id.
    bins: Vec<Bin>,
    linear: Vec<VirtualPosition>,
}

#[derive(Debug)]
pub struct TabixIndex {
    path: PathBuf,
    config: TabixConfig,
    names: Vec<String>,
    name_to_tid: HashMap<String, usize>,
    references: Vec<ReferenceIndex>,
}

pub fn index_path_for(source: &Path) -> PathBuf {
    let mut path = source.as_os_str().to_owned();
    path.push(".");
    path.push(TABIX_EXTENSION);
    PathBuf::from(path)
}

impl TabixIndex {
    /// Loads the `.tbi` sidecar of `source`.
    pub fn for_source(source: &Path) -> Result<Self> {
        let index_path = index_path_for(source);
        if !index_path.is_file() {
            return Err(VarannoError::MissingIndex {
                index_path,
                source_path: source.to_path_buf(),
            });
        }
        Self::from_path(&index_path)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut bytes = Vec::new();
        MultiGzDecoder::new(file)
            .read_to_end(&mut bytes)
            .map_err(|e| corrupt(path, format!("cannot decompress index: {e}")))?;
        Self::parse(&bytes, path)
    }

    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self> {
        let mut cursor = IndexCursor { bytes, path, at: 0 };
        if cursor.take(4)? != TABIX_MAGIC {
            return Err(corrupt(path, "bad magic, not a tabix index"));
        }

        let n_ref = cursor.count("reference count")?;
        let format = cursor.i32()?;
        let preset = match format & 0xffff {
            0 => Preset::Generic,
            1 => Preset::Sam,
            2 => Preset::Vcf,
            other => return Err(corrupt(path, format!("unknown preset {other}"))),
        };
        let sequence_column = cursor.count("sequence column")?;
        let begin_column = cursor.count("begin column")?;
        let end_column = cursor.count("end column")?;
        if sequence_column == 0 || begin_column == 0 {
            return Err(corrupt(path, "sequence and begin columns must be >= 1"));
        }
        let meta = cursor.i32()?;
        let meta_char = u8::try_from(meta)
            .ok()
            .filter(|&b| b != 0)
            .map(char::from);
        let skip_lines = cursor.count("skip line count")?;
        let names_len = cursor.count("name block length")?;
        let names: Vec<String> = cursor
            .take(names_len)?
            .split(|&b| b == 0)
            .filter(|name| !name.is_empty())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();
        if names.len() != n_ref {
            return Err(corrupt(
                path,
                format!("{} sequence names for {} references", names.len(), n_ref),
            ));
        }

        let mut references = Vec::with_capacity(n_ref);
        for tid in 0..n_ref {
            references.push(cursor.reference(&names[tid])?);
        }

        let name_to_tid = names
            .iter()
            .enumerate()
            .map(|(tid, name)| (name.clone(), tid))
            .collect();

        log::trace!(
            "Loaded tabix index {} with {} sequences",
            path.display(),
            names.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            config: TabixConfig {
                preset,
                zero_based: format & FLAG_UCSC != 0,
                sequence_column,
                begin_column,
                end_column,
                meta_char,
                skip_lines,
            },
            names,
            name_to_tid,
            references,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &TabixConfig {
        &self.config
    }

    pub fn sequence_names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, chromosome: &str) -> bool {
        self.name_to_tid.contains_key(chromosome)
    }

    /// Chunks holding every record that may overlap the 1-based `position`.
    pub fn region_query(&self, chromosome: &str, position: i64) -> Result<Vec<Chunk>> {
        let tid = *self.name_to_tid.get(chromosome).ok_or_else(|| {
            VarannoError::ChromosomeNotFound {
                chromosome: chromosome.to_string(),
                path: self.path.clone(),
            }
        })?;
        let reference = &self.references[tid];
        let begin = (position.max(1) - 1) as u64;

        let window = (begin >> LINEAR_SHIFT) as usize;
        let min_offset = reference
            .linear
            .get(window)
            .or_else(|| reference.linear.last())
            .copied()
            .unwrap_or_else(|| VirtualPosition::from(0));

        let mut chunks: Vec<Chunk> = Vec::new();
        for bin_id in reg2bins(begin, begin + 1) {
            if let Ok(found) = reference.bins.binary_search_by_key(&bin_id, |bin| bin.id) {
                chunks.extend(
                    reference.bins[found]
                        .chunks
                        .iter()
                        .filter(|chunk| chunk.end > min_offset),
                );
            }
        }
        Ok(merge_chunks(chunks))
    }
}

/// Bins overlapping the 0-based half-open range `[begin, end)`.
pub fn reg2bins(begin: u64, end: u64) -> Vec<u32> {
    let end = end.max(begin + 1) - 1;
    let mut bins = vec![0];
    for (first, shift) in [(1u64, 26u32), (9, 23), (73, 20), (585, 17), (4681, 14)] {
        for bin in (first + (begin >> shift))..=(first + (end >> shift)) {
            bins.push(bin as u32);
        }
    }
    bins
}

/// Sorts chunks by begin and coalesces overlapping or touching runs.
pub fn merge_chunks(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort_by_key(|chunk| chunk.begin);
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(last) if chunk.begin <= last.end => {
                last.end = last.end.max(chunk.end);
            }
            _ => merged.push(chunk),
        }
    }
    merged
}

/// Feeds the raw bytes of each line inside `chunks`, without the line
/// terminator, to `visit` until it returns `false`.
///
/// Lines are not decoded here, so one undecodable row cannot end the scan.
pub fn scan_chunks<R, F>(
    reader: &mut bgzf::io::reader::Reader<R>,
    chunks: &[Chunk],
    mut visit: F,
) -> Result<()>
where
    R: Read + Seek,
    F: FnMut(&[u8]) -> Result<bool>,
{
    let mut line = Vec::new();
    for chunk in chunks {
        reader.seek(chunk.begin)?;
        while reader.virtual_position() < chunk.end {
            if !read_trimmed_bytes(reader, &mut line)? {
                return Ok(());
            }
            if !visit(&line)? {
                return Ok(());
            }
        }
    }
    Ok(())
}

fn corrupt(path: &Path, message: impl Into<String>) -> VarannoError {
    VarannoError::IndexCorrupt {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

struct IndexCursor<'a> {
    bytes: &'a [u8],
    path: &'a Path,
    at: usize,
}

impl<'a> IndexCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .at
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| corrupt(self.path, format!("truncated at byte {}", self.at)))?;
        let slice = &self.bytes[self.at..end];
        self.at = end;
        Ok(slice)
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn count(&mut self, what: &str) -> Result<usize> {
        let value = self.i32()?;
        usize::try_from(value)
            .map_err(|_| corrupt(self.path, format!("negative {what}: {value}")))
    }

    fn reference(&mut self, name: &str) -> Result<ReferenceIndex> {
        let n_bin = self.count("bin count")?;
        let mut bins = Vec::with_capacity(n_bin);
        for _ in 0..n_bin {
            let id = self.u32()?;
            let n_chunk = self.count("chunk count")?;
            let mut chunks = Vec::with_capacity(n_chunk);
            for _ in 0..n_chunk {
                let begin = VirtualPosition::from(self.u64()?);
                let end = VirtualPosition::from(self.u64()?);
                if id != METADATA_BIN && begin > end {
                    return Err(corrupt(
                        self.path,
                        format!("chunk {begin:?}-{end:?} of bin {id} on {name} ends before it begins"),
                    ));
                }
                chunks.push(Chunk { begin, end });
            }
            if id == METADATA_BIN {
                continue;
            }
            if id > MAX_BIN {
                return Err(corrupt(self.path, format!("bin {id} out of range on {name}")));
            }
            bins.push(Bin { id, chunks });
        }
        bins.sort_by_key(|bin| bin.id);
        if let Some(pair) = bins.windows(2).find(|pair| pair[0].id == pair[1].id) {
            return Err(corrupt(
                self.path,
                format!("duplicate bin {} on {}", pair[0].id, name),
            ));
        }

        let n_intv = self.count("linear index size")?;
        let mut linear = Vec::with_capacity(n_intv);
        let mut last_set = VirtualPosition::from(0);
        for window in 0..n_intv {
            let offset = VirtualPosition::from(self.u64()?);
            if u64::from(offset) != 0 {
                if offset < last_set {
                    return Err(corrupt(
                        self.path,
                        format!("linear index decreases at window {window} on {name}"),
                    ));
                }
                last_set = offset;
            }
            linear.push(offset);
        }
        Ok(ReferenceIndex { bins, linear })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vcf_config() -> TabixConfig {
        TabixConfig {
            preset: Preset::Vcf,
            zero_based: false,
            sequence_column: 1,
            begin_column: 2,
            end_column: 0,
            meta_char: Some('#'),
            skip_lines: 0,
        }
    }

    /// Minimal uncompressed index body with a single reference.
    fn index_bytes(bins: &[(u32, &[(u64, u64)])], linear: &[u64]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(TABIX_MAGIC);
        for value in [1i32, 2, 1, 2, 0, b'#' as i32, 0, 5] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(b"chr1\0");
        out.extend_from_slice(&(bins.len() as i32).to_le_bytes());
        for (id, chunks) in bins {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(chunks.len() as i32).to_le_bytes());
            for (begin, end) in chunks.iter() {
                out.extend_from_slice(&begin.to_le_bytes());
                out.extend_from_slice(&end.to_le_bytes());
            }
        }
        out.extend_from_slice(&(linear.len() as i32).to_le_bytes());
        for offset in linear {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_reg2bins_single_position() {
        let bins = reg2bins(999, 1000);
        assert_eq!(bins, [0, 1, 9, 73, 585, 4681]);
        let bins = reg2bins(1 << 14, (1 << 14) + 1);
        assert_eq!(bins, [0, 1, 9, 73, 585, 4682]);
    }

    #[test]
    fn test_merge_chunks_coalesces_overlaps() {
        let chunk = |b: u64, e: u64| Chunk {
            begin: VirtualPosition::from(b),
            end: VirtualPosition::from(e),
        };
        let merged = merge_chunks(vec![chunk(50, 60), chunk(10, 20), chunk(15, 30), chunk(30, 40)]);
        assert_eq!(merged, [chunk(10, 40), chunk(50, 60)]);
    }

    #[test]
    fn test_parse_and_query() {
        let bytes = index_bytes(
            &[(4681, &[(100, 200)]), (METADATA_BIN, &[(100, 300), (3, 0)]), (585, &[(250, 300)])],
            &[100],
        );
        let index = TabixIndex::parse(&bytes, Path::new("mem.tbi")).unwrap();
        assert_eq!(index.config(), &vcf_config());
        assert_eq!(index.sequence_names(), ["chr1"]);
        assert!(index.contains("chr1"));
        assert!(!index.contains("1"));

        let chunks = index.region_query("chr1", 1000).unwrap();
        assert_eq!(
            chunks,
            [
                Chunk {
                    begin: VirtualPosition::from(100),
                    end: VirtualPosition::from(200)
                },
                Chunk {
                    begin: VirtualPosition::from(250),
                    end: VirtualPosition::from(300)
                }
            ]
        );

        let err = index.region_query("chr2", 1000).unwrap_err();
        assert!(matches!(err, VarannoError::ChromosomeNotFound { .. }));
    }

    #[test]
    fn test_linear_index_prunes_early_chunks() {
        let bytes = index_bytes(&[(0, &[(10, 50), (400, 500)])], &[300]);
        let index = TabixIndex::parse(&bytes, Path::new("mem.tbi")).unwrap();
        let chunks = index.region_query("chr1", 5).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].begin, VirtualPosition::from(400));
    }

    #[test]
    fn test_parse_rejects_corrupt_indexes() {
        let path = Path::new("bad.tbi");
        let cases: Vec<Vec<u8>> = vec![
            b"NOPE".to_vec(),
            index_bytes(&[(4681, &[(100, 200)])], &[100])[..30].to_vec(),
            index_bytes(&[(4681, &[(100, 200)]), (4681, &[(300, 400)])], &[100]),
            index_bytes(&[(4681, &[(200, 100)])], &[100]),
            index_bytes(&[(4681, &[(100, 200)])], &[300, 100]),
        ];
        for bytes in cases {
            let err = TabixIndex::parse(&bytes, path).unwrap_err();
            assert!(matches!(err, VarannoError::IndexCorrupt { .. }), "{err}");
        }
    }

    #[test]
    fn test_missing_index_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.vcf.gz");
        std::fs::write(&source, b"").unwrap();
        let err = TabixIndex::for_source(&source).unwrap_err();
        match err {
            VarannoError::MissingIndex { index_path, .. } => {
                assert_eq!(index_path, dir.path().join("source.vcf.gz.tbi"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_vcf_row_interval_uses_ref_length_and_end() {
        let config = vcf_config();
        let snv = ["1", "1000", ".", "A", "G", ".", "PASS", "."];
        assert_eq!(
            config.row_interval(&snv).unwrap(),
            RowInterval {
                begin: 1000,
                end: 1000
            }
        );
        let deletion = ["1", "998", ".", "ACGT", "A", ".", "PASS", "."];
        assert_eq!(config.row_interval(&deletion).unwrap().end, 1001);
        let sv = ["1", "900", ".", "N", "<DEL>", ".", "PASS", "SVTYPE=DEL;END=1500"];
        assert_eq!(config.row_interval(&sv).unwrap().end, 1500);
        assert!(config.row_interval(&["1", "x"]).is_err());
    }

    #[test]
    fn test_generic_row_interval_zero_based() {
        let config = TabixConfig {
            preset: Preset::Generic,
            zero_based: true,
            sequence_column: 1,
            begin_column: 2,
            end_column: 3,
            meta_char: Some('#'),
            skip_lines: 0,
        };
        let row = ["chr1", "999", "1000", "x"];
        assert_eq!(
            config.row_interval(&row).unwrap(),
            RowInterval {
                begin: 1000,
                end: 1000
            }
        );
        assert!(config.is_meta("#chr\tpos"));
        assert!(!config.is_meta("chr1\t5"));
    }
}
