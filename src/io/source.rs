//! Annotation sources: tabix-indexed VCF and TSV files and in-memory gene lists.

use crate::{
    constants::{MISSING_VALUE, VCF_FIXED_COLUMNS},
    core::{
        coordinate::{contig_candidates, CoordinateKey},
        field_map::FieldRecord,
        variant::{parse_info, InfoMap},
    },
    error::VarannoError,
    index::tabix::{scan_chunks, Preset, TabixIndex},
    io::{gene_list::GeneList, readers::read_trimmed_bytes},
    utils::util::Result,
};
use noodles::bgzf;
use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

type BgzfFile = bgzf::io::reader::Reader<File>;

/// Idle BGZF handles of one source. Each lookup checks one out, so concurrent
/// lookups never share a file position.
struct HandlePool {
    path: PathBuf,
    idle: Mutex<Vec<BgzfFile>>,
}

impl fmt::Debug for HandlePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n_idle = self.idle.lock().map(|idle| idle.len()).unwrap_or(0);
        f.debug_struct("HandlePool")
            .field("path", &self.path)
            .field("idle", &n_idle)
            .finish()
    }
}

impl HandlePool {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            idle: Mutex::new(Vec::new()),
        }
    }

    fn checkout(&self) -> Result<BgzfFile> {
        let reused = self
            .idle
            .lock()
            .map_err(|_| crate::varanno_error!("Handle pool of {} poisoned", self.path.display()))?
            .pop();
        match reused {
            Some(reader) => Ok(reader),
            None => {
                let file = File::open(&self.path).map_err(|e| {
                    crate::varanno_error!("Failed to open {}: {e}", self.path.display())
                })?;
                Ok(bgzf::io::reader::Reader::new(file))
            }
        }
    }

    /// Runs `f` on a checked-out handle and returns the handle to the pool afterwards.
    fn with_handle<T>(&self, f: impl FnOnce(&mut BgzfFile) -> Result<T>) -> Result<T> {
        let mut reader = self.checkout()?;
        let result = f(&mut reader);
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(reader);
        }
        result
    }
}

/// A BGZF file with its tabix index and leading meta lines.
#[derive(Debug)]
pub struct IndexedFile {
    path: PathBuf,
    index: Arc<TabixIndex>,
    meta_lines: Vec<String>,
    pool: HandlePool,
}

impl IndexedFile {
    pub fn open(path: &Path) -> Result<Self> {
        let index = Arc::new(TabixIndex::for_source(path)?);
        let pool = HandlePool::new(path);
        let meta_lines = pool.with_handle(|reader| read_meta_lines(reader, &index))?;
        log::debug!(
            "Opened {} ({} sequences, {} header lines)",
            path.display(),
            index.sequence_names().len(),
            meta_lines.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            index,
            meta_lines,
            pool,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &TabixIndex {
        &self.index
    }

    /// Leading meta lines, including skipped lines, without their terminators.
    pub fn meta_lines(&self) -> &[String] {
        &self.meta_lines
    }

    /// The last meta line with the meta character stripped, split on tabs.
    pub fn column_names(&self) -> Option<Vec<String>> {
        let meta_char = self.index.config().meta_char?;
        let last = self.meta_lines.last()?;
        let stripped = last.trim_start_matches(meta_char);
        Some(stripped.split('\t').map(str::to_string).collect())
    }

    /// The source's spelling of `chromosome`, trying the `chr`-prefixed form
    /// first when `add_chr` is set.
    pub fn resolve_contig(&self, chromosome: &str, add_chr: bool) -> Result<String> {
        contig_candidates(chromosome, add_chr)
            .into_iter()
            .find(|candidate| self.index.contains(candidate))
            .map(|candidate| candidate.into_owned())
            .ok_or_else(|| VarannoError::ChromosomeNotFound {
                chromosome: chromosome.to_string(),
                path: self.path.clone(),
            })
    }

    /// Visits the columns of every row on `contig` whose interval overlaps the
    /// 1-based `position`, in file order, until `visit` returns `false`.
    pub fn rows_overlapping<F>(&self, contig: &str, position: i64, mut visit: F) -> Result<()>
    where
        F: FnMut(&[&str]) -> bool,
    {
        let chunks = self.index.region_query(contig, position)?;
        if chunks.is_empty() {
            return Ok(());
        }
        let config = self.index.config();
        self.pool.with_handle(|reader| {
            scan_chunks(reader, &chunks, |bytes| {
                let line = match std::str::from_utf8(bytes) {
                    Ok(line) => line,
                    Err(e) => {
                        warn_malformed(&self.path, format!("row is not valid UTF-8: {e}"));
                        return Ok(true);
                    }
                };
                if line.is_empty() || config.is_meta(line) {
                    return Ok(true);
                }
                let columns: Vec<&str> = line.split('\t').collect();
                if columns.get(config.sequence_column - 1) != Some(&contig) {
                    return Ok(false);
                }
                let interval = match config.row_interval(&columns) {
                    Ok(interval) => interval,
                    Err(message) => {
                        warn_malformed(&self.path, message);
                        return Ok(true);
                    }
                };
                if interval.begin > position {
                    return Ok(false);
                }
                if interval.end < position {
                    return Ok(true);
                }
                Ok(visit(&columns))
            })
        })
    }
}

fn read_meta_lines(reader: &mut BgzfFile, index: &TabixIndex) -> Result<Vec<String>> {
    let config = index.config();
    let mut meta_lines = Vec::new();
    let mut line = Vec::new();
    while read_trimmed_bytes(reader, &mut line)? {
        let text = String::from_utf8_lossy(&line);
        if meta_lines.len() < config.skip_lines || config.is_meta(&text) {
            meta_lines.push(text.into_owned());
        } else {
            break;
        }
    }
    Ok(meta_lines)
}

fn warn_malformed(path: &Path, message: impl Into<String>) {
    log::warn!(
        "{}",
        VarannoError::MalformedRecord {
            path: path.to_path_buf(),
            message: message.into(),
        }
    );
}

/// One decoded row of a positional source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub key: CoordinateKey,
    /// VCF ID column; `None` for TSV rows or a missing (`.`) ID.
    pub id: Option<String>,
    /// VCF FILTER column; `None` for TSV rows.
    pub filter: Option<String>,
    pub fields: RowFields,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowFields {
    Info(InfoMap),
    Columns(Vec<String>),
}

#[derive(Debug)]
pub struct VcfSource {
    file: IndexedFile,
}

impl VcfSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = IndexedFile::open(path)?;
        if file.index().config().preset != Preset::Vcf {
            log::warn!(
                "{} is not indexed with the VCF preset; decoding rows as VCF anyway",
                path.display()
            );
        }
        Ok(Self { file })
    }

    pub fn file(&self) -> &IndexedFile {
        &self.file
    }

    /// `##INFO` definitions from the source header.
    pub fn info_header_lines(&self) -> impl Iterator<Item = &str> {
        self.file
            .meta_lines()
            .iter()
            .map(String::as_str)
            .filter(|line| line.starts_with("##INFO=<"))
    }

    fn decode(columns: &[&str]) -> std::result::Result<SourceRow, String> {
        if columns.len() < VCF_FIXED_COLUMNS {
            return Err(format!(
                "expected {} columns, found {}",
                VCF_FIXED_COLUMNS,
                columns.len()
            ));
        }
        let position: i64 = columns[1]
            .parse()
            .map_err(|e| format!("invalid POS '{}': {e}", columns[1]))?;
        Ok(SourceRow {
            key: CoordinateKey::new(columns[0], position, columns[3], columns[4]),
            id: Some(columns[2])
                .filter(|id| !id.is_empty() && *id != MISSING_VALUE)
                .map(str::to_string),
            filter: Some(columns[6].to_string()),
            fields: RowFields::Info(parse_info(columns[7])),
        })
    }
}

#[derive(Debug)]
pub struct TsvSource {
    file: IndexedFile,
    /// 0-based allele columns compared when set.
    ref_column: Option<usize>,
    alt_column: Option<usize>,
}

impl TsvSource {
    /// `ref_column` and `alt_column` are 1-based.
    pub fn open(path: &Path, ref_column: Option<usize>, alt_column: Option<usize>) -> Result<Self> {
        let file = IndexedFile::open(path)?;
        if file.index().config().preset == Preset::Sam {
            return Err(crate::config_error!(
                "{} is indexed with the SAM preset, which is not supported",
                path.display()
            ));
        }
        Ok(Self {
            file,
            ref_column: ref_column.map(|c| c.saturating_sub(1)),
            alt_column: alt_column.map(|c| c.saturating_sub(1)),
        })
    }

    pub fn file(&self) -> &IndexedFile {
        &self.file
    }

    fn decode(&self, columns: &[&str]) -> std::result::Result<SourceRow, String> {
        let config = self.file.index().config();
        let begin = config.row_interval(columns)?.begin;
        let allele = |column: Option<usize>| -> std::result::Result<String, String> {
            match column {
                Some(c) => columns
                    .get(c)
                    .map(|value| value.to_string())
                    .ok_or_else(|| format!("missing allele column {}", c + 1)),
                None => Ok(String::new()),
            }
        };
        Ok(SourceRow {
            key: CoordinateKey::new(
                columns[config.sequence_column - 1],
                begin,
                allele(self.ref_column)?,
                allele(self.alt_column)?,
            ),
            id: None,
            filter: None,
            fields: RowFields::Columns(columns.iter().map(|c| c.to_string()).collect()),
        })
    }
}

/// Where an annotator reads its rows from.
#[derive(Debug)]
pub enum SourceReader {
    Vcf(VcfSource),
    Tsv(TsvSource),
    GeneList(GeneList),
}

impl SourceReader {
    pub fn path(&self) -> &Path {
        match self {
            SourceReader::Vcf(source) => source.file.path(),
            SourceReader::Tsv(source) => source.file.path(),
            SourceReader::GeneList(list) => list.path(),
        }
    }

    /// Decoded rows overlapping `chromosome:position` in file order, until
    /// `visit` returns `false`. Rows that fail to decode are skipped with a
    /// warning. Gene lists have no positional rows.
    pub fn rows_at<F>(&self, chromosome: &str, position: i64, add_chr: bool, mut visit: F) -> Result<()>
    where
        F: FnMut(SourceRow) -> bool,
    {
        let file = match self {
            SourceReader::Vcf(source) => &source.file,
            SourceReader::Tsv(source) => &source.file,
            SourceReader::GeneList(_) => return Ok(()),
        };
        let contig = file.resolve_contig(chromosome, add_chr)?;
        file.rows_overlapping(&contig, position, |columns| {
            let decoded = match self {
                SourceReader::Vcf(_) => VcfSource::decode(columns),
                SourceReader::Tsv(source) => source.decode(columns),
                SourceReader::GeneList(_) => return false,
            };
            match decoded {
                Ok(row) => visit(row),
                Err(message) => {
                    warn_malformed(file.path(), message);
                    true
                }
            }
        })
    }

    pub fn gene(&self, symbol: &str) -> Option<&FieldRecord> {
        match self {
            SourceReader::GeneList(list) => list.get(symbol),
            _ => None,
        }
    }
}
