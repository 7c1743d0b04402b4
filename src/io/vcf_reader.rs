use crate::{
    constants::VCF_FIXED_COLUMNS,
    core::variant::Variant,
    io::readers::{open_input, read_trimmed_bytes, read_trimmed_line, TextReader},
    utils::util::Result,
};
use std::{collections::HashSet, path::Path};

const INFO_HEADER_PREFIX: &str = "##INFO=<";

/// `ID` of an `##INFO=<ID=...,...>` header line.
pub fn info_header_id(line: &str) -> Option<&str> {
    let body = line.strip_prefix(INFO_HEADER_PREFIX)?;
    let id = body.strip_prefix("ID=")?;
    let end = id.find([',', '>']).unwrap_or(id.len());
    Some(&id[..end])
}

/// Rewrites the `ID` of an `##INFO` header line, keeping the rest verbatim.
pub fn rename_info_header(line: &str, new_id: &str) -> Option<String> {
    let old_id = info_header_id(line)?;
    let rest = &line[INFO_HEADER_PREFIX.len() + "ID=".len() + old_id.len()..];
    Some(format!("{INFO_HEADER_PREFIX}ID={new_id}{rest}"))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VcfHeader {
    /// `##` lines in input order.
    pub meta_lines: Vec<String>,
    /// The `#CHROM` line.
    pub column_line: String,
}

impl VcfHeader {
    /// Sample names from the `#CHROM` line, after the FORMAT column.
    pub fn sample_names(&self) -> Vec<&str> {
        self.column_line.split('\t').skip(VCF_FIXED_COLUMNS + 1).collect()
    }

    pub fn info_ids(&self) -> HashSet<&str> {
        self.meta_lines
            .iter()
            .filter_map(|line| info_header_id(line))
            .collect()
    }
}

/// Line-oriented reader for the primary VCF stream.
///
/// Records that cannot be parsed are logged with their `file:line` and
/// skipped; only I/O failures end the stream.
pub struct VcfReader {
    reader: TextReader,
    header: VcfHeader,
    line: Vec<u8>,
    line_number: usize,
    n_skipped: usize,
    label: String,
}

impl VcfReader {
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let label = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<stdin>".to_string());
        Self::from_reader(open_input(path)?, label)
    }

    pub fn from_reader(mut reader: TextReader, label: String) -> Result<Self> {
        let mut header = VcfHeader::default();
        let mut line = String::new();
        let mut line_number = 0;
        loop {
            if !read_trimmed_line(&mut reader, &mut line)? {
                return Err(crate::varanno_error!(
                    "{label}: missing #CHROM header line"
                ));
            }
            line_number += 1;
            if line.starts_with("##") {
                header.meta_lines.push(line.clone());
            } else if line.starts_with('#') {
                header.column_line = line.clone();
                break;
            } else if !line.is_empty() {
                return Err(crate::varanno_error!(
                    "{label}:{line_number}: record before #CHROM header line"
                ));
            }
        }
        log::debug!(
            "Read VCF header of {} with {} meta lines",
            label,
            header.meta_lines.len()
        );
        Ok(Self {
            reader,
            header,
            line: Vec::new(),
            line_number,
            n_skipped: 0,
            label,
        })
    }

    pub fn header(&self) -> &VcfHeader {
        &self.header
    }

    /// Number of malformed records skipped so far.
    pub fn n_skipped(&self) -> usize {
        self.n_skipped
    }

    pub fn next_variant(&mut self) -> Result<Option<Variant>> {
        loop {
            if !read_trimmed_bytes(&mut self.reader, &mut self.line)? {
                return Ok(None);
            }
            self.line_number += 1;
            if self.line.is_empty() || self.line.starts_with(b"#") {
                continue;
            }
            let parsed = std::str::from_utf8(&self.line)
                .map_err(|e| crate::varanno_error!("record is not valid UTF-8: {e}"))
                .and_then(Variant::from_vcf_line);
            match parsed {
                Ok(variant) => return Ok(Some(variant)),
                Err(e) => {
                    self.n_skipped += 1;
                    log::warn!(
                        "{}:{}: skipping malformed record: {}",
                        self.label,
                        self.line_number,
                        e
                    );
                }
            }
        }
    }

    /// Up to `batch_size` variants; empty at end of input.
    pub fn read_batch(&mut self, batch_size: usize) -> Result<Vec<Variant>> {
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            match self.next_variant()? {
                Some(variant) => batch.push(variant),
                None => break,
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Read};

    fn reader_for(text: &str) -> Result<VcfReader> {
        let inner: Box<dyn Read + Send> = Box::new(Cursor::new(text.as_bytes().to_vec()));
        VcfReader::from_reader(BufReader::new(inner), "test.vcf".to_string())
    }

    const VCF: &str = "##fileformat=VCFv4.2\n\
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t1000\t.\tA\tG\t.\tPASS\tDP=4\n\
\n\
chr1\t2000\trs2\tC\tT\t.\tq10\t.\n\
chr2\t5\t.\tG\tA\t.\tPASS\t.\n";

    #[test]
    fn reads_header_and_batches() {
        let mut reader = reader_for(VCF).unwrap();
        assert_eq!(reader.header().meta_lines.len(), 2);
        assert!(reader.header().column_line.starts_with("#CHROM"));
        assert!(reader.header().info_ids().contains("DP"));

        let first = reader.read_batch(2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].id, "rs2");
        let second = reader.read_batch(2).unwrap();
        assert_eq!(second.len(), 1);
        assert!(reader.read_batch(2).unwrap().is_empty());
    }

    #[test]
    fn rejects_missing_column_header() {
        assert!(reader_for("##fileformat=VCFv4.2\n").is_err());
        assert!(reader_for("chr1\t1\t.\tA\tG\t.\tPASS\t.\n").is_err());
    }

    #[test]
    fn malformed_records_are_skipped_and_counted() {
        let text = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t100\t.\tA\tG\t.\tPASS\t.\n\
chr1\tBAD\t.\tA\tG\t.\tPASS\t.\n\
1\tx\n\
chr1\t300\t.\tA\tG\t.\tPASS\t.\n";
        let mut reader = reader_for(text).unwrap();
        let batch = reader.read_batch(10).unwrap();
        let positions: Vec<i64> = batch.iter().map(|v| v.pos).collect();
        assert_eq!(positions, [100, 300]);
        assert_eq!(reader.n_skipped(), 2);
    }

    #[test]
    fn invalid_utf8_record_is_skipped() {
        let mut bytes = b"#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n".to_vec();
        bytes.extend_from_slice(b"chr1\t100\t.\tA\tG\t.\tPASS\tNOTE=\xff\xfe\n");
        bytes.extend_from_slice(b"chr1\t200\t.\tA\tG\t.\tPASS\t.\n");
        let inner: Box<dyn Read + Send> = Box::new(Cursor::new(bytes));
        let mut reader =
            VcfReader::from_reader(BufReader::new(inner), "test.vcf".to_string()).unwrap();

        let variant = reader.next_variant().unwrap().unwrap();
        assert_eq!(variant.pos, 200);
        assert_eq!(reader.n_skipped(), 1);
        assert!(reader.next_variant().unwrap().is_none());
    }

    #[test]
    fn info_header_helpers() {
        let line = "##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele frequency\">";
        assert_eq!(info_header_id(line), Some("AF"));
        assert_eq!(
            rename_info_header(line, "TGAF").unwrap(),
            "##INFO=<ID=TGAF,Number=A,Type=Float,Description=\"Allele frequency\">"
        );
        assert_eq!(info_header_id("##FORMAT=<ID=GT>"), None);
    }
}
