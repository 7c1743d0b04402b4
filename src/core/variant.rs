use crate::{
    constants::{MISSING_VALUE, PASS_FILTER, VCF_FIXED_COLUMNS},
    core::coordinate::CoordinateKey,
    utils::util::Result,
};
use indexmap::IndexMap;
use std::fmt;

/// INFO-style ordered map. A `None` value is a flag (key without `=value`).
pub type InfoMap = IndexMap<String, Option<String>>;

/// Splits a VCF INFO column into an ordered map.
///
/// `.` is the empty map. Entries without `=` are flags. A repeated key keeps
/// its first value.
pub fn parse_info(info: &str) -> InfoMap {
    let mut map = InfoMap::new();
    if info.is_empty() || info == MISSING_VALUE {
        return map;
    }
    for entry in info.split(';').filter(|entry| !entry.is_empty()) {
        let (key, value) = match entry.split_once('=') {
            Some((key, value)) => (key, Some(value.to_string())),
            None => (entry, None),
        };
        map.entry(key.to_string()).or_insert(value);
    }
    map
}

pub fn format_info(info: &InfoMap) -> String {
    if info.is_empty() {
        return MISSING_VALUE.to_string();
    }
    info.iter()
        .map(|(key, value)| match value {
            Some(value) => format!("{key}={value}"),
            None => key.clone(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// One record of the primary variant stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub chrom: String,
    pub pos: i64,
    pub id: String,
    pub reference: String,
    pub alternate: String,
    pub qual: String,
    pub filter: String,
    pub info: InfoMap,
    /// FORMAT and sample columns, carried through verbatim.
    pub samples: Vec<String>,
}

impl Variant {
    pub fn new(
        chrom: impl Into<String>,
        pos: i64,
        reference: impl Into<String>,
        alternate: impl Into<String>,
    ) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
            id: MISSING_VALUE.to_string(),
            reference: reference.into(),
            alternate: alternate.into(),
            qual: MISSING_VALUE.to_string(),
            filter: PASS_FILTER.to_string(),
            info: InfoMap::new(),
            samples: Vec::new(),
        }
    }

    pub fn with(mut self, updates: impl FnOnce(&mut Self)) -> Self {
        updates(&mut self);
        self
    }

    pub fn from_vcf_line(line: &str) -> Result<Self> {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < VCF_FIXED_COLUMNS {
            return Err(crate::varanno_error!(
                "Expected at least {} tab-separated columns, found {}: {}",
                VCF_FIXED_COLUMNS,
                columns.len(),
                line
            ));
        }
        let pos: i64 = columns[1]
            .parse()
            .map_err(|e| crate::varanno_error!("Invalid POS '{}': {}", columns[1], e))?;
        if pos < 1 {
            return Err(crate::varanno_error!(
                "POS must be >= 1 (1-based), found {}",
                pos
            ));
        }

        Ok(Self {
            chrom: columns[0].to_string(),
            pos,
            id: columns[2].to_string(),
            reference: columns[3].to_string(),
            alternate: columns[4].to_string(),
            qual: columns[5].to_string(),
            filter: columns[6].to_string(),
            info: parse_info(columns[7]),
            samples: columns[VCF_FIXED_COLUMNS..]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
    }

    pub fn key(&self) -> CoordinateKey {
        CoordinateKey::new(
            self.chrom.clone(),
            self.pos,
            self.reference.clone(),
            self.alternate.clone(),
        )
    }

    /// Value of an INFO field: `None` when absent, `Some("")` for a flag.
    pub fn info_value(&self, key: &str) -> Option<&str> {
        self.info
            .get(key)
            .map(|value| value.as_deref().unwrap_or(""))
    }

    pub fn has_info(&self, key: &str) -> bool {
        self.info.contains_key(key)
    }

    pub fn set_info(&mut self, key: impl Into<String>, value: Option<String>) {
        self.info.insert(key.into(), value);
    }

    /// Inserts `key` unless it is already present. Returns whether it was inserted.
    pub fn insert_info_if_absent(&mut self, key: &str, value: Option<String>) -> bool {
        if self.info.contains_key(key) {
            return false;
        }
        self.info.insert(key.to_string(), value);
        true
    }

    pub fn has_empty_id(&self) -> bool {
        self.id.is_empty() || self.id == MISSING_VALUE
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.pos,
            self.id,
            self.reference,
            self.alternate,
            self.qual,
            self.filter,
            format_info(&self.info)
        )?;
        for column in &self.samples {
            write!(f, "\t{column}")?;
        }
        Ok(())
    }
}
