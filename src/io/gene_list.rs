use crate::{
    core::field_map::{ColumnMapper, FieldMapper, FieldRecord},
    io::readers::{open_text_reader, read_trimmed_line},
    utils::util::Result,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Where gene-list values come from and how they are named.
#[derive(Debug, Clone)]
pub enum GeneOutputs {
    /// Presence only: `name=<symbol>` for each matched gene.
    Presence { name: String },
    Columns(FieldMapper),
}

/// A flat gene table loaded completely into memory, keyed by gene symbol.
#[derive(Debug)]
pub struct GeneList {
    path: PathBuf,
    header: Option<Vec<String>>,
    columns: Option<ColumnMapper>,
    records: HashMap<String, FieldRecord>,
}

impl GeneList {
    /// Reads `path` (plain or gzip). `key_column` is 1-based. With
    /// `has_header`, the first line names the columns and is not data.
    pub fn load(path: &Path, key_column: usize, has_header: bool, outputs: &GeneOutputs) -> Result<Self> {
        if key_column == 0 {
            return Err(crate::config_error!(
                "Gene list key column is 1-based, found 0 for {}",
                path.display()
            ));
        }
        let key_index = key_column - 1;
        let mut reader = open_text_reader(path)?;
        let mut line = String::new();

        let mut header = None;
        if has_header && read_trimmed_line(&mut reader, &mut line)? {
            header = Some(line.split('\t').map(str::to_string).collect::<Vec<_>>());
        }

        let columns = match outputs {
            GeneOutputs::Presence { .. } => None,
            GeneOutputs::Columns(mapper) => Some(mapper.resolve_columns(header.as_deref())?),
        };

        let mut records = HashMap::new();
        let mut n_rows = 0;
        while read_trimmed_line(&mut reader, &mut line)? {
            if line.is_empty() {
                continue;
            }
            n_rows += 1;
            let row: Vec<&str> = line.split('\t').collect();
            let Some(symbol) = row.get(key_index).map(|s| s.trim()).filter(|s| !s.is_empty())
            else {
                log::debug!(
                    "{}: row {} has no key column {}, skipping",
                    path.display(),
                    n_rows,
                    key_column
                );
                continue;
            };
            if records.contains_key(symbol) {
                continue;
            }
            let record = match (&columns, outputs) {
                (Some(columns), _) => columns.apply(&row),
                (None, GeneOutputs::Presence { name }) => {
                    let mut record = FieldRecord::new();
                    record.insert(name.clone(), Some(symbol.to_string()));
                    record
                }
                (None, GeneOutputs::Columns(_)) => FieldRecord::new(),
            };
            records.insert(symbol.to_string(), record);
        }

        log::debug!(
            "Loaded {} genes from {} ({} rows)",
            records.len(),
            path.display(),
            n_rows
        );
        Ok(Self {
            path: path.to_path_buf(),
            header,
            columns,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Resolved output columns; `None` for a presence list.
    pub fn columns(&self) -> Option<&ColumnMapper> {
        self.columns.as_ref()
    }

    pub fn get(&self, symbol: &str) -> Option<&FieldRecord> {
        self.records.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
