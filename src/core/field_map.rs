use crate::{constants::MISSING_VALUE, core::variant::InfoMap, utils::util::Result};

/// Fields produced by one matched source row, in mapping order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldRecord(InfoMap);

impl FieldRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` unless an earlier mapping already produced it.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.0.entry(key.into()).or_insert(value);
    }

    /// `None` when absent, `Some("")` for a flag.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|value| value.as_deref().unwrap_or(""))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<String>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds every field of `other` not already present here.
    pub fn extend_missing(&mut self, other: FieldRecord) {
        for (key, value) in other.0 {
            self.0.entry(key).or_insert(value);
        }
    }
}

impl IntoIterator for FieldRecord {
    type Item = (String, Option<String>);
    type IntoIter = indexmap::map::IntoIter<String, Option<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: String,
    pub output: String,
}

/// Ordered `source -> output` pairs parsed from a `key1,key2,src=OUT` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapper {
    entries: Vec<FieldMapping>,
}

impl FieldMapper {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(crate::config_error!("Field mapping is empty"));
        }

        let mut entries = Vec::new();
        for token in spec.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(crate::config_error!(
                    "Empty token in field mapping '{}'",
                    spec
                ));
            }
            let (source, output) = match token.split_once('=') {
                Some((source, output)) => (source.trim(), output.trim()),
                None => (token, token),
            };
            if source.is_empty() || output.is_empty() {
                return Err(crate::config_error!(
                    "Token '{}' in field mapping '{}' must be FIELD or SRC=OUT",
                    token,
                    spec
                ));
            }
            entries.push(FieldMapping {
                source: source.to_string(),
                output: output.to_string(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[FieldMapping] {
        &self.entries
    }

    /// Copies the mapped keys present in `info`; absent keys are skipped.
    pub fn apply_info(&self, info: &InfoMap) -> FieldRecord {
        let mut record = FieldRecord::new();
        for entry in &self.entries {
            if let Some(value) = info.get(&entry.source) {
                record.insert(entry.output.clone(), value.clone());
            }
        }
        record
    }

    /// Resolves the sources to column indices for delimited files.
    ///
    /// With a header, a source naming a header column resolves to it and is
    /// output under that name when the token was bare. Otherwise the source
    /// must be a 1-based column number, and a bare number `N` is output as `colN`.
    /// An output written `OUT:text` carries `text` as its header description.
    pub fn resolve_columns(&self, header: Option<&[String]>) -> Result<ColumnMapper> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let bare = entry.source == entry.output;
            let by_name = header.and_then(|names| {
                names
                    .iter()
                    .position(|name| name == &entry.source)
                    .map(|index| (index, names[index].clone()))
            });

            let (output, description) = match entry.output.split_once(':') {
                Some((output, description)) if !bare => {
                    (output.to_string(), Some(description.to_string()))
                }
                _ => (entry.output.clone(), None),
            };

            let mapping = match by_name {
                Some((column, name)) => ColumnMapping {
                    column,
                    output,
                    header: Some(name),
                    description,
                },
                None => {
                    let number: usize = entry.source.parse().map_err(|_| {
                        crate::config_error!(
                            "Column '{}' is neither a header name nor a 1-based column number",
                            entry.source
                        )
                    })?;
                    if number == 0 {
                        return Err(crate::config_error!(
                            "Column numbers are 1-based, found 0 in mapping for '{}'",
                            entry.output
                        ));
                    }
                    let column = number - 1;
                    ColumnMapping {
                        column,
                        output: if bare { format!("col{number}") } else { output },
                        header: header.and_then(|names| names.get(column).cloned()),
                        description,
                    }
                }
            };
            entries.push(mapping);
        }
        Ok(ColumnMapper { entries })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// 0-based column index.
    pub column: usize,
    pub output: String,
    pub header: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapper {
    entries: Vec<ColumnMapping>,
}

impl ColumnMapper {
    pub fn entries(&self) -> &[ColumnMapping] {
        &self.entries
    }

    pub fn max_column(&self) -> Option<usize> {
        self.entries.iter().map(|entry| entry.column).max()
    }

    /// Copies the mapped columns of one row. Columns that are missing, empty
    /// or `.` produce no field.
    pub fn apply(&self, columns: &[&str]) -> FieldRecord {
        let mut record = FieldRecord::new();
        for entry in &self.entries {
            match columns.get(entry.column) {
                Some(value) if !value.is_empty() && *value != MISSING_VALUE => {
                    record.insert(entry.output.clone(), Some(value.to_string()));
                }
                _ => {}
            }
        }
        record
    }
}
