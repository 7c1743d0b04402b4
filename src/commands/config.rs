//! JSON annotation configuration.

use crate::{
    core::annotator_spec::{AnnotatorSpec, SourceFormat},
    utils::util::Result,
};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
    Vcf,
    Tsv,
    GeneList,
}

impl From<ConfigFormat> for SourceFormat {
    fn from(format: ConfigFormat) -> Self {
        match format {
            ConfigFormat::Vcf => SourceFormat::Vcf,
            ConfigFormat::Tsv => SourceFormat::Tsv,
            ConfigFormat::GeneList => SourceFormat::GeneList,
        }
    }
}

/// One entry of the `annotators` array.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AnnotatorConfig {
    pub format: ConfigFormat,
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Option<String>,
    #[serde(default)]
    pub add_chr: bool,
    #[serde(default)]
    pub require_pass: bool,
    #[serde(default)]
    pub copy_id: bool,
    /// VCF sources only; `false` matches on position alone.
    #[serde(default)]
    pub match_alleles: Option<bool>,
    #[serde(default)]
    pub check_ref: Option<usize>,
    #[serde(default)]
    pub check_alt: Option<usize>,
    #[serde(default)]
    pub has_header: bool,
    #[serde(default)]
    pub use_header: bool,
    #[serde(default)]
    pub key_column: Option<usize>,
    #[serde(default)]
    pub output_columns: Option<String>,
    #[serde(default)]
    pub gene_field: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AnnotationConfig {
    /// Run the SnpEff splitter before the annotators.
    #[serde(default)]
    pub split_effects: bool,
    pub annotators: Vec<AnnotatorConfig>,
}

impl AnnotationConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            crate::config_error!("Failed to read configuration {}: {}", path.display(), e)
        })?;
        Self::from_json(&text)
            .map_err(|e| crate::config_error!("{}: {}", path.display(), e))
    }

    pub fn from_json(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Annotator specs in declared order, with relative source paths
    /// resolved against `base_dir` first and the working directory second.
    pub fn annotator_specs(&self, base_dir: &Path) -> Result<Vec<AnnotatorSpec>> {
        if self.annotators.is_empty() {
            log::warn!("Configuration declares no annotators");
        }
        self.annotators
            .iter()
            .map(|entry| entry.to_spec(base_dir))
            .collect()
    }
}

fn resolve_source_path(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let relative_to_config = base_dir.join(path);
    if relative_to_config.exists() {
        relative_to_config
    } else {
        path.to_path_buf()
    }
}

impl AnnotatorConfig {
    pub fn to_spec(&self, base_dir: &Path) -> Result<AnnotatorSpec> {
        let path = resolve_source_path(&self.path, base_dir);
        let fields = self.fields.clone().unwrap_or_default();
        let mut spec = match SourceFormat::from(self.format) {
            SourceFormat::Vcf => AnnotatorSpec::vcf(path, fields),
            SourceFormat::Tsv => AnnotatorSpec::tsv(path, fields),
            SourceFormat::GeneList => {
                let name = self.name.clone().ok_or_else(|| {
                    crate::config_error!("gene_list annotator {} needs a name", self.path.display())
                })?;
                let mut spec = AnnotatorSpec::gene_list(name, path);
                if let Some(columns) = self.output_columns.as_ref().or(self.fields.as_ref()) {
                    spec = spec.output_columns(columns.clone());
                }
                spec
            }
        };
        if let Some(name) = &self.name {
            spec = spec.name(name.clone());
        }
        spec = spec
            .add_chr(self.add_chr)
            .require_pass(self.require_pass)
            .copy_id(self.copy_id)
            .has_header(self.has_header)
            .use_header(self.use_header);
        if self.match_alleles == Some(false) {
            spec = spec.ignore_alleles();
        }
        if let Some(column) = self.check_ref {
            spec = spec.check_ref(column);
        }
        if let Some(column) = self.check_alt {
            spec = spec.check_alt(column);
        }
        if let Some(column) = self.key_column {
            spec = spec.key_column(column);
        }
        if let Some(field) = &self.gene_field {
            spec = spec.gene_field(field.clone());
        }
        Ok(spec)
    }
}
