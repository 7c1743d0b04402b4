use crate::{
    constants::{DEFAULT_GENE_FIELD, DEFAULT_KEY_COLUMN, VCF_ALT_COLUMN, VCF_REF_COLUMN},
    core::{coordinate::MatchRule, field_map::FieldMapper},
    error::VarannoError,
    utils::util::Result,
};
use std::{
    fmt,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Vcf,
    Tsv,
    GeneList,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceFormat::Vcf => "vcf",
            SourceFormat::Tsv => "tsv",
            SourceFormat::GeneList => "gene_list",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatorOptions {
    /// Only rows whose FILTER is `PASS` or `.` may match.
    pub require_pass: bool,
    /// Prefix `chr` to query contigs that lack it.
    pub add_chr: bool,
    /// Carry the source ID into variants with an empty ID.
    pub copy_id: bool,
    pub check_ref: bool,
    pub check_alt: bool,
    /// 1-based allele columns of positional sources.
    pub ref_column: usize,
    pub alt_column: usize,
    pub has_header: bool,
    pub use_header: bool,
    /// 1-based key column of gene lists.
    pub key_column: usize,
    /// Variant INFO field holding gene symbols.
    pub gene_field: String,
}

impl AnnotatorOptions {
    fn for_format(format: SourceFormat) -> Self {
        let alleles = format == SourceFormat::Vcf;
        Self {
            require_pass: false,
            add_chr: false,
            copy_id: false,
            check_ref: alleles,
            check_alt: alleles,
            ref_column: VCF_REF_COLUMN,
            alt_column: VCF_ALT_COLUMN,
            has_header: false,
            use_header: false,
            key_column: DEFAULT_KEY_COLUMN,
            gene_field: DEFAULT_GENE_FIELD.to_string(),
        }
    }

    pub fn match_rule(&self) -> MatchRule {
        MatchRule {
            check_ref: self.check_ref,
            check_alt: self.check_alt,
        }
    }
}

/// Declarative description of one annotator, validated before any source is opened.
///
/// ```
/// use varanno::core::annotator_spec::AnnotatorSpec;
///
/// let spec = AnnotatorSpec::vcf("cg54.vcf.gz", "AF=CG54AF")
///     .add_chr(true)
///     .require_pass(true);
/// assert!(spec.options.add_chr);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatorSpec {
    pub name: String,
    pub source_path: PathBuf,
    pub format: SourceFormat,
    /// Field mapping (`key1,key2,src=OUT`); optional for gene lists.
    pub fields: Option<String>,
    pub options: AnnotatorOptions,
}

impl AnnotatorSpec {
    fn new(format: SourceFormat, path: impl Into<PathBuf>, fields: Option<String>) -> Self {
        let source_path = path.into();
        let name = default_name(&source_path);
        Self {
            name,
            source_path,
            format,
            fields,
            options: AnnotatorOptions::for_format(format),
        }
    }

    pub fn vcf(path: impl Into<PathBuf>, fields: impl Into<String>) -> Self {
        Self::new(SourceFormat::Vcf, path, Some(fields.into()))
    }

    pub fn tsv(path: impl Into<PathBuf>, fields: impl Into<String>) -> Self {
        Self::new(SourceFormat::Tsv, path, Some(fields.into()))
    }

    pub fn gene_list(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(SourceFormat::GeneList, path, None).name(name)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn require_pass(mut self, require_pass: bool) -> Self {
        self.options.require_pass = require_pass;
        self
    }

    pub fn add_chr(mut self, add_chr: bool) -> Self {
        self.options.add_chr = add_chr;
        self
    }

    pub fn copy_id(mut self, copy_id: bool) -> Self {
        self.options.copy_id = copy_id;
        self
    }

    /// Require REF to match, read from the 1-based `column` for TSV sources.
    pub fn check_ref(mut self, column: usize) -> Self {
        self.options.check_ref = true;
        self.options.ref_column = column;
        self
    }

    /// Require ALT to match, read from the 1-based `column` for TSV sources.
    pub fn check_alt(mut self, column: usize) -> Self {
        self.options.check_alt = true;
        self.options.alt_column = column;
        self
    }

    /// Match on position alone.
    pub fn ignore_alleles(mut self) -> Self {
        self.options.check_ref = false;
        self.options.check_alt = false;
        self
    }

    pub fn has_header(mut self, has_header: bool) -> Self {
        self.options.has_header = has_header;
        self
    }

    pub fn use_header(mut self, use_header: bool) -> Self {
        self.options.use_header = use_header;
        self
    }

    pub fn key_column(mut self, column: usize) -> Self {
        self.options.key_column = column;
        self
    }

    /// Gene-list output columns, `COL=OUT,...` with 1-based columns.
    pub fn output_columns(mut self, columns: impl Into<String>) -> Self {
        self.fields = Some(columns.into());
        self
    }

    pub fn gene_field(mut self, field: impl Into<String>) -> Self {
        self.options.gene_field = field.into();
        self
    }

    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = path.into();
        self
    }

    /// Parsed field mapping; `None` only for gene lists without output columns.
    pub fn field_mapper(&self) -> Result<Option<FieldMapper>> {
        match (&self.fields, self.format) {
            (Some(fields), _) => FieldMapper::parse(fields).map(Some).map_err(|e| match e {
                VarannoError::Config { message } => {
                    crate::config_error!("Annotator '{}': {}", self.name, message)
                }
                other => other,
            }),
            (None, SourceFormat::GeneList) => Ok(None),
            (None, format) => Err(crate::config_error!(
                "Annotator '{}': {} sources need a field mapping",
                self.name,
                format
            )),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::config_error!(
                "Annotator for {} has an empty name",
                self.source_path.display()
            ));
        }
        self.field_mapper()?;
        let options = &self.options;
        if self.format == SourceFormat::Tsv
            && ((options.check_ref && options.ref_column == 0)
                || (options.check_alt && options.alt_column == 0))
        {
            return Err(crate::config_error!(
                "Annotator '{}': allele columns are 1-based",
                self.name
            ));
        }
        if self.format == SourceFormat::GeneList {
            if options.key_column == 0 {
                return Err(crate::config_error!(
                    "Annotator '{}': key column is 1-based",
                    self.name
                ));
            }
            if options.gene_field.is_empty() {
                return Err(crate::config_error!(
                    "Annotator '{}': gene field is empty",
                    self.name
                ));
            }
        }
        if !self.source_path.is_file() {
            return Err(crate::config_error!(
                "Annotator '{}': source file {} not found",
                self.name,
                self.source_path.display()
            ));
        }
        Ok(())
    }
}

fn default_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vcf_defaults_check_alleles() {
        let spec = AnnotatorSpec::vcf("/data/ALL.sites.vcf.gz", "AMR_AF,AF=TGAF");
        assert_eq!(spec.name, "ALL.sites.vcf.gz");
        assert_eq!(spec.options.match_rule(), MatchRule::ALLELES);
        assert!(!spec.options.require_pass);
        let spec = spec.ignore_alleles();
        assert_eq!(spec.options.match_rule(), MatchRule::POSITION_ONLY);
    }

    #[test]
    fn test_tsv_checks_only_configured_columns() {
        let spec = AnnotatorSpec::tsv("dbNSFP.gz", "22=SIFT");
        assert_eq!(spec.options.match_rule(), MatchRule::POSITION_ONLY);
        let spec = spec.check_ref(3).check_alt(4);
        assert_eq!(spec.options.match_rule(), MatchRule::ALLELES);
        assert_eq!((spec.options.ref_column, spec.options.alt_column), (3, 4));
    }

    #[test]
    fn test_gene_list_builder() {
        let spec = AnnotatorSpec::gene_list("hgnc", "hgnc.txt")
            .has_header(true)
            .key_column(2)
            .output_columns("3=HGNC_NAME");
        assert_eq!(spec.name, "hgnc");
        assert_eq!(spec.options.gene_field, "Gene_name");
        assert_eq!(spec.field_mapper().unwrap().unwrap().entries().len(), 1);
        assert!(AnnotatorSpec::gene_list("omim", "omimgenes")
            .field_mapper()
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_validate_rejects_bad_specs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.vcf.gz");
        std::fs::write(&path, b"").unwrap();

        assert!(AnnotatorSpec::vcf(&path, "AF").validate().is_ok());
        let cases = [
            AnnotatorSpec::vcf(&path, "AF,,DP"),
            AnnotatorSpec::vcf(&path, "AF").name(" "),
            AnnotatorSpec::tsv(&path, "5").check_ref(0),
            AnnotatorSpec::gene_list("g", &path).key_column(0),
            AnnotatorSpec::vcf(dir.path().join("absent.vcf.gz"), "AF"),
        ];
        for spec in cases {
            let err = spec.validate().unwrap_err();
            assert!(matches!(err, VarannoError::Config { .. }), "{err}");
        }
    }
}
