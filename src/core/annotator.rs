use crate::{
    core::{
        annotator_spec::{AnnotatorSpec, SourceFormat},
        field_map::{ColumnMapper, FieldMapper, FieldRecord},
        filter::filter_status_passes,
        variant::Variant,
    },
    error::VarannoError,
    io::{
        gene_list::{GeneList, GeneOutputs},
        source::{IndexedFile, RowFields, SourceReader, SourceRow, TsvSource, VcfSource},
        vcf_reader::{info_header_id, rename_info_header},
    },
    utils::util::Result,
};
use std::{collections::HashSet, path::Path, sync::Mutex};

/// Fields contributed by one annotator to one variant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Annotation {
    pub fields: FieldRecord,
    /// ID of the matched source row, set only for `copy_id` annotators.
    pub source_id: Option<String>,
}

#[derive(Debug)]
enum OutputMapping {
    Info(FieldMapper),
    Columns(ColumnMapper),
    /// Gene lists carry their fields pre-mapped.
    Genes,
}

/// One configured annotation source, ready for concurrent lookups.
#[derive(Debug)]
pub struct Annotator {
    spec: AnnotatorSpec,
    reader: SourceReader,
    mapping: OutputMapping,
    info_lines: Vec<String>,
    missing_contigs: Mutex<HashSet<String>>,
}

impl Annotator {
    /// Validates `spec`, then opens its source and index.
    pub fn open(spec: AnnotatorSpec) -> Result<Self> {
        spec.validate()?;
        let mapper = spec.field_mapper()?;
        let path = spec.source_path.as_path();
        let options = &spec.options;

        let (reader, mapping, info_lines) = match (spec.format, mapper) {
            (SourceFormat::Vcf, Some(mapper)) => {
                let source = VcfSource::open(path)?;
                let info_lines = vcf_info_lines(&source, &mapper);
                (SourceReader::Vcf(source), OutputMapping::Info(mapper), info_lines)
            }
            (SourceFormat::Tsv, Some(mapper)) => {
                let source = TsvSource::open(
                    path,
                    options.check_ref.then_some(options.ref_column),
                    options.check_alt.then_some(options.alt_column),
                )?;
                let header = if options.use_header {
                    let names = source.file().column_names();
                    if names.is_none() {
                        log::warn!(
                            "{}: use_header is set but the file has no header line",
                            path.display()
                        );
                    }
                    names
                } else {
                    None
                };
                let columns = mapper.resolve_columns(header.as_deref())?;
                let info_lines = column_info_lines(&columns, source.file());
                (SourceReader::Tsv(source), OutputMapping::Columns(columns), info_lines)
            }
            (SourceFormat::GeneList, mapper) => {
                let outputs = match mapper {
                    Some(mapper) => GeneOutputs::Columns(mapper),
                    None => GeneOutputs::Presence {
                        name: spec.name.clone(),
                    },
                };
                let list =
                    GeneList::load(path, options.key_column, options.has_header, &outputs)?;
                let info_lines = gene_info_lines(&list, &outputs);
                (SourceReader::GeneList(list), OutputMapping::Genes, info_lines)
            }
            (format, None) => {
                return Err(crate::config_error!(
                    "Annotator '{}': {} sources need a field mapping",
                    spec.name,
                    format
                ))
            }
        };

        log::info!(
            "Annotator '{}': {} source {}",
            spec.name,
            spec.format,
            path.display()
        );
        Ok(Self {
            spec,
            reader,
            mapping,
            info_lines,
            missing_contigs: Mutex::new(HashSet::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// `##INFO` lines describing every output field.
    pub fn info_lines(&self) -> &[String] {
        &self.info_lines
    }

    /// The annotation for `variant`, or `None` when no source row matches.
    ///
    /// A contig missing from the source is not an error here: it is logged
    /// once and reported as no match.
    pub fn lookup(&self, variant: &Variant) -> Result<Option<Annotation>> {
        match self.spec.format {
            SourceFormat::GeneList => Ok(self.lookup_genes(variant)),
            SourceFormat::Vcf | SourceFormat::Tsv => match self.lookup_position(variant) {
                Err(VarannoError::ChromosomeNotFound { chromosome, path }) => {
                    self.note_missing_contig(&chromosome, &path);
                    Ok(None)
                }
                other => other,
            },
        }
    }

    fn lookup_position(&self, variant: &Variant) -> Result<Option<Annotation>> {
        let query = variant.key();
        let options = &self.spec.options;
        let rule = options.match_rule();

        let mut matched: Option<SourceRow> = None;
        self.reader
            .rows_at(&query.chromosome, query.position, options.add_chr, |row| {
                if options.require_pass
                    && !row.filter.as_deref().map_or(true, filter_status_passes)
                {
                    return true;
                }
                if !query.matches(&row.key, rule) {
                    return true;
                }
                matched = Some(row);
                false
            })?;

        let Some(row) = matched else {
            return Ok(None);
        };
        let fields = match (&self.mapping, &row.fields) {
            (OutputMapping::Info(mapper), RowFields::Info(info)) => mapper.apply_info(info),
            (OutputMapping::Columns(columns), RowFields::Columns(values)) => {
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                columns.apply(&values)
            }
            _ => FieldRecord::new(),
        };
        log::trace!(
            "{}: {} matched {} ({} fields)",
            self.name(),
            query,
            row.key,
            fields.len()
        );
        Ok(Some(Annotation {
            fields,
            source_id: if options.copy_id { row.id } else { None },
        }))
    }

    fn lookup_genes(&self, variant: &Variant) -> Option<Annotation> {
        let genes = variant.info_value(&self.spec.options.gene_field)?;
        let mut fields = FieldRecord::new();
        let mut any_gene = false;
        for gene in genes.split(',').map(str::trim).filter(|g| !g.is_empty()) {
            if let Some(record) = self.reader.gene(gene) {
                any_gene = true;
                fields.extend_missing(record.clone());
            }
        }
        any_gene.then_some(Annotation {
            fields,
            source_id: None,
        })
    }

    fn note_missing_contig(&self, chromosome: &str, path: &Path) {
        if let Ok(mut seen) = self.missing_contigs.lock() {
            if seen.insert(chromosome.to_string()) {
                log::debug!(
                    "Annotator '{}': chromosome {} not found in {}",
                    self.name(),
                    chromosome,
                    path.display()
                );
            }
        }
    }
}

fn info_line(id: &str, number: &str, description: &str) -> String {
    format!(
        "##INFO=<ID={id},Number={number},Type=String,Description=\"{}\">",
        description.replace('"', "'")
    )
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn vcf_info_lines(source: &VcfSource, mapper: &FieldMapper) -> Vec<String> {
    mapper
        .entries()
        .iter()
        .map(|entry| {
            source
                .info_header_lines()
                .find(|line| info_header_id(line) == Some(entry.source.as_str()))
                .and_then(|line| rename_info_header(line, &entry.output))
                .unwrap_or_else(|| {
                    info_line(
                        &entry.output,
                        ".",
                        &format!(
                            "{} from {}",
                            entry.source,
                            file_label(source.file().path())
                        ),
                    )
                })
        })
        .collect()
}

fn column_description(
    header: Option<&str>,
    column: usize,
    path: &Path,
    capitalize: bool,
) -> String {
    let label = file_label(path);
    match header {
        Some(name) => format!("{name}, column {} from {label}", column + 1),
        None if capitalize => format!("Column {} from {label}", column + 1),
        None => format!("column {} from {label}", column + 1),
    }
}

fn column_info_lines(columns: &ColumnMapper, file: &IndexedFile) -> Vec<String> {
    columns
        .entries()
        .iter()
        .map(|entry| {
            let description = entry.description.clone().unwrap_or_else(|| {
                column_description(entry.header.as_deref(), entry.column, file.path(), true)
            });
            info_line(&entry.output, "1", &description)
        })
        .collect()
}

fn gene_info_lines(list: &GeneList, outputs: &GeneOutputs) -> Vec<String> {
    match (outputs, list.columns()) {
        (GeneOutputs::Presence { name }, _) => vec![info_line(
            name,
            "1",
            &format!("Gene present in the file {}", file_label(list.path())),
        )],
        (GeneOutputs::Columns(_), Some(columns)) => columns
            .entries()
            .iter()
            .map(|entry| {
                let description = entry.description.clone().unwrap_or_else(|| {
                    column_description(entry.header.as_deref(), entry.column, list.path(), false)
                });
                info_line(&entry.output, "1", &description)
            })
            .collect(),
        (GeneOutputs::Columns(_), None) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::source::tests::{tsv_conf, vcf_conf, write_indexed};
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SOURCE_VCF: &str = "##fileformat=VCFv4.2\n\
##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele frequency\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t998\t.\tACGTA\tA\t.\tPASS\tAF=0.5\n\
chr1\t1000\t.\tA\tT\t.\tFAIL\tAF=0.2\n\
chr1\t1000\trs10\tA\tG\t.\tPASS\tAF=0.03\n\
chr1\t1000\trs11\tA\tG\t.\tPASS\tAF=0.04\n";

    fn source(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("source.vcf.gz");
        write_indexed(&path, SOURCE_VCF, vcf_conf());
        path
    }

    #[test]
    fn test_lookup_matches_alleles_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let annotator = Annotator::open(AnnotatorSpec::vcf(source(&dir), "AF=TGAF")).unwrap();

        let hit = annotator
            .lookup(&Variant::new("chr1", 1000, "A", "G"))
            .unwrap()
            .unwrap();
        assert_eq!(hit.fields.get("TGAF"), Some("0.03"));
        assert_eq!(hit.source_id, None);

        assert!(annotator
            .lookup(&Variant::new("chr1", 1000, "A", "C"))
            .unwrap()
            .is_none());
        assert!(annotator
            .lookup(&Variant::new("chr1", 1001, "C", "A"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_spanning_record_is_not_a_positional_match() {
        let dir = tempfile::tempdir().unwrap();
        let spec = AnnotatorSpec::vcf(source(&dir), "AF").ignore_alleles();
        let annotator = Annotator::open(spec).unwrap();
        assert!(annotator
            .lookup(&Variant::new("chr1", 999, "C", "G"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_position_only_takes_first_row_and_require_pass_skips_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = source(&dir);
        let variant = Variant::new("chr1", 1000, "A", "C");

        let loose = Annotator::open(AnnotatorSpec::vcf(&path, "AF").ignore_alleles()).unwrap();
        let hit = loose.lookup(&variant).unwrap().unwrap();
        assert_eq!(hit.fields.get("AF"), Some("0.2"));

        let strict = Annotator::open(
            AnnotatorSpec::vcf(&path, "AF")
                .ignore_alleles()
                .require_pass(true),
        )
        .unwrap();
        let hit = strict.lookup(&variant).unwrap().unwrap();
        assert_eq!(hit.fields.get("AF"), Some("0.03"));
    }

    #[test]
    fn test_copy_id_and_missing_contig() {
        let dir = tempfile::tempdir().unwrap();
        let annotator =
            Annotator::open(AnnotatorSpec::vcf(source(&dir), "AF").copy_id(true)).unwrap();
        let hit = annotator
            .lookup(&Variant::new("1", 1000, "A", "G"))
            .unwrap()
            .unwrap();
        assert_eq!(hit.source_id.as_deref(), Some("rs10"));

        assert!(annotator
            .lookup(&Variant::new("chrUn", 1000, "A", "G"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_vcf_info_lines_copy_source_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let annotator =
            Annotator::open(AnnotatorSpec::vcf(source(&dir), "AF=TGAF,DP=SRCDP")).unwrap();
        assert_eq!(
            annotator.info_lines(),
            [
                "##INFO=<ID=TGAF,Number=A,Type=Float,Description=\"Allele frequency\">",
                "##INFO=<ID=SRCDP,Number=.,Type=String,Description=\"DP from source.vcf.gz\">"
            ]
        );
    }

    #[test]
    fn test_tsv_lookup_with_header_and_allele_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.tsv.gz");
        let text = "#chr\tpos\tref\talt\tSIFT_score\tpred\n\
1\t1000\tA\tG\t0.9\t.\n\
1\t1000\tA\tT\t0.1\tD\n";
        write_indexed(&path, text, tsv_conf());

        let spec = AnnotatorSpec::tsv(&path, "SIFT_score=SIFT,6")
            .use_header(true)
            .check_ref(3)
            .check_alt(4);
        let annotator = Annotator::open(spec).unwrap();

        let hit = annotator
            .lookup(&Variant::new("chr1", 1000, "A", "T"))
            .unwrap()
            .unwrap();
        assert_eq!(hit.fields.get("SIFT"), Some("0.1"));
        assert_eq!(hit.fields.get("col6"), Some("D"));

        let hit = annotator
            .lookup(&Variant::new("chr1", 1000, "A", "G"))
            .unwrap()
            .unwrap();
        assert_eq!(hit.fields.get("col6"), None);

        assert_eq!(
            annotator.info_lines()[0],
            "##INFO=<ID=SIFT,Number=1,Type=String,Description=\"SIFT_score, column 5 from scores.tsv.gz\">"
        );
    }

    #[test]
    fn test_gene_list_lookup_merges_listed_genes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("omimgenes");
        std::fs::write(&path, "BRCA1\nTP53\n").unwrap();
        let annotator = Annotator::open(AnnotatorSpec::gene_list("in_omim", &path)).unwrap();

        let variant = Variant::new("1", 5, "A", "C").with(|v| {
            v.set_info("Gene_name", Some("KRAS,TP53,BRCA1".to_string()));
        });
        let hit = annotator.lookup(&variant).unwrap().unwrap();
        assert_eq!(hit.fields.get("in_omim"), Some("TP53"));

        let no_gene = Variant::new("1", 5, "A", "C");
        assert!(annotator.lookup(&no_gene).unwrap().is_none());
        assert_eq!(
            annotator.info_lines(),
            ["##INFO=<ID=in_omim,Number=1,Type=String,Description=\"Gene present in the file omimgenes\">"]
        );
    }
}
