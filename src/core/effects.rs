//! Variant-stream transforms that run before annotation.

use crate::{constants::DEFAULT_GENE_FIELD, core::variant::Variant};
use std::cmp::Ordering;

pub trait VariantTransform: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, variant: &mut Variant);

    /// `##INFO` lines for the fields this transform writes.
    fn info_lines(&self) -> Vec<String>;
}

pub const SNPEFF_INFO_TAG: &str = "EFF";
const SNPEFF_FIELD_DELIMITER: char = '|';
const SNPEFF_FIELD_COUNT: usize = 11;
const IMPACT_FIELD: usize = 0;
const GENE_NAME_FIELD: usize = 5;

/// SnpEff effect names, most severe first.
const EFFECT_ORDER: &[&str] = &[
    // HIGH
    "SPLICE_SITE_ACCEPTOR",
    "SPLICE_SITE_DONOR",
    "START_LOST",
    "EXON_DELETED",
    "FRAME_SHIFT",
    "STOP_GAINED",
    "STOP_LOST",
    "RARE_AMINO_ACID",
    "CHROMOSOME_LARGE_DELETION",
    // MODERATE
    "NON_SYNONYMOUS_CODING",
    "CODON_CHANGE",
    "CODON_INSERTION",
    "CODON_CHANGE_PLUS_CODON_INSERTION",
    "CODON_DELETION",
    "CODON_CHANGE_PLUS_CODON_DELETION",
    "SPLICE_SITE_BRANCH_U12",
    "UTR_5_DELETED",
    "UTR_3_DELETED",
    // LOW
    "SYNONYMOUS_START",
    "NON_SYNONYMOUS_START",
    "START_GAINED",
    "SYNONYMOUS_CODING",
    "SYNONYMOUS_STOP",
    "NON_SYNONYMOUS_STOP",
    "SPLICE_SITE_BRANCH",
    "SPLICE_SITE_REGION",
    // MODIFIER
    "UTR_5_PRIME",
    "UTR_3_PRIME",
    "REGULATION",
    "UPSTREAM",
    "DOWNSTREAM",
    "GENE",
    "TRANSCRIPT",
    "EXON",
    "INTRON_CONSERVED",
    "INTRON",
    "INTRAGENIC",
    "INTERGENIC",
    "INTERGENIC_CONSERVED",
    "NONE",
    "CHROMOSOME",
    "CUSTOM",
    "CDS",
];

fn effect_rank(effect: &str) -> usize {
    EFFECT_ORDER
        .iter()
        .position(|known| *known == effect)
        .unwrap_or(EFFECT_ORDER.len())
}

/// One `Effect(field|field|...)` entry of an `EFF` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnpEffEntry {
    pub effect: String,
    /// Always `SNPEFF_FIELD_COUNT` long; absent trailing fields are empty.
    pub fields: Vec<String>,
}

impl SnpEffEntry {
    pub fn parse(encoded: &str) -> Option<Self> {
        let open = encoded.find('(')?;
        let body = encoded[open + 1..].strip_suffix(')')?;
        let effect = encoded[..open].trim();
        if effect.is_empty() {
            return None;
        }
        let mut fields: Vec<String> = body
            .splitn(SNPEFF_FIELD_COUNT, SNPEFF_FIELD_DELIMITER)
            .map(str::to_string)
            .collect();
        fields.resize(SNPEFF_FIELD_COUNT, String::new());
        Some(Self {
            effect: effect.to_string(),
            fields,
        })
    }

    pub fn impact(&self) -> &str {
        &self.fields[IMPACT_FIELD]
    }

    pub fn gene_name(&self) -> &str {
        &self.fields[GENE_NAME_FIELD]
    }

    fn severity_cmp(&self, other: &Self) -> Ordering {
        effect_rank(&self.effect)
            .cmp(&effect_rank(&other.effect))
            .then_with(|| self.fields.cmp(&other.fields))
    }
}

/// Picks the most severe SnpEff effect of each variant and exposes it as
/// `EFFECT`, `Gene_name` and `IMPACT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnpEffSplitter;

impl SnpEffSplitter {
    pub fn most_severe(value: &str) -> Option<SnpEffEntry> {
        value
            .split(',')
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let parsed = SnpEffEntry::parse(entry);
                if parsed.is_none() {
                    log::warn!("Skipping malformed {} entry '{}'", SNPEFF_INFO_TAG, entry);
                }
                parsed
            })
            .min_by(|a, b| a.severity_cmp(b))
    }
}

impl VariantTransform for SnpEffSplitter {
    fn name(&self) -> &str {
        "SnpEffSplitter"
    }

    fn transform(&self, variant: &mut Variant) {
        let Some(entry) = variant
            .info_value(SNPEFF_INFO_TAG)
            .and_then(SnpEffSplitter::most_severe)
        else {
            return;
        };
        variant.set_info("EFFECT", Some(entry.effect.clone()));
        variant.set_info(DEFAULT_GENE_FIELD, Some(entry.gene_name().to_string()));
        variant.set_info("IMPACT", Some(entry.impact().to_string()));
    }

    fn info_lines(&self) -> Vec<String> {
        [
            ("EFFECT", "Effect type of the change (from SnpEff)"),
            (DEFAULT_GENE_FIELD, "Name of affected gene (from SnpEff)"),
            ("IMPACT", "Impact of change (HIGH|MODERATE|LOW|MODIFIER)"),
        ]
        .iter()
        .map(|(id, description)| {
            format!("##INFO=<ID={id},Number=.,Type=String,Description=\"{description}\">")
        })
        .collect()
    }
}
