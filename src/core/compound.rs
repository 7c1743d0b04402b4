//! Compound-heterozygous grouping of consecutive records within a gene.

use crate::core::{
    pedigree::{diploid_alleles, Trio},
    variant::Variant,
};

pub const COMPOUND_TAG: &str = "COMPOUND";
pub const INDEX_TAG: &str = "Index";
pub const PARTNERS_TAG: &str = "MendHetRec";

fn is_alt(allele: Option<u32>) -> bool {
    matches!(allele, Some(allele) if allele > 0)
}

fn has_ref_or_missing(call: [Option<u32>; 2]) -> bool {
    call.iter().any(|allele| !is_alt(*allele))
}

fn push_once(indices: &mut Vec<usize>, index: usize) {
    if indices.last() != Some(&index) {
        indices.push(index);
    }
}

/// Groups consecutive output records by gene and flags genes where the
/// trio's child carries at least one alternate allele absent from the father
/// and at least one absent from the mother.
///
/// Every record is numbered with `Index` in output order. Flagged records get
/// `COMPOUND` and a `MendHetRec` list of the partner indices inherited from
/// the other parent. Records without a gene form their own group.
#[derive(Debug)]
pub struct CompoundHetGrouper {
    trio: Trio,
    gene_field: String,
    next_index: usize,
    group_gene: Option<String>,
    group: Vec<Variant>,
    n_flagged: usize,
}

impl CompoundHetGrouper {
    pub fn new(trio: Trio, gene_field: impl Into<String>) -> Self {
        Self {
            trio,
            gene_field: gene_field.into(),
            next_index: 0,
            group_gene: None,
            group: Vec::new(),
            n_flagged: 0,
        }
    }

    pub fn n_flagged(&self) -> usize {
        self.n_flagged
    }

    fn gene_of(&self, variant: &Variant) -> Option<String> {
        variant
            .info_value(&self.gene_field)
            .filter(|gene| !gene.is_empty())
            .map(str::to_string)
    }

    /// Adds `variant` and returns the records of any group it completes.
    pub fn push(&mut self, variant: Variant) -> Vec<Variant> {
        let gene = self.gene_of(&variant);
        let continues_group = gene.is_some() && gene == self.group_gene;
        let completed = if continues_group || self.group.is_empty() {
            Vec::new()
        } else {
            self.flush()
        };
        self.group_gene = gene;
        self.group.push(variant);
        completed
    }

    /// Releases the last open group.
    pub fn finish(&mut self) -> Vec<Variant> {
        self.flush()
    }

    fn call(&self, variant: &Variant, sample: usize) -> [Option<u32>; 2] {
        variant
            .samples
            .get(sample + 1)
            .map(|call| diploid_alleles(call))
            .unwrap_or([None, None])
    }

    fn flush(&mut self) -> Vec<Variant> {
        let mut group = std::mem::take(&mut self.group);
        self.group_gene = None;

        // Indices of records carrying an alt allele not seen in each parent.
        let mut non_paternal = Vec::new();
        let mut non_maternal = Vec::new();
        for variant in group.iter_mut() {
            let index = self.next_index;
            self.next_index += 1;
            variant.set_info(INDEX_TAG, Some(index.to_string()));

            let child = self.call(variant, self.trio.child);
            if !child.iter().any(|allele| is_alt(*allele)) {
                continue;
            }
            let father = self.call(variant, self.trio.father);
            let mother = self.call(variant, self.trio.mother);
            if child.iter().all(|allele| is_alt(*allele))
                && has_ref_or_missing(father)
                && has_ref_or_missing(mother)
            {
                push_once(&mut non_paternal, index);
                push_once(&mut non_maternal, index);
                continue;
            }
            for allele in child.into_iter().filter(|allele| is_alt(*allele)) {
                if !father.contains(&allele) {
                    push_once(&mut non_paternal, index);
                }
                if !mother.contains(&allele) {
                    push_once(&mut non_maternal, index);
                }
            }
        }

        if !non_paternal.is_empty() && !non_maternal.is_empty() {
            let base = self.next_index - group.len();
            let join = |indices: &[usize]| {
                indices
                    .iter()
                    .map(usize::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            };
            let (paternal_partners, maternal_partners) = (join(&non_maternal), join(&non_paternal));
            for &index in &non_paternal {
                let variant = &mut group[index - base];
                variant.set_info(COMPOUND_TAG, None);
                variant.set_info(PARTNERS_TAG, Some(paternal_partners.clone()));
            }
            for &index in &non_maternal {
                let variant = &mut group[index - base];
                variant.set_info(COMPOUND_TAG, None);
                variant.set_info(PARTNERS_TAG, Some(maternal_partners.clone()));
            }
            let mut flagged = non_paternal.clone();
            flagged.extend(&non_maternal);
            flagged.sort_unstable();
            flagged.dedup();
            self.n_flagged += flagged.len();
        }
        group
    }

    pub fn info_lines() -> Vec<String> {
        vec![
            format!("##INFO=<ID={COMPOUND_TAG},Number=0,Type=Flag,Description=\"Within this gene there is at least one variant not inherited from each parent.\">"),
            format!("##INFO=<ID={INDEX_TAG},Number=1,Type=Integer,Description=\"Index of the variant within this file (used to refer between variants).\">"),
            format!("##INFO=<ID={PARTNERS_TAG},Number=.,Type=Integer,Description=\"Comma-separated list of indices participating in compound recessive grouping.\">"),
        ]
    }
}
