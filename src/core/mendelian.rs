//! Mendelian-constraint likelihood ratios for parent-child trios.

use crate::{
    core::{
        effects::VariantTransform,
        pedigree::{genotype_likelihoods, Trio},
        variant::Variant,
    },
    utils::util::format_significant,
};

const MISSING_LIKELIHOODS_TAG: &str = "NOPL";

/// Zero-based alleles `(j, k)`, `j <= k`, of the genotype at `index` in the
/// VCF `GL`/`PL` ordering `AA, AB, BB, AC, BC, CC, ...`.
pub fn genotype_alleles(index: usize) -> (usize, usize) {
    let mut k = (((8.0 * index as f64 + 1.0).sqrt() - 1.0) / 2.0) as usize;
    while (k + 1) * (k + 2) / 2 <= index {
        k += 1;
    }
    while k * (k + 1) / 2 > index {
        k -= 1;
    }
    (index - k * (k + 1) / 2, k)
}

fn allele_mask(index: usize) -> Option<u64> {
    let (j, k) = genotype_alleles(index);
    Some(1u64.checked_shl(j as u32)? | 1u64.checked_shl(k as u32)?)
}

fn format_genotypes(indices: [usize; 3]) -> String {
    indices
        .iter()
        .map(|&index| {
            let (j, k) = genotype_alleles(index);
            format!("{j}/{k}")
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// log10 of the summed probabilities of `log_likelihoods`.
fn log_sum_of_logs(log_likelihoods: &[f64]) -> f64 {
    if let [single] = log_likelihoods {
        return *single;
    }
    let max = log_likelihoods
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    let sum: f64 = log_likelihoods
        .iter()
        .filter(|p| **p != f64::NEG_INFINITY)
        .map(|p| 10f64.powf(p - max))
        .sum();
    max + sum.log10()
}

/// Best joint genotypes of one trio, split by whether the child's alleles can
/// be inherited one from each parent.
#[derive(Debug, Clone, PartialEq)]
pub struct TrioLikelihoods {
    pub max_constrained: f64,
    pub best_constrained: [usize; 3],
    pub max_unconstrained: f64,
    pub best_unconstrained: [usize; 3],
    pub constrained: Vec<f64>,
    pub unconstrained: Vec<f64>,
}

impl TrioLikelihoods {
    /// Enumerates every child, father, mother genotype combination. `None`
    /// when a genotype index is beyond the supported allele count.
    pub fn compute(child: &[f64], father: &[f64], mother: &[f64]) -> Option<Self> {
        let masks = |likelihoods: &[f64]| -> Option<Vec<u64>> {
            (0..likelihoods.len()).map(allele_mask).collect()
        };
        let (child_masks, father_masks, mother_masks) =
            (masks(child)?, masks(father)?, masks(mother)?);

        let mut result = Self {
            max_constrained: f64::NEG_INFINITY,
            best_constrained: [0; 3],
            max_unconstrained: f64::NEG_INFINITY,
            best_unconstrained: [0; 3],
            constrained: Vec::new(),
            unconstrained: Vec::new(),
        };
        for (c, &ca) in child_masks.iter().enumerate() {
            for (f, &fa) in father_masks.iter().enumerate() {
                for (m, &ma) in mother_masks.iter().enumerate() {
                    let sum = child[c] + father[f] + mother[m];
                    let inheritable = (fa | ma) & ca == ca && fa & ca != 0 && ma & ca != 0;
                    if inheritable {
                        if sum > result.max_constrained {
                            result.max_constrained = sum;
                            result.best_constrained = [c, f, m];
                        }
                        result.constrained.push(sum);
                    } else {
                        if sum > result.max_unconstrained {
                            result.max_unconstrained = sum;
                            result.best_unconstrained = [c, f, m];
                        }
                        result.unconstrained.push(sum);
                    }
                }
            }
        }
        Some(result)
    }

    pub fn is_violation(&self) -> bool {
        self.max_constrained < self.max_unconstrained
    }

    /// log10 ratio of the total unconstrained to the total constrained likelihood.
    pub fn likelihood_ratio(&self) -> f64 {
        log_sum_of_logs(&self.unconstrained) - log_sum_of_logs(&self.constrained)
    }
}

/// Annotates records whose most likely trio genotypes violate Mendelian
/// inheritance with `MVCLR`, `MENDELLR`, `UNCGT` and `CONGT`. Records are
/// never dropped. With several trios the last violating one is reported.
#[derive(Debug, Clone)]
pub struct MendelianConstraint {
    trios: Vec<Trio>,
}

impl MendelianConstraint {
    pub fn new(trios: Vec<Trio>) -> Self {
        Self { trios }
    }
}

impl VariantTransform for MendelianConstraint {
    fn name(&self) -> &str {
        "MendelianConstraint"
    }

    fn transform(&self, variant: &mut Variant) {
        let Some(likelihoods) = genotype_likelihoods(variant) else {
            return;
        };
        for trio in &self.trios {
            let members = trio
                .members()
                .map(|sample| likelihoods.get(sample).and_then(Option::as_deref));
            let [Some(child), Some(father), Some(mother)] = members else {
                variant.set_info(MISSING_LIKELIHOODS_TAG, None);
                continue;
            };
            let Some(trio_likelihoods) = TrioLikelihoods::compute(child, father, mother) else {
                log::debug!(
                    "Too many alleles for trio likelihoods at {}:{}",
                    variant.chrom,
                    variant.pos
                );
                continue;
            };
            if !trio_likelihoods.is_violation() {
                continue;
            }
            let TrioLikelihoods {
                max_constrained,
                max_unconstrained,
                best_constrained,
                best_unconstrained,
                ..
            } = trio_likelihoods;
            variant.set_info(
                "MVCLR",
                Some(format_significant(max_unconstrained - max_constrained, 3)),
            );
            variant.set_info(
                "MENDELLR",
                Some(format_significant(trio_likelihoods.likelihood_ratio(), 3)),
            );
            variant.set_info("UNCGT", Some(format_genotypes(best_unconstrained)));
            variant.set_info("CONGT", Some(format_genotypes(best_constrained)));
        }
    }

    fn info_lines(&self) -> Vec<String> {
        vec![
            "##INFO=<ID=MVCLR,Number=1,Type=Float,Description=\"Log-likelihood ratio of most likely unconstrained to constrained genotype\">".to_string(),
            "##INFO=<ID=MENDELLR,Number=1,Type=Float,Description=\"Log-likelihood ratio of unconstrained to constrained genotypes\">".to_string(),
            "##INFO=<ID=UNCGT,Number=1,Type=String,Description=\"Most likely unconstrained trio genotypes\">".to_string(),
            "##INFO=<ID=CONGT,Number=1,Type=String,Description=\"Most likely genotypes under mendelian constraints\">".to_string(),
            format!("##INFO=<ID={MISSING_LIKELIHOODS_TAG},Number=0,Type=Flag,Description=\"A trio member has no genotype likelihoods\">"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trio_variant(child: &str, father: &str, mother: &str) -> Variant {
        Variant::new("chr1", 1000, "A", "G").with(|v| {
            v.samples = vec![
                "GT:PL".to_string(),
                child.to_string(),
                father.to_string(),
                mother.to_string(),
            ];
        })
    }

    fn constraint() -> MendelianConstraint {
        MendelianConstraint::new(vec![Trio {
            child: 0,
            father: 1,
            mother: 2,
        }])
    }

    #[test]
    fn test_genotype_alleles_follow_vcf_ordering() {
        let expected = [(0, 0), (0, 1), (1, 1), (0, 2), (1, 2), (2, 2), (0, 3)];
        for (index, alleles) in expected.iter().enumerate() {
            assert_eq!(genotype_alleles(index), *alleles, "index {index}");
        }
        assert_eq!(allele_mask(4), Some(0b110));
    }

    #[test]
    fn test_log_sum_of_logs() {
        assert_eq!(log_sum_of_logs(&[-2.0]), -2.0);
        assert_eq!(log_sum_of_logs(&[]), f64::NEG_INFINITY);
        assert!((log_sum_of_logs(&[-1.0, -1.0]) - (-1.0 + 2f64.log10())).abs() < 1e-12);
        assert_eq!(log_sum_of_logs(&[f64::NEG_INFINITY, -3.0]), -3.0);
    }

    #[test]
    fn test_de_novo_het_is_annotated() {
        let mut variant = trio_variant("0/1:200,0,200", "0/0:0,200,200", "0/0:0,200,200");
        constraint().transform(&mut variant);
        assert_eq!(variant.info_value("UNCGT"), Some("0/1,0/0,0/0"));
        assert_eq!(variant.info_value("CONGT"), Some("0/0,0/0,0/0"));
        assert_eq!(variant.info_value("MVCLR"), Some("20.0"));
        assert!(variant.info_value("MENDELLR").is_some());
    }

    #[test]
    fn test_inherited_het_is_untouched() {
        let mut variant = trio_variant("0/1:200,0,200", "0/1:200,0,200", "0/0:0,200,200");
        let before = variant.clone();
        constraint().transform(&mut variant);
        assert_eq!(variant, before);
    }

    #[test]
    fn test_missing_parent_likelihoods_set_flag() {
        let mut variant = trio_variant("0/1:200,0,200", "0/0", "0/0:0,200,200");
        constraint().transform(&mut variant);
        assert_eq!(variant.info_value("NOPL"), Some(""));
        assert!(!variant.has_info("MVCLR"));
    }
}
