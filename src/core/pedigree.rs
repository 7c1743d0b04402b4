//! Parent-child trios declared in `##PEDIGREE` header lines, and the
//! per-sample genotype data the trio analyses read.

use crate::{constants::MISSING_VALUE, core::variant::Variant, io::vcf_reader::VcfHeader};

const PEDIGREE_PREFIX: &str = "##PEDIGREE=<";

/// Sample indices (0-based, after FORMAT) of one child and its parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trio {
    pub child: usize,
    pub father: usize,
    pub mother: usize,
}

impl Trio {
    /// Child, father, mother.
    pub fn members(&self) -> [usize; 3] {
        [self.child, self.father, self.mother]
    }
}

fn pedigree_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.split(',')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim().trim_matches('"'))
}

/// Trios of every `##PEDIGREE=<Child=..,Father=..,Mother=..>` line whose
/// three members are sample columns of `header`. Other pedigree lines are
/// skipped with a warning.
pub fn trios_from_header(header: &VcfHeader) -> Vec<Trio> {
    let samples = header.sample_names();
    let index_of = |name: Option<&str>| name.and_then(|n| samples.iter().position(|s| *s == n));

    let mut trios = Vec::new();
    for line in &header.meta_lines {
        let Some(body) = line
            .strip_prefix(PEDIGREE_PREFIX)
            .and_then(|rest| rest.strip_suffix('>'))
        else {
            continue;
        };
        let members = (
            index_of(pedigree_value(body, "Child")),
            index_of(pedigree_value(body, "Father")),
            index_of(pedigree_value(body, "Mother")),
        );
        match members {
            (Some(child), Some(father), Some(mother)) => trios.push(Trio {
                child,
                father,
                mother,
            }),
            _ => log::warn!("Ignoring pedigree without matching samples: {line}"),
        }
    }
    log::debug!("Found {} complete trios in the input header", trios.len());
    trios
}

/// Alleles of a diploid `GT` call. Missing or unparsable alleles are `None`.
/// Haploid and missing calls yield `[None, None]`.
pub fn diploid_alleles(call: &str) -> [Option<u32>; 2] {
    let gt = call.split(':').next().unwrap_or_default();
    if gt.starts_with(MISSING_VALUE) {
        return [None, None];
    }
    match gt.split_once(['/', '|']) {
        Some((first, second)) => [first.parse().ok(), second.parse().ok()],
        None => [None, None],
    }
}

/// Genotype log10-likelihoods of every sample, from `GL` or else from `PL`
/// divided by -10. `None` when FORMAT has neither key; a sample without a
/// usable value is `None` inside the vector.
pub fn genotype_likelihoods(variant: &Variant) -> Option<Vec<Option<Vec<f64>>>> {
    let format: Vec<&str> = variant.samples.first()?.split(':').collect();
    let (index, scale) = match format.iter().position(|key| *key == "GL") {
        Some(index) => (index, 1.0),
        None => (format.iter().position(|key| *key == "PL")?, -0.1),
    };
    let per_sample = variant.samples[1..]
        .iter()
        .map(|call| {
            let value = call.split(':').nth(index)?;
            value
                .split(',')
                .map(|v| v.parse::<f64>().ok().map(|v| v * scale))
                .collect::<Option<Vec<f64>>>()
        })
        .collect();
    Some(per_sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(meta: &[&str], samples: &[&str]) -> VcfHeader {
        let mut column_line = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT".to_string();
        for sample in samples {
            column_line.push('\t');
            column_line.push_str(sample);
        }
        VcfHeader {
            meta_lines: meta.iter().map(|l| l.to_string()).collect(),
            column_line,
        }
    }

    #[test]
    fn test_trios_resolve_sample_columns() {
        let header = header(
            &[
                "##fileformat=VCFv4.2",
                "##PEDIGREE=<Child=kid,Father=dad,Mother=mom>",
                "##PEDIGREE=<Child=kid,Father=dad,Mother=absent>",
            ],
            &["mom", "dad", "kid"],
        );
        assert_eq!(
            trios_from_header(&header),
            [Trio {
                child: 2,
                father: 1,
                mother: 0
            }]
        );
    }

    #[test]
    fn test_diploid_alleles() {
        assert_eq!(diploid_alleles("0/1:35"), [Some(0), Some(1)]);
        assert_eq!(diploid_alleles("1|2"), [Some(1), Some(2)]);
        assert_eq!(diploid_alleles("./.:0"), [None, None]);
        assert_eq!(diploid_alleles("1"), [None, None]);
        assert_eq!(diploid_alleles("0/."), [Some(0), None]);
    }

    #[test]
    fn test_likelihoods_prefer_gl_and_scale_pl() {
        let pl = Variant::new("chr1", 1, "A", "G").with(|v| {
            v.samples = vec!["GT:PL".into(), "0/1:30,0,200".into(), "0/0".into()];
        });
        let likelihoods = genotype_likelihoods(&pl).unwrap();
        assert_eq!(likelihoods[0], Some(vec![-3.0, -0.0, -20.0]));
        assert_eq!(likelihoods[1], None);

        let gl = Variant::new("chr1", 1, "A", "G").with(|v| {
            v.samples = vec!["GT:PL:GL".into(), "0/1:30,0,200:-1.5,0,-9".into()];
        });
        assert_eq!(genotype_likelihoods(&gl).unwrap()[0], Some(vec![-1.5, 0.0, -9.0]));

        let bare = Variant::new("chr1", 1, "A", "G").with(|v| {
            v.samples = vec!["GT".into(), "0/1".into()];
        });
        assert!(genotype_likelihoods(&bare).is_none());
    }
}
