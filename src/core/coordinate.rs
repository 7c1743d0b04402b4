use crate::constants::CHR_PREFIX;
use std::{borrow::Cow, fmt};

/// Identity of a variant for matching against annotation sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoordinateKey {
    pub chromosome: String,
    pub position: i64,
    pub reference: String,
    pub alternate: String,
}

/// Which parts of a key beyond (chromosome, position) must agree for two keys to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchRule {
    pub check_ref: bool,
    pub check_alt: bool,
}

impl MatchRule {
    pub const POSITION_ONLY: MatchRule = MatchRule {
        check_ref: false,
        check_alt: false,
    };

    pub const ALLELES: MatchRule = MatchRule {
        check_ref: true,
        check_alt: true,
    };
}

impl CoordinateKey {
    pub fn new(
        chromosome: impl Into<String>,
        position: i64,
        reference: impl Into<String>,
        alternate: impl Into<String>,
    ) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
            reference: reference.into(),
            alternate: alternate.into(),
        }
    }

    /// Compares `self` (a query) against `other` (a source row) under `rule`.
    ///
    /// Chromosome names are compared after reconciling a `chr` prefix, so
    /// `chr1` and `1` refer to the same contig.
    pub fn matches(&self, other: &CoordinateKey, rule: MatchRule) -> bool {
        self.position == other.position
            && strip_chr(&self.chromosome) == strip_chr(&other.chromosome)
            && (!rule.check_ref || self.reference == other.reference)
            && (!rule.check_alt || self.alternate == other.alternate)
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {}>{}",
            self.chromosome, self.position, self.reference, self.alternate
        )
    }
}

pub fn has_chr_prefix(chromosome: &str) -> bool {
    chromosome
        .get(..CHR_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(CHR_PREFIX))
}

pub fn strip_chr(chromosome: &str) -> &str {
    if has_chr_prefix(chromosome) {
        &chromosome[CHR_PREFIX.len()..]
    } else {
        chromosome
    }
}

pub fn add_chr(chromosome: &str) -> Cow<'_, str> {
    if has_chr_prefix(chromosome) {
        Cow::Borrowed(chromosome)
    } else {
        Cow::Owned(format!("{CHR_PREFIX}{chromosome}"))
    }
}

/// Contig spellings to try against a source, most preferred first.
///
/// With `prefer_chr` the `chr`-prefixed name is tried first. The other
/// spelling is always offered as a fallback so that `1`/`chr1` mismatches
/// between the primary stream and a source reconcile without configuration.
pub fn contig_candidates(chromosome: &str, prefer_chr: bool) -> [Cow<'_, str>; 2] {
    let alternate = if has_chr_prefix(chromosome) {
        Cow::Borrowed(strip_chr(chromosome))
    } else {
        add_chr(chromosome)
    };
    if prefer_chr && !has_chr_prefix(chromosome) {
        [alternate, Cow::Borrowed(chromosome)]
    } else {
        [Cow::Borrowed(chromosome), alternate]
    }
}
