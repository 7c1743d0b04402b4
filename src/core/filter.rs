use crate::{
    constants::{
        DEFAULT_FREQUENCY_CUTOFF, DEFAULT_FREQUENCY_FIELDS, DEFAULT_PASSING_IMPACTS,
        MISSING_VALUE, PASS_FILTER,
    },
    core::variant::Variant,
    utils::util::parse_float_prefix,
};

/// Decides whether an annotated variant is emitted. Never fails: missing or
/// malformed values are handled by each predicate.
pub trait VariantFilter: Send + Sync {
    fn evaluate(&self, variant: &Variant) -> bool;
}

impl<F> VariantFilter for F
where
    F: Fn(&Variant) -> bool + Send + Sync,
{
    fn evaluate(&self, variant: &Variant) -> bool {
        self(variant)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassAll;

impl VariantFilter for PassAll {
    fn evaluate(&self, _variant: &Variant) -> bool {
        true
    }
}

/// FILTER is `PASS` or unset.
pub fn filter_status_passes(filter: &str) -> bool {
    filter == PASS_FILTER || filter == MISSING_VALUE
}

/// `IMPACT` is present and one of `impacts`. A missing `IMPACT` fails.
pub fn filter_impact(variant: &Variant, impacts: &[&str]) -> bool {
    variant
        .info_value("IMPACT")
        .is_some_and(|impact| impacts.contains(&impact))
}

/// `!(value > cutoff)`: absent, flag and non-numeric values parse to NaN and pass.
pub fn filter_less_than(variant: &Variant, key: &str, cutoff: f64) -> bool {
    let value = variant
        .info_value(key)
        .map(parse_float_prefix)
        .unwrap_or(f64::NAN);
    !(value > cutoff)
}

/// Keeps passing, high or moderate impact variants that are rare in every
/// population-frequency field.
#[derive(Debug, Clone)]
pub struct DefaultFilter {
    pub passing_impacts: Vec<String>,
    pub frequency_fields: Vec<String>,
    pub cutoff: f64,
}

impl Default for DefaultFilter {
    fn default() -> Self {
        Self {
            passing_impacts: DEFAULT_PASSING_IMPACTS.iter().map(|s| s.to_string()).collect(),
            frequency_fields: DEFAULT_FREQUENCY_FIELDS.iter().map(|s| s.to_string()).collect(),
            cutoff: DEFAULT_FREQUENCY_CUTOFF,
        }
    }
}

impl VariantFilter for DefaultFilter {
    fn evaluate(&self, variant: &Variant) -> bool {
        let impacts: Vec<&str> = self.passing_impacts.iter().map(String::as_str).collect();
        filter_status_passes(&variant.filter)
            && filter_impact(variant, &impacts)
            && self
                .frequency_fields
                .iter()
                .all(|field| filter_less_than(variant, field, self.cutoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(filter: &str, info: &[(&str, Option<&str>)]) -> Variant {
        Variant::new("chr1", 1000, "A", "G").with(|v| {
            v.filter = filter.to_string();
            for (key, value) in info {
                v.set_info(*key, value.map(str::to_string));
            }
        })
    }

    #[test]
    fn test_filter_less_than_is_nan_permissive() {
        let absent = variant("PASS", &[]);
        assert!(filter_less_than(&absent, "TGAF", 0.01));
        for (value, expected) in [
            ("not_a_number", true),
            ("0.005", true),
            ("0.01", true),
            ("0.02", false),
            ("0.005,0.2", true),
        ] {
            let v = variant("PASS", &[("TGAF", Some(value))]);
            assert_eq!(filter_less_than(&v, "TGAF", 0.01), expected, "{value}");
        }
        let flag = variant("PASS", &[("TGAF", None)]);
        assert!(filter_less_than(&flag, "TGAF", 0.01));
    }

    #[test]
    fn test_filter_impact_fails_closed() {
        let impacts = ["HIGH", "MODERATE"];
        assert!(!filter_impact(&variant("PASS", &[]), &impacts));
        assert!(filter_impact(&variant("PASS", &[("IMPACT", Some("HIGH"))]), &impacts));
        assert!(!filter_impact(&variant("PASS", &[("IMPACT", Some("LOW"))]), &impacts));
    }

    #[test]
    fn test_filter_status_passes() {
        assert!(filter_status_passes("PASS"));
        assert!(filter_status_passes("."));
        assert!(!filter_status_passes("q10"));
        assert!(!filter_status_passes("PASS;q10"));
    }

    #[test]
    fn test_default_filter() {
        let filter = DefaultFilter::default();
        let keep = variant(
            "PASS",
            &[("IMPACT", Some("MODERATE")), ("TGAF", Some("0.005"))],
        );
        assert!(filter.evaluate(&keep));

        let common = variant("PASS", &[("IMPACT", Some("HIGH")), ("TGAF", Some("0.03"))]);
        assert!(!filter.evaluate(&common));

        let common_niehs = variant("PASS", &[("IMPACT", Some("HIGH")), ("NIEHSIAF", Some("0.5"))]);
        assert!(!filter.evaluate(&common_niehs));

        let failed = variant("LowQual", &[("IMPACT", Some("HIGH"))]);
        assert!(!filter.evaluate(&failed));

        let no_impact = variant(".", &[("TGAF", Some("0.001"))]);
        assert!(!filter.evaluate(&no_impact));
    }

    #[test]
    fn test_closures_and_pass_all_are_filters() {
        let filters: Vec<Box<dyn VariantFilter>> = vec![
            Box::new(PassAll),
            Box::new(|v: &Variant| v.pos > 500),
        ];
        let v = variant("FAIL", &[]);
        assert!(filters.iter().all(|f| f.evaluate(&v)));
    }
}
