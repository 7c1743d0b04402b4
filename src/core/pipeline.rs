use crate::{
    core::{
        annotator::{Annotation, Annotator},
        annotator_spec::AnnotatorSpec,
        effects::VariantTransform,
        filter::VariantFilter,
        variant::Variant,
    },
    io::vcf_reader::info_header_id,
    utils::util::Result,
};
use rayon::prelude::*;
use std::collections::HashMap;

/// Ordered transforms and annotators followed by a filter.
///
/// Annotators merge first-writer-wins: a key already on the variant (from the
/// input, a transform or an earlier annotator) is never overwritten.
pub struct AnnotationPipeline {
    annotators: Vec<Annotator>,
    transforms: Vec<Box<dyn VariantTransform>>,
    filter: Box<dyn VariantFilter>,
}

impl AnnotationPipeline {
    pub fn new(
        annotators: Vec<Annotator>,
        transforms: Vec<Box<dyn VariantTransform>>,
        filter: Box<dyn VariantFilter>,
    ) -> Self {
        Self {
            annotators,
            transforms,
            filter,
        }
    }

    /// Opens every annotator in declared order; the first failure aborts.
    pub fn from_specs(
        specs: Vec<AnnotatorSpec>,
        transforms: Vec<Box<dyn VariantTransform>>,
        filter: Box<dyn VariantFilter>,
    ) -> Result<Self> {
        let annotators = specs
            .into_iter()
            .map(Annotator::open)
            .collect::<Result<Vec<_>>>()?;
        let pipeline = Self::new(annotators, transforms, filter);
        pipeline.warn_shadowed_outputs();
        Ok(pipeline)
    }

    /// `##INFO` lines of transforms, then annotators, in declared order.
    pub fn info_lines(&self) -> Vec<String> {
        self.transforms
            .iter()
            .flat_map(|transform| transform.info_lines())
            .chain(
                self.annotators
                    .iter()
                    .flat_map(|annotator| annotator.info_lines().iter().cloned()),
            )
            .collect()
    }

    /// Runs transforms, then merges every annotator's fields into `variant`.
    pub fn annotate(&self, variant: &mut Variant) {
        for transform in &self.transforms {
            transform.transform(variant);
        }
        for annotator in &self.annotators {
            match annotator.lookup(variant) {
                Ok(Some(annotation)) => merge_annotation(variant, annotation),
                Ok(None) => {}
                Err(e) => log::warn!(
                    "Annotator '{}' failed at {}:{}: {}",
                    annotator.name(),
                    variant.chrom,
                    variant.pos,
                    e
                ),
            }
        }
    }

    /// Annotates `variant` and reports whether it passes the filter.
    pub fn process(&self, variant: &mut Variant) -> bool {
        self.annotate(variant);
        self.filter.evaluate(variant)
    }

    /// Annotates a batch in parallel on the current rayon pool and returns
    /// the passing variants in input order.
    pub fn process_batch(&self, mut batch: Vec<Variant>) -> Vec<Variant> {
        let keep: Vec<bool> = batch
            .par_iter_mut()
            .map(|variant| self.process(variant))
            .collect();
        batch
            .into_iter()
            .zip(keep)
            .filter_map(|(variant, keep)| keep.then_some(variant))
            .collect()
    }

    fn warn_shadowed_outputs(&self) {
        let mut owners: HashMap<String, &str> = HashMap::new();
        for annotator in &self.annotators {
            for id in annotator.info_lines().iter().filter_map(|l| info_header_id(l)) {
                if let Some(first) = owners.get(id) {
                    log::warn!(
                        "INFO/{} is written by both '{}' and '{}'; the earlier annotator wins",
                        id,
                        first,
                        annotator.name()
                    );
                } else {
                    owners.insert(id.to_string(), annotator.name());
                }
            }
        }
    }
}

fn merge_annotation(variant: &mut Variant, annotation: Annotation) {
    for (key, value) in annotation.fields {
        variant.insert_info_if_absent(&key, value);
    }
    if let Some(id) = annotation.source_id {
        if variant.has_empty_id() {
            variant.id = id;
        }
    }
}
