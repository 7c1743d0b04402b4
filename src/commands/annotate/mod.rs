use crate::{
    cli::{AnnotateArgs, FilterMode, TrioArgs},
    commands::config::AnnotationConfig,
    constants::DEFAULT_GENE_FIELD,
    core::{
        compound::CompoundHetGrouper,
        effects::{SnpEffSplitter, VariantTransform},
        filter::{DefaultFilter, PassAll, VariantFilter},
        mendelian::MendelianConstraint,
        pedigree::trios_from_header,
        pipeline::AnnotationPipeline,
        variant::Variant,
    },
    error::VarannoError,
    io::{
        vcf_reader::{VcfHeader, VcfReader},
        vcf_writer::{create_output_header, VcfWriter},
    },
    utils::util::Result,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{path::Path, thread};

mod shutdown;

use shutdown::finalize_annotate_threads;


/// Threading and output settings shared by the streaming commands.
#[derive(Debug, Clone)]
pub(crate) struct StreamOptions {
    pub num_threads: usize,
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub write_index: bool,
}

fn build_filter(mode: FilterMode) -> Box<dyn VariantFilter> {
    match mode {
        FilterMode::Default => Box::new(DefaultFilter::default()),
        FilterMode::None => Box::new(PassAll),
    }
}

/// Trio transforms and the compound-het stage requested on the command
/// line, over the trios declared in `header`.
pub(crate) fn trio_stages(
    trio_args: &TrioArgs,
    header: &VcfHeader,
) -> (Vec<Box<dyn VariantTransform>>, Option<CompoundHetGrouper>) {
    if !trio_args.mendelian && !trio_args.compound_het {
        return (Vec::new(), None);
    }
    let trios = trios_from_header(header);
    if trios.is_empty() {
        log::warn!("No complete trio in the ##PEDIGREE header lines; trio analysis is skipped");
        return (Vec::new(), None);
    }

    let mut transforms: Vec<Box<dyn VariantTransform>> = Vec::new();
    if trio_args.mendelian {
        transforms.push(Box::new(MendelianConstraint::new(trios.clone())));
    }
    let grouper = trio_args.compound_het.then(|| {
        if trios.len() > 1 {
            log::info!("Compound-het grouping uses the first of {} trios", trios.len());
        }
        CompoundHetGrouper::new(trios[0], DEFAULT_GENE_FIELD)
    });
    (transforms, grouper)
}

/// `##INFO` lines of the pipeline, then of the compound-het stage.
pub(crate) fn output_info_lines(
    pipeline: &AnnotationPipeline,
    grouper: Option<&CompoundHetGrouper>,
) -> Vec<String> {
    let mut lines = pipeline.info_lines();
    if grouper.is_some() {
        lines.extend(CompoundHetGrouper::info_lines());
    }
    lines
}

fn build_pipeline(
    args: &AnnotateArgs,
    trio_transforms: Vec<Box<dyn VariantTransform>>,
) -> Result<AnnotationPipeline> {
    let config = AnnotationConfig::from_path(&args.config)?;
    let base_dir = args.config.parent().unwrap_or_else(|| Path::new("."));
    let specs = config.annotator_specs(base_dir)?;
    let mut transforms: Vec<Box<dyn VariantTransform>> = Vec::new();
    if config.split_effects {
        transforms.push(Box::new(SnpEffSplitter));
    }
    transforms.extend(trio_transforms);
    log::debug!(
        "Pipeline: {} transforms, {} annotators, filter={:?}",
        transforms.len(),
        specs.len(),
        args.filter
    );
    AnnotationPipeline::from_specs(specs, transforms, build_filter(args.filter))
}

pub fn annotate(args: AnnotateArgs) -> Result<()> {
    let reader = VcfReader::open(args.input.as_deref())?;
    let (trio_transforms, grouper) = trio_stages(&args.trio, reader.header());
    let pipeline = build_pipeline(&args, trio_transforms)?;
    let info_lines = output_info_lines(&pipeline, grouper.as_ref());
    let header = create_output_header(reader.header(), &info_lines, args.no_version);

    let mut writer = VcfWriter::new(args.output.as_deref())?;
    writer.write_header(&header)?;
    if args.print_header {
        return writer.finish(false);
    }

    let options = StreamOptions {
        num_threads: args.num_threads,
        batch_size: args.batch_size,
        queue_capacity: args.queue_capacity,
        write_index: args.write_index,
    };
    stream_variants(reader, &pipeline, grouper, writer, &options)
}

/// Streams `reader` through `pipeline` into `writer`, preserving input order.
///
/// A reader thread parses batches into a bounded channel; the calling thread
/// annotates each batch on a rayon pool and writes the survivors, through
/// `grouper` when compound-het grouping is on.
pub(crate) fn stream_variants(
    mut reader: VcfReader,
    pipeline: &AnnotationPipeline,
    mut grouper: Option<CompoundHetGrouper>,
    mut writer: VcfWriter,
    options: &StreamOptions,
) -> Result<()> {
    log::debug!(
        "Initializing annotation thread pool with {} threads...",
        options.num_threads
    );
    let pool = ThreadPoolBuilder::new()
        .num_threads(options.num_threads)
        .thread_name(|i| format!("varanno-annotate-{i}"))
        .build()
        .map_err(|e| crate::varanno_error!("Failed to initialize annotation thread pool: {e}"))?;

    let (batch_sender, batch_receiver): (Sender<Vec<Variant>>, Receiver<Vec<Variant>>) =
        bounded(options.queue_capacity);

    let batch_size = options.batch_size;
    let reader_thread = thread::spawn(move || -> Result<()> {
        let tx = batch_sender;
        log::debug!("Reader thread started.");
        let mut n_batches = 0usize;
        loop {
            let batch = reader.read_batch(batch_size)?;
            if batch.is_empty() {
                break;
            }
            log::trace!("Reader: Sending batch {} with {} variants", n_batches, batch.len());
            if tx.send(batch).is_err() {
                return Err(VarannoError::ReceiverClosed { thread: "reader" });
            }
            n_batches += 1;
        }
        log::debug!("Reader thread finished after {} batches.", n_batches);
        if reader.n_skipped() > 0 {
            log::warn!("Skipped {} malformed input records", reader.n_skipped());
        }
        Ok(())
    });

    let main_result = write_batches(
        batch_receiver,
        pipeline,
        &pool,
        grouper.as_mut(),
        &mut writer,
    );
    finalize_annotate_threads(reader_thread, main_result)?;
    writer.finish(options.write_index)
}

fn write_batches(
    batch_receiver: Receiver<Vec<Variant>>,
    pipeline: &AnnotationPipeline,
    pool: &ThreadPool,
    mut grouper: Option<&mut CompoundHetGrouper>,
    writer: &mut VcfWriter,
) -> Result<()> {
    let mut n_read = 0usize;
    for batch in batch_receiver {
        n_read += batch.len();
        let kept = pool.install(|| pipeline.process_batch(batch));
        for variant in kept {
            match grouper.as_deref_mut() {
                Some(grouper) => {
                    for grouped in grouper.push(variant) {
                        writer.write_variant(&grouped)?;
                    }
                }
                None => writer.write_variant(&variant)?,
            }
        }
    }
    if let Some(grouper) = grouper {
        for grouped in grouper.finish() {
            writer.write_variant(&grouped)?;
        }
        log::info!("Flagged {} compound-heterozygous variants", grouper.n_flagged());
    }
    log::info!(
        "Processed {} variants, wrote {} ({} filtered)",
        n_read,
        writer.n_written(),
        n_read - writer.n_written()
    );
    Ok(())
}
