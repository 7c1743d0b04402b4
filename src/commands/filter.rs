use crate::{
    cli::FilterArgs,
    commands::annotate::{output_info_lines, stream_variants, trio_stages, StreamOptions},
    constants::{DEFAULT_BATCH_SIZE, DEFAULT_QUEUE_CAPACITY},
    core::{filter::DefaultFilter, pipeline::AnnotationPipeline},
    io::{
        vcf_reader::VcfReader,
        vcf_writer::{create_output_header, VcfWriter},
    },
    utils::util::Result,
};

/// Applies the default filter to an already annotated stream.
pub fn filter(args: FilterArgs) -> Result<()> {
    let reader = VcfReader::open(args.input.as_deref())?;
    let (transforms, grouper) = trio_stages(&args.trio, reader.header());
    let pipeline =
        AnnotationPipeline::new(Vec::new(), transforms, Box::new(DefaultFilter::default()));
    let info_lines = output_info_lines(&pipeline, grouper.as_ref());
    let header = create_output_header(reader.header(), &info_lines, args.no_version);

    let mut writer = VcfWriter::new(args.output.as_deref())?;
    writer.write_header(&header)?;

    let options = StreamOptions {
        num_threads: 1,
        batch_size: DEFAULT_BATCH_SIZE,
        queue_capacity: DEFAULT_QUEUE_CAPACITY,
        write_index: false,
    };
    stream_variants(reader, &pipeline, grouper, writer, &options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cli::{Cli, Command},
        core::variant::Variant,
    };
    use clap::Parser;
    use tempfile::tempdir;

    #[test]
    fn test_filter_keeps_only_default_passing_records() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("annotated.vcf");
        let output = dir.path().join("filtered.vcf");
        std::fs::write(
            &input,
            "##fileformat=VCFv4.2\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t100\t.\tA\tG\t.\tPASS\tIMPACT=HIGH;TGAF=0.005\n\
chr1\t200\t.\tA\tG\t.\tPASS\tIMPACT=HIGH;TGAF=0.03\n\
chr1\t300\t.\tA\tG\t.\tLowQual\tIMPACT=HIGH\n\
chr1\t400\t.\tA\tG\t.\t.\tIMPACT=MODERATE;NIEHSAF=not_a_number\n\
chr1\t500\t.\tA\tG\t.\tPASS\tTGAF=0.001\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "varanno",
            "filter",
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--no-version",
        ])
        .unwrap();
        let Command::Filter(args) = cli.command else {
            panic!("expected filter command");
        };
        filter(args).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        let positions: Vec<&str> = text
            .lines()
            .filter(|l| !l.starts_with('#'))
            .map(|l| l.split('\t').nth(1).unwrap())
            .collect();
        assert_eq!(positions, ["100", "400"]);
        assert!(!text.contains("varannoVersion"));
    }

    #[test]
    fn test_trio_analyses_annotate_filtered_stream() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("trio.vcf");
        let output = dir.path().join("trio.out.vcf");
        std::fs::write(
            &input,
            "##fileformat=VCFv4.2\n\
##PEDIGREE=<Child=kid,Father=dad,Mother=mom>\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tkid\tdad\tmom\n\
chr1\t100\t.\tA\tG\t.\tPASS\tIMPACT=HIGH;Gene_name=BRCA1\tGT:PL\t0/1:200,0,200\t0/1:200,0,200\t0/0:0,200,200\n\
chr1\t150\t.\tA\tG\t.\tPASS\tIMPACT=LOW;Gene_name=BRCA1\tGT:PL\t0/1:200,0,200\t0/1:200,0,200\t0/0:0,200,200\n\
chr1\t200\t.\tA\tG\t.\tPASS\tIMPACT=HIGH;Gene_name=BRCA1\tGT:PL\t0/1:200,0,200\t0/0:0,200,200\t0/1:200,0,200\n\
chr1\t300\t.\tA\tG\t.\tPASS\tIMPACT=HIGH;Gene_name=TP53\tGT:PL\t0/1:200,0,200\t0/0:0,200,200\t0/0:0,200,200\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "varanno",
            "filter",
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--mendelian",
            "--compound-het",
        ])
        .unwrap();
        let Command::Filter(args) = cli.command else {
            panic!("expected filter command");
        };
        filter(args).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains("##INFO=<ID=MVCLR,"));
        assert!(text.contains("##INFO=<ID=COMPOUND,"));
        let records: Vec<Variant> = text
            .lines()
            .filter(|l| !l.starts_with('#'))
            .map(|l| Variant::from_vcf_line(l).unwrap())
            .collect();
        let positions: Vec<i64> = records.iter().map(|v| v.pos).collect();
        assert_eq!(positions, [100, 200, 300]);

        let indices: Vec<Option<&str>> = records.iter().map(|v| v.info_value("Index")).collect();
        assert_eq!(indices, [Some("0"), Some("1"), Some("2")]);
        assert!(records[0].has_info("COMPOUND"));
        assert_eq!(records[0].info_value("MendHetRec"), Some("1"));
        assert_eq!(records[1].info_value("MendHetRec"), Some("0"));
        assert!(!records[0].has_info("MVCLR"));

        assert_eq!(records[2].info_value("MVCLR"), Some("20.0"));
        assert_eq!(records[2].info_value("UNCGT"), Some("0/1,0/0,0/0"));
        assert_eq!(records[2].samples.len(), 4);
    }

    #[test]
    fn test_trio_flags_without_pedigree_leave_stream_unchanged() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("plain.vcf");
        let output = dir.path().join("plain.out.vcf");
        std::fs::write(
            &input,
            "##fileformat=VCFv4.2\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t100\t.\tA\tG\t.\tPASS\tIMPACT=HIGH\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "varanno",
            "filter",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--compound-het",
            "--no-version",
        ])
        .unwrap();
        let Command::Filter(args) = cli.command else {
            panic!("expected filter command");
        };
        filter(args).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(!text.contains("COMPOUND"));
        assert!(text.ends_with("chr1\t100\t.\tA\tG\t.\tPASS\tIMPACT=HIGH\n"));
    }
}
