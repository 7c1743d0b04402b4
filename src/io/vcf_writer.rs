use crate::{
    cli::FULL_VERSION,
    core::variant::Variant,
    io::vcf_reader::{info_header_id, VcfHeader},
    utils::util::Result,
};
use rust_htslib::{bcf, bgzf};
use std::{
    collections::HashSet,
    env,
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Header lines of the output stream: the input's meta lines, then `##INFO`
/// lines for every added field not already defined, then the version lines,
/// then the `#CHROM` line.
pub fn create_output_header(
    input: &VcfHeader,
    added_info_lines: &[String],
    no_version: bool,
) -> Vec<String> {
    let mut lines = input.meta_lines.clone();
    let mut defined: HashSet<String> = input.info_ids().into_iter().map(str::to_string).collect();
    for line in added_info_lines {
        match info_header_id(line) {
            Some(id) if defined.insert(id.to_string()) => lines.push(line.clone()),
            Some(id) => log::debug!("Header already defines INFO/{id}, keeping the input definition"),
            None => lines.push(line.clone()),
        }
    }
    if !no_version {
        add_version_info(&mut lines);
    }
    lines.push(input.column_line.clone());
    lines
}

fn add_version_info(lines: &mut Vec<String>) {
    lines.push(format!(
        "##{}Version={}",
        env!("CARGO_PKG_NAME"),
        &**FULL_VERSION
    ));
    let command_line = env::args().collect::<Vec<String>>().join(" ");
    lines.push(format!("##{}Command={}", env!("CARGO_PKG_NAME"), command_line));
}

fn is_bgzf_path(path: &Path) -> bool {
    let lower = path.to_string_lossy().to_lowercase();
    lower.ends_with(".gz") || lower.ends_with(".bgz")
}

/// Text VCF output to standard output, a plain file, or a BGZF file
/// (chosen by a `.gz`/`.bgz` extension).
pub struct VcfWriter {
    writer: Box<dyn Write>,
    path: Option<PathBuf>,
    compressed: bool,
    n_written: usize,
}

impl VcfWriter {
    pub fn new(output: Option<&Path>) -> Result<Self> {
        let (writer, compressed): (Box<dyn Write>, bool) = match output {
            Some(path) if is_bgzf_path(path) => {
                let writer = bgzf::Writer::from_path(path).map_err(|e| {
                    crate::varanno_error!("Failed to create writer for {}: {}", path.display(), e)
                })?;
                (Box::new(writer), true)
            }
            Some(path) => {
                let file = File::create(path).map_err(|e| {
                    crate::varanno_error!("Failed to create writer for {}: {}", path.display(), e)
                })?;
                (Box::new(BufWriter::new(file)), false)
            }
            None => (Box::new(BufWriter::new(io::stdout().lock())), false),
        };
        log::trace!(
            "Writer: output={:?} compressed={}",
            output.map(Path::display),
            compressed
        );
        Ok(Self {
            writer,
            path: output.map(Path::to_path_buf),
            compressed,
            n_written: 0,
        })
    }

    pub fn write_header(&mut self, lines: &[String]) -> Result<()> {
        for line in lines {
            writeln!(self.writer, "{line}")?;
        }
        Ok(())
    }

    pub fn write_variant(&mut self, variant: &Variant) -> Result<()> {
        writeln!(self.writer, "{variant}")?;
        self.n_written += 1;
        Ok(())
    }

    pub fn n_written(&self) -> usize {
        self.n_written
    }

    /// Flushes and closes the output. With `build_index`, a BGZF output is
    /// then tabix-indexed; this requires coordinate-sorted records.
    pub fn finish(mut self, build_index: bool) -> Result<()> {
        self.writer.flush()?;
        drop(self.writer);
        match (&self.path, build_index) {
            (Some(path), true) if self.compressed => {
                log::debug!("Writer: Building tabix index for {}", path.display());
                bcf::index::build(path, None, 1, bcf::index::Type::Tbx).map_err(|error| {
                    crate::varanno_error!(
                        "Failed to build tabix index for output {}: {}",
                        path.display(),
                        error
                    )
                })?;
            }
            (_, true) => log::warn!("Index requested for uncompressed output, skipping"),
            _ => {}
        }
        Ok(())
    }
}
