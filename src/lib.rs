pub mod cli;
pub mod error;

pub mod commands {
    pub mod annotate;
    pub mod config;
    pub mod filter;
}

pub mod core {
    pub mod annotator;
    pub mod annotator_spec;
    pub mod compound;
    pub mod coordinate;
    pub mod effects;
    pub mod field_map;
    pub mod filter;
    pub mod mendelian;
    pub mod pedigree;
    pub mod pipeline;
    pub mod variant;
}

pub mod index {
    pub mod tabix;
}

pub mod io {
    pub mod gene_list;
    pub mod readers;
    pub mod source;
    pub mod vcf_reader;
    pub mod vcf_writer;
}

pub mod utils {
    pub mod util;
    pub mod util_intern;
}

pub mod constants;

pub use constants::*;
