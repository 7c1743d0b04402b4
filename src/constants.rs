pub const DEFAULT_BATCH_SIZE: usize = 1024;
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;
pub const DEFAULT_KEY_COLUMN: usize = 1;
pub const DEFAULT_GENE_FIELD: &str = "Gene_name";
pub const DEFAULT_FREQUENCY_CUTOFF: f64 = 0.01;
pub const DEFAULT_FREQUENCY_FIELDS: [&str; 3] = ["NIEHSAF", "NIEHSIAF", "TGAF"];
pub const DEFAULT_PASSING_IMPACTS: [&str; 2] = ["HIGH", "MODERATE"];

pub const VCF_REF_COLUMN: usize = 4;
pub const VCF_ALT_COLUMN: usize = 5;
pub const VCF_FIXED_COLUMNS: usize = 8;

pub const MISSING_VALUE: &str = ".";
pub const PASS_FILTER: &str = "PASS";
pub const CHR_PREFIX: &str = "chr";
