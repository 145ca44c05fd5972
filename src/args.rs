use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Path to a JSON module set (array of module descriptors).
    #[arg(long, value_name = "PATH")]
    pub modules: PathBuf,

    /// Module name that triggered the resolve. Can be provided multiple
    /// times; defaults to all modules in the set.
    #[arg(long, value_name = "NAME")]
    pub trigger: Vec<String>,

    /// Treat trigger failure as a hard error instead of a partial result.
    #[arg(long, default_value_t = false)]
    pub mandatory_triggers: bool,

    /// How many modules are handed to the solver per batch.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub batch_size: usize,

    /// Emit machine-readable JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Verbose logging (same as RUST_LOG=debug).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}
