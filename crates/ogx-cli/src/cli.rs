use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ogx",
    about = "Inspect, list and rewrite object-graph XML archives",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Serializer configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Types decoded with the generic record codec, comma separated
    #[arg(long, global = true, value_delimiter = ',')]
    pub record_types: Vec<String>,

    /// Validate every unit before decoding it
    #[arg(long, global = true)]
    pub validate: bool,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load an archive and print its object tree
    Inspect(InspectArgs),
    /// List every unit reachable from a root unit
    Units(UnitsArgs),
    /// Load an archive and save it again with the configured policies
    Resave(ResaveArgs),
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Root unit of the archive
    pub file: PathBuf,
    /// Stop printing below this depth
    #[arg(long)]
    pub depth: Option<usize>,
}

#[derive(Args, Debug)]
pub struct UnitsArgs {
    /// Root unit of the archive
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ResaveArgs {
    /// Root unit of the archive
    pub file: PathBuf,
    /// Folder the new archive is written to
    #[arg(long)]
    pub out: PathBuf,
    /// Also write the schema files of registered types
    #[arg(long)]
    pub schema: bool,
}
