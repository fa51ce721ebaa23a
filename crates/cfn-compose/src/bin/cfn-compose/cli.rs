//! cfn-compose cli interface

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Build manifest (JSON or YAML)
    #[clap(long = "config")]
    pub config: PathBuf,

    /// Directory the templates and tag files are written to
    ///
    /// Files end up in `<path>/<environment>/Templates` and `<path>/<environment>/Tags`.
    #[clap(long = "path-output")]
    pub path_output: PathBuf,

    /// Only build this environment (case-insensitive)
    #[clap(long = "environment")]
    pub environment: Option<String>,
}
