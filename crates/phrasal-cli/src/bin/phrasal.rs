use std::path::PathBuf;

use clap::{Parser, Subcommand};

use phrasal_cli::commands::decode_ops::DecodeOptions;
use phrasal_cli::commands::{config_ops, decode_ops};
use phrasal_cli::trace_init::init_tracing;

#[derive(Parser)]
#[command(name = "phrasal", about = "Phrase-based statistical machine translation decoder")]
struct Cli {
    /// Emit log events as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate tokenized sentences, one per line
    Decode {
        /// Settings TOML (defaults are used for missing keys)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Moses-style phrase table; repeat for independent tables
        #[arg(long = "ttable", required = true)]
        ttables: Vec<PathBuf>,
        /// ARPA language model
        #[arg(long)]
        lm: Option<PathBuf>,
        /// Weights file (`name value` per line), overriding [weights]
        #[arg(long)]
        weights: Option<PathBuf>,
        /// Input file (default: stdin)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Write the full n-best list here
        #[arg(long)]
        nbest_file: Option<PathBuf>,
        /// Write the n-best list as JSON lines instead of Moses format
        #[arg(long)]
        json: bool,
        /// Reference file for force decoding; repeat for several references
        #[arg(long)]
        force_decode: Vec<PathBuf>,
        /// Number of decoding threads
        #[arg(long)]
        threads: Option<usize>,
        /// N-best list size
        #[arg(short, long)]
        nbest: Option<usize>,
    },
    /// Print the default settings TOML
    SettingsExport,
    /// Parse and validate a settings TOML
    SettingsValidate {
        /// Path to the settings file
        file: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Decode {
            config,
            ttables,
            lm,
            weights,
            input,
            nbest_file,
            json,
            force_decode,
            threads,
            nbest,
        } => decode_ops::decode(&DecodeOptions {
            config,
            ttables,
            lm,
            weights,
            input,
            nbest_file,
            json,
            force_decode,
            threads,
            nbest,
        }),
        Command::SettingsExport => config_ops::settings_export(),
        Command::SettingsValidate { file } => config_ops::settings_validate(&file),
    }
}
