//! notecrypt CLI - password-based note encryption
//!
//! Command-line interface for encrypting and decrypting notes using
//! AES-256-GCM with PBKDF2-HMAC-SHA256 key derivation.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use notecrypt::file_ops;
use notecrypt::kdf::{DEFAULT_ITERATIONS, IterationPreset};
use notecrypt::note::{EncryptOptions, Limits};
use notecrypt::password::{NewPassword, PasswordSource, StreamPassword, TerminalPassword};

/// Environment variable that overrides the log filter.
const LOG_ENV: &str = "NOTECRYPT_LOG";

#[derive(Parser)]
#[command(name = "notecrypt")]
#[command(version)]
#[command(about = "Password-based note encryption.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true)]
    password_stdin: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a note
    #[command(alias = "e")]
    Encrypt {
        /// Path to the note to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the file to write the encrypted note to
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[command(flatten)]
        strength: KdfStrength,

        /// Do not compress the note before encrypting it
        #[arg(long)]
        no_compress: bool,

        /// Record advisory metadata (timestamp, algorithm, parameters)
        #[arg(long)]
        metadata: bool,
    },

    /// Decrypt a note
    #[command(alias = "d")]
    Decrypt {
        /// Path to the encrypted note
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the file to write the decrypted note to
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Update an encrypted note with new content, while validating
    /// that the password is not accidentally changed.
    #[command(alias = "u")]
    Update {
        /// Path to the new note to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the existing encrypted note to replace
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Show how a note was encrypted, without decrypting it
    #[command(alias = "x")]
    Inspect {
        /// Path to the encrypted note
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
}

#[derive(Args)]
#[group(multiple = false)]
struct KdfStrength {
    /// Key derivation iterations
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    iterations: Option<u32>,

    /// Named iteration count
    #[arg(long, value_enum)]
    preset: Option<IterationPreset>,
}

impl KdfStrength {
    fn iterations(&self) -> u32 {
        match (self.iterations, self.preset) {
            (Some(n), _) => n,
            (None, Some(preset)) => preset.iterations(),
            (None, None) => DEFAULT_ITERATIONS,
        }
    }
}

#[derive(Args)]
struct LimitArgs {
    /// Refuse envelopes that ask for more key derivation iterations than this
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_iterations: Option<u32>,
}

impl LimitArgs {
    fn limits(&self) -> Limits {
        let defaults = Limits::default();
        Limits {
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            ..defaults
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Encrypt {
            input,
            output,
            strength,
            no_compress,
            metadata,
        } => {
            let options = EncryptOptions {
                iterations: strength.iterations(),
                compress: !no_compress,
                include_metadata: metadata,
            };
            let mut source = NewPassword::new(password_source(cli.password_stdin, true));
            file_ops::encrypt_file(&input, &output, &mut source, &options)
        }
        Commands::Decrypt {
            input,
            output,
            limits,
        } => {
            let mut source = password_source(cli.password_stdin, false);
            file_ops::decrypt_file(&input, &output, &mut *source, &limits.limits())
        }
        Commands::Update {
            input,
            output,
            limits,
        } => {
            let mut source = password_source(cli.password_stdin, false);
            file_ops::update_file(&input, &output, &mut *source, &limits.limits())
        }
        Commands::Inspect { input } => file_ops::inspect_file(&input).map(|inspection| {
            println!("{}", inspection);
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", error_chain(&e));
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

fn password_source(use_stdin: bool, confirm: bool) -> Box<dyn PasswordSource> {
    if use_stdin {
        Box::new(StreamPassword::new(std::io::stdin()))
    } else if confirm {
        Box::new(TerminalPassword::confirming())
    } else {
        Box::new(TerminalPassword::new())
    }
}
