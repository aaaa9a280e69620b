//! stackc - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stackc::backends::TargetPlatform;
use stackc::util::{config, logger};
use stackc::{compile_file, default_output_path, run_file, write_artifact, OutputFormat, NAME, VERSION};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Compile stack IR to JVM class files or x86 assembly
#[derive(Parser, Debug)]
#[command(name = "stackc")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./stackc.toml, then the user config)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile the entry routine into a class file
    Jvm {
        /// IR file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output path (defaults to <class name>.class next to the input)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,

        /// Internal name of the generated class
        #[arg(long)]
        class_name: Option<String>,

        /// Omit the LocalVariableTable
        #[arg(long)]
        no_debug_info: bool,
    },

    /// Compile every function into x86 assembly
    X86 {
        /// IR file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output path; `-` prints to stdout (defaults to <input>.s)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,

        /// Symbol convention: UNIX or WIN
        #[arg(long)]
        platform: Option<TargetPlatform>,
    },

    /// Run the IR on the reference interpreter, one integer per stdin line
    Run {
        /// IR file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = config::load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if args.verbose {
        logger::init_verbose();
    } else {
        logger::init_with_level(config.log.level);
    }
    tracing::debug!("{} {} on {}", NAME, VERSION, std::env::consts::OS);

    match args.command {
        Commands::Jvm {
            file,
            output,
            class_name,
            no_debug_info,
        } => {
            if let Some(class_name) = class_name {
                config.managed.class_name = class_name;
            }
            if no_debug_info {
                config.managed.debug_info = false;
            }
            let artifact = compile_file(&file, OutputFormat::Jvm, &config)?;
            let output = output.unwrap_or_else(|| default_output_path(&file, OutputFormat::Jvm, &config));
            write_artifact(&artifact, &output)?;
        }
        Commands::X86 {
            file,
            output,
            platform,
        } => {
            if let Some(platform) = platform {
                config.native.platform = platform;
            }
            let artifact = compile_file(&file, OutputFormat::X86, &config)?;
            match output {
                Some(path) if path.as_os_str() == "-" => {
                    io::stdout()
                        .write_all(artifact.as_bytes())
                        .context("Failed to write to stdout")?;
                }
                Some(path) => write_artifact(&artifact, &path)?,
                None => {
                    let path = default_output_path(&file, OutputFormat::X86, &config);
                    write_artifact(&artifact, &path)?;
                }
            }
        }
        Commands::Run { file } => {
            let input = read_input().context("Failed to read stdin")?;
            let output = run_file(&file, &input)?;
            let mut stdout = io::stdout().lock();
            for value in output {
                writeln!(stdout, "{}", value)?;
            }
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}

/// Integers from stdin, one per non-blank line
fn read_input() -> Result<Vec<i32>> {
    let mut values = Vec::new();
    for (number, line) in io::stdin().lock().lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = line
            .parse()
            .with_context(|| format!("line {}: `{}` is not an integer", number + 1, line))?;
        values.push(value);
    }
    Ok(values)
}
