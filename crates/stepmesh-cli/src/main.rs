//! `stepmesh` command-line frontend.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stepmesh::config::{DEFAULT_ANGULAR_DEFLECTION, DEFAULT_LINEAR_DEFLECTION};
use stepmesh::{ToleranceConfig, TerminalProgress};

/// Convert a STEP model to glTF, GLB, OBJ, or binary STL.
///
/// The output format is inferred from the output file extension.
#[derive(Debug, Parser)]
#[command(name = "stepmesh", version, about, max_term_width = 100)]
struct Cli {
    /// Input STEP file.
    input: PathBuf,

    /// Output file (.gltf, .glb, .obj or .stl).
    output: PathBuf,

    /// Linear (chordal) deflection in model units.
    #[arg(long, value_name = "FLOAT", default_value_t = DEFAULT_LINEAR_DEFLECTION)]
    linear: f64,

    /// Angular deflection in radians.
    #[arg(long, value_name = "FLOAT", default_value_t = DEFAULT_ANGULAR_DEFLECTION)]
    angular: f64,

    /// Print stage banners.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    // Help and usage errors share the fatal exit code; only a completed
    // conversion exits 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config =
        ToleranceConfig::new(cli.linear, cli.angular).with_verbosity(cli.verbose);
    let progress = TerminalProgress::new();
    stepmesh::pipeline::convert(&cli.input, &cli.output, &config, &progress)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_declaration() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_match_library() {
        let cli = Cli::try_parse_from(["stepmesh", "in.step", "out.glb"]).unwrap();
        assert_eq!(cli.linear, 0.1);
        assert_eq!(cli.angular, 0.5);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_rejects_missing_positional() {
        assert!(Cli::try_parse_from(["stepmesh", "in.step"]).is_err());
        assert!(Cli::try_parse_from(["stepmesh"]).is_err());
    }

    #[test]
    fn test_rejects_unknown_flag() {
        assert!(Cli::try_parse_from(["stepmesh", "--frobnicate", "a", "b"]).is_err());
    }
}
