use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use map2dae::{logging, ConvertConfig, Converter, MaterialPolicy};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Converts a mapgen2 XML map to a COLLADA terrain mesh",
    override_usage = "map2dae -o <OUTFILE> <MAP_XML>"
)]
struct Cli {
    /// mapgen2 XML map to convert
    map: PathBuf,

    /// Write the DAE document to OUTFILE
    #[arg(short, long, value_name = "OUTFILE")]
    outfile: Option<PathBuf>,

    /// YAML conversion settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the elevation multiplier
    #[arg(long)]
    z_scale: Option<f64>,

    /// Which palette materials to emit
    #[arg(long, value_enum)]
    materials: Option<MaterialPolicy>,

    /// Write a JSON conversion summary to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log filter, e.g. `debug` (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    if !cli.map.is_file() {
        return usage_failure(&format!(
            "Input file '{}' is not a valid file.",
            cli.map.display()
        ));
    }
    let Some(outfile) = cli.outfile.clone() else {
        return usage_failure("Must specify an output file.");
    };

    match run(&cli, &outfile) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn usage_failure(message: &str) -> ExitCode {
    let _ = Cli::command().print_help();
    eprintln!("{message}");
    ExitCode::FAILURE
}

fn run(cli: &Cli, outfile: &Path) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ConvertConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ConvertConfig::default(),
    };
    if let Some(z) = cli.z_scale {
        config.scale.z = z;
    }
    if let Some(materials) = cli.materials {
        config.materials = materials;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;
    logging::init_logging(Some(&config.logging.level));

    let converter = Converter::new(config);
    let graph = converter
        .load(&cli.map)
        .with_context(|| format!("Failed to load map {}", cli.map.display()))?;

    let generator = graph.generator();
    println!(
        "Generated map file created on '{}' via URL '{}'.",
        generator.timestamp.as_deref().unwrap_or("unknown"),
        generator.url.as_deref().unwrap_or("unknown")
    );
    println!("Found {} centers.", graph.centers().len());
    println!("Found {} corners.", graph.corners().len());
    println!("Found {} edges.", graph.edges().len());

    let report = converter
        .convert_graph(&graph, outfile)
        .with_context(|| format!("Failed to convert {}", cli.map.display()))?;

    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }
    Ok(())
}
