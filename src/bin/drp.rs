//! `edrp`: run a reduction recipe from the command line.

use clap::Parser;
use colored::Colorize;
use echelle_drp::config::DrpConfig;
use echelle_drp::controller::PipelineController;
use echelle_drp::recipe::RecipeOutcome;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "edrp", version, about = "Echelle spectrograph data reduction pipeline")]
struct Cli {
    /// Recipe file (JSON) to execute.
    #[arg(short, long)]
    recipe: PathBuf,

    /// Pipeline configuration file (JSON). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force debug-level logging, regardless of the configured level.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match DrpConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{} {}", "error:".red().bold(), err);
                return ExitCode::FAILURE;
            }
        },
        None => DrpConfig::default(),
    };
    if cli.verbose {
        config.log_verbose = true;
    }
    if let Err(err) = config.init_logging() {
        eprintln!("{} {}", "error:".red().bold(), err);
        return ExitCode::FAILURE;
    }

    let controller = PipelineController::new(config);
    match controller.run_recipe_file(&cli.recipe) {
        Ok(report) => {
            match &report.outcome {
                RecipeOutcome::Succeeded => {
                    println!(
                        "{} recipe '{}' completed ({} steps)",
                        "ok:".green().bold(),
                        report.recipe,
                        report.steps.len()
                    );
                }
                RecipeOutcome::Aborted { failed_step } => {
                    let step = &report.steps[*failed_step];
                    eprintln!(
                        "{} recipe '{}' aborted at step {} ('{}'): {}",
                        "failed:".red().bold(),
                        report.recipe,
                        failed_step,
                        step.primitive,
                        step.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            ExitCode::from(PipelineController::exit_code(&report) as u8)
        }
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}
