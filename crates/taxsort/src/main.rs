// SPDX-FileCopyrightText: 2026 Taxsort Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Taxsort - tax document classification and reclassification.
//!
//! This is the binary entry point.

mod app;
mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use taxsort_agent::JobPayload;
use taxsort_config::model::TaxsortConfig;
use taxsort_core::{CategoryId, FileId, ProjectId, TaxsortError};

use crate::app::App;

/// Taxsort - sorts tax documents into twenty categories.
#[derive(Parser, Debug)]
#[command(name = "taxsort", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the XDG lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage projects and their files.
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Preprocess, classify and merge a project's documents.
    Classify { project_id: ProjectId },
    /// Show the current classification results of a project.
    Results {
        project_id: ProjectId,
        /// Also write a JSON results report into this directory.
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },
    /// Reclassify files from a natural-language instruction.
    Reclassify {
        project_id: ProjectId,
        /// The instruction, e.g. "move the rental contract to category 9".
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
        /// Keep the existing merged document.
        #[arg(long)]
        no_pdf: bool,
    },
    /// Apply explicit category changes.
    Apply {
        project_id: ProjectId,
        /// FILE_ID=CATEGORY_ID, repeatable.
        #[arg(long = "update", required = true, value_parser = commands::parse_update)]
        updates: Vec<(FileId, CategoryId)>,
        /// Reason recorded in each file's reasoning trail.
        #[arg(long)]
        reasoning: Option<String>,
        /// Keep the existing merged document.
        #[arg(long)]
        no_pdf: bool,
    },
    /// Rebuild the merged document.
    Merge { project_id: ProjectId },
    /// Rebuild the memory snapshot from the persistent store.
    Resync { project_id: ProjectId },
    /// Queue a job for the worker.
    #[command(subcommand)]
    Enqueue(EnqueueCommand),
    /// Run the job worker.
    Worker {
        /// Exit once the queue is empty.
        #[arg(long)]
        drain: bool,
    },
    /// Check credentials and the category catalog.
    Validate,
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// Create a project.
    Create { name: String },
    /// Register files with a project.
    AddFile {
        project_id: ProjectId,
        #[arg(required = true, num_args = 1..)]
        paths: Vec<PathBuf>,
    },
    /// List projects.
    List,
}

#[derive(Subcommand, Debug)]
enum EnqueueCommand {
    Classify {
        project_id: ProjectId,
    },
    Reclassify {
        project_id: ProjectId,
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
        #[arg(long)]
        no_pdf: bool,
    },
    Apply {
        project_id: ProjectId,
        #[arg(long = "update", required = true, value_parser = commands::parse_update)]
        updates: Vec<(FileId, CategoryId)>,
        #[arg(long)]
        reasoning: Option<String>,
        #[arg(long)]
        no_pdf: bool,
    },
    Resync {
        project_id: ProjectId,
    },
}

impl EnqueueCommand {
    fn into_payload(self) -> JobPayload {
        match self {
            Self::Classify { project_id } => JobPayload::Classify { project_id },
            Self::Reclassify {
                project_id,
                prompt,
                no_pdf,
            } => JobPayload::Reclassify {
                project_id,
                prompt: prompt.join(" "),
                regenerate_pdf: !no_pdf,
            },
            Self::Apply {
                project_id,
                updates,
                reasoning,
                no_pdf,
            } => JobPayload::Apply {
                project_id,
                updates: updates
                    .into_iter()
                    .map(|(file_id, category)| {
                        let update = taxsort_reclassify::ReclassificationUpdate::new(file_id, category);
                        match &reasoning {
                            Some(reasoning) => update.with_reasoning(reasoning.as_str()),
                            None => update,
                        }
                    })
                    .collect(),
                regenerate_pdf: !no_pdf,
            },
            Self::Resync { project_id } => JobPayload::Resync { project_id },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => taxsort_config::load_and_validate_path(path),
        None => taxsort_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            taxsort_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.agent.log_level);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("taxsort: error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: TaxsortConfig) -> Result<(), TaxsortError> {
    let app = App::open(config).await?;
    let result = dispatch(&app, command).await;
    app.close().await;
    result
}

async fn dispatch(app: &App, command: Commands) -> Result<(), TaxsortError> {
    match command {
        Commands::Project(ProjectCommand::Create { name }) => {
            print_json(&commands::create_project(app, &name).await?)
        }
        Commands::Project(ProjectCommand::AddFile { project_id, paths }) => {
            print_json(&commands::add_files(app, project_id, &paths).await?)
        }
        Commands::Project(ProjectCommand::List) => print_json(&commands::list_projects(app).await?),
        Commands::Classify { project_id } => print_json(&commands::classify(app, project_id).await?),
        Commands::Results {
            project_id,
            report_dir,
        } => print_json(&commands::results(app, project_id, report_dir.as_deref()).await?),
        Commands::Reclassify {
            project_id,
            prompt,
            no_pdf,
        } => print_json(
            &commands::reclassify(app, project_id, &prompt.join(" "), !no_pdf).await?,
        ),
        Commands::Apply {
            project_id,
            updates,
            reasoning,
            no_pdf,
        } => print_json(
            &commands::apply(app, project_id, &updates, reasoning.as_deref(), !no_pdf).await?,
        ),
        Commands::Merge { project_id } => print_json(&commands::merge(app, project_id).await?),
        Commands::Resync { project_id } => {
            print_json(&commands::resync_project(app, project_id).await?)
        }
        Commands::Enqueue(job) => print_json(&commands::enqueue(app, &job.into_payload()).await?),
        Commands::Worker { drain } => print_json(&commands::worker(app, drain).await?),
        Commands::Validate => {
            let validation = commands::validate(app);
            print_json(&validation)?;
            if validation.valid {
                Ok(())
            } else {
                Err(TaxsortError::Config(format!(
                    "{} problem(s) found",
                    validation.problems.len()
                )))
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), TaxsortError> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| TaxsortError::Internal(format!("output serialization: {e}")))?;
    println!("{body}");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr so stdout carries only command output.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("taxsort={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
