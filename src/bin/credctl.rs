//! Operator tasks for the credentialing service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use credentialing_service::config::Config;
use credentialing_service::db::{self, applications};
use credentialing_service::pipeline::{DocumentImager, PdfiumRenderer, worker};
use credentialing_service::status::compute_progress;
use credentialing_service::telemetry::init_cli_logging;
use credentialing_service::{AppState, llm, report};

#[derive(Parser)]
#[command(name = "credctl")]
#[command(about = "Maintenance commands for the credentialing service database")]
struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Recompute application progress from the review statuses
    BackfillProgress {
        /// Print the changes without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Write credentialing reports as markdown files
    RenderReports {
        /// Output directory
        #[arg(short, long, default_value = "reports")]
        out: PathBuf,

        /// Only this application
        #[arg(short, long)]
        app: Option<String>,

        /// Also write the short summary
        #[arg(short, long)]
        summary: bool,
    },
    /// Run waiting documents through the verification pipeline once
    ProcessDocuments {
        /// Maximum number of documents to process
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}

async fn build_state(config: Config) -> anyhow::Result<AppState> {
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let llm_client = Arc::new(llm::client_from_config(&config));
    let renderer = PdfiumRenderer::new(config.pdfium_library_path.clone(), config.render_dpi);

    Ok(AppState {
        pool,
        llm_client,
        imager: DocumentImager::new(Arc::new(renderer)),
        config,
    })
}

async fn backfill_progress(state: &AppState, dry_run: bool) -> anyhow::Result<()> {
    let mut changed = 0;
    for app in applications::list_applications(&state.pool).await? {
        let progress = compute_progress(Some(app.psv_status.as_str()), Some(app.committee_status.as_str()));
        if progress == app.progress {
            continue;
        }
        println!(
            "{}\t{}/{}\t{} -> {}",
            app.id, app.psv_status, app.committee_status, app.progress, progress
        );
        if !dry_run {
            applications::update_progress(&state.pool, &app.id, progress).await?;
        }
        changed += 1;
    }

    let verb = if dry_run { "would change" } else { "changed" };
    println!("{changed} application(s) {verb}");
    Ok(())
}

async fn render_reports(
    state: &AppState,
    out: PathBuf,
    app: Option<String>,
    summary: bool,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;

    let ids = match app {
        Some(id) => vec![id],
        None => applications::list_applications(&state.pool)
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect(),
    };

    let mut failures = 0;
    for id in &ids {
        match report::generate_credentialing_report(&state.pool, state.report_enhancer(), id).await {
            Ok(result) => {
                let path = out.join(format!("{id}.md"));
                tokio::fs::write(&path, &result.markdown).await?;
                println!("{}", path.display());
            }
            Err(e) => {
                tracing::warn!(app_id = %id, error = %e, "Skipping report");
                failures += 1;
                continue;
            }
        }

        if summary {
            let result = report::generate_short_summary(&state.pool, id).await?;
            let path = out.join(format!("{id}_summary.md"));
            tokio::fs::write(&path, &result.markdown).await?;
            println!("{}", path.display());
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} report(s) failed", ids.len());
    }
    Ok(())
}

async fn process_documents(state: &AppState, limit: usize) -> anyhow::Result<()> {
    let results = worker::drain(state, limit).await?;
    for (id, outcome) in &results {
        println!("{id}\t{}", outcome.as_str());
    }
    println!("{} document(s) processed", results.len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_cli_logging();

    let mut config = Config::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command {
        Commands::Migrate => {
            let pool = db::create_pool(&config.database_url).await?;
            db::run_migrations(&pool).await?;
            println!("migrations applied");
        }
        Commands::BackfillProgress { dry_run } => {
            let state = build_state(config).await?;
            backfill_progress(&state, dry_run).await?;
        }
        Commands::RenderReports { out, app, summary } => {
            let state = build_state(config).await?;
            render_reports(&state, out, app, summary).await?;
        }
        Commands::ProcessDocuments { limit } => {
            let state = build_state(config).await?;
            process_documents(&state, limit).await?;
        }
    }

    Ok(())
}
