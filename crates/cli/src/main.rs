use clap::{Parser, Subcommand};
use retention_core::client::{HttpPredictionClient, PredictionClient};
use retention_core::domain::contract::PredictionRequest;
use retention_core::export::ExportArtifact;
use retention_core::render;
use retention_core::session::{Persisted, PredictionSession};
use retention_core::storage::{FileBackend, HistoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "retention_cli")]
struct Args {
    /// Directory holding the persisted prediction history. Overrides HISTORY_DIR.
    #[arg(long, global = true)]
    history_dir: Option<PathBuf>,

    /// Directory exported files are written to.
    #[arg(long, global = true, default_value = ".")]
    out_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Request a prediction and add it to history.
    Predict {
        #[arg(long)]
        name: String,

        #[arg(long)]
        age: i64,

        #[arg(long)]
        attendance_rate: i64,

        #[arg(long)]
        academic_percentage: i64,

        /// 1 if the student takes part in extracurricular activities.
        #[arg(long, default_value_t = 0)]
        activities: i64,

        /// Also write the single-prediction text report.
        #[arg(long)]
        download_report: bool,
    },

    /// Show the stored prediction history.
    History,

    /// Write the stored history as CSV.
    ExportHistory,

    /// Check that the prediction server is up.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = retention_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let history_dir = args
        .history_dir
        .clone()
        .unwrap_or_else(|| settings.history_dir.clone());
    let store = HistoryStore::open(Arc::new(FileBackend::open(&history_dir)?));
    let mut session = PredictionSession::open(store);

    let result = run(&args, &settings, &mut session).await;
    session.close();

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %err, "command failed");
    }
    result
}

async fn run(
    args: &Args,
    settings: &retention_core::config::Settings,
    session: &mut PredictionSession,
) -> anyhow::Result<()> {
    match &args.command {
        Command::Predict {
            name,
            age,
            attendance_rate,
            academic_percentage,
            activities,
            download_report,
        } => {
            let request = PredictionRequest {
                name: name.clone(),
                age: *age,
                attendance_rate: *attendance_rate,
                academic_percentage: *academic_percentage,
                activities_participation: *activities,
            };
            request.validate()?;

            let client = HttpPredictionClient::from_settings(settings)?;
            let record = client.predict(&request).await?;
            tracing::info!(
                student = %record.student_name,
                status = %record.retention_status,
                "prediction received"
            );

            println!("{}", record.retention_status);
            println!();
            println!("Student Summary");
            for (label, value) in render::render_summary(&record) {
                println!("{label}: {value}");
            }

            if let Persisted::NotSaved(reason) = session.record_prediction(record) {
                println!();
                println!("Note: prediction was not saved to history ({reason}).");
            }

            println!();
            println!("{}", render::render_table(&session.rows()));

            if *download_report {
                emit(session.export_single_report(), &args.out_dir)?;
            }
        }
        Command::History => {
            println!("{}", render::render_table(&session.rows()));
        }
        Command::ExportHistory => {
            emit(session.export_history_report(), &args.out_dir)?;
        }
        Command::Health => {
            let client = HttpPredictionClient::from_settings(settings)?;
            let health = client.health().await?;
            println!(
                "status: {}, model available: {}",
                health.status, health.model_available
            );
        }
    }

    Ok(())
}

/// Writes the artifact, or prints the advisory message when there is
/// nothing to export.
fn emit<E: std::fmt::Display>(
    artifact: Result<ExportArtifact, E>,
    out_dir: &Path,
) -> anyhow::Result<()> {
    match artifact {
        Ok(artifact) => {
            let path = artifact.write_to_dir(out_dir)?;
            tracing::info!(path = %path.display(), "export written");
            println!("Saved {}", path.display());
        }
        Err(advisory) => println!("{advisory}"),
    }
    Ok(())
}

fn init_sentry(settings: &retention_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_predict_flags() {
        let args = Args::parse_from([
            "retention_cli",
            "--out-dir",
            "reports",
            "predict",
            "--name",
            "Ana",
            "--age",
            "19",
            "--attendance-rate",
            "80",
            "--academic-percentage",
            "75",
            "--activities",
            "1",
            "--download-report",
        ]);
        assert_eq!(args.out_dir, PathBuf::from("reports"));
        match args.command {
            Command::Predict {
                name,
                activities,
                download_report,
                ..
            } => {
                assert_eq!(name, "Ana");
                assert_eq!(activities, 1);
                assert!(download_report);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn activities_defaults_to_zero() {
        let args = Args::parse_from([
            "retention_cli",
            "predict",
            "--name",
            "Ana",
            "--age",
            "19",
            "--attendance-rate",
            "80",
            "--academic-percentage",
            "75",
        ]);
        assert!(matches!(args.command, Command::Predict { activities: 0, .. }));
    }

    #[test]
    fn history_dir_is_global() {
        let args = Args::parse_from(["retention_cli", "export-history", "--history-dir", "/tmp/h"]);
        assert_eq!(args.history_dir, Some(PathBuf::from("/tmp/h")));
        assert!(matches!(args.command, Command::ExportHistory));
    }

    #[test]
    fn advisory_export_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        emit(
            retention_core::export::export_single_report(None),
            &out,
        )
        .unwrap();
        assert!(!out.exists());
    }
}
