use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use retention_core::client::{HttpPredictionClient, PredictionClient, RejectedByServer};
use retention_core::domain::contract::PredictionRequest;
use retention_core::domain::prediction::{HistoryList, PredictionRecord};
use retention_core::export::{ExportArtifact, ExportError};
use retention_core::render::DisplayRow;
use retention_core::session::{Persisted, PredictionSession};
use retention_core::storage::{FileBackend, HistoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = retention_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let client: Option<Arc<dyn PredictionClient>> =
        match HttpPredictionClient::from_settings(&settings) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "prediction client unavailable; starting API in degraded mode");
                None
            }
        };

    let store = HistoryStore::open(Arc::new(FileBackend::open(&settings.history_dir)?));
    let state = AppState::new(PredictionSession::open(store), client);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));

    tracing::info!(%addr, history_dir = %settings.history_dir.display(), "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Ok(session) = Arc::try_unwrap(state.session) {
        if let Ok(session) = session.into_inner() {
            session.close();
        }
    }

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/predict", post(predict))
        .route("/history", get(get_history))
        .route("/history/rows", get(get_history_rows))
        .route("/history.csv", get(download_history))
        .route("/report.txt", get(download_report))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<PredictionSession>>,
    client: Option<Arc<dyn PredictionClient>>,
}

impl AppState {
    fn new(session: PredictionSession, client: Option<Arc<dyn PredictionClient>>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            client,
        }
    }

    fn session(&self) -> Result<MutexGuard<'_, PredictionSession>, ApiError> {
        self.session.lock().map_err(|_| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "session lock poisoned".to_string(),
        })
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        let status = match err {
            ExportError::NoPrediction => StatusCode::CONFLICT,
            ExportError::EmptyHistory => StatusCode::NOT_FOUND,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "message": self.message })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
struct ApiPrediction {
    prediction: PredictionRecord,
    saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<ApiPrediction>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;

    let Some(client) = &state.client else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "prediction server is not configured",
        ));
    };

    let record = client.predict(&request).await.map_err(|e| {
        if let Some(rejected) = e.downcast_ref::<RejectedByServer>() {
            return ApiError::new(StatusCode::BAD_REQUEST, rejected.message.clone());
        }
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %e, "prediction failed");
        ApiError::new(StatusCode::BAD_GATEWAY, "prediction server request failed")
    })?;

    let persisted = state.session()?.record_prediction(record.clone());
    let (saved, note) = match persisted {
        Persisted::Saved => (true, None),
        Persisted::NotSaved(reason) => (false, Some(format!("not saved to history: {reason}"))),
    };

    Ok(Json(ApiPrediction {
        prediction: record,
        saved,
        note,
    }))
}

async fn get_history(State(state): State<AppState>) -> Result<Json<HistoryList>, ApiError> {
    Ok(Json(state.session()?.history()))
}

async fn get_history_rows(
    State(state): State<AppState>,
) -> Result<Json<Vec<DisplayRow>>, ApiError> {
    Ok(Json(state.session()?.rows()))
}

async fn download_report(State(state): State<AppState>) -> Result<Response, ApiError> {
    let artifact = state.session()?.export_single_report()?;
    Ok(attachment(artifact))
}

async fn download_history(State(state): State<AppState>) -> Result<Response, ApiError> {
    let artifact = state.session()?.export_history_report()?;
    Ok(attachment(artifact))
}

fn attachment(artifact: ExportArtifact) -> Response {
    (
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact.filename),
            ),
        ],
        artifact.body,
    )
        .into_response()
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
