use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::{sync::Arc, time::{SystemTime, UNIX_EPOCH}};

use crate::error::DiagnosisError;
use crate::pipeline::{AppContext, Diagnosis, PipelineStats};
use crate::types::{ExplanationOutcome, SensorReading};
use crate::visual::{CropRect, VisualOutcome};

// ---------- Response types ----------

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VisualOut {
    Available { rect: CropRect, url: String },
    Unavailable { reason: String },
}

#[derive(Serialize)]
pub struct DiagnoseOut {
    pub t: i64,
    pub stage: usize,
    pub probabilities: Vec<f32>,
    pub visual: VisualOut,
    pub explanation: ExplanationOutcome,
}

impl DiagnoseOut {
    fn from_diagnosis(d: Diagnosis) -> Self {
        let visual = match d.visual {
            VisualOutcome::Available(region) => VisualOut::Available {
                rect: region.rect,
                url: format!("/reference/{}", region.stage),
            },
            VisualOutcome::Unavailable { reason } => VisualOut::Unavailable { reason },
        };
        Self {
            t: now_ms(),
            stage: d.stage,
            probabilities: d.probabilities,
            visual,
            explanation: d.explanation,
        }
    }
}

#[derive(Serialize)]
struct HealthOut {
    status: &'static str,
    reference_image: bool,
    explanations: bool,
    stats: PipelineStats,
}

// ---------- Server state ----------

#[derive(Clone)]
struct AppState {
    ctx: Arc<AppContext>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(e: DiagnosisError) -> ApiError {
    let code = match e {
        DiagnosisError::InvalidReading(_) => StatusCode::BAD_REQUEST,
        DiagnosisError::Inference(_) | DiagnosisError::Configuration(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (code, Json(json!({ "error": e.to_string(), "kind": e.kind() })))
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ---------- Handlers ----------

// Flat body: {"PDT1": .., "PGV2": .., "PDT3": .., "ATB1": .., "ATB2": ..}
async fn diagnose(
    State(state): State<AppState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<DiagnoseOut>, ApiError> {
    let Json(body) = payload
        .map_err(|rej| api_error(DiagnosisError::InvalidReading(rej.body_text())))?;
    let reading = SensorReading::from_json(&body).map_err(api_error)?;
    let d = state.ctx.diagnose(&reading).await.map_err(api_error)?;
    tracing::info!(
        stage = d.stage,
        explanation_parsed = d.explanation.is_parsed(),
        "diagnosis complete"
    );
    Ok(Json(DiagnoseOut::from_diagnosis(d)))
}

async fn reference(State(state): State<AppState>, Path(stage): Path<usize>) -> Response {
    let Some(reference) = state.ctx.reference.as_ref() else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "reference image not found" })))
            .into_response();
    };
    let classes = state.ctx.classifier.class_count();
    if stage >= classes {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": format!("stage {} outside 0..{}", stage, classes) })))
            .into_response();
    }
    let Some(region) = reference.crop_for_stage(stage) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": format!("no reference cell for stage {}", stage) })))
            .into_response();
    };
    match region.to_png() {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(e) => {
            tracing::error!(stage, error = %e, "png encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    Json(HealthOut {
        status: "ok",
        reference_image: state.ctx.reference.is_some(),
        explanations: state.ctx.explainer.is_enabled(),
        stats: state.ctx.stats(),
    })
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/diagnose", post(diagnose))
        .route("/reference/:stage", get(reference))
        .route("/health", get(health))
        .with_state(AppState { ctx })
}
