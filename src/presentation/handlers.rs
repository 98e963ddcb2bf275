// HTTP request handlers
use crate::application::report::Report;
use crate::domain::dashboard::{SchemaVersion, Variables};
use crate::domain::error::ReportError;
use crate::domain::time_range::TimeRange;
use crate::infrastructure::config::ReporterConfig;
use crate::infrastructure::grafana_client::GrafanaClient;
use crate::infrastructure::latex::LatexCompiler;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_FROM: &str = "now-1h";
const DEFAULT_TO: &str = "now";
const VARIABLE_PREFIX: &str = "var-";

/// Query parameters of a report request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub time_range: TimeRange,
    pub api_token: Option<String>,
    pub template: Option<String>,
    pub variables: Variables,
}

impl ReportRequest {
    pub fn from_params(params: Vec<(String, String)>) -> Self {
        let mut from = None;
        let mut to = None;
        let mut api_token = None;
        let mut template = None;
        let mut variables = Vec::new();

        for (key, value) in params {
            match key.as_str() {
                "from" => from = Some(value),
                "to" => to = Some(value),
                "apitoken" => api_token = Some(value),
                "template" => template = Some(value),
                k if k.starts_with(VARIABLE_PREFIX) => variables.push((key, value)),
                _ => {}
            }
        }

        Self {
            time_range: TimeRange::new(
                from.unwrap_or_else(|| DEFAULT_FROM.to_string()),
                to.unwrap_or_else(|| DEFAULT_TO.to_string()),
            ),
            api_token,
            template,
            variables,
        }
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = match &self {
            ReportError::MalformedTimeExpression(_) | ReportError::InvalidTemplate(_) => {
                StatusCode::BAD_REQUEST
            }
            ReportError::DashboardNotFound(_) => StatusCode::NOT_FOUND,
            ReportError::DashboardFetchFailed { .. } => StatusCode::BAD_GATEWAY,
            ReportError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!("Report request failed: {}", self);
        (status, self.to_string()).into_response()
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Report for a Grafana v4 dashboard, addressed by slug
pub async fn v4_report(
    State(state): State<Arc<AppState>>,
    Path(dashboard): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ReportError> {
    generate_report(&state, SchemaVersion::V4, dashboard, params).await
}

/// Report for a Grafana v5 dashboard, addressed by uid
pub async fn v5_report(
    State(state): State<Arc<AppState>>,
    Path(dashboard): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ReportError> {
    generate_report(&state, SchemaVersion::V5, dashboard, params).await
}

async fn generate_report(
    state: &AppState,
    schema: SchemaVersion,
    dashboard: String,
    params: Vec<(String, String)>,
) -> Result<Response, ReportError> {
    let request = ReportRequest::from_params(params);
    let grafana = &state.config.grafana;
    let api_token = request
        .api_token
        .clone()
        .unwrap_or_else(|| grafana.api_token.clone());

    let client = GrafanaClient::new(
        &grafana.url,
        api_token,
        request.variables.clone(),
        grafana.ssl_check,
        schema,
    )
    .map_err(|e| ReportError::DashboardFetchFailed {
        dashboard: dashboard.clone(),
        reason: format!("failed to build HTTP client: {}", e),
    })?;

    let template = load_template(&state.config, request.template.as_deref()).await?;
    let report = Report::new(
        Arc::new(client),
        dashboard.clone(),
        request.time_range,
        state.config.report_options(template),
    )
    .await?;

    let pdf = run_report(state.compiler.clone(), report, state.shutdown.child_token()).await?;

    let disposition = format!("inline; filename=\"{}.pdf\"", file_stem(&dashboard));
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response())
}

/// Render, compile and clean up in a task of its own. Dropping the returned
/// future (client gone) cancels the render; the working directory is removed
/// either way.
async fn run_report(
    compiler: LatexCompiler,
    report: Report,
    cancel: CancellationToken,
) -> Result<Vec<u8>, ReportError> {
    let _abandon = cancel.clone().drop_guard();
    let report = report.with_cancellation(cancel);

    let task = tokio::spawn(async move {
        let pdf = build_pdf(&compiler, &report).await;
        if let Err(e) = report.clean().await {
            tracing::warn!("Failed to clean {}: {}", report.work_dir().display(), e);
        }
        pdf
    });

    task.await.map_err(|e| ReportError::Task(e.to_string()))?
}

async fn build_pdf(compiler: &LatexCompiler, report: &Report) -> Result<Vec<u8>, ReportError> {
    let rendered = report.render().await?;
    tracing::info!(
        "Compiling report with {} of {} panel images",
        rendered.images.iter().filter(|image| image.path.is_some()).count(),
        rendered.images.len()
    );
    let pdf_path = compiler.compile(&rendered.tex_path).await?;
    Ok(tokio::fs::read(pdf_path).await?)
}

/// Read `<template_dir>/<name>.tex` for a named template.
async fn load_template(
    config: &ReporterConfig,
    name: Option<&str>,
) -> Result<Option<String>, ReportError> {
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(ReportError::InvalidTemplate(name.to_string()));
    }
    let Some(dir) = &config.report.template_dir else {
        return Err(ReportError::InvalidTemplate(format!(
            "{} (no template directory configured)",
            name
        )));
    };

    let path = dir.join(format!("{}.tex", name));
    match tokio::fs::read_to_string(&path).await {
        Ok(template) => Ok(Some(template)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ReportError::InvalidTemplate(format!("{} not found", name)))
        }
        Err(e) => Err(e.into()),
    }
}

fn file_stem(dashboard: &str) -> String {
    dashboard
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
