// Report service - Builds one report in its own working directory
use crate::application::dashboard_repository::DashboardRepository;
use crate::application::document::{render_document, DocumentContext, DEFAULT_TEMPLATE};
use crate::application::panel_renderer::{PanelRenderer, RenderOutcome, RenderedImage, RendererConfig};
use crate::domain::dashboard::Dashboard;
use crate::domain::error::ReportError;
use crate::domain::time_range::{ResolvedRange, TimeRange};
use chrono::{DateTime, Local, TimeZone};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const IMAGES_DIR: &str = "images";
const TEX_FILE: &str = "report.tex";

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub renderer: RendererConfig,
    /// Document template replacing the built-in one
    pub template: Option<String>,
    /// Directory under which per-report working directories are created
    pub work_root: PathBuf,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            renderer: RendererConfig::default(),
            template: None,
            work_root: std::env::temp_dir(),
        }
    }
}

#[derive(Debug)]
pub struct RenderedReport {
    pub tex_path: PathBuf,
    pub images: Vec<RenderedImage>,
    /// Panels that failed to render; the document is still usable without them
    pub warning: Option<ReportError>,
}

pub struct Report {
    repository: Arc<dyn DashboardRepository>,
    dashboard_name: String,
    time_range: TimeRange,
    options: ReportOptions,
    work_dir: PathBuf,
    cancel: CancellationToken,
}

impl Report {
    /// Create a report with a fresh, uniquely named working directory.
    pub async fn new(
        repository: Arc<dyn DashboardRepository>,
        dashboard_name: impl Into<String>,
        time_range: TimeRange,
        options: ReportOptions,
    ) -> Result<Self, ReportError> {
        let work_dir = options.work_root.join(format!("report-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&work_dir).await?;
        tracing::debug!("Created report working directory {}", work_dir.display());

        Ok(Self {
            repository,
            dashboard_name: dashboard_name.into(),
            time_range,
            options,
            work_dir,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn images_dir(&self) -> PathBuf {
        self.work_dir.join(IMAGES_DIR)
    }

    pub fn tex_path(&self) -> PathBuf {
        self.work_dir.join(TEX_FILE)
    }

    /// Fetch the dashboard, render its panels and write the document source.
    ///
    /// A bad time range or a dashboard that cannot be fetched fails the
    /// report. Panels that fail to render are left out of the document and
    /// reported through `RenderedReport::warning`.
    pub async fn render(&self) -> Result<RenderedReport, ReportError> {
        self.render_at(&Local::now()).await
    }

    /// `render` with relative time expressions resolved against `now`.
    pub async fn render_at<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Result<RenderedReport, ReportError>
    where
        Tz::Offset: fmt::Display,
    {
        let range = self.time_range.resolve_at(now)?;
        let dashboard = self.fetch_dashboard().await?;

        tracing::info!(
            "Rendering {} panels of dashboard {} ({} to {})",
            dashboard.panels().len(),
            self.dashboard_name,
            self.time_range.from,
            self.time_range.to
        );

        let outcome = self.render_images(&dashboard).await?;
        let tex_path = self.write_document(&dashboard, &outcome, &range).await?;

        let warning = outcome.error.map(ReportError::from);
        if let Some(warning) = &warning {
            tracing::warn!("Report for {} is incomplete: {}", self.dashboard_name, warning);
        }

        Ok(RenderedReport {
            tex_path,
            images: outcome.images,
            warning,
        })
    }

    /// Remove the working directory. Removing it twice is not an error.
    pub async fn clean(&self) -> Result<(), ReportError> {
        match tokio::fs::remove_dir_all(&self.work_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_dashboard(&self) -> Result<Dashboard, ReportError> {
        let body = self.repository.fetch_dashboard(&self.dashboard_name).await?;

        Dashboard::from_json(&body, self.repository.schema(), self.repository.variables()).map_err(
            |e| ReportError::DashboardFetchFailed {
                dashboard: self.dashboard_name.clone(),
                reason: format!("unparsable dashboard JSON: {}", e),
            },
        )
    }

    async fn render_images(&self, dashboard: &Dashboard) -> Result<RenderOutcome, ReportError> {
        PanelRenderer::new(self.repository.clone(), self.options.renderer.clone())
            .with_cancellation(self.cancel.clone())
            .render_all(dashboard, &self.dashboard_name, &self.time_range, &self.images_dir())
            .await
    }

    async fn write_document<Tz: TimeZone>(
        &self,
        dashboard: &Dashboard,
        outcome: &RenderOutcome,
        range: &ResolvedRange<Tz>,
    ) -> Result<PathBuf, ReportError>
    where
        Tz::Offset: fmt::Display,
    {
        let template = self.options.template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
        let ctx = DocumentContext {
            dashboard,
            outcome,
            from: range.from_formatted(),
            to: range.to_formatted(),
        };

        let tex_path = self.tex_path();
        tokio::fs::write(&tex_path, render_document(template, &ctx)).await?;
        Ok(tex_path)
    }
}
