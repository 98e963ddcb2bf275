// Panel renderer - Concurrent panel image fetching with retry and failure isolation
use crate::application::dashboard_repository::{DashboardRepository, PanelRequest};
use crate::domain::dashboard::{Dashboard, Panel};
use crate::domain::error::{AggregateRenderError, PanelFailure, PanelFetchError, ReportError};
use crate::domain::time_range::TimeRange;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Size panels from their grid position instead of fixed per-type sizes
    pub grid_layout: bool,
    /// Total attempts per panel, including the first one
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Panels rendered at the same time
    pub max_workers: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            grid_layout: false,
            max_attempts: 3,
            retry_delay: Duration::from_secs(10),
            max_workers: 8,
        }
    }
}

/// Image file of one panel, `None` when the panel failed to render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub panel_id: u64,
    pub path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct RenderOutcome {
    /// One entry per dashboard panel, in dashboard order
    pub images: Vec<RenderedImage>,
    pub error: Option<AggregateRenderError>,
}

impl RenderOutcome {
    pub fn image_path(&self, panel_id: u64) -> Option<&Path> {
        self.images
            .iter()
            .find(|image| image.panel_id == panel_id)
            .and_then(|image| image.path.as_deref())
    }
}

pub struct PanelRenderer {
    repository: Arc<dyn DashboardRepository>,
    config: RendererConfig,
    cancel: CancellationToken,
}

impl PanelRenderer {
    pub fn new(repository: Arc<dyn DashboardRepository>, config: RendererConfig) -> Self {
        Self {
            repository,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Render every panel of `dashboard` into `images_dir` as `image<id>.png`.
    ///
    /// All panels are attempted even when some of them fail; failures are
    /// collected into `RenderOutcome::error`. Only cancellation and failing to
    /// create `images_dir` abort the whole render. Dropping the returned
    /// future aborts every panel task still running.
    pub async fn render_all(
        &self,
        dashboard: &Dashboard,
        dashboard_name: &str,
        time_range: &TimeRange,
        images_dir: &Path,
    ) -> Result<RenderOutcome, ReportError> {
        tokio::fs::create_dir_all(images_dir).await?;

        let workers = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        for (index, panel) in dashboard.panels().iter().enumerate() {
            let unit = RenderUnit {
                repository: self.repository.clone(),
                config: self.config.clone(),
                cancel: self.cancel.clone(),
                panel: panel.clone(),
                dashboard_name: dashboard_name.to_string(),
                time_range: time_range.clone(),
                path: images_dir.join(panel.image_file_name()),
            };
            let workers = workers.clone();
            tasks.spawn(async move { (index, unit.run(workers).await) });
        }

        let mut results: Vec<Option<Result<PathBuf, PanelFetchError>>> =
            vec![None; dashboard.panels().len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => tracing::error!("Render task of dashboard {} failed: {}", dashboard_name, e),
            }
        }

        if results
            .iter()
            .any(|result| matches!(result, Some(Err(PanelFetchError::Cancelled))))
        {
            tracing::warn!("Rendering of dashboard {} was cancelled", dashboard_name);
            return Err(ReportError::Cancelled);
        }

        let mut images = Vec::with_capacity(results.len());
        let mut failures = Vec::new();

        for (panel, result) in dashboard.panels().iter().zip(results) {
            let result = result.unwrap_or_else(|| {
                Err(PanelFetchError::Permanent("render task failed".to_string()))
            });

            match result {
                Ok(path) => images.push(RenderedImage {
                    panel_id: panel.id,
                    path: Some(path),
                }),
                Err(error) => {
                    tracing::error!(
                        "Failed to render panel {} of dashboard {}: {}",
                        panel.id,
                        dashboard_name,
                        error
                    );
                    images.push(RenderedImage {
                        panel_id: panel.id,
                        path: None,
                    });
                    failures.push(PanelFailure {
                        panel_id: panel.id,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            "Rendered {}/{} panels of dashboard {}",
            images.len() - failures.len(),
            images.len(),
            dashboard_name
        );

        let error = (!failures.is_empty()).then(|| AggregateRenderError {
            total_panels: images.len(),
            failures,
        });

        Ok(RenderOutcome { images, error })
    }
}

/// Work for a single panel, owned by its task.
struct RenderUnit {
    repository: Arc<dyn DashboardRepository>,
    config: RendererConfig,
    cancel: CancellationToken,
    panel: Panel,
    dashboard_name: String,
    time_range: TimeRange,
    path: PathBuf,
}

impl RenderUnit {
    async fn run(self, workers: Arc<Semaphore>) -> Result<PathBuf, PanelFetchError> {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PanelFetchError::Cancelled),
            permit = workers.acquire_owned() => {
                permit.map_err(|e| PanelFetchError::Permanent(e.to_string()))?
            }
        };

        let png = self.fetch_with_retry().await?;

        tokio::fs::write(&self.path, &png).await.map_err(|e| {
            PanelFetchError::Permanent(format!("failed to write {}: {}", self.path.display(), e))
        })?;

        Ok(self.path)
    }

    async fn fetch_with_retry(&self) -> Result<Bytes, PanelFetchError> {
        let request = PanelRequest {
            panel: &self.panel,
            dashboard_name: &self.dashboard_name,
            time_range: &self.time_range,
            size: self.panel.render_size(self.config.grid_layout),
        };
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PanelFetchError::Cancelled),
                result = self.repository.fetch_panel_png(request) => result,
            };

            match result {
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        "Panel {} attempt {}/{} failed, retrying in {:?}: {}",
                        self.panel.id,
                        attempt,
                        max_attempts,
                        self.config.retry_delay,
                        error
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(PanelFetchError::Cancelled),
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                    attempt += 1;
                }
                Err(PanelFetchError::Transient(reason)) => {
                    return Err(PanelFetchError::Permanent(format!(
                        "giving up after {} attempts: {}",
                        attempt, reason
                    )));
                }
                other => return other,
            }
        }
    }
}
