use crate::application::panel_renderer::RendererConfig;
use crate::application::report::ReportOptions;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ReporterConfig {
    pub server: ServerSettings,
    pub grafana: GrafanaSettings,
    pub report: ReportSettings,
    pub renderer: RendererSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub listen: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GrafanaSettings {
    pub url: String,
    pub api_token: String,
    pub ssl_check: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportSettings {
    pub grid_layout: bool,
    /// Directory holding custom `<name>.tex` templates
    pub template_dir: Option<PathBuf>,
    pub work_root: Option<PathBuf>,
    pub latex_program: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RendererSettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_workers: usize,
}

impl ReporterConfig {
    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            grid_layout: self.report.grid_layout,
            max_attempts: self.renderer.max_attempts,
            retry_delay: Duration::from_millis(self.renderer.retry_delay_ms),
            max_workers: self.renderer.max_workers,
        }
    }

    pub fn report_options(&self, template: Option<String>) -> ReportOptions {
        ReportOptions {
            renderer: self.renderer_config(),
            template,
            work_root: self
                .report
                .work_root
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }
}

pub fn load_reporter_config() -> anyhow::Result<ReporterConfig> {
    load_config_from("config/reporter")
}

/// Defaults, then the optional file at `path`, then `REPORTER_*` environment
/// variables (`REPORTER_GRAFANA__URL` sets `grafana.url`).
pub fn load_config_from(path: &str) -> anyhow::Result<ReporterConfig> {
    let settings = config::Config::builder()
        .set_default("server.listen", "0.0.0.0:8686")?
        .set_default("grafana.url", "http://localhost:3000")?
        .set_default("grafana.api_token", "")?
        .set_default("grafana.ssl_check", true)?
        .set_default("report.grid_layout", false)?
        .set_default("report.latex_program", "pdflatex")?
        .set_default("renderer.max_attempts", 3)?
        .set_default("renderer.retry_delay_ms", 10_000)?
        .set_default("renderer.max_workers", 8)?
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("REPORTER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
