// Application state for HTTP handlers
use crate::infrastructure::config::ReporterConfig;
use crate::infrastructure::latex::LatexCompiler;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub config: ReporterConfig,
    pub compiler: LatexCompiler,
    /// Cancelled on shutdown; in-flight reports stop retrying and bail out
    pub shutdown: CancellationToken,
}
