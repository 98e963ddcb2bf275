// Error taxonomy shared by the report pipeline
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("malformed time expression: {0:?}")]
    MalformedTimeExpression(String),

    #[error("dashboard {0:?} not found")]
    DashboardNotFound(String),

    #[error("failed to fetch dashboard {dashboard:?}: {reason}")]
    DashboardFetchFailed { dashboard: String, reason: String },

    #[error(transparent)]
    PanelRender(#[from] AggregateRenderError),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("report generation was cancelled")]
    Cancelled,

    #[error("document compilation failed: {0}")]
    Compile(String),

    #[error("report task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single panel image fetch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PanelFetchError {
    /// Retryable, e.g. a server-side fault or a dropped connection.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),

    #[error("cancelled")]
    Cancelled,
}

impl PanelFetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PanelFetchError::Transient(_))
    }
}

#[derive(Debug, Clone)]
pub struct PanelFailure {
    pub panel_id: u64,
    pub error: PanelFetchError,
}

/// Every permanent panel failure of one render, in dashboard order.
#[derive(Debug, Clone)]
pub struct AggregateRenderError {
    pub total_panels: usize,
    pub failures: Vec<PanelFailure>,
}

impl fmt::Display for AggregateRenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} panels failed to render",
            self.failures.len(),
            self.total_panels
        )?;
        if let Some(first) = self.failures.first() {
            write!(f, "; panel {}: {}", first.panel_id, first.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateRenderError {}
