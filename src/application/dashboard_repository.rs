// Repository trait for dashboard metadata and rendered panel images
use crate::domain::dashboard::{Panel, PanelSize, SchemaVersion};
use crate::domain::error::{PanelFetchError, ReportError};
use crate::domain::time_range::TimeRange;
use async_trait::async_trait;
use bytes::Bytes;

/// Everything needed to render one panel image.
#[derive(Debug, Clone, Copy)]
pub struct PanelRequest<'a> {
    pub panel: &'a Panel,
    pub dashboard_name: &'a str,
    pub time_range: &'a TimeRange,
    pub size: PanelSize,
}

#[async_trait]
pub trait DashboardRepository: Send + Sync {
    /// Schema of the metadata returned by `fetch_dashboard`
    fn schema(&self) -> SchemaVersion;

    /// Input variables forwarded with every panel request
    fn variables(&self) -> &[(String, String)];

    /// Raw dashboard metadata (JSON)
    async fn fetch_dashboard(&self, dashboard_name: &str) -> Result<Bytes, ReportError>;

    /// Rendered PNG of a single panel
    async fn fetch_panel_png(&self, request: PanelRequest<'_>) -> Result<Bytes, PanelFetchError>;
}
