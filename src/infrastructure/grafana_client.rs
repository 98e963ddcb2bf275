// Grafana HTTP API implementation of the dashboard repository
use crate::application::dashboard_repository::{DashboardRepository, PanelRequest};
use crate::domain::dashboard::{SchemaVersion, Variables};
use crate::domain::error::{PanelFetchError, ReportError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{RequestBuilder, StatusCode};

#[derive(Debug, Clone)]
pub struct GrafanaClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    variables: Variables,
    schema: SchemaVersion,
}

impl GrafanaClient {
    pub fn new(
        base_url: &str,
        api_token: impl Into<String>,
        variables: Variables,
        ssl_check: bool,
        schema: SchemaVersion,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!ssl_check)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            variables,
            schema,
        })
    }

    fn dashboard_url(&self, dashboard_name: &str) -> String {
        let name = urlencoding::encode(dashboard_name);
        match self.schema {
            SchemaVersion::V4 => format!("{}/api/dashboards/db/{}", self.base_url, name),
            SchemaVersion::V5 => format!("{}/api/dashboards/uid/{}", self.base_url, name),
        }
    }

    fn panel_url(&self, dashboard_name: &str) -> String {
        let name = urlencoding::encode(dashboard_name);
        match self.schema {
            SchemaVersion::V4 => format!("{}/render/dashboard-solo/db/{}", self.base_url, name),
            SchemaVersion::V5 => format!("{}/render/d-solo/{}/_", self.base_url, name),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_token)
        }
    }
}

#[async_trait]
impl DashboardRepository for GrafanaClient {
    fn schema(&self) -> SchemaVersion {
        self.schema
    }

    fn variables(&self) -> &[(String, String)] {
        &self.variables
    }

    async fn fetch_dashboard(&self, dashboard_name: &str) -> Result<Bytes, ReportError> {
        let url = self.dashboard_url(dashboard_name);
        tracing::debug!("Fetching dashboard from {}", url);

        let fetch_failed = |reason: String| ReportError::DashboardFetchFailed {
            dashboard: dashboard_name.to_string(),
            reason,
        };

        let response = self
            .authorized(self.http.get(&url))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| fetch_failed(format!("request to Grafana failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ReportError::DashboardNotFound(dashboard_name.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(fetch_failed(format!("Grafana returned {}: {}", status, body)));
        }

        response
            .bytes()
            .await
            .map_err(|e| fetch_failed(format!("failed to read dashboard body: {}", e)))
    }

    async fn fetch_panel_png(&self, request: PanelRequest<'_>) -> Result<Bytes, PanelFetchError> {
        let url = self.panel_url(request.dashboard_name);

        let mut query = vec![
            ("from".to_string(), request.time_range.from.clone()),
            ("to".to_string(), request.time_range.to.clone()),
            ("panelId".to_string(), request.panel.id.to_string()),
            ("width".to_string(), request.size.width.to_string()),
            ("height".to_string(), request.size.height.to_string()),
        ];
        query.extend(self.variables.iter().cloned());

        tracing::debug!("Fetching panel {} from {}", request.panel.id, url);

        let response = self
            .authorized(self.http.get(&url))
            .query(&query)
            .send()
            .await
            .map_err(|e| PanelFetchError::Transient(format!("request to Grafana failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = format!("Grafana returned {} for panel {}: {}", status, request.panel.id, body);
            return Err(if status.is_server_error() {
                PanelFetchError::Transient(reason)
            } else {
                PanelFetchError::Permanent(reason)
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| PanelFetchError::Transient(format!("failed to read panel image: {}", e)))
    }
}
