// Shared fixtures for application tests
use crate::application::dashboard_repository::{DashboardRepository, PanelRequest};
use crate::domain::dashboard::{SchemaVersion, Variables};
use crate::domain::error::{PanelFetchError, ReportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Two rows holding 2 and 7 panels.
pub const NINE_PANEL_DASHBOARD: &str = r##"
{"Dashboard":
    {
        "Title":"My first dashboard",
        "Rows":
        [{"Title": "Overview #1",
          "Panels":
            [{"Type":"singlestat", "Id":1, "Title":"Uptime"},
             {"Type":"graph", "Id":22, "Title":"Requests"}]
        },
        {"Panels":
            [
                {"Type":"singlestat", "Id":33},
                {"Type":"graph", "Id":44},
                {"Type":"graph", "Id":55},
                {"Type":"graph", "Id":66},
                {"Type":"graph", "Id":77},
                {"Type":"graph", "Id":88},
                {"Type":"graph", "Id":99}
            ]
        }]
    },
"Meta":
    {"Slug":"testDash"}
}"##;

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Succeed,
    /// Permanent failure on the n-th call (1-based)
    FailNth(usize),
    /// Transient failure on the first n calls
    TransientFirst(usize),
    AlwaysTransient,
    /// Never answers
    Hang,
}

pub struct MockRepository {
    behaviour: Behaviour,
    dashboard: Option<String>,
    variables: Variables,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancel_on_call: Option<(usize, CancellationToken)>,
}

impl MockRepository {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            dashboard: Some(NINE_PANEL_DASHBOARD.to_string()),
            variables: Vec::new(),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            cancel_on_call: None,
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Cancel `token` while answering the n-th panel call (1-based).
    pub fn with_cancel_on_call(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    pub fn with_dashboard_json(mut self, json: &str) -> Self {
        self.dashboard = Some(json.to_string());
        self
    }

    /// Answer dashboard requests with `DashboardNotFound`.
    pub fn without_dashboard(mut self) -> Self {
        self.dashboard = None;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DashboardRepository for MockRepository {
    fn schema(&self) -> SchemaVersion {
        SchemaVersion::V4
    }

    fn variables(&self) -> &[(String, String)] {
        &self.variables
    }

    async fn fetch_dashboard(&self, dashboard_name: &str) -> Result<Bytes, ReportError> {
        match &self.dashboard {
            Some(json) => Ok(Bytes::from(json.clone())),
            None => Err(ReportError::DashboardNotFound(dashboard_name.to_string())),
        }
    }

    async fn fetch_panel_png(&self, _request: PanelRequest<'_>) -> Result<Bytes, PanelFetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if let Behaviour::Hang = self.behaviour {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((n, token)) = &self.cancel_on_call {
            if call == *n {
                token.cancel();
            }
        }

        let png = Bytes::from_static(b"Not actually a png");
        match self.behaviour {
            Behaviour::FailNth(n) if call == n => Err(PanelFetchError::Permanent(
                "The second panel has some problem".to_string(),
            )),
            Behaviour::TransientFirst(n) if call <= n => Err(PanelFetchError::Transient(
                "500 Internal Server Error".to_string(),
            )),
            Behaviour::AlwaysTransient => Err(PanelFetchError::Transient(
                "500 Internal Server Error".to_string(),
            )),
            _ => Ok(png),
        }
    }
}
