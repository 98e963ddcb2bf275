// Dashboard domain model, normalized from Grafana v4 (rows) and v5 (flat panels) JSON
use serde::Deserialize;

/// Pixels per grid unit when sizing panels from their grid position.
const GRID_UNIT_PX: f64 = 40.0;

/// Characters with a special meaning in LaTeX, escaped with a backslash.
const LATEX_SPECIAL: [char; 7] = ['#', '$', '%', '&', '_', '{', '}'];

/// Request variables as `(key, value)` pairs, e.g. `("var-host", "db01")`.
pub type Variables = Vec<(String, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Panels grouped under rows, addressed by slug.
    V4,
    /// Flat panel list with structural row panels, addressed by uid.
    V5,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelType {
    #[serde(alias = "stat")]
    SingleStat,
    Graph,
    Text,
    Table,
    /// Structural row divider of the v5 schema, never kept in a dashboard.
    Row,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct GridPos {
    #[serde(alias = "H")]
    pub h: f64,
    #[serde(alias = "W")]
    pub w: f64,
    #[serde(alias = "X")]
    pub x: f64,
    #[serde(alias = "Y")]
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Panel {
    #[serde(alias = "Id")]
    pub id: u64,
    #[serde(rename = "type", alias = "Type")]
    pub panel_type: PanelType,
    #[serde(alias = "Title")]
    pub title: String,
    #[serde(rename = "gridPos", alias = "GridPos")]
    pub grid_pos: GridPos,
}

impl Panel {
    pub fn is(&self, panel_type: PanelType) -> bool {
        self.panel_type == panel_type
    }

    /// Pixel size to request from the renderer. With `grid_layout` the size
    /// follows the panel's grid position, otherwise (or when the panel has no
    /// grid position, as in v4 dashboards) a fixed size per type.
    pub fn render_size(&self, grid_layout: bool) -> PanelSize {
        if grid_layout && self.grid_pos.w > 0.0 && self.grid_pos.h > 0.0 {
            return PanelSize {
                width: (self.grid_pos.w * GRID_UNIT_PX).round() as u32,
                height: (self.grid_pos.h * GRID_UNIT_PX).round() as u32,
            };
        }

        match self.panel_type {
            PanelType::SingleStat => PanelSize { width: 300, height: 150 },
            PanelType::Text => PanelSize { width: 1000, height: 100 },
            _ => PanelSize { width: 1000, height: 500 },
        }
    }

    /// File name of the rendered image for this panel.
    pub fn image_file_name(&self) -> String {
        format!("image{}.png", self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub title: String,
    panel_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    title: String,
    rows: Vec<Row>,
    panels: Vec<Panel>,
    variable_values: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DashboardEnvelope {
    #[serde(alias = "Dashboard")]
    dashboard: RawDashboard,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDashboard {
    #[serde(alias = "Title")]
    title: String,
    #[serde(alias = "Rows")]
    rows: Vec<RawRow>,
    #[serde(alias = "Panels")]
    panels: Vec<Panel>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRow {
    #[serde(alias = "Title")]
    title: String,
    #[serde(alias = "Panels")]
    panels: Vec<Panel>,
}

impl Dashboard {
    /// Parse the dashboard API response body for the given schema version.
    pub fn from_json(
        body: &[u8],
        schema: SchemaVersion,
        variables: &[(String, String)],
    ) -> Result<Self, serde_json::Error> {
        let envelope: DashboardEnvelope = serde_json::from_slice(body)?;
        Ok(Self::normalize(envelope.dashboard, schema, variables))
    }

    fn normalize(raw: RawDashboard, schema: SchemaVersion, variables: &[(String, String)]) -> Self {
        let mut panels = Vec::new();
        let mut rows = Vec::new();

        match schema {
            SchemaVersion::V4 => {
                for raw_row in raw.rows {
                    let mut panel_indices = Vec::with_capacity(raw_row.panels.len());
                    for panel in raw_row.panels.into_iter().filter(|p| !p.is(PanelType::Row)) {
                        panel_indices.push(panels.len());
                        panels.push(sanitize_panel(panel));
                    }
                    rows.push(Row {
                        title: sanitize_title(&raw_row.title),
                        panel_indices,
                    });
                }
            }
            SchemaVersion::V5 => {
                panels.extend(
                    raw.panels
                        .into_iter()
                        .filter(|p| !p.is(PanelType::Row))
                        .map(sanitize_panel),
                );
            }
        }

        let variable_values = variables
            .iter()
            .map(|(_, value)| value.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            title: sanitize_title(&raw.title),
            rows,
            panels,
            variable_values,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// All panels in row order, without structural row panels.
    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn row_panels<'a>(&'a self, row: &'a Row) -> impl Iterator<Item = &'a Panel> + 'a {
        row.panel_indices.iter().filter_map(|&i| self.panels.get(i))
    }

    pub fn variable_values(&self) -> &str {
        &self.variable_values
    }
}

fn sanitize_panel(panel: Panel) -> Panel {
    Panel {
        title: sanitize_title(&panel.title),
        ..panel
    }
}

/// Escape LaTeX special characters so the text is typeset literally and can
/// never form a command.
pub fn sanitize_title(title: &str) -> String {
    let mut sanitized = String::with_capacity(title.len());
    for c in title.chars() {
        match c {
            '\\' => sanitized.push_str("\\textbackslash{}"),
            '~' => sanitized.push_str("\\textasciitilde{}"),
            '^' => sanitized.push_str("\\textasciicircum{}"),
            c if LATEX_SPECIAL.contains(&c) => {
                sanitized.push('\\');
                sanitized.push(c);
            }
            c => sanitized.push(c),
        }
    }
    sanitized
}
