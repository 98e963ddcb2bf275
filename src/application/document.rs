// LaTeX document source generation from a rendered dashboard
use crate::application::panel_renderer::RenderOutcome;
use crate::domain::dashboard::{sanitize_title, Dashboard, Panel, PanelType};
use std::collections::HashMap;

/// Built-in report template. Placeholders: `${title}`, `${subtitle}`,
/// `${variables}`, `${from}`, `${to}` and `${body}`.
pub const DEFAULT_TEMPLATE: &str = r#"\documentclass{article}
\usepackage{graphicx}
\usepackage[margin=1in]{geometry}
\graphicspath{ {images/} }
\begin{document}
\title{${title}${subtitle}}
\date{${from} -- ${to}}
\maketitle
\begin{center}
${body}
\end{center}
\end{document}
"#;

pub struct DocumentContext<'a> {
    pub dashboard: &'a Dashboard,
    pub outcome: &'a RenderOutcome,
    pub from: String,
    pub to: String,
}

/// Fill `template` with the dashboard title, variable values, time range and
/// an include for every successfully rendered panel.
pub fn render_document(template: &str, ctx: &DocumentContext<'_>) -> String {
    let variables = sanitize_title(ctx.dashboard.variable_values());
    let subtitle = if variables.is_empty() {
        String::new()
    } else {
        format!(" \\\\ \\large {}", variables)
    };

    let mut vars = HashMap::new();
    vars.insert("title".to_string(), ctx.dashboard.title().to_string());
    vars.insert("subtitle".to_string(), subtitle);
    vars.insert("variables".to_string(), variables);
    vars.insert("from".to_string(), ctx.from.clone());
    vars.insert("to".to_string(), ctx.to.clone());
    vars.insert("body".to_string(), document_body(ctx.dashboard, ctx.outcome));

    prepare_template(template, &vars)
}

/// Replace `${key}` placeholders in a template.
pub fn prepare_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

fn document_body(dashboard: &Dashboard, outcome: &RenderOutcome) -> String {
    let mut body = String::new();

    if dashboard.rows().is_empty() {
        push_panels(&mut body, dashboard.panels().iter(), outcome);
        return body;
    }

    for row in dashboard.rows() {
        if !row.title.is_empty() {
            body.push_str(&format!("\\section*{{{}}}\n", row.title));
        }
        push_panels(&mut body, dashboard.row_panels(row), outcome);
    }
    body
}

fn push_panels<'a>(
    body: &mut String,
    panels: impl Iterator<Item = &'a Panel>,
    outcome: &RenderOutcome,
) {
    // panels without an image failed to render and are left out
    for panel in panels.filter(|p| outcome.image_path(p.id).is_some()) {
        if !panel.title.is_empty() {
            body.push_str(&format!("% {}\n", panel.title));
        }
        let width = match panel.panel_type {
            PanelType::SingleStat => "0.3\\textwidth",
            _ => "\\textwidth",
        };
        body.push_str(&format!(
            "\\includegraphics[width={}]{{{}}}\n",
            width,
            panel.image_file_name()
        ));
        if !panel.is(PanelType::SingleStat) {
            body.push_str("\\par\\medskip\n");
        }
    }
}
