//! HTML prediction page
//!
//! A single server-rendered page: an input form built from the active
//! model's features, a prediction slot and the active version.

use axum::{extract::State, response::Html};
use spendcast_common::model::FeatureEncoder;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::state::Snapshot;
use crate::AppState;

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Spendcast</title>
<style>
body { font-family: sans-serif; max-width: 40em; margin: 2em auto; }
label { display: block; margin: 0.5em 0; }
#prediction { font-size: 1.4em; font-weight: bold; }
.meta { color: #666; font-size: 0.9em; }
</style>
</head>
<body>
<h1>Average 7-Day Spend</h1>
"#;

const PAGE_TAIL: &str = "</body>\n</html>\n";

/// GET /
pub async fn serve_index(State(state): State<AppState>) -> Html<String> {
    let snapshot = state.serving.snapshot().await;
    Html(render_page(&state, &snapshot, &BTreeMap::new(), None))
}

/// Full page; `values` pre-fills the form, `message` fills the prediction slot
pub(crate) fn render_page(
    state: &AppState,
    snapshot: &Snapshot,
    values: &BTreeMap<String, String>,
    message: Option<&str>,
) -> String {
    let mut html = String::from(PAGE_HEAD);

    html.push_str("<form method=\"post\" action=\"/predict\">\n");
    match snapshot.model() {
        Some(model) => {
            for encoder in &model.encoders {
                render_encoder_field(&mut html, encoder, values);
            }
        }
        None => {
            if let Some(schema) = &state.schema {
                for name in schema.features() {
                    render_text_field(&mut html, name, values.get(name).map(String::as_str));
                }
            }
        }
    }
    html.push_str("<button type=\"submit\">Predict</button>\n</form>\n");

    let _ = writeln!(
        html,
        "<p id=\"prediction\">{}</p>",
        escape_html(message.unwrap_or(""))
    );
    let _ = writeln!(
        html,
        "<p class=\"meta\">Model: {} (loaded {})</p>",
        escape_html(snapshot.active_version().unwrap_or("none")),
        snapshot.loaded_at().format("%Y-%m-%d %H:%M:%S UTC")
    );

    html.push_str(PAGE_TAIL);
    html
}

fn render_encoder_field(html: &mut String, encoder: &FeatureEncoder, values: &BTreeMap<String, String>) {
    let name = encoder.name();
    let current = values.get(name).map(String::as_str);
    match encoder {
        FeatureEncoder::Numeric { .. } => {
            let _ = writeln!(
                html,
                "<label>{0} <input type=\"number\" step=\"any\" name=\"{0}\" value=\"{1}\" required></label>",
                escape_html(name),
                escape_html(current.unwrap_or(""))
            );
        }
        FeatureEncoder::OneHot { categories, .. } => {
            let _ = writeln!(html, "<label>{0} <select name=\"{0}\">", escape_html(name));
            for category in categories {
                let selected = if current == Some(category.as_str()) { " selected" } else { "" };
                let _ = writeln!(
                    html,
                    "<option value=\"{0}\"{1}>{0}</option>",
                    escape_html(category),
                    selected
                );
            }
            html.push_str("</select></label>\n");
        }
        FeatureEncoder::Flag { .. } => {
            let checked = current
                .and_then(spendcast_common::model::parse_flag)
                .unwrap_or(false);
            let _ = writeln!(
                html,
                "<label>{0} <input type=\"checkbox\" name=\"{0}\" value=\"true\"{1}></label>",
                escape_html(name),
                if checked { " checked" } else { "" }
            );
        }
    }
}

fn render_text_field(html: &mut String, name: &str, current: Option<&str>) {
    let _ = writeln!(
        html,
        "<label>{0} <input type=\"text\" name=\"{0}\" value=\"{1}\"></label>",
        escape_html(name),
        escape_html(current.unwrap_or(""))
    );
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
        assert_eq!(escape_html("gold"), "gold");
    }
}
