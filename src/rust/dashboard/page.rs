//! Full-page markup for the dashboard.

use std::fmt::Write;

use super::{DisplayFragment, FormState};
use crate::config::DashboardConfig;
use crate::markup::escape_html;

const STYLE: &str = r##"
        body { font-family: Arial, sans-serif; color: #333; margin: 0; }
        .page { max-width: 1100px; margin: 0 auto; padding: 1.5rem; }
        h1 { font-size: 1.6rem; margin-bottom: 0.25rem; }
        .legend { color: #666; font-size: 0.9rem; margin-bottom: 1rem; }
        textarea { width: 100%; height: 120px; font-size: 1rem; padding: 0.5rem; box-sizing: border-box; }
        .controls { display: flex; gap: 1rem; align-items: flex-end; margin: 0.75rem 0; }
        .controls label { display: block; font-size: 0.85rem; color: #555; margin-bottom: 0.25rem; }
        input[type="number"], select { padding: 0.35rem; font-size: 0.95rem; }
        button { padding: 0.45rem 1rem; font-size: 0.95rem; cursor: pointer; }
        .error { background: #fef2f2; border: 1px solid #fecaca; color: #b91c1c; padding: 0.6rem 0.8rem; border-radius: 4px; margin: 0.75rem 0; }
"##;

/// Static page text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSettings {
    pub title: String,
    pub heading: String,
    pub legend: String,
}

impl From<&DashboardConfig> for PageSettings {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            title: config.title.clone(),
            heading: config.heading.clone(),
            legend: config.legend.clone(),
        }
    }
}

/// One entry of the classifier dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierOption {
    pub key: String,
    pub name: String,
}

/// Renders the whole dashboard with the form populated from `form`.
pub fn render_page(
    settings: &PageSettings,
    options: &[ClassifierOption],
    form: &FormState,
    fragment: &DisplayFragment,
    error: Option<&str>,
) -> String {
    let mut html = String::with_capacity(4096);
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n    <meta charset=\"UTF-8\">\n    <title>{}</title>\n    <style>{}</style>\n</head>\n<body>\n<div class=\"page\">\n",
        escape_html(&settings.title),
        STYLE,
    );
    let _ = writeln!(html, "<h1>{}</h1>", escape_html(&settings.heading));
    let _ = writeln!(html, "<p class=\"legend\">{}</p>", escape_html(&settings.legend));

    html.push_str("<form method=\"post\" action=\"/\">\n");
    let _ = writeln!(
        html,
        "<textarea id=\"text-input\" name=\"text\" placeholder=\"Enter text to explain\">{}</textarea>",
        escape_html(&form.text),
    );

    html.push_str("<div class=\"controls\">\n");
    let _ = writeln!(
        html,
        "<div><label for=\"num-samples\">Number of samples</label><input id=\"num-samples\" type=\"number\" name=\"num_samples\" min=\"1\" step=\"1\" value=\"{}\"></div>",
        escape_html(&form.num_samples),
    );
    html.push_str("<div><label for=\"classifier\">Classifier</label><select id=\"classifier\" name=\"classifier\">");
    for option in options {
        let selected = if option.key == form.classifier { " selected" } else { "" };
        let _ = write!(
            html,
            "<option value=\"{}\"{}>{}</option>",
            escape_html(&option.key),
            selected,
            escape_html(&option.name),
        );
    }
    html.push_str("</select></div>\n");
    html.push_str("<button type=\"submit\" name=\"action\" value=\"explain\">Explain results</button>\n");
    html.push_str("<button type=\"submit\" name=\"action\" value=\"reset\">Reset</button>\n");
    html.push_str("</div>\n</form>\n");

    if let Some(message) = error {
        let _ = writeln!(html, "<div class=\"error\" role=\"alert\">{}</div>", escape_html(message));
    }

    let _ = writeln!(html, "<div id=\"display\">{}</div>", fragment.render());
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PageSettings {
        PageSettings::from(&DashboardConfig::default())
    }

    fn options() -> Vec<ClassifierOption> {
        vec![
            ClassifierOption { key: "fasttext".into(), name: "FastText".into() },
            ClassifierOption { key: "minilm".into(), name: "MiniLM".into() },
        ]
    }

    #[test]
    fn test_page_has_controls() {
        let form = FormState::with_defaults("fasttext", 5000);
        let html = render_page(&settings(), &options(), &form, &DisplayFragment::Placeholder, None);
        assert!(html.contains("LIME Explainer Dashboard for Fine-grained Sentiment"));
        assert!(html.contains("1: Strongly Negative"));
        assert!(html.contains("name=\"num_samples\" min=\"1\" step=\"1\" value=\"5000\""));
        assert!(html.contains("<option value=\"fasttext\" selected>FastText</option>"));
        assert!(html.contains("<option value=\"minilm\">MiniLM</option>"));
        assert!(html.contains("Explain results"));
        assert!(html.contains("value=\"reset\">Reset"));
        assert!(!html.contains("class=\"error\""));
    }

    #[test]
    fn test_user_values_are_escaped() {
        let form = FormState {
            text: "</textarea><script>alert(1)</script>".into(),
            num_samples: "\"><b>".into(),
            classifier: "minilm".into(),
        };
        let html = render_page(&settings(), &options(), &form, &DisplayFragment::Placeholder, Some("bad <input>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;/textarea&gt;&lt;script&gt;"));
        assert!(html.contains("value=\"&quot;&gt;&lt;b&gt;\""));
        assert!(html.contains("<option value=\"minilm\" selected>"));
        assert!(html.contains("role=\"alert\">bad &lt;input&gt;</div>"));
    }

    #[test]
    fn test_page_embeds_fragment() {
        let form = FormState::with_defaults("fasttext", 10);
        let fragment = DisplayFragment::Rendered("<p>done</p>".into());
        let html = render_page(&settings(), &options(), &form, &fragment, None);
        assert!(html.contains("sandbox=\"\""));
        assert!(html.contains("&lt;p&gt;done&lt;/p&gt;"));
    }
}
