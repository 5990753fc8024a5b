use crate::markup::escape_html;

pub const PLACEHOLDER_HTML: &str = "<div>Enter input text to see LIME explanations.</div>";

const FRAME_STYLE: &str = "width: 100%; border: 2px #d3d3d3 solid;";

/// Whether the display region currently shows an explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    Empty,
    Showing,
}

/// Content of the display region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayFragment {
    /// Hidden frame with a prompt to enter text
    Placeholder,
    /// Sandboxed frame holding a rendered explanation document
    Rendered(String),
}

impl DisplayFragment {
    pub fn state(&self) -> DisplayState {
        match self {
            DisplayFragment::Placeholder => DisplayState::Empty,
            DisplayFragment::Rendered(_) => DisplayState::Showing,
        }
    }

    /// Markup for the display region.
    pub fn render(&self) -> String {
        match self {
            DisplayFragment::Placeholder => format!(
                "<iframe id=\"explanation\" srcdoc=\"{}\" style=\"{} height: 100px;\" hidden></iframe>",
                escape_html(PLACEHOLDER_HTML),
                FRAME_STYLE,
            ),
            DisplayFragment::Rendered(html) => format!(
                "<iframe id=\"explanation\" srcdoc=\"{}\" style=\"{} height: 1000px;\" sandbox=\"\"></iframe>",
                escape_html(html),
                FRAME_STYLE,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_hidden() {
        let html = DisplayFragment::Placeholder.render();
        assert!(html.contains("hidden"));
        assert!(html.contains("height: 100px;"));
        assert!(html.contains("&lt;div&gt;Enter input text to see LIME explanations.&lt;/div&gt;"));
        assert_eq!(DisplayFragment::Placeholder.state(), DisplayState::Empty);
    }

    #[test]
    fn test_rendered_is_sandboxed_and_escaped() {
        let fragment = DisplayFragment::Rendered("<p class=\"x\">hi</p>".into());
        let html = fragment.render();
        assert!(html.contains("sandbox=\"\""));
        assert!(html.contains("height: 1000px;"));
        assert!(html.contains("srcdoc=\"&lt;p class=&quot;x&quot;&gt;hi&lt;/p&gt;\""));
        assert!(!html.contains(" hidden"));
        assert_eq!(fragment.state(), DisplayState::Showing);
    }
}
