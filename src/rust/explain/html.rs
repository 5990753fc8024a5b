//! Static HTML rendering of an [`Explanation`].
//!
//! The output is a complete document with inline styles only. It never contains
//! script, so it can be shown inside a sandboxed frame.

use std::fmt::Write;

use super::{Explanation, LabelExplanation};
use crate::markup::escape_html;

const POSITIVE_RGB: (u8, u8, u8) = (255, 127, 14);
const NEGATIVE_RGB: (u8, u8, u8) = (31, 119, 180);

const STYLE: &str = "\
body { font-family: Arial, sans-serif; color: #515151; margin: 12px; }
h3 { margin: 18px 0 6px; }
table { border-collapse: collapse; }
td { padding: 2px 6px; font-size: 13px; }
td.bar { width: 240px; }
td.value { text-align: right; font-family: monospace; }
.fill { height: 14px; }
.half { display: inline-block; width: 120px; height: 14px; vertical-align: middle; }
.half.left { text-align: right; }
.meta { font-size: 12px; color: #777; }
.text { line-height: 1.8; white-space: pre-wrap; }
.text span { padding: 1px 2px; border-radius: 2px; }
";

fn rgba((r, g, b): (u8, u8, u8), alpha: f64) -> String {
    format!("rgba({}, {}, {}, {:.3})", r, g, b, alpha.clamp(0.0, 1.0))
}

impl Explanation {
    /// Renders probability bars, per-class word weights and highlighted text.
    pub fn as_html(&self) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><style>\n");
        html.push_str(STYLE);
        html.push_str("</style></head><body>\n");

        self.write_probabilities(&mut html);
        for label in &self.labels {
            self.write_label(&mut html, label);
        }

        html.push_str("</body></html>\n");
        html
    }

    fn class_name(&self, label: usize) -> &str {
        self.class_names.get(label).map(String::as_str).unwrap_or("?")
    }

    fn write_probabilities(&self, html: &mut String) {
        html.push_str("<section class=\"probabilities\">\n<h3>Prediction probabilities</h3>\n<table>\n");
        for (label, &probability) in self.predict_proba.iter().enumerate() {
            let _ = writeln!(
                html,
                "<tr><td class=\"name\">{}</td><td class=\"bar\"><div class=\"fill\" style=\"width: {:.1}%; background: {};\"></div></td><td class=\"value\">{:.3}</td></tr>",
                escape_html(self.class_name(label)),
                (probability as f64 * 100.0).clamp(0.0, 100.0),
                rgba(POSITIVE_RGB, 0.9),
                probability,
            );
        }
        html.push_str("</table>\n</section>\n");
    }

    fn write_label(&self, html: &mut String, label: &LabelExplanation) {
        let max_weight = label.weights.iter()
            .map(|(_, w)| w.abs())
            .fold(0.0f64, f64::max);
        let scale = |w: f64| if max_weight > 0.0 { w.abs() / max_weight } else { 0.0 };

        let _ = writeln!(
            html,
            "<section class=\"label\">\n<h3>Class {}</h3>\n<p class=\"meta\">intercept {:.4}, local prediction {:.4}, score {:.4}</p>",
            escape_html(self.class_name(label.label)),
            label.intercept,
            label.local_prediction,
            label.score,
        );

        html.push_str("<table class=\"weights\">\n");
        for &(feature, weight) in &label.weights {
            let width = scale(weight) * 100.0;
            let (left, right) = if weight < 0.0 {
                (format!("<div class=\"fill\" style=\"width: {:.1}%; margin-left: auto; background: {};\"></div>", width, rgba(NEGATIVE_RGB, 0.9)), String::new())
            } else {
                (String::new(), format!("<div class=\"fill\" style=\"width: {:.1}%; background: {};\"></div>", width, rgba(POSITIVE_RGB, 0.9)))
            };
            let _ = writeln!(
                html,
                "<tr><td class=\"name\">{}</td><td class=\"bar\"><span class=\"half left\">{}</span><span class=\"half\">{}</span></td><td class=\"value\">{:+.4}</td></tr>",
                escape_html(self.text.word(feature)),
                left,
                right,
                weight,
            );
        }
        html.push_str("</table>\n");

        let weights: std::collections::HashMap<usize, f64> = label.weights.iter().copied().collect();
        html.push_str("<p class=\"text\">");
        for (piece, feature) in self.text.pieces() {
            match feature.and_then(|f| weights.get(&f).copied()) {
                Some(weight) => {
                    let color = if weight < 0.0 { NEGATIVE_RGB } else { POSITIVE_RGB };
                    let _ = write!(
                        html,
                        "<span style=\"background: {};\">{}</span>",
                        rgba(color, 0.15 + 0.85 * scale(weight)),
                        escape_html(piece),
                    );
                }
                None => html.push_str(&escape_html(piece)),
            }
        }
        html.push_str("</p>\n</section>\n");
    }
}
