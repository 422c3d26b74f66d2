use crate::{prediction::Prediction, upload::StoredUpload};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

const TEMPLATE: &str = include_str!("../templates/index.html");
const PLACEHOLDER: &str = "{{ result }}";

/// State of the upload page: empty form, a prediction, or an error.
#[derive(Debug, Default)]
pub struct IndexPage {
    prediction: Option<String>,
    confidence: Option<String>,
    img_path: Option<String>,
    error: Option<String>,
    detail: Option<String>,
    status: StatusCode,
}

impl IndexPage {
    pub fn form() -> Self {
        Self::default()
    }

    pub fn prediction(prediction: &Prediction, upload: &StoredUpload) -> Self {
        Self {
            prediction: Some(prediction.label.to_string()),
            confidence: Some(prediction.format_confidence()),
            img_path: Some(upload.public_path()),
            ..Self::default()
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            prediction: Some("ERROR".to_string()),
            error: Some(message.into()),
            status,
            ..Self::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn render(&self) -> String {
        let mut result = String::new();

        if let Some(error) = &self.error {
            result.push_str("  <div class=\"error\">\n");
            result.push_str(&format!("    <p>{}</p>\n", escape(error)));
            if let Some(detail) = &self.detail {
                result.push_str(&format!("    <p class=\"detail\">{}</p>\n", escape(detail)));
            }
            result.push_str("  </div>\n");
        } else if let Some(prediction) = &self.prediction {
            result.push_str("  <div class=\"result\">\n");
            result.push_str(&format!(
                "    <h2>Prediction: <span id=\"prediction\">{}</span></h2>\n",
                escape(prediction)
            ));
            if let Some(confidence) = &self.confidence {
                result.push_str(&format!(
                    "    <p>Confidence: <span id=\"confidence\">{}</span></p>\n",
                    escape(confidence)
                ));
            }
            if let Some(img_path) = &self.img_path {
                result.push_str(&format!(
                    "    <img src=\"/{}\" alt=\"Uploaded X-ray\">\n",
                    escape(img_path)
                ));
            }
            result.push_str("  </div>\n");
        }

        TEMPLATE.replace(PLACEHOLDER, &result)
    }
}

impl IntoResponse for IndexPage {
    fn into_response(self) -> Response {
        (self.status, Html(self.render())).into_response()
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::Label;
    use std::path::PathBuf;

    #[test]
    fn test_form_has_no_result() {
        let page = IndexPage::form();
        let html = page.render();
        assert!(html.contains("name=\"file\""));
        assert!(!html.contains("Prediction:"));
        assert!(!html.contains(PLACEHOLDER));
        assert_eq!(page.status, StatusCode::OK);
    }

    #[test]
    fn test_prediction_page() {
        let prediction = Prediction {
            label: Label::Pneumonia,
            confidence: 0.9712,
        };
        let upload = StoredUpload {
            file_name: "scan_0a1b2c3d.png".to_string(),
            path: PathBuf::from("static/uploads/scan_0a1b2c3d.png"),
            size: 10,
        };

        let html = IndexPage::prediction(&prediction, &upload).render();
        assert!(html.contains("<span id=\"prediction\">PNEUMONIA</span>"));
        assert!(html.contains("<span id=\"confidence\">97.12%</span>"));
        assert!(html.contains("src=\"/static/uploads/scan_0a1b2c3d.png\""));
    }

    #[test]
    fn test_error_page_escapes_detail() {
        let page = IndexPage::error(StatusCode::BAD_REQUEST, "Bad request")
            .with_detail("<script>alert(1)</script>");
        let html = page.render();
        assert!(html.contains("<p>Bad request</p>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
        assert!(!html.contains("Prediction:"));
    }
}
