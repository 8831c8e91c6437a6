// Discrete UI actions the page reports. Strong typing over ad-hoc event names;
// each variant maps to one event name and its property set.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::Properties;

/// A discrete interaction, as sent from JS (`{"type": "download_click", ...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interaction {
    /// Download button pressed.
    DownloadClick {
        source: String,
        #[serde(default)]
        platform: Option<String>,
    },
    /// Demo video placeholder clicked.
    VideoClick,
    /// Research paper link opened.
    PaperClick { paper_id: String },
    /// Contact form sent. Only field names and message length (UTF-16 units,
    /// as the page measures it) are recorded.
    ContactFormSubmit {
        form_fields: Vec<String>,
        #[serde(default)]
        message: Option<String>,
    },
    FormFieldFocus { field_name: String, field_type: String },
    FormSubmit {
        #[serde(default)]
        form_id: String,
        #[serde(default)]
        form_action: String,
    },
    /// In-page anchor followed.
    NavigationClick { target_section: String },
    /// Section scrolled at least halfway into view.
    SectionView {
        section: String,
        #[serde(default)]
        section_title: Option<String>,
    },
    ExternalLinkClick { url: String, link_text: String },
    ScrollToVideo,
    /// Call-to-action that scrolls to the download section.
    DownloadCtaClick { source: String },
    /// Platform card chosen; opens the opt-in prompt.
    DownloadButtonClick { platform: String },
    /// Files requested; `via_opt_in` is reported as `provided_email`.
    DownloadAttempt {
        platform: String,
        via_opt_in: bool,
        email_saved: bool,
    },
    DownloadEmailOptIn { platform: String },
    DownloadEmailOptInSkipped { platform: String },
}

impl Interaction {
    pub fn event_name(&self) -> &'static str {
        match self {
            Interaction::DownloadClick { .. } => "download_click",
            Interaction::VideoClick => "video_click",
            Interaction::PaperClick { .. } => "paper_click",
            Interaction::ContactFormSubmit { .. } => "contact_form_submit",
            Interaction::FormFieldFocus { .. } => "form_field_focus",
            Interaction::FormSubmit { .. } => "form_submit",
            Interaction::NavigationClick { .. } => "navigation_click",
            Interaction::SectionView { .. } => "section_view",
            Interaction::ExternalLinkClick { .. } => "external_link_click",
            Interaction::ScrollToVideo => "scroll_to_video",
            Interaction::DownloadCtaClick { .. } => "download_cta_click",
            Interaction::DownloadButtonClick { .. } => "download_button_click",
            Interaction::DownloadAttempt { .. } => "download_attempt",
            Interaction::DownloadEmailOptIn { .. } => "download_email_opt_in",
            Interaction::DownloadEmailOptInSkipped { .. } => "download_email_opt_in_skipped",
        }
    }

    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        let mut put = |key: &str, value: Value| {
            props.insert(key.to_string(), value);
        };

        match self {
            Interaction::DownloadClick { source, platform } => {
                put("source", json!(source));
                put("platform", json!(platform));
                put("download_type", json!("application"));
            }
            Interaction::VideoClick => {
                put("video_type", json!("demo"));
                put("video_status", json!("placeholder"));
            }
            Interaction::PaperClick { paper_id } => {
                put("paper_id", json!(paper_id));
                put("paper_type", json!("research"));
            }
            Interaction::ContactFormSubmit {
                form_fields,
                message,
            } => {
                let message_length = message.as_deref().map_or(0, |m| m.encode_utf16().count());
                put("form_fields", json!(form_fields));
                put("has_message", json!(message_length > 0));
                put("message_length", json!(message_length));
            }
            Interaction::FormFieldFocus {
                field_name,
                field_type,
            } => {
                put("field_name", json!(field_name));
                put("field_type", json!(field_type));
            }
            Interaction::FormSubmit {
                form_id,
                form_action,
            } => {
                put("form_id", json!(form_id));
                put("form_action", json!(form_action));
            }
            Interaction::NavigationClick { target_section } => {
                put("target_section", json!(target_section));
            }
            Interaction::SectionView {
                section,
                section_title,
            } => {
                put("section", json!(section));
                put(
                    "section_title",
                    json!(section_title.as_deref().unwrap_or("Unknown")),
                );
            }
            Interaction::ExternalLinkClick { url, link_text } => {
                put("url", json!(url));
                put("link_text", json!(link_text.trim()));
            }
            Interaction::ScrollToVideo => {}
            Interaction::DownloadCtaClick { source } => {
                put("source", json!(source));
            }
            Interaction::DownloadButtonClick { platform }
            | Interaction::DownloadEmailOptInSkipped { platform } => {
                put("platform", json!(platform));
            }
            Interaction::DownloadEmailOptIn { platform } => {
                put("platform", json!(platform));
                put("provided_email", json!(true));
            }
            Interaction::DownloadAttempt {
                platform,
                via_opt_in,
                email_saved,
            } => {
                put("platform", json!(platform));
                put("provided_email", json!(via_opt_in));
                put("email_saved", json!(email_saved));
            }
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_click_from_js() {
        let interaction: Interaction =
            serde_json::from_str(r#"{"type":"download_click","source":"hero"}"#).unwrap();
        assert_eq!(interaction.event_name(), "download_click");

        let props = interaction.properties();
        assert_eq!(props["source"], json!("hero"));
        assert_eq!(props["platform"], Value::Null);
        assert_eq!(props["download_type"], json!("application"));
    }

    #[test]
    fn contact_form_records_shape_not_content() {
        let interaction = Interaction::ContactFormSubmit {
            form_fields: vec!["name".to_string(), "email".to_string(), "message".to_string()],
            message: Some("Hello there".to_string()),
        };
        let props = interaction.properties();
        assert_eq!(props["has_message"], json!(true));
        assert_eq!(props["message_length"], json!(11));
        assert!(!props.values().any(|v| v == &json!("Hello there")));
    }

    #[test]
    fn contact_form_without_message() {
        let interaction: Interaction =
            serde_json::from_str(r#"{"type":"contact_form_submit","form_fields":["email"]}"#)
                .unwrap();
        let props = interaction.properties();
        assert_eq!(props["has_message"], json!(false));
        assert_eq!(props["message_length"], json!(0));
    }

    #[test]
    fn message_length_counts_utf16_units() {
        let interaction = Interaction::ContactFormSubmit {
            form_fields: vec!["message".to_string()],
            message: Some("hi 👋".to_string()),
        };
        // "hi " is 3 units, the emoji is a surrogate pair.
        assert_eq!(interaction.properties()["message_length"], json!(5));
    }

    #[test]
    fn download_attempt_reports_provided_email() {
        let interaction: Interaction = serde_json::from_str(
            r#"{"type":"download_attempt","platform":"mac","via_opt_in":true,"email_saved":false}"#,
        )
        .unwrap();
        let props = interaction.properties();
        assert_eq!(props["provided_email"], json!(true));
        assert_eq!(props["email_saved"], json!(false));
        assert_eq!(props["platform"], json!("mac"));
        assert!(!props.contains_key("via_opt_in"));
    }

    #[test]
    fn email_opt_in_marks_email_provided() {
        let opt_in = Interaction::DownloadEmailOptIn {
            platform: "windows".to_string(),
        };
        let props = opt_in.properties();
        assert_eq!(opt_in.event_name(), "download_email_opt_in");
        assert_eq!(props["platform"], json!("windows"));
        assert_eq!(props["provided_email"], json!(true));

        let skipped = Interaction::DownloadEmailOptInSkipped {
            platform: "windows".to_string(),
        };
        assert!(!skipped.properties().contains_key("provided_email"));
    }

    #[test]
    fn section_view_defaults_title() {
        let interaction = Interaction::SectionView {
            section: "features".to_string(),
            section_title: None,
        };
        assert_eq!(interaction.properties()["section_title"], json!("Unknown"));
    }

    #[test]
    fn unit_variants_parse() {
        let interaction: Interaction = serde_json::from_str(r#"{"type":"scroll_to_video"}"#).unwrap();
        assert_eq!(interaction, Interaction::ScrollToVideo);
        assert!(interaction.properties().is_empty());
    }

    #[test]
    fn unknown_type_rejected() {
        assert!(serde_json::from_str::<Interaction>(r#"{"type":"teleport"}"#).is_err());
    }
}
