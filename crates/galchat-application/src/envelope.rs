//! Typed payloads for the REST glue layer.
//!
//! The HTTP server itself lives outside this workspace; these are the
//! envelopes it serializes, kept here so the wire shapes stay in one place.

use galchat_core::dialog::{DialogOption, SituationAnalysis};
use serde::{Deserialize, Serialize};

/// Standard `{ success, data, message }` response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Payload of a successful `/api/generate` round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateData {
    pub session_id: Option<String>,
    pub original_text: String,
    pub options: Vec<DialogOption>,
    pub scene_summary: String,
    pub style: String,
}

/// Payload of a successful `/api/analyze` round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeData {
    pub analysis: SituationAnalysis,
}

#[cfg(test)]
mod tests {
    use super::*;
    use galchat_core::dialog::option::OptionLabel;

    #[test]
    fn test_generate_payload_field_names() {
        let envelope = ApiEnvelope::ok(GenerateData {
            session_id: Some("s1".to_string()),
            original_text: "在吗".to_string(),
            options: vec![DialogOption::new(OptionLabel::A, "在的在的")],
            scene_summary: "对方在试探".to_string(),
            style: "gentle".to_string(),
        });

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["sessionId"], "s1");
        assert_eq!(json["data"]["originalText"], "在吗");
        assert_eq!(json["data"]["sceneSummary"], "对方在试探");
        assert_eq!(json["data"]["options"][0]["id"], "A");
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let envelope: ApiEnvelope<GenerateData> = ApiEnvelope::error("模型生成失败");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
        assert_eq!(json["message"], "模型生成失败");
    }
}
