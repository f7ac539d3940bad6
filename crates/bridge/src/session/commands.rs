//! Inbound command decoding and outbound frame types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use brushlink_comfyui::api::ImageFolder;
use brushlink_comfyui::runner::GeneratedImage;

/// An `image_to_image` request decoded from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub input_path: PathBuf,
    pub workflow_path: PathBuf,
    /// ComfyUI folder the input image is uploaded into. A missing or
    /// invalid `type` field normalizes to `input`.
    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_source_folder"
    )]
    pub source: ImageFolder,
}

/// Tolerant `type` field parser: anything that is not a recognized folder
/// name (wrong string, wrong JSON type, null) falls back to `Input`.
fn deserialize_source_folder<'de, D>(deserializer: D) -> Result<ImageFolder, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value.as_str() {
        Some("temp") => ImageFolder::Temp,
        Some("output") => ImageFolder::Output,
        _ => ImageFolder::Input,
    })
}

/// One decoded inbound command.
#[derive(Debug, Clone)]
pub enum Command {
    Generate(GenerateRequest),
    Cancel,
    /// Well-formed JSON whose `command` value is unrecognized or absent.
    /// Carries the raw command name for logging.
    Unknown(String),
}

impl Command {
    /// Decode one inbound text frame.
    ///
    /// Malformed JSON -- and a known command missing required fields -- is an
    /// `Err`; the caller drops the frame without replying.
    pub fn decode(text: &str) -> Result<Command, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let name = value
            .get("command")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();
        match name.as_str() {
            "image_to_image" => Ok(Command::Generate(serde_json::from_value(value)?)),
            "cancel" => Ok(Command::Cancel),
            _ => Ok(Command::Unknown(name)),
        }
    }
}

/// Outbound status frames sent to the plugin.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ServerMessage {
    Error {
        message: String,
    },
    Preview {
        /// Raw image bytes as a JSON byte array.
        image: Vec<u8>,
    },
    Success {
        message: String,
        images: Vec<GeneratedImage>,
    },
    Cancelled {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn preview(image: Vec<u8>) -> Self {
        ServerMessage::Preview { image }
    }

    pub fn success(images: Vec<GeneratedImage>) -> Self {
        ServerMessage::Success {
            message: "Image generation completed".into(),
            images,
        }
    }

    pub fn cancelled() -> Self {
        ServerMessage::Cancelled {
            message: "Generation cancelled".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn decodes_full_generate_request() {
        let cmd = Command::decode(
            r#"{"command":"image_to_image","type":"temp","input_path":"/tmp/in.png","workflow_path":"/tmp/wf.json"}"#,
        )
        .unwrap();

        let Command::Generate(request) = cmd else {
            panic!("expected Generate");
        };
        assert_eq!(request.input_path, PathBuf::from("/tmp/in.png"));
        assert_eq!(request.workflow_path, PathBuf::from("/tmp/wf.json"));
        assert_eq!(request.source, ImageFolder::Temp);
    }

    #[test]
    fn missing_type_defaults_to_input() {
        let cmd = Command::decode(
            r#"{"command":"image_to_image","input_path":"/a.png","workflow_path":"/w.json"}"#,
        )
        .unwrap();
        assert_matches!(cmd, Command::Generate(r) if r.source == ImageFolder::Input);
    }

    #[test]
    fn invalid_type_string_defaults_to_input() {
        let cmd = Command::decode(
            r#"{"command":"image_to_image","type":"latent","input_path":"/a.png","workflow_path":"/w.json"}"#,
        )
        .unwrap();
        assert_matches!(cmd, Command::Generate(r) if r.source == ImageFolder::Input);
    }

    #[test]
    fn non_string_type_defaults_to_input() {
        let cmd = Command::decode(
            r#"{"command":"image_to_image","type":7,"input_path":"/a.png","workflow_path":"/w.json"}"#,
        )
        .unwrap();
        assert_matches!(cmd, Command::Generate(r) if r.source == ImageFolder::Input);
    }

    #[test]
    fn generate_missing_input_path_is_an_error() {
        let result =
            Command::decode(r#"{"command":"image_to_image","workflow_path":"/w.json"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn decodes_cancel() {
        let cmd = Command::decode(r#"{"command":"cancel"}"#).unwrap();
        assert_matches!(cmd, Command::Cancel);
    }

    #[test]
    fn unrecognized_command_is_unknown() {
        let cmd = Command::decode(r#"{"command":"unknown_op"}"#).unwrap();
        assert_matches!(cmd, Command::Unknown(raw) if raw == "unknown_op");
    }

    #[test]
    fn missing_command_field_is_unknown() {
        let cmd = Command::decode(r#"{"foo":"bar"}"#).unwrap();
        assert_matches!(cmd, Command::Unknown(raw) if raw.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Command::decode("not json at all").is_err());
    }

    #[test]
    fn preview_frame_serializes_bytes_as_array() {
        let frame = ServerMessage::preview(vec![1, 2, 3]);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"status":"preview","image":[1,2,3]}"#);
    }

    #[test]
    fn success_frame_carries_image_descriptors() {
        let frame = ServerMessage::success(vec![GeneratedImage {
            filename: "out.png".into(),
            image_data: vec![9],
        }]);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "Image generation completed");
        assert_eq!(json["images"][0]["filename"], "out.png");
        assert_eq!(json["images"][0]["image_data"], serde_json::json!([9]));
    }

    #[test]
    fn cancelled_frame_has_fixed_message() {
        let json = serde_json::to_string(&ServerMessage::cancelled()).unwrap();
        assert_eq!(
            json,
            r#"{"status":"cancelled","message":"Generation cancelled"}"#
        );
    }
}
