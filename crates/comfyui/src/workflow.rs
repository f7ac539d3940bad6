//! Workflow loading and patching.
//!
//! Workflows are ComfyUI API-format JSON: an object mapping node IDs to
//! `{class_type, inputs, _meta}`. Before submission the bridge patches the
//! `LoadImage` source, the prompt texts (resolved through the sampler's
//! `positive`/`negative` input links), and the sampler settings carried in
//! the plugin's prompt payload.

use std::path::Path;

use serde_json::Value;

use brushlink_core::prompt::PromptPayload;

/// Errors from workflow loading and patching.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Failed to read workflow {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed workflow JSON in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Workflow has no {0} node")]
    MissingNode(&'static str),
}

/// Load a workflow file into JSON.
pub async fn load_workflow(path: &Path) -> Result<Value, WorkflowError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| WorkflowError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| WorkflowError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Point every `LoadImage` node at the uploaded input image.
pub fn apply_input_image(workflow: &mut Value, image_name: &str) -> Result<(), WorkflowError> {
    let Some(nodes) = workflow.as_object_mut() else {
        return Err(WorkflowError::MissingNode("LoadImage"));
    };

    let mut patched = false;
    for node in nodes.values_mut() {
        if node.get("class_type").and_then(Value::as_str) != Some("LoadImage") {
            continue;
        }
        if let Some(inputs) = node.get_mut("inputs").and_then(Value::as_object_mut) {
            inputs.insert("image".into(), Value::String(image_name.to_string()));
            patched = true;
        }
    }

    if patched {
        Ok(())
    } else {
        Err(WorkflowError::MissingNode("LoadImage"))
    }
}

/// Replace the positive and negative prompt texts.
///
/// The text encoders are found by following the sampler's `positive` and
/// `negative` input links rather than by node title, so retitled workflows
/// still patch correctly.
pub fn apply_prompts(
    workflow: &mut Value,
    positive: &str,
    negative: &str,
) -> Result<(), WorkflowError> {
    let sampler_id = find_sampler(workflow).ok_or(WorkflowError::MissingNode("KSampler"))?;

    if let Some(target) = link_target(workflow, &sampler_id, "positive") {
        set_text_input(workflow, &target, positive);
    }
    if let Some(target) = link_target(workflow, &sampler_id, "negative") {
        set_text_input(workflow, &target, negative);
    }

    Ok(())
}

/// Apply the sampler settings present in the prompt payload.
///
/// Absent fields leave the workflow's own values untouched. Missing sampler
/// node is a no-op; the workflow may be a plain passthrough graph.
pub fn apply_sampler_overrides(workflow: &mut Value, prompt: &PromptPayload) {
    let Some(sampler_id) = find_sampler(workflow) else {
        return;
    };
    let Some(inputs) = workflow
        .get_mut(&sampler_id)
        .and_then(|n| n.get_mut("inputs"))
        .and_then(Value::as_object_mut)
    else {
        return;
    };

    if let Some(seed) = prompt.seed.as_ref().and_then(as_integer) {
        inputs.insert("seed".into(), seed.into());
    }
    if let Some(steps) = prompt.steps.as_ref().and_then(as_integer) {
        inputs.insert("steps".into(), steps.into());
    }
    if let Some(cfg) = prompt.cfg.as_ref().and_then(as_float) {
        inputs.insert("cfg".into(), cfg.into());
    }
    if let Some(denoise) = prompt.denoise.as_ref().and_then(as_float) {
        inputs.insert("denoise".into(), denoise.into());
    }
}

/// ID of the first sampler node (`KSampler`, `KSamplerAdvanced`, ...).
fn find_sampler(workflow: &Value) -> Option<String> {
    let nodes = workflow.as_object()?;
    nodes
        .iter()
        .find(|(_, node)| {
            node.get("class_type")
                .and_then(Value::as_str)
                .is_some_and(|class| class.starts_with("KSampler"))
        })
        .map(|(id, _)| id.clone())
}

/// Resolve a node-link input (`[node_id, slot]`) to the source node's ID.
fn link_target(workflow: &Value, node_id: &str, input: &str) -> Option<String> {
    workflow
        .get(node_id)?
        .get("inputs")?
        .get(input)?
        .as_array()?
        .first()?
        .as_str()
        .map(str::to_string)
}

/// Set the `text` input on a CLIP text encode node, if it exists.
fn set_text_input(workflow: &mut Value, node_id: &str, text: &str) {
    if let Some(inputs) = workflow
        .get_mut(node_id)
        .and_then(|n| n.get_mut("inputs"))
        .and_then(Value::as_object_mut)
    {
        inputs.insert("text".into(), Value::String(text.to_string()));
    }
}

/// The plugin UI serializes numbers as strings; accept both.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Minimal image-to-image graph: LoadImage -> KSampler with two
    /// CLIPTextEncode conditioning inputs.
    fn fixture() -> Value {
        json!({
            "1": {
                "class_type": "LoadImage",
                "inputs": { "image": "placeholder.png" }
            },
            "2": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "old positive", "clip": ["5", 1] }
            },
            "3": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "old negative", "clip": ["5", 1] }
            },
            "4": {
                "class_type": "KSampler",
                "inputs": {
                    "seed": 0,
                    "steps": 12,
                    "cfg": 8.0,
                    "denoise": 1.0,
                    "positive": ["2", 0],
                    "negative": ["3", 0],
                    "latent_image": ["6", 0]
                }
            }
        })
    }

    #[test]
    fn input_image_is_applied_to_load_image_node() {
        let mut wf = fixture();
        apply_input_image(&mut wf, "uploaded_01.png").unwrap();
        assert_eq!(wf["1"]["inputs"]["image"], "uploaded_01.png");
    }

    #[test]
    fn missing_load_image_node_is_an_error() {
        let mut wf = json!({ "4": { "class_type": "KSampler", "inputs": {} } });
        let err = apply_input_image(&mut wf, "x.png").unwrap_err();
        assert!(matches!(err, WorkflowError::MissingNode("LoadImage")));
    }

    #[test]
    fn prompts_are_routed_through_sampler_links() {
        let mut wf = fixture();
        apply_prompts(&mut wf, "a castle", "blurry, low quality").unwrap();
        assert_eq!(wf["2"]["inputs"]["text"], "a castle");
        assert_eq!(wf["3"]["inputs"]["text"], "blurry, low quality");
    }

    #[test]
    fn prompts_without_sampler_is_an_error() {
        let mut wf = json!({ "1": { "class_type": "LoadImage", "inputs": {} } });
        let err = apply_prompts(&mut wf, "p", "n").unwrap_err();
        assert!(matches!(err, WorkflowError::MissingNode("KSampler")));
    }

    #[test]
    fn sampler_overrides_coerce_string_numbers() {
        let mut wf = fixture();
        let prompt = PromptPayload {
            seed: Some(json!("42")),
            steps: Some(json!("20")),
            cfg: Some(json!("6.5")),
            denoise: Some(json!(0.6)),
            ..Default::default()
        };

        apply_sampler_overrides(&mut wf, &prompt);

        assert_eq!(wf["4"]["inputs"]["seed"], 42);
        assert_eq!(wf["4"]["inputs"]["steps"], 20);
        assert_eq!(wf["4"]["inputs"]["cfg"], 6.5);
        assert_eq!(wf["4"]["inputs"]["denoise"], 0.6);
    }

    #[test]
    fn absent_overrides_leave_workflow_values() {
        let mut wf = fixture();
        apply_sampler_overrides(&mut wf, &PromptPayload::default());
        assert_eq!(wf["4"]["inputs"]["steps"], 12);
        assert_eq!(wf["4"]["inputs"]["cfg"], 8.0);
    }

    #[test]
    fn uncoercible_override_is_skipped() {
        let mut wf = fixture();
        let prompt = PromptPayload {
            seed: Some(json!("not a number")),
            ..Default::default()
        };
        apply_sampler_overrides(&mut wf, &prompt);
        assert_eq!(wf["4"]["inputs"]["seed"], 0);
    }

    #[test]
    fn advanced_sampler_is_found() {
        let wf = json!({
            "9": { "class_type": "KSamplerAdvanced", "inputs": {} }
        });
        assert_eq!(find_sampler(&wf).as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn load_workflow_reads_and_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        std::fs::write(&path, fixture().to_string()).unwrap();

        let wf = load_workflow(&path).await.unwrap();
        assert_eq!(wf["4"]["class_type"], "KSampler");
    }

    #[tokio::test]
    async fn load_workflow_missing_file_is_read_error() {
        let err = load_workflow(Path::new("/no/such/workflow.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Read { .. }));
    }
}
