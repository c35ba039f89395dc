//! ComfyUI workflow template engine.
//!
//! Loads an API-format workflow export (an object keyed by node ID,
//! each value holding `class_type` and `inputs`) and patches individual
//! node inputs before submission:
//!
//! ```json
//! {
//!   "3": { "class_type": "KSampler", "inputs": { "seed": 42, "model": ["4", 0] } },
//!   "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "a cat", "clip": ["4", 1] } }
//! }
//! ```
//!
//! Node IDs are positional artifacts of the exporting tool, so the engine
//! only checks that a node exists before writing to it. Mutations that
//! target a missing node are skipped and reported as
//! [`MutationOutcome::SkippedMissingNode`]; they never fail.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::NodeId;

// ---------------------------------------------------------------------------
// Well-known input names
// ---------------------------------------------------------------------------

/// Prompt text input on `CLIPTextEncode` nodes.
pub const TEXT_INPUT: &str = "text";

/// Seed input on `KSampler` nodes.
pub const SEED_INPUT: &str = "seed";

/// Width input on `EmptyLatentImage` nodes.
pub const WIDTH_INPUT: &str = "width";

/// Height input on `EmptyLatentImage` nodes.
pub const HEIGHT_INPUT: &str = "height";

/// Checkpoint filename input on `CheckpointLoaderSimple` nodes.
pub const CKPT_NAME_INPUT: &str = "ckpt_name";

/// Output filename prefix on `SaveImage` nodes.
pub const FILENAME_PREFIX_INPUT: &str = "filename_prefix";

/// Image-source input on `SaveImage` nodes.
pub const IMAGES_INPUT: &str = "images";

/// Upper bound (inclusive) for randomly injected seeds.
pub const MAX_RANDOM_SEED: u64 = 100_000_000_000_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading a workflow template.
///
/// All of these are configuration errors: the pipeline cannot run any job
/// without a usable template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read workflow template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse workflow template {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid workflow template: {0}")]
    Shape(String),
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A graph edge: `(upstream_node_id, output_slot_index)`.
///
/// Serialized the way ComfyUI expects it, as a two-element array
/// `["4", 0]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeLink(pub NodeId, pub u32);

impl NodeLink {
    pub fn new(node_id: impl Into<NodeId>, slot: u32) -> Self {
        Self(node_id.into(), slot)
    }

    /// Upstream node ID.
    pub fn node_id(&self) -> &str {
        &self.0
    }
}

/// Value of a single node input: either an edge to another node or a
/// literal (string, number, bool, or anything else the node accepts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Link(NodeLink),
    Scalar(Value),
}

impl InputValue {
    pub fn as_link(&self) -> Option<&NodeLink> {
        match self {
            Self::Link(link) => Some(link),
            Self::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Link(_) => None,
        }
    }
}

impl From<NodeLink> for InputValue {
    fn from(link: NodeLink) -> Self {
        Self::Link(link)
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<u64> for InputValue {
    fn from(value: u64) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<u32> for InputValue {
    fn from(value: u32) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<i64> for InputValue {
    fn from(value: i64) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        Self::Scalar(Value::from(value))
    }
}

/// A single node record.
///
/// `inputs` is an open bag so that unknown node kinds pass through
/// untouched. Any other top-level keys (e.g. `_meta`) are kept in
/// `extra` and written back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// ComfyUI class type (e.g. "KSampler"). Hand-written templates may
    /// omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_type: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputValue>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Result of a single mutation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The field was written.
    Applied,
    /// The target node does not exist; nothing changed.
    SkippedMissingNode,
}

impl MutationOutcome {
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

/// A reference pair whose upstream node is absent from the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingLink {
    pub node_id: NodeId,
    pub input_name: String,
    pub missing_upstream: NodeId,
}

/// The two alternate upstream branches a save node can read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRoutes {
    /// Plain decode branch, used when upscaling is off.
    pub direct: NodeLink,
    /// Upscale-then-decode branch.
    pub upscaled: NodeLink,
}

/// A full workflow: node ID to node record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    nodes: BTreeMap<NodeId, WorkflowNode>,
}

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

impl WorkflowGraph {
    /// Build a graph from parsed workflow JSON.
    ///
    /// The root must be a non-empty object whose values are node objects.
    pub fn from_value(json: Value) -> Result<Self, TemplateError> {
        let Value::Object(obj) = json else {
            return Err(TemplateError::Shape(
                "Workflow JSON must be an object keyed by node ID".to_string(),
            ));
        };

        if obj.is_empty() {
            return Err(TemplateError::Shape(
                "Workflow JSON must contain at least one node".to_string(),
            ));
        }

        let mut nodes = BTreeMap::new();
        for (node_id, node_value) in obj {
            if !node_value.is_object() {
                return Err(TemplateError::Shape(format!(
                    "Node '{node_id}' must be an object"
                )));
            }
            let node: WorkflowNode = serde_json::from_value(node_value)
                .map_err(|e| TemplateError::Shape(format!("Node '{node_id}': {e}")))?;
            nodes.insert(node_id, node);
        }

        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(node_id)
    }

    /// Node IDs in sorted order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Current value of one input, if both the node and the input exist.
    pub fn input(&self, node_id: &str, input_name: &str) -> Option<&InputValue> {
        self.nodes.get(node_id)?.inputs.get(input_name)
    }

    /// Write `value` into `inputs[input_name]` of `node_id`.
    ///
    /// Only the existence of the node is checked. The input is created if
    /// the node does not have it yet.
    pub fn set_input(
        &mut self,
        node_id: &str,
        input_name: &str,
        value: InputValue,
    ) -> MutationOutcome {
        match self.nodes.get_mut(node_id) {
            Some(node) => {
                node.inputs.insert(input_name.to_string(), value);
                MutationOutcome::Applied
            }
            None => {
                tracing::warn!(
                    node_id = %node_id,
                    input = %input_name,
                    "Workflow node not found, skipping mutation",
                );
                MutationOutcome::SkippedMissingNode
            }
        }
    }

    /// Every edge in the graph as `(node_id, input_name, link)`.
    pub fn links(&self) -> impl Iterator<Item = (&str, &str, &NodeLink)> {
        self.nodes.iter().flat_map(|(node_id, node)| {
            node.inputs.iter().filter_map(move |(input_name, value)| {
                value
                    .as_link()
                    .map(|link| (node_id.as_str(), input_name.as_str(), link))
            })
        })
    }

    /// Edges pointing at nodes that are not in the graph.
    ///
    /// Purely diagnostic: mutations never check referential integrity.
    pub fn dangling_links(&self) -> Vec<DanglingLink> {
        self.links()
            .filter(|(_, _, link)| !self.contains(link.node_id()))
            .map(|(node_id, input_name, link)| DanglingLink {
                node_id: node_id.to_string(),
                input_name: input_name.to_string(),
                missing_upstream: link.node_id().to_string(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// WorkflowTemplate
// ---------------------------------------------------------------------------

/// A loaded template plus its working copy.
///
/// Mutations rewrite the working copy in place; [`reset`](Self::reset)
/// restores the graph as loaded so one template can serve a whole batch.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    source: Option<PathBuf>,
    pristine: WorkflowGraph,
    graph: WorkflowGraph,
}

impl WorkflowTemplate {
    /// Load a template from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let json: Value = serde_json::from_str(&text).map_err(|source| TemplateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let graph = WorkflowGraph::from_value(json)?;
        tracing::debug!(
            path = %path.display(),
            nodes = graph.len(),
            "Loaded workflow template",
        );

        let mut template = Self::from_graph(graph);
        template.source = Some(path.to_path_buf());
        Ok(template)
    }

    /// Build a template from already-parsed workflow JSON.
    pub fn from_value(json: Value) -> Result<Self, TemplateError> {
        WorkflowGraph::from_value(json).map(Self::from_graph)
    }

    pub fn from_graph(graph: WorkflowGraph) -> Self {
        Self {
            source: None,
            pristine: graph.clone(),
            graph,
        }
    }

    /// File the template was loaded from, if any.
    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// The current (mutated) graph, ready for submission.
    pub fn materialize(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// The current graph as a JSON value.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.graph)
    }

    /// Discard all mutations.
    pub fn reset(&mut self) {
        self.graph = self.pristine.clone();
    }

    /// Set the `text` input of a prompt node.
    pub fn set_text_field(&mut self, node_id: &str, text: &str) -> MutationOutcome {
        self.graph.set_input(node_id, TEXT_INPUT, InputValue::from(text))
    }

    /// Set any input to a literal or a link.
    pub fn set_field(
        &mut self,
        node_id: &str,
        input_name: &str,
        value: impl Into<InputValue>,
    ) -> MutationOutcome {
        self.graph.set_input(node_id, input_name, value.into())
    }

    pub fn set_seed(&mut self, node_id: &str, seed: u64) -> MutationOutcome {
        self.set_field(node_id, SEED_INPUT, seed)
    }

    /// Set `width` and `height` on a latent-image node.
    pub fn set_dimensions(&mut self, node_id: &str, width: u32, height: u32) -> MutationOutcome {
        let outcome = self.set_field(node_id, WIDTH_INPUT, width);
        if outcome.is_applied() {
            self.set_field(node_id, HEIGHT_INPUT, height);
        }
        outcome
    }

    /// Set a model filename input (checkpoint, LoRA, upscaler, ...).
    pub fn set_model(&mut self, node_id: &str, input_name: &str, filename: &str) -> MutationOutcome {
        self.set_field(node_id, input_name, filename)
    }

    /// Set a strength-like float input (LoRA strength, denoise, ...).
    pub fn set_strength(&mut self, node_id: &str, input_name: &str, value: f64) -> MutationOutcome {
        self.set_field(node_id, input_name, value)
    }

    pub fn set_filename_prefix(&mut self, node_id: &str, prefix: &str) -> MutationOutcome {
        self.set_field(node_id, FILENAME_PREFIX_INPUT, prefix)
    }

    /// Inject a random seed in `1..=MAX_RANDOM_SEED`.
    ///
    /// The generated seed is returned even when the node is missing so the
    /// caller can still record it.
    pub fn randomize_seed(&mut self, node_id: &str) -> u64 {
        let seed = rand::rng().random_range(1..=MAX_RANDOM_SEED);
        self.set_seed(node_id, seed);
        seed
    }

    /// Point a save node at one of two pre-existing upstream branches.
    ///
    /// Skipped when either the save node or the selected upstream node is
    /// absent; the engine never creates nodes.
    pub fn route_output(
        &mut self,
        save_node_id: &str,
        input_name: &str,
        use_upscale: bool,
        routes: &OutputRoutes,
    ) -> MutationOutcome {
        let target = if use_upscale {
            &routes.upscaled
        } else {
            &routes.direct
        };

        if !self.graph.contains(target.node_id()) {
            tracing::warn!(
                save_node_id = %save_node_id,
                upstream = %target.node_id(),
                "Routing target not found, skipping mutation",
            );
            return MutationOutcome::SkippedMissingNode;
        }

        self.set_field(save_node_id, input_name, target.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn sample_workflow_json() -> Value {
        json!({
            "3": {
                "class_type": "KSampler",
                "inputs": {
                    "seed": 1001,
                    "cfg": 7.5,
                    "steps": 20,
                    "model": ["4", 0],
                    "positive": ["6", 0],
                    "latent_image": ["5", 0]
                }
            },
            "4": {
                "class_type": "CheckpointLoaderSimple",
                "inputs": { "ckpt_name": "sd_xl_base_1.0.safetensors" }
            },
            "5": {
                "class_type": "EmptyLatentImage",
                "inputs": { "width": 1024, "height": 1024, "batch_size": 1 }
            },
            "6": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "a beautiful landscape", "clip": ["4", 1] },
                "_meta": { "title": "Positive Prompt" }
            },
            "8": {
                "class_type": "VAEDecode",
                "inputs": { "samples": ["3", 0], "vae": ["4", 2] }
            },
            "9": {
                "class_type": "SaveImage",
                "inputs": { "images": ["8", 0], "filename_prefix": "ComfyUI" }
            },
            "11": {
                "class_type": "ImageUpscaleWithModel",
                "inputs": { "image": ["8", 0], "upscale_model": ["10", 0] }
            }
        })
    }

    fn sample_template() -> WorkflowTemplate {
        WorkflowTemplate::from_value(sample_workflow_json()).unwrap()
    }

    fn node_json(template: &WorkflowTemplate, node_id: &str) -> String {
        serde_json::to_string(template.materialize().node(node_id).unwrap()).unwrap()
    }

    // -- scenario from the minimal template ----------------------------------

    #[test]
    fn patches_prompt_and_seed_of_minimal_template() {
        let mut template = WorkflowTemplate::from_value(json!({
            "3": { "inputs": { "seed": 0 } },
            "6": { "inputs": { "text": "" } }
        }))
        .unwrap();

        assert_eq!(template.set_text_field("6", "a cat"), MutationOutcome::Applied);
        assert_eq!(template.set_field("3", "seed", 42u64), MutationOutcome::Applied);

        assert_eq!(
            template.to_json().unwrap(),
            json!({
                "3": { "inputs": { "seed": 42 } },
                "6": { "inputs": { "text": "a cat" } }
            })
        );
    }

    // -- set_text_field / set_field ------------------------------------------

    #[test]
    fn mutation_leaves_other_nodes_untouched() {
        let mut template = sample_template();
        let before: Vec<(String, String)> = template
            .materialize()
            .node_ids()
            .filter(|id| *id != "6")
            .map(|id| (id.to_string(), node_json(&template, id)))
            .collect();

        template.set_text_field("6", "neon city at night");

        for (id, json_before) in before {
            assert_eq!(node_json(&template, &id), json_before, "node {id} changed");
        }
    }

    #[test]
    fn mutation_leaves_other_inputs_of_same_node_untouched() {
        let mut template = sample_template();
        template.set_seed("3", 7);

        let graph = template.materialize();
        assert_eq!(graph.input("3", "seed"), Some(&InputValue::from(7u64)));
        assert_eq!(graph.input("3", "cfg"), Some(&InputValue::from(7.5)));
        assert_eq!(
            graph.input("3", "model"),
            Some(&InputValue::Link(NodeLink::new("4", 0)))
        );
    }

    #[test]
    fn missing_node_is_a_noop() {
        let mut template = sample_template();
        let before = template.materialize().clone();

        assert_eq!(
            template.set_text_field("999", "ignored"),
            MutationOutcome::SkippedMissingNode
        );
        assert_eq!(
            template.set_field("999", "seed", 1u64),
            MutationOutcome::SkippedMissingNode
        );
        assert_eq!(template.materialize(), &before);
    }

    #[test]
    fn set_field_creates_missing_input_on_existing_node() {
        let mut template = sample_template();
        let outcome = template.set_strength("3", "denoise", 0.65);
        assert!(outcome.is_applied());
        assert_eq!(
            template.materialize().input("3", "denoise"),
            Some(&InputValue::from(0.65))
        );
    }

    #[test]
    fn set_text_preserves_non_ascii() {
        let mut template = sample_template();
        template.set_text_field("6", "赛博朋克, 霓虹灯");
        let json = template.to_json().unwrap();
        assert_eq!(json["6"]["inputs"]["text"], "赛博朋克, 霓虹灯");
    }

    #[test]
    fn set_dimensions_writes_both_fields() {
        let mut template = sample_template();
        assert!(template.set_dimensions("5", 832, 1216).is_applied());
        let json = template.to_json().unwrap();
        assert_eq!(json["5"]["inputs"]["width"], 832);
        assert_eq!(json["5"]["inputs"]["height"], 1216);
        assert_eq!(json["5"]["inputs"]["batch_size"], 1);
    }

    #[test]
    fn set_model_and_filename_prefix() {
        let mut template = sample_template();
        template.set_model("4", CKPT_NAME_INPUT, "juggernaut_xl.safetensors");
        template.set_filename_prefix("9", "job_0001");
        let json = template.to_json().unwrap();
        assert_eq!(json["4"]["inputs"]["ckpt_name"], "juggernaut_xl.safetensors");
        assert_eq!(json["9"]["inputs"]["filename_prefix"], "job_0001");
    }

    // -- materialize -----------------------------------------------------------

    #[test]
    fn materialize_is_repeatable() {
        let mut template = sample_template();
        template.set_text_field("6", "a cat");
        let first = template.materialize().clone();
        let second = template.materialize().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn materialize_reflects_latest_mutation() {
        let mut template = sample_template();
        template.set_seed("3", 1);
        template.set_seed("3", 2);
        assert_eq!(
            template.materialize().input("3", "seed"),
            Some(&InputValue::from(2u64))
        );
    }

    #[test]
    fn reset_restores_loaded_graph() {
        let mut template = sample_template();
        let original = template.materialize().clone();
        template.set_text_field("6", "changed");
        template.set_seed("3", 5);
        template.reset();
        assert_eq!(template.materialize(), &original);
    }

    // -- serialization ---------------------------------------------------------

    #[test]
    fn links_serialize_as_pairs() {
        let template = sample_template();
        let json = template.to_json().unwrap();
        assert_eq!(json["3"]["inputs"]["model"], json!(["4", 0]));
        assert_eq!(json["9"]["inputs"]["images"], json!(["8", 0]));
    }

    #[test]
    fn extra_node_keys_are_preserved() {
        let template = sample_template();
        let json = template.to_json().unwrap();
        assert_eq!(json["6"]["_meta"]["title"], "Positive Prompt");
        assert_eq!(json["6"]["class_type"], "CLIPTextEncode");
    }

    #[test]
    fn unmodified_template_round_trips() {
        let template = sample_template();
        assert_eq!(template.to_json().unwrap(), sample_workflow_json());
    }

    #[test]
    fn non_link_arrays_stay_scalar() {
        let template = WorkflowTemplate::from_value(json!({
            "1": { "inputs": { "sizes": [512, 768, 1024] } }
        }))
        .unwrap();
        let value = template.materialize().input("1", "sizes").unwrap();
        assert_matches!(value, InputValue::Scalar(_));
    }

    // -- routing ---------------------------------------------------------------

    fn routes() -> OutputRoutes {
        OutputRoutes {
            direct: NodeLink::new("8", 0),
            upscaled: NodeLink::new("11", 0),
        }
    }

    #[test]
    fn route_output_switches_to_upscale_branch() {
        let mut template = sample_template();
        let outcome = template.route_output("9", IMAGES_INPUT, true, &routes());
        assert_eq!(outcome, MutationOutcome::Applied);
        assert_eq!(
            template.materialize().input("9", IMAGES_INPUT),
            Some(&InputValue::Link(NodeLink::new("11", 0)))
        );

        template.route_output("9", IMAGES_INPUT, false, &routes());
        assert_eq!(
            template.materialize().input("9", IMAGES_INPUT),
            Some(&InputValue::Link(NodeLink::new("8", 0)))
        );
    }

    #[test]
    fn route_output_skips_missing_branch() {
        let mut template = sample_template();
        let missing = OutputRoutes {
            direct: NodeLink::new("8", 0),
            upscaled: NodeLink::new("42", 0),
        };
        let outcome = template.route_output("9", IMAGES_INPUT, true, &missing);
        assert_eq!(outcome, MutationOutcome::SkippedMissingNode);
        assert_eq!(
            template.materialize().input("9", IMAGES_INPUT),
            Some(&InputValue::Link(NodeLink::new("8", 0)))
        );
    }

    #[test]
    fn route_output_skips_missing_save_node() {
        let mut template = sample_template();
        let outcome = template.route_output("99", IMAGES_INPUT, true, &routes());
        assert_eq!(outcome, MutationOutcome::SkippedMissingNode);
    }

    // -- seeds -----------------------------------------------------------------

    #[test]
    fn randomize_seed_stays_in_range_and_is_applied() {
        let mut template = sample_template();
        for _ in 0..50 {
            let seed = template.randomize_seed("3");
            assert!((1..=MAX_RANDOM_SEED).contains(&seed));
            assert_eq!(
                template.materialize().input("3", SEED_INPUT),
                Some(&InputValue::from(seed))
            );
        }
    }

    #[test]
    fn randomize_seed_on_missing_node_still_returns_seed() {
        let mut template = sample_template();
        let before = template.materialize().clone();
        let seed = template.randomize_seed("404");
        assert!(seed >= 1);
        assert_eq!(template.materialize(), &before);
    }

    // -- diagnostics -----------------------------------------------------------

    #[test]
    fn dangling_links_reports_missing_upstream() {
        let template = sample_template();
        let dangling = template.materialize().dangling_links();
        // Node 11 references upscale model loader "10", which is absent.
        assert_eq!(
            dangling,
            vec![DanglingLink {
                node_id: "11".to_string(),
                input_name: "upscale_model".to_string(),
                missing_upstream: "10".to_string(),
            }]
        );
    }

    #[test]
    fn links_enumerates_every_edge() {
        let template = sample_template();
        // KSampler 3, CLIP 1, VAEDecode 2, SaveImage 1, Upscale 2.
        assert_eq!(template.materialize().links().count(), 9);
    }

    // -- loading ---------------------------------------------------------------

    #[test]
    fn load_reads_template_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("create temp file");
        write!(file, "{}", sample_workflow_json()).expect("write template");

        let template = WorkflowTemplate::load(file.path()).unwrap();
        assert_eq!(template.materialize().len(), 7);
        assert_eq!(template.source_path(), Some(file.path()));
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let result = WorkflowTemplate::load(dir.path().join("missing.json"));
        assert_matches!(result, Err(TemplateError::Read { .. }));
    }

    #[test]
    fn load_invalid_json_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        write!(file, "{{ not json").expect("write");
        let result = WorkflowTemplate::load(file.path());
        assert_matches!(result, Err(TemplateError::Parse { .. }));
    }

    #[test]
    fn non_object_root_is_rejected() {
        let err = WorkflowTemplate::from_value(json!(["a", "b"])).unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn empty_object_is_rejected() {
        let err = WorkflowTemplate::from_value(json!({})).unwrap_err();
        assert!(err.to_string().contains("at least one node"));
    }

    #[test]
    fn non_object_node_is_rejected() {
        let err = WorkflowTemplate::from_value(json!({ "1": 5 })).unwrap_err();
        assert!(err.to_string().contains("Node '1'"));
    }

    #[test]
    fn node_without_inputs_gets_empty_bag() {
        let template =
            WorkflowTemplate::from_value(json!({ "1": { "class_type": "SaveImage" } })).unwrap();
        let node = template.materialize().node("1").unwrap();
        assert!(node.inputs.is_empty());
        assert_eq!(node.class_type.as_deref(), Some("SaveImage"));
    }
}
