//! Dependency extraction and topological layering for a batch of
//! independently-described tasks (C10, spec.md §4.10). Grounded on the
//! teacher's JSON-mode LLM parsing in `llm.rs` for the "ask the model,
//! parse strict JSON back" shape, and on `config.rs::detect_cycle` for the
//! graph-walk pattern, generalized from a workflow's static node graph to a
//! dynamically inferred one.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::error::AgentMeshError;
use crate::llm::LlmCapability;
use crate::state::Message;

/// What the dependency-extraction LLM call reports for one task
/// description: the artifact names it produces and the ones it consumes
/// from earlier tasks.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedArtifacts {
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub consumes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    produces: Vec<String>,
    consumes: Vec<String>,
}

const EXTRACTION_SYSTEM_PROMPT: &str = "You analyze a task description and report, as strict JSON \
with keys \"produces\" and \"consumes\" (both arrays of short lowercase artifact names, no prose), \
which named artifacts this task produces for later tasks and which ones it consumes from earlier \
tasks. Respond with JSON only.";

/// One node of the inferred dependency graph: a task id paired with the
/// artifacts it reads and writes.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub task_id: String,
    pub description: String,
    pub artifacts: ExtractedArtifacts,
}

/// Builds a dependency graph over a batch of task descriptions by asking an
/// LLM to name each task's produced/consumed artifacts, then wires edges
/// wherever one task consumes an artifact another produces.
pub struct DependencyAnalyzer {
    llm: std::sync::Arc<dyn LlmCapability>,
    model: String,
}

impl DependencyAnalyzer {
    pub fn new(llm: std::sync::Arc<dyn LlmCapability>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }

    async fn extract(&self, task_id: &str, description: &str) -> Result<ExtractedArtifacts, AgentMeshError> {
        let messages = vec![Message::user(description)];
        let response = self.llm.chat(&messages, EXTRACTION_SYSTEM_PROMPT, &[], &self.model).await?;

        let parsed: ExtractionResponse = serde_json::from_str(response.content.trim()).map_err(|e| {
            AgentMeshError::SchemaViolation {
                message: format!("dependency extraction for task '{task_id}' returned invalid JSON: {e}"),
                ctx: crate::error::ErrorContext::new().with_task(task_id),
            }
        })?;

        // Artifact names are normalized to lowercase here rather than trusted
        // from the model's response, so a producer's "Draft" and a
        // consumer's "draft" still wire an edge (spec §4.8).
        Ok(ExtractedArtifacts {
            produces: parsed.produces.into_iter().map(|s| s.to_lowercase()).collect(),
            consumes: parsed.consumes.into_iter().map(|s| s.to_lowercase()).collect(),
        })
    }

    /// Extracts artifacts for every `(task_id, description)` pair and
    /// returns the resulting graph nodes. Each task is analyzed
    /// independently, so callers may run this concurrently upstream if
    /// they choose; this method itself is sequential for determinism in
    /// tests.
    pub async fn analyze(&self, tasks: &[(String, String)]) -> Result<Vec<TaskNode>, AgentMeshError> {
        let mut nodes = Vec::with_capacity(tasks.len());
        for (task_id, description) in tasks {
            let artifacts = self.extract(task_id, description).await?;
            nodes.push(TaskNode { task_id: task_id.clone(), description: description.clone(), artifacts });
        }
        Ok(nodes)
    }
}

/// A dependency graph over task ids, built from each task's declared
/// produces/consumes sets. `edges[to]` lists the task ids `to` depends on.
pub struct DependencyGraph {
    pub task_ids: Vec<String>,
    pub edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Wires an edge from consumer to producer for every artifact name a
    /// later-listed task consumes that an earlier-listed task produces.
    /// Only the first producer of a given artifact is wired to, so a
    /// diamond re-production doesn't create redundant edges.
    pub fn build(nodes: &[TaskNode]) -> Self {
        let mut producer_of: HashMap<&str, &str> = HashMap::new();
        for node in nodes {
            for artifact in &node.artifacts.produces {
                producer_of.entry(artifact.as_str()).or_insert(node.task_id.as_str());
            }
        }

        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        for node in nodes {
            let mut deps = HashSet::new();
            for artifact in &node.artifacts.consumes {
                if let Some(&producer) = producer_of.get(artifact.as_str()) {
                    if producer != node.task_id {
                        deps.insert(producer.to_string());
                    }
                }
            }
            edges.insert(node.task_id.clone(), deps.into_iter().collect());
        }

        Self { task_ids: nodes.iter().map(|n| n.task_id.clone()).collect(), edges }
    }

    /// Partitions the graph into layers where every task in layer N depends
    /// only on tasks in layers `< N`; tasks within a layer have no edges
    /// between them and can run concurrently. Returns
    /// [`AgentMeshError::CycleDetected`] if the graph isn't a DAG.
    pub fn topological_layers(&self) -> Result<Vec<Vec<String>>, AgentMeshError> {
        let mut remaining: HashSet<String> = self.task_ids.iter().cloned().collect();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<String> = remaining
                .iter()
                .filter(|id| {
                    self.edges
                        .get(id.as_str())
                        .map(|deps| deps.iter().all(|d| !remaining.contains(d)))
                        .unwrap_or(true)
                })
                .cloned()
                .collect();

            if ready.is_empty() {
                return Err(AgentMeshError::CycleDetected);
            }

            for id in &ready {
                remaining.remove(id);
            }
            let mut layer = ready;
            layer.sort();
            layers.push(layer);
        }

        Ok(layers)
    }

    /// All task ids depending, transitively, on `failed`. Used by the
    /// scheduler to mark descendants of a failed task as skipped rather
    /// than attempting them against missing inputs.
    pub fn descendants_of(&self, failed: &str) -> HashSet<String> {
        let mut descendants = HashSet::new();
        let mut frontier = vec![failed.to_string()];
        while let Some(node) = frontier.pop() {
            for (task_id, deps) in &self.edges {
                if deps.contains(&node) && descendants.insert(task_id.clone()) {
                    frontier.push(task_id.clone());
                }
            }
        }
        descendants
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, MockLlmCaller, ScriptedReply};
    use std::sync::Arc;

    fn node(id: &str, produces: &[&str], consumes: &[&str]) -> TaskNode {
        TaskNode {
            task_id: id.to_string(),
            description: String::new(),
            artifacts: ExtractedArtifacts {
                produces: produces.iter().map(|s| s.to_string()).collect(),
                consumes: consumes.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    #[test]
    fn independent_tasks_land_in_the_same_layer() {
        let nodes = vec![node("a", &["x"], &[]), node("b", &["y"], &[])];
        let graph = DependencyGraph::build(&nodes);
        let layers = graph.topological_layers().unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0], vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn a_consumer_lands_one_layer_after_its_producer() {
        let nodes = vec![node("a", &["draft"], &[]), node("b", &[], &["draft"])];
        let graph = DependencyGraph::build(&nodes);
        let layers = graph.topological_layers().unwrap();
        assert_eq!(layers, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }

    #[test]
    fn a_mutual_dependency_is_reported_as_a_cycle() {
        let nodes = vec![node("a", &["x"], &["y"]), node("b", &["y"], &["x"])];
        let graph = DependencyGraph::build(&nodes);
        assert!(matches!(graph.topological_layers(), Err(AgentMeshError::CycleDetected)));
    }

    #[test]
    fn descendants_of_a_failed_task_include_transitive_consumers() {
        let nodes = vec![
            node("a", &["draft"], &[]),
            node("b", &["reviewed"], &["draft"]),
            node("c", &[], &["reviewed"]),
        ];
        let graph = DependencyGraph::build(&nodes);
        let descendants = graph.descendants_of("a");
        assert!(descendants.contains("b"));
        assert!(descendants.contains("c"));
    }

    #[tokio::test]
    async fn extracted_artifacts_are_lowercased_so_differently_cased_names_still_wire() {
        let llm = Arc::new(MockLlmCaller::new(vec![
            ScriptedReply::Response(ChatResponse {
                content: r#"{"produces": ["Draft"], "consumes": []}"#.to_string(),
                tool_calls: Vec::new(),
                usage: None,
            }),
            ScriptedReply::Response(ChatResponse {
                content: r#"{"produces": [], "consumes": ["draft"]}"#.to_string(),
                tool_calls: Vec::new(),
                usage: None,
            }),
        ]));
        let analyzer = DependencyAnalyzer::new(llm, "gpt-4");

        let nodes = analyzer
            .analyze(&[("a".to_string(), "write a draft".to_string()), ("b".to_string(), "review the draft".to_string())])
            .await
            .unwrap();

        assert_eq!(nodes[0].artifacts.produces, vec!["draft".to_string()]);
        assert_eq!(nodes[1].artifacts.consumes, vec!["draft".to_string()]);

        let graph = DependencyGraph::build(&nodes);
        let layers = graph.topological_layers().unwrap();
        assert_eq!(layers, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }
}
