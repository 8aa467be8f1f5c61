//! External configuration records (C6/agent descriptors). This crate
//! defines these shapes and deserializes them, but never loads them from
//! disk or performs `${VAR}` interpolation itself — that is the documented
//! responsibility of an external loader.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::human::ApprovalPolicy;

/// Base delay, multiplier, max attempts, and jitter fraction for the
/// exponential backoff the tool manager and LLM retry wrapper use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_attempts: 3,
            jitter_fraction: 0.2,
        }
    }
}

/// Immutable, once-loaded description of an agent: name, role, system
/// prompt, tool allow-list, iteration cap, and model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub role: String,
    pub system_prompt: String,
    pub tool_allow_list: Vec<String>,
    pub max_iterations: usize,
    pub model: String,
    pub temperature: f32,
    #[serde(default)]
    pub sub_agents: Vec<String>,
    #[serde(default)]
    pub approval_policy: Option<ApprovalPolicyConfig>,
}

/// Serde-friendly mirror of [`ApprovalPolicy`] (which doesn't round-trip
/// through JSON as cleanly because of its `RiskLevel` ordering semantics
/// being a pure code concern, not a config concern).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalPolicyConfig {
    AlwaysAsk,
    NeverAsk,
    AskAbove { threshold: crate::human::RiskLevel },
    ToolBased { thresholds: HashMap<String, crate::human::RiskLevel> },
}

impl From<ApprovalPolicyConfig> for ApprovalPolicy {
    fn from(cfg: ApprovalPolicyConfig) -> Self {
        match cfg {
            ApprovalPolicyConfig::AlwaysAsk => ApprovalPolicy::AlwaysAsk,
            ApprovalPolicyConfig::NeverAsk => ApprovalPolicy::NeverAsk,
            ApprovalPolicyConfig::AskAbove { threshold } => ApprovalPolicy::AskAbove(threshold),
            ApprovalPolicyConfig::ToolBased { thresholds } => ApprovalPolicy::ToolBased(thresholds),
        }
    }
}

/// Node kinds in a workflow graph (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDefinition {
    Agent { agent: String, #[serde(default)] interrupt_before: bool },
    Tool { tool: String, #[serde(default)] interrupt_before: bool },
    Condition { #[serde(default)] interrupt_before: bool },
    Human { #[serde(default)] interrupt_before: bool },
}

impl NodeDefinition {
    pub fn interrupt_before(&self) -> bool {
        match self {
            NodeDefinition::Agent { interrupt_before, .. }
            | NodeDefinition::Tool { interrupt_before, .. }
            | NodeDefinition::Condition { interrupt_before }
            | NodeDefinition::Human { interrupt_before } => *interrupt_before,
        }
    }
}

/// An edge is either unconditional (`to`) or a routing-key dispatch table
/// (`routes`), never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub routes: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub nodes: HashMap<String, NodeDefinition>,
    pub edges: Vec<EdgeDefinition>,
    pub entry_node: String,
    #[serde(default)]
    pub checkpoints: std::collections::HashSet<String>,
    pub max_iterations: usize,
}

impl WorkflowDefinition {
    /// A node is checkpoint-eligible if it carries `interrupt_before` or is
    /// named in the `checkpoints` set.
    pub fn is_checkpoint_eligible(&self, node: &str) -> bool {
        self.checkpoints.contains(node) || self.nodes.get(node).map(|n| n.interrupt_before()).unwrap_or(false)
    }

    /// Validates that the node/edge graph forms a DAG once conditional
    /// edges are collapsed, and that at most one edge definition originates
    /// from any given node.
    pub fn validate(&self) -> Result<(), crate::error::AgentMeshError> {
        if !self.nodes.contains_key(&self.entry_node) {
            return Err(crate::error::AgentMeshError::WorkflowValidation {
                message: format!("entry node '{}' is not defined", self.entry_node),
            });
        }

        let mut seen_sources = std::collections::HashSet::new();
        for edge in &self.edges {
            if !seen_sources.insert(edge.from.clone()) {
                return Err(crate::error::AgentMeshError::WorkflowValidation {
                    message: format!("node '{}' has more than one edge definition", edge.from),
                });
            }
            if !self.nodes.contains_key(&edge.from) {
                return Err(crate::error::AgentMeshError::WorkflowValidation {
                    message: format!("edge references undefined source node '{}'", edge.from),
                });
            }
            if let Some(to) = &edge.to {
                if !self.nodes.contains_key(to) {
                    return Err(crate::error::AgentMeshError::WorkflowValidation {
                        message: format!("edge references undefined target node '{}'", to),
                    });
                }
            }
            if let Some(routes) = &edge.routes {
                for target in routes.values() {
                    if !self.nodes.contains_key(target) {
                        return Err(crate::error::AgentMeshError::WorkflowValidation {
                            message: format!("conditional edge references undefined target node '{}'", target),
                        });
                    }
                }
            }
        }

        detect_cycle(self)
    }
}

fn detect_cycle(def: &WorkflowDefinition) -> Result<(), crate::error::AgentMeshError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let successors = |node: &str| -> Vec<String> {
        def.edges
            .iter()
            .find(|e| e.from == node)
            .map(|e| {
                let mut targets = Vec::new();
                if let Some(to) = &e.to {
                    targets.push(to.clone());
                }
                if let Some(routes) = &e.routes {
                    targets.extend(routes.values().cloned());
                }
                targets
            })
            .unwrap_or_default()
    };

    let mut marks: HashMap<String, Mark> = def.nodes.keys().map(|n| (n.clone(), Mark::Unvisited)).collect();

    fn visit(
        node: &str,
        marks: &mut HashMap<String, Mark>,
        successors: &impl Fn(&str) -> Vec<String>,
    ) -> Result<(), crate::error::AgentMeshError> {
        match marks.get(node).copied().unwrap_or(Mark::Unvisited) {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(crate::error::AgentMeshError::CycleDetected),
            Mark::Unvisited => {}
        }
        marks.insert(node.to_string(), Mark::InProgress);
        for next in successors(node) {
            visit(&next, marks, successors)?;
        }
        marks.insert(node.to_string(), Mark::Done);
        Ok(())
    }

    let node_names: Vec<String> = def.nodes.keys().cloned().collect();
    for node in node_names {
        visit(&node, &mut marks, &successors)?;
    }
    Ok(())
}
