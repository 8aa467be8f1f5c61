use serde::{Serialize, Deserialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanApprovalRequest {
    pub tool_name: String,
    pub tool_args: HashMap<String, serde_json::Value>,
    pub risk_level: RiskLevel,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HumanDecision {
    Approved,
    Rejected(String), // Reason for rejection
    Modified {
        tool_name: String,
        tool_args: HashMap<String, serde_json::Value>,
    },
}

#[derive(Debug, Clone)]
pub enum ApprovalPolicy {
    AlwaysAsk,
    NeverAsk,
    AskAbove(RiskLevel),
    ToolBased(HashMap<String, RiskLevel>),
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::AskAbove(RiskLevel::High)
    }
}

impl ApprovalPolicy {
    /// `risk_level` is the caller-assigned risk of this particular call
    /// (carried on the `HumanApprovalRequest`); `ToolBased` looks up a
    /// per-tool threshold and compares against it instead of a fixed one.
    pub fn needs_approval(&self, tool_name: &str, risk_level: RiskLevel, _args: &HashMap<String, serde_json::Value>) -> bool {
        match self {
            Self::AlwaysAsk => true,
            Self::NeverAsk => false,
            Self::AskAbove(threshold) => risk_level >= *threshold,
            Self::ToolBased(thresholds) => match thresholds.get(tool_name) {
                Some(threshold) => risk_level >= *threshold,
                None => risk_level >= RiskLevel::High,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_based_uses_the_stored_per_tool_threshold() {
        let mut thresholds = HashMap::new();
        thresholds.insert("delete_file".to_string(), RiskLevel::Low);
        thresholds.insert("read_file".to_string(), RiskLevel::Critical);
        let policy = ApprovalPolicy::ToolBased(thresholds);

        assert!(policy.needs_approval("delete_file", RiskLevel::Medium, &HashMap::new()));
        assert!(!policy.needs_approval("read_file", RiskLevel::High, &HashMap::new()));
    }

    #[test]
    fn tool_based_falls_back_to_high_threshold_for_unlisted_tools() {
        let policy = ApprovalPolicy::ToolBased(HashMap::new());
        assert!(!policy.needs_approval("unlisted", RiskLevel::Medium, &HashMap::new()));
        assert!(policy.needs_approval("unlisted", RiskLevel::High, &HashMap::new()));
    }
}
