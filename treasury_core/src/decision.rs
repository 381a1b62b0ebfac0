//! Decisions - immutable records of one agent's synthesized action.

use serde::{Deserialize, Serialize};
use treasury_env::AgentId;

/// Creation-ordered decision identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(pub u64);

impl std::fmt::Display for DecisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dec-{:06}", self.0)
    }
}

/// Projected effect of a decision on the treasury.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionImpact {
    /// Signed change in treasury value, USD
    pub treasury_change_usd: f64,
    /// Signed change in the treasury risk score
    pub risk_score_delta: f64,
    /// Signed change in the compliance score
    pub compliance_score_delta: f64,
}

impl DecisionImpact {
    pub fn new(treasury_change_usd: f64, risk_score_delta: f64, compliance_score_delta: f64) -> Self {
        Self {
            treasury_change_usd,
            risk_score_delta,
            compliance_score_delta,
        }
    }

    fn is_finite(&self) -> bool {
        self.treasury_change_usd.is_finite()
            && self.risk_score_delta.is_finite()
            && self.compliance_score_delta.is_finite()
    }
}

/// A decision as appended to the ledger. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: DecisionId,
    pub agent_id: AgentId,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub action: String,
    pub rationale: String,
    pub confidence: f64,
    pub impact: DecisionImpact,
}

/// The content of a decision before the coordinator stamps id and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionDraft {
    pub action: String,
    pub rationale: String,
    pub confidence: f64,
    pub impact: DecisionImpact,
}

impl DecisionDraft {
    pub fn new(
        action: impl Into<String>,
        rationale: impl Into<String>,
        confidence: f64,
        impact: DecisionImpact,
    ) -> Self {
        Self {
            action: action.into(),
            rationale: rationale.into(),
            confidence,
            impact,
        }
    }

    /// Rejects drafts that would violate decision invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.action.trim().is_empty() {
            return Err("action must not be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        if !self.impact.is_finite() {
            return Err("impact values must be finite".to_string());
        }
        Ok(())
    }

    /// Stamps the draft into a ledger entry.
    pub fn into_decision(self, id: DecisionId, agent_id: AgentId, timestamp: u64) -> Decision {
        Decision {
            id,
            agent_id,
            timestamp,
            action: self.action,
            rationale: self.rationale,
            confidence: self.confidence,
            impact: self.impact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_validation() {
        let ok = DecisionDraft::new("Hold", "Nothing to do", 0.8, DecisionImpact::default());
        assert!(ok.validate().is_ok());

        let bad = DecisionDraft { confidence: 1.2, ..ok.clone() };
        assert!(bad.validate().is_err());

        let bad = DecisionDraft { action: "  ".into(), ..ok.clone() };
        assert!(bad.validate().is_err());

        let bad = DecisionDraft {
            impact: DecisionImpact::new(f64::NAN, 0.0, 0.0),
            ..ok
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_decision_json_shape() {
        let draft = DecisionDraft::new("Hold", "Stable", 0.9, DecisionImpact::new(-120.5, 0.3, 0.0));
        let decision = draft.into_decision(DecisionId(7), AgentId::new("trader-1").unwrap(), 1_700_000_000_000);
        let json = serde_json::to_value(&decision).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["agentId"], "trader-1");
        assert_eq!(json["timestamp"], 1_700_000_000_000u64);
        assert_eq!(json["impact"]["treasuryChangeUsd"], -120.5);
        assert_eq!(decision.id.to_string(), "dec-000007");
    }
}
