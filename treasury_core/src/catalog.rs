//! Built-in crisis and demo scenarios.
//!
//! Decision steps reference the default roster ids, so these scenarios
//! expect a coordinator built from [`crate::agent::default_roster`].

use crate::decision::{DecisionDraft, DecisionImpact};
use crate::error::EngineError;
use crate::scenario::{Scenario, ScenarioStep};
use serde_json::json;
use treasury_env::AgentId;

pub const MARKET_CRASH: &str = "market-crash";
pub const COMPLIANCE_AUDIT: &str = "compliance-audit";
pub const GOVERNANCE_PROPOSAL: &str = "governance-proposal";
pub const LIQUIDITY_CRUNCH: &str = "liquidity-crunch";

/// Every built-in scenario, in presentation order.
pub fn builtin_scenarios() -> Result<Vec<Scenario>, EngineError> {
    Ok(vec![
        market_crash()?,
        compliance_audit()?,
        governance_proposal()?,
        liquidity_crunch()?,
    ])
}

fn decision_step(
    id: &str,
    title: &str,
    description: &str,
    duration_ms: u64,
    agent: &str,
    draft: DecisionDraft,
) -> Result<ScenarioStep, EngineError> {
    Ok(ScenarioStep::new(id, title, description, duration_ms)
        .with_decision(AgentId::new(agent)?, draft))
}

fn market_crash() -> Result<Scenario, EngineError> {
    Ok(Scenario::new(MARKET_CRASH, "Market Crash Response")
        .with_description("ETH drops 30% in an hour; the treasury hedges and reports.")
        .step(
            ScenarioStep::new(
                "detect-drawdown",
                "Detect drawdown",
                "Price feeds report a 30% ETH decline",
                2_000,
            )
            .with_result(json!({ "asset": "ETH", "drawdownPct": -30.0, "severity": "critical" })),
        )
        .step(decision_step(
            "hedge-exposure",
            "Hedge exposure",
            "Trader rotates volatile holdings into stablecoins",
            3_000,
            "trader-1",
            DecisionDraft::new(
                "Rotate 15% of ETH holdings into USDC",
                "Drawdown exceeded the 20% risk limit; reducing volatile exposure",
                0.92,
                DecisionImpact::new(-37_500.0, -4.5, 0.0),
            ),
        )?)
        .step(decision_step(
            "verify-limits",
            "Verify limits",
            "Compliance checks the rotation against treasury policy",
            1_500,
            "compliance-1",
            DecisionDraft::new(
                "Approve emergency rotation",
                "Rotation stays within the emergency mandate of the treasury policy",
                0.88,
                DecisionImpact::new(0.0, 0.0, 2.0),
            ),
        )?)
        .step(
            ScenarioStep::new(
                "report",
                "Report to DAO",
                "Summary posted to the governance forum",
                1_000,
            )
            .with_result(json!({ "channel": "forum", "published": true })),
        ))
}

fn compliance_audit() -> Result<Scenario, EngineError> {
    Ok(Scenario::new(COMPLIANCE_AUDIT, "Quarterly Compliance Audit")
        .with_description("Sanctions screening and exposure review ahead of the quarterly report.")
        .step(
            ScenarioStep::new(
                "screen-counterparties",
                "Screen counterparties",
                "Check recent counterparties against sanctions lists",
                2_500,
            )
            .with_result(json!({ "screened": 42, "flagged": 1 })),
        )
        .step(decision_step(
            "freeze-flagged",
            "Freeze flagged address",
            "Compliance blocks further transfers to the flagged address",
            1_500,
            "compliance-1",
            DecisionDraft::new(
                "Block transfers to flagged counterparty",
                "Counterparty matched a sanctions list entry",
                0.97,
                DecisionImpact::new(0.0, -1.0, 6.5),
            ),
        )?)
        .step(
            ScenarioStep::new(
                "exposure-review",
                "Review exposure",
                "Concentration limits per asset are recomputed",
                2_000,
            )
            .with_result(json!({ "maxConcentrationPct": 38.0, "limitPct": 40.0 })),
        )
        .step(decision_step(
            "sign-off",
            "Supervisor sign-off",
            "Risk supervisor signs the audit report",
            1_000,
            "supervisor-1",
            DecisionDraft::new(
                "Sign quarterly compliance report",
                "All findings addressed; exposure within limits",
                0.9,
                DecisionImpact::new(0.0, -0.5, 3.0),
            ),
        )?))
}

fn governance_proposal() -> Result<Scenario, EngineError> {
    Ok(Scenario::new(GOVERNANCE_PROPOSAL, "Governance Proposal")
        .with_description("A proposal to fund a grants program moves from draft to execution.")
        .step(
            ScenarioStep::new(
                "draft",
                "Draft proposal",
                "Advisor drafts a 250k USDC grants allocation",
                2_000,
            )
            .with_result(json!({ "proposal": "GP-17", "amountUsd": 250_000 })),
        )
        .step(decision_step(
            "impact-analysis",
            "Impact analysis",
            "Advisor assesses runway impact",
            2_500,
            "advisor-1",
            DecisionDraft::new(
                "Recommend phased grant disbursement",
                "Phasing keeps runway above 24 months",
                0.81,
                DecisionImpact::new(-83_000.0, 1.2, 0.0),
            ),
        )?)
        .step(
            ScenarioStep::new("vote", "On-chain vote", "Token holders vote", 4_000)
                .with_result(json!({ "for": 0.71, "against": 0.22, "abstain": 0.07, "passed": true })),
        )
        .step(decision_step(
            "execute",
            "Execute first tranche",
            "Trader releases the first tranche from the stablecoin reserve",
            1_500,
            "trader-1",
            DecisionDraft::new(
                "Release first grants tranche",
                "Proposal GP-17 passed with 71% approval",
                0.95,
                DecisionImpact::new(-83_000.0, 0.4, 1.0),
            ),
        )?))
}

fn liquidity_crunch() -> Result<Scenario, EngineError> {
    Ok(Scenario::new(LIQUIDITY_CRUNCH, "Liquidity Crunch")
        .with_description("A lending market freezes withdrawals while payroll is due.")
        .step(
            ScenarioStep::new(
                "detect-freeze",
                "Detect withdrawal freeze",
                "Lending protocol pauses withdrawals",
                1_500,
            )
            .with_result(json!({ "protocol": "lending-pool", "lockedUsd": 400_000 })),
        )
        .step(decision_step(
            "escalate",
            "Escalate",
            "Supervisor raises the treasury risk level",
            1_000,
            "supervisor-1",
            DecisionDraft::new(
                "Raise treasury risk level to HIGH",
                "Locked funds exceed 15% of the portfolio",
                0.9,
                DecisionImpact::new(0.0, 8.0, 0.0),
            ),
        )?)
        .step(decision_step(
            "raise-liquidity",
            "Raise liquidity",
            "Trader sells BTC to cover upcoming obligations",
            3_000,
            "trader-1",
            DecisionDraft::new(
                "Sell 4 BTC for USDC",
                "Payroll of 180k USDC is due in 3 days",
                0.86,
                DecisionImpact::new(-2_100.0, -3.0, 0.0),
            ),
        )?)
        .step(
            ScenarioStep::new(
                "confirm-payroll",
                "Confirm payroll",
                "Payroll executes from the replenished reserve",
                1_000,
            )
            .with_result(json!({ "paidUsd": 180_000, "shortfallUsd": 0 })),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::default_roster;
    use crate::scenario::{StepAction, StepStatus};
    use std::collections::HashSet;

    #[test]
    fn test_catalog_ids_are_unique() {
        let ids: HashSet<String> = builtin_scenarios().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 4);
        assert!(ids.contains(MARKET_CRASH));
        assert!(ids.contains(LIQUIDITY_CRUNCH));
    }

    #[test]
    fn test_steps_start_pending_with_unique_ids() {
        for scenario in builtin_scenarios().unwrap() {
            assert!(!scenario.steps.is_empty(), "{} has no steps", scenario.id);
            let step_ids: HashSet<&str> = scenario.steps.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(step_ids.len(), scenario.steps.len(), "{}", scenario.id);
            assert!(scenario.steps.iter().all(|s| s.status == StepStatus::Pending));
            assert!(scenario.total_duration_ms() > 0);
        }
    }

    #[test]
    fn test_decision_steps_use_roster_agents_and_valid_drafts() {
        let roster: HashSet<AgentId> = default_roster().into_iter().map(|s| s.id).collect();
        for scenario in builtin_scenarios().unwrap() {
            for step in &scenario.steps {
                if let StepAction::Decision { agent_id, draft } = &step.action {
                    assert!(roster.contains(agent_id), "{} -> {}", step.id, agent_id);
                    assert!(draft.validate().is_ok(), "{}", step.id);
                }
            }
        }
    }
}
