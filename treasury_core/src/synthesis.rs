//! Decision synthesis - turns an agent, its random stream and a market
//! snapshot into a [`DecisionDraft`].
//!
//! Everything here is pure with respect to the coordinator: the same agent
//! kind, RNG state and snapshot always yield the same draft.

use crate::agent::{Agent, AgentKind};
use crate::config::EngineConfig;
use crate::decision::{DecisionDraft, DecisionImpact};
use crate::market::MarketSnapshot;
use crate::templates::{render, TemplateBook, TemplateError};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use std::collections::HashMap;
use thiserror::Error;

/// Reasons a single agent's tick can fail.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SynthesisError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("market snapshot has no priced assets")]
    EmptyMarket,

    #[error("invalid distribution: {0}")]
    Distribution(String),

    #[error("invalid draft: {0}")]
    InvalidDraft(String),
}

/// Bounds of the score deltas for one kind, as fractions of `max_score_delta`.
#[derive(Debug, Clone, Copy)]
struct ImpactProfile {
    /// Share of the drawn treasury move this kind actually executes
    treasury_weight: f64,
    risk: (f64, f64),
    compliance: (f64, f64),
}

fn impact_profile(kind: &AgentKind) -> ImpactProfile {
    match kind {
        AgentKind::Trader => ImpactProfile {
            treasury_weight: 1.0,
            risk: (-0.5, 0.5),
            compliance: (-0.1, 0.1),
        },
        AgentKind::Compliance => ImpactProfile {
            treasury_weight: 0.0,
            risk: (-0.5, 0.0),
            compliance: (0.0, 1.0),
        },
        AgentKind::Supervisor => ImpactProfile {
            treasury_weight: 0.1,
            risk: (-1.0, 0.0),
            compliance: (0.0, 0.3),
        },
        AgentKind::Advisor => ImpactProfile {
            treasury_weight: 0.3,
            risk: (-0.3, 0.3),
            compliance: (-0.1, 0.2),
        },
        AgentKind::Custom(_) => ImpactProfile {
            treasury_weight: 0.5,
            risk: (-0.5, 0.5),
            compliance: (-0.5, 0.5),
        },
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Produces decision drafts from templates and bounded random draws.
#[derive(Debug, Clone)]
pub struct DecisionSynthesizer {
    templates: TemplateBook,
    min_confidence: f64,
    max_confidence: f64,
    max_treasury_move: f64,
    max_score_delta: f64,
}

impl DecisionSynthesizer {
    /// Creates a synthesizer. `config` is assumed validated.
    pub fn new(templates: TemplateBook, config: &EngineConfig) -> Self {
        Self {
            templates,
            min_confidence: config.min_confidence,
            max_confidence: config.max_confidence,
            max_treasury_move: config.max_treasury_move,
            max_score_delta: config.max_score_delta,
        }
    }

    /// Synthesizes one draft for `agent`.
    pub fn synthesize<R: Rng>(
        &self,
        agent: &Agent,
        rng: &mut R,
        market: &MarketSnapshot,
    ) -> Result<DecisionDraft, SynthesisError> {
        let templates = self.templates.templates_for(&agent.kind)?;
        let template = &templates[rng.gen_range(0..templates.len())];

        if market.prices.is_empty() {
            return Err(SynthesisError::EmptyMarket);
        }
        let (asset, price) = market
            .prices
            .iter()
            .nth(rng.gen_range(0..market.prices.len()))
            .ok_or(SynthesisError::EmptyMarket)?;

        let confidence = Uniform::new_inclusive(self.min_confidence, self.max_confidence).sample(rng);

        let move_fraction = if self.max_treasury_move > 0.0 {
            Normal::new(0.0, self.max_treasury_move / 2.0)
                .map_err(|e| SynthesisError::Distribution(e.to_string()))?
                .sample(rng)
                .clamp(-self.max_treasury_move, self.max_treasury_move)
        } else {
            0.0
        };

        let profile = impact_profile(&agent.kind);
        let d = self.max_score_delta;
        let risk = Uniform::new_inclusive(profile.risk.0 * d, profile.risk.1 * d).sample(rng);
        let compliance =
            Uniform::new_inclusive(profile.compliance.0 * d, profile.compliance.1 * d).sample(rng);

        let impact = DecisionImpact::new(
            round2(market.portfolio_value_usd * move_fraction * profile.treasury_weight),
            round2(risk),
            round2(compliance),
        );

        let vars: HashMap<&str, String> = HashMap::from([
            ("agent", agent.name.clone()),
            ("asset", asset.clone()),
            ("price", format!("{:.2}", price)),
            ("pct", format!("{:.2}", move_fraction.abs() * 100.0)),
            (
                "direction",
                if move_fraction >= 0.0 { "increase" } else { "reduce" }.to_string(),
            ),
            ("portfolio", format!("{:.0}", market.portfolio_value_usd)),
            ("confidence", format!("{:.0}", confidence * 100.0)),
        ]);

        let draft = DecisionDraft::new(
            render(&template.action, &vars)?,
            render(&template.rationale, &vars)?,
            round2(confidence).clamp(0.0, 1.0),
            impact,
        );
        draft.validate().map_err(SynthesisError::InvalidDraft)?;
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentSpec;
    use crate::templates::ActionTemplate;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn agent(kind: AgentKind) -> Agent {
        Agent::new(AgentSpec::new("a-1", "Agent", kind).unwrap())
    }

    #[test]
    fn test_same_seed_same_draft() {
        let synth = DecisionSynthesizer::new(TemplateBook::default(), &EngineConfig::default());
        let market = MarketSnapshot::default();
        let a = synth
            .synthesize(&agent(AgentKind::Trader), &mut ChaCha8Rng::seed_from_u64(9), &market)
            .unwrap();
        let b = synth
            .synthesize(&agent(AgentKind::Trader), &mut ChaCha8Rng::seed_from_u64(9), &market)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_draws_stay_within_bounds() {
        let config = EngineConfig::default();
        let synth = DecisionSynthesizer::new(TemplateBook::default(), &config);
        let market = MarketSnapshot::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for kind in [AgentKind::Trader, AgentKind::Compliance, AgentKind::Supervisor, AgentKind::Advisor] {
            let agent = agent(kind);
            for _ in 0..200 {
                let draft = synth.synthesize(&agent, &mut rng, &market).unwrap();
                assert!(draft.confidence >= 0.55 && draft.confidence <= 0.98);
                let max_move = market.portfolio_value_usd * config.max_treasury_move + 0.01;
                assert!(draft.impact.treasury_change_usd.abs() <= max_move);
                assert!(draft.impact.risk_score_delta.abs() <= config.max_score_delta + 0.01);
                assert!(draft.impact.compliance_score_delta.abs() <= config.max_score_delta + 0.01);
                assert!(!draft.action.contains('{'));
            }
        }
    }

    #[test]
    fn test_compliance_never_moves_treasury() {
        let synth = DecisionSynthesizer::new(TemplateBook::default(), &EngineConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..50 {
            let draft = synth
                .synthesize(&agent(AgentKind::Compliance), &mut rng, &MarketSnapshot::default())
                .unwrap();
            assert_eq!(draft.impact.treasury_change_usd, 0.0);
            assert!(draft.impact.compliance_score_delta >= 0.0);
        }
    }

    #[test]
    fn test_malformed_template_fails() {
        let book = TemplateBook::empty().with_templates(
            AgentKind::Trader,
            vec![ActionTemplate::new("Swap {token}", "ok")],
        );
        let synth = DecisionSynthesizer::new(book, &EngineConfig::default());
        let err = synth
            .synthesize(&agent(AgentKind::Trader), &mut ChaCha8Rng::seed_from_u64(0), &MarketSnapshot::default())
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Template(TemplateError::UnknownPlaceholder { .. })));
    }

    #[test]
    fn test_empty_market_fails() {
        let synth = DecisionSynthesizer::new(TemplateBook::default(), &EngineConfig::default());
        let err = synth
            .synthesize(&agent(AgentKind::Advisor), &mut ChaCha8Rng::seed_from_u64(0), &MarketSnapshot::new(1.0))
            .unwrap_err();
        assert_eq!(err, SynthesisError::EmptyMarket);
    }
}
