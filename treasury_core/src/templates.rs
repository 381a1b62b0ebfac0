//! Action templates - per-kind wording for synthesized decisions.
//!
//! Templates use `{name}` placeholders. Rendering fails on an unknown or
//! unterminated placeholder; the coordinator treats that as a failure of the
//! one agent whose tick hit it.

use crate::agent::AgentKind;
use std::collections::HashMap;
use thiserror::Error;

/// Template rendering errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder in template {template:?}")]
    Unterminated { template: String },

    #[error("unknown placeholder {{{name}}}")]
    UnknownPlaceholder { name: String },

    #[error("no templates registered for agent kind {kind}")]
    NoTemplates { kind: String },
}

/// An action/rationale pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTemplate {
    pub action: String,
    pub rationale: String,
}

impl ActionTemplate {
    pub fn new(action: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            rationale: rationale.into(),
        }
    }
}

/// Substitutes `{name}` placeholders from `vars`.
///
/// `{{` and `}}` render literal braces.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(TemplateError::Unterminated {
                        template: template.to_string(),
                    });
                }
                let value = vars
                    .get(name.trim())
                    .ok_or(TemplateError::UnknownPlaceholder { name })?;
                out.push_str(value);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Templates indexed by agent kind.
#[derive(Debug, Clone)]
pub struct TemplateBook {
    by_kind: HashMap<AgentKind, Vec<ActionTemplate>>,
}

impl TemplateBook {
    /// An empty book; every kind fails until templates are added.
    pub fn empty() -> Self {
        Self {
            by_kind: HashMap::new(),
        }
    }

    /// Replaces the templates for `kind`.
    pub fn with_templates(mut self, kind: AgentKind, templates: Vec<ActionTemplate>) -> Self {
        self.by_kind.insert(kind, templates);
        self
    }

    /// Returns the templates registered for `kind`.
    pub fn templates_for(&self, kind: &AgentKind) -> Result<&[ActionTemplate], TemplateError> {
        match self.by_kind.get(kind) {
            Some(list) if !list.is_empty() => Ok(list),
            _ => Err(TemplateError::NoTemplates {
                kind: kind.to_string(),
            }),
        }
    }
}

impl Default for TemplateBook {
    fn default() -> Self {
        Self::empty()
            .with_templates(
                AgentKind::Trader,
                vec![
                    ActionTemplate::new(
                        "Rebalance {asset} allocation ({direction} {pct}%)",
                        "{asset} at ${price} drifted from target weight; rebalancing keeps the ${portfolio} treasury inside its allocation bands",
                    ),
                    ActionTemplate::new(
                        "Execute DCA order for {asset}",
                        "Spreading exposure over time at ${price} reduces timing risk ({confidence}% confidence)",
                    ),
                    ActionTemplate::new(
                        "Harvest yield and {direction} {asset} position by {pct}%",
                        "Accrued yield exceeds gas cost at current {asset} price ${price}",
                    ),
                ],
            )
            .with_templates(
                AgentKind::Compliance,
                vec![
                    ActionTemplate::new(
                        "Run regulatory check on pending {asset} transfers",
                        "Transfers above reporting thresholds require screening before settlement",
                    ),
                    ActionTemplate::new(
                        "Verify counterparty KYC status for {asset} desk",
                        "Periodic re-verification keeps the treasury within jurisdictional rules",
                    ),
                    ActionTemplate::new(
                        "Attest reserve composition ({asset} {pct}% movement reviewed)",
                        "Reserve attestations must reflect movements larger than policy tolerance",
                    ),
                ],
            )
            .with_templates(
                AgentKind::Supervisor,
                vec![
                    ActionTemplate::new(
                        "Review risk limits after {asset} move of {pct}%",
                        "Exposure to {asset} approaches the configured concentration limit",
                    ),
                    ActionTemplate::new(
                        "Approve agent actions for current cycle",
                        "All agent proposals are within mandate ({confidence}% confidence)",
                    ),
                ],
            )
            .with_templates(
                AgentKind::Advisor,
                vec![
                    ActionTemplate::new(
                        "Recommend {direction} {asset} exposure by {pct}%",
                        "Market structure around ${price} favours a gradual adjustment",
                    ),
                    ActionTemplate::new(
                        "Propose governance review of {asset} strategy",
                        "Strategy performance warrants token-holder input on a ${portfolio} treasury",
                    ),
                ],
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<&'static str, String> {
        HashMap::from([("asset", "ETH".to_string()), ("pct", "1.50".to_string())])
    }

    #[test]
    fn test_render_substitutes() {
        let out = render("Rebalance {asset} by {pct}%", &vars()).unwrap();
        assert_eq!(out, "Rebalance ETH by 1.50%");
    }

    #[test]
    fn test_render_escaped_braces() {
        let out = render("{{literal}} {asset}", &vars()).unwrap();
        assert_eq!(out, "{literal} ETH");
    }

    #[test]
    fn test_render_errors() {
        assert_eq!(
            render("Buy {token}", &vars()),
            Err(TemplateError::UnknownPlaceholder { name: "token".into() })
        );
        assert!(matches!(
            render("Buy {asset", &vars()),
            Err(TemplateError::Unterminated { .. })
        ));
    }

    #[test]
    fn test_builtin_book_covers_standard_kinds() {
        let book = TemplateBook::default();
        for kind in [AgentKind::Trader, AgentKind::Compliance, AgentKind::Supervisor, AgentKind::Advisor] {
            assert!(book.templates_for(&kind).is_ok());
        }
        assert!(book.templates_for(&AgentKind::Custom("x".into())).is_err());
    }
}
