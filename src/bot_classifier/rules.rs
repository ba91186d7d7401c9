//! The ordered bot-rule registry.
//!
//! Each rule is `{id, enabled, kind, pattern, action, priority, botType}`.
//! Rules are matched in priority order, highest first; the first match
//! determines `botType`/`rulesMatched`, while `action` is the maximum over
//! action-priority across *every* matching rule.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{BotType, RequestSignals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Priority,
    Render,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    UserAgent,
    Ip,
    Header,
    Path,
}

/// A single registry entry. `pattern_compiled` is built once at
/// `ProxyConfig` construction, never recompiled per-request.
#[derive(Debug, Clone)]
pub struct BotRule {
    pub id: String,
    pub enabled: bool,
    pub kind: RuleKind,
    pub pattern_compiled: Regex,
    pub action: RuleAction,
    pub priority: u32,
    pub bot_type: BotType,
    /// Confidence floor this rule asserts when matched (0-100).
    pub confidence_floor: u32,
}

impl BotRule {
    pub fn matches(&self, signals: &RequestSignals<'_>, ua_lower: &str) -> bool {
        match self.kind {
            RuleKind::UserAgent => self.pattern_compiled.is_match(ua_lower),
            RuleKind::Path => self.pattern_compiled.is_match(signals.path),
            RuleKind::Ip => signals
                .client_ip
                .is_some_and(|ip| self.pattern_compiled.is_match(ip)),
            RuleKind::Header => signals
                .user_agent
                .is_some_and(|ua| self.pattern_compiled.is_match(ua)),
        }
    }
}

fn rule(
    id: &str,
    pattern: &str,
    action: RuleAction,
    priority: u32,
    bot_type: BotType,
    confidence_floor: u32,
) -> BotRule {
    BotRule {
        id: id.to_string(),
        enabled: true,
        kind: RuleKind::UserAgent,
        pattern_compiled: Regex::new(pattern).expect("built-in bot rule pattern must compile"),
        action,
        priority,
        bot_type,
        confidence_floor,
    }
}

/// The registry that ships compiled into `ProxyConfig` at startup. A
/// read-only snapshot per the atomic-pointer-swap reload discipline.
#[must_use]
pub fn default_registry() -> Vec<BotRule> {
    vec![
        rule(
            "googlebot",
            r"googlebot",
            RuleAction::Render,
            100,
            BotType::Googlebot,
            95,
        ),
        rule(
            "bingbot",
            r"bingbot|msnbot|adidxbot",
            RuleAction::Render,
            100,
            BotType::Bingbot,
            95,
        ),
        rule(
            "social-card-fetchers",
            r"facebookexternalhit|twitterbot|linkedinbot|slackbot|discordbot|whatsapp|telegrambot",
            RuleAction::Render,
            90,
            BotType::Social,
            90,
        ),
        rule(
            "monitoring",
            r"pingdom|uptimerobot|statuscake|site24x7|newrelicpinger",
            RuleAction::Allow,
            80,
            BotType::Monitoring,
            85,
        ),
        rule(
            "automation-clients",
            r"headlesschrome|phantomjs|selenium|puppeteer",
            RuleAction::Render,
            70,
            BotType::Automation,
            80,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_compiles_and_matches_googlebot() {
        let registry = default_registry();
        let gbot = registry.iter().find(|r| r.id == "googlebot").unwrap();
        let sig = RequestSignals {
            path: "/",
            ..Default::default()
        };
        assert!(gbot.matches(&sig, "mozilla/5.0 (compatible; googlebot/2.1)"));
    }
}
