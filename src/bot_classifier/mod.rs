//! Bot Classifier — produces a `Classification` from request signals.
//!
//! Grounded on the reference crate's pattern-list configuration idiom
//! (`config/types.rs`'s pre-compiled `excluded_patterns_compiled`): the rule
//! registry here is likewise compiled once, held in `ProxyConfig`, and never
//! mutated mid-request.

pub mod rules;

pub use rules::{BotRule, RuleAction, RuleKind};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::ProxyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotType {
    Googlebot,
    Bingbot,
    Social,
    Monitoring,
    Automation,
    Unknown,
    Human,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub is_bot: bool,
    pub bot_type: BotType,
    pub confidence: f64,
    pub rules_matched: Vec<String>,
    pub action: RuleAction,
}

/// The request-derived signals the classifier needs. Constructed by the
/// router from the inbound `http::Request` parts.
#[derive(Debug, Clone, Default)]
pub struct RequestSignals<'a> {
    pub user_agent: Option<&'a str>,
    pub path: &'a str,
    pub client_ip: Option<&'a str>,
    pub has_x_forwarded_for: bool,
    pub has_via: bool,
}

const AUTOMATION_TOKENS: [&str; 8] = [
    "bot", "crawler", "spider", "scrape", "headless", "phantom", "selenium", "puppeteer",
];

const HTTP_LIBRARY_TOKENS: [&str; 4] = ["curl", "wget", "python-requests", "java/"];

const BROWSER_TOKENS: [&str; 4] = ["mozilla/", "chrome", "safari", "edge"];

#[must_use]
pub fn classify(config: &ProxyConfig, signals: &RequestSignals<'_>) -> Classification {
    let ua_lower = signals.user_agent.unwrap_or_default().to_ascii_lowercase();

    let mut rules_matched = BTreeSet::new();
    let mut best: Option<(&BotRule, u32)> = None;
    let mut max_action: Option<RuleAction> = None;

    for rule in config.bot_rules() {
        if !rule.enabled {
            continue;
        }
        if rule.matches(signals, &ua_lower) {
            rules_matched.insert(rule.id.clone());
            let replace = match best {
                None => true,
                Some((_, prio)) => rule.priority > prio,
            };
            if replace {
                best = Some((rule, rule.priority));
            }
            max_action = Some(match max_action {
                None => rule.action,
                Some(current) => current.max(rule.action),
            });
        }
    }

    let mut heuristic_score: u32 = 0;
    let ua_len = signals.user_agent.map(str::len).unwrap_or(0);
    if signals.user_agent.is_none() || ua_len <= 20 {
        heuristic_score += 20;
    }
    if !BROWSER_TOKENS.iter().any(|t| ua_lower.contains(t)) {
        heuristic_score += 30;
    }
    if AUTOMATION_TOKENS.iter().any(|t| ua_lower.contains(t)) {
        heuristic_score += 25;
    }
    if HTTP_LIBRARY_TOKENS.iter().any(|t| ua_lower.contains(t)) {
        heuristic_score += 40;
    }
    if signals.has_x_forwarded_for {
        heuristic_score += 15;
    }
    if signals.has_via {
        heuristic_score += 10;
    }

    let rule_bot_type = best.map(|(r, _)| r.bot_type);
    let action = max_action.unwrap_or(RuleAction::Allow);

    let is_bot = rule_bot_type.is_some_and(|t| t != BotType::Human) || heuristic_score >= 30;

    let bot_type = if is_bot {
        rule_bot_type.unwrap_or(BotType::Unknown)
    } else {
        BotType::Human
    };

    let rule_score = best.map_or(0, |(r, _)| r.confidence_floor);
    let confidence = f64::from(heuristic_score.max(rule_score).min(100)) / 100.0;

    Classification {
        is_bot,
        bot_type,
        confidence,
        rules_matched: rules_matched.into_iter().collect(),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfigBuilder;

    fn config() -> ProxyConfig {
        ProxyConfigBuilder::default()
            .target_url("https://example.com")
            .build()
            .unwrap()
    }

    #[test]
    fn googlebot_user_agent_classified_as_bot() {
        let cfg = config();
        let sig = RequestSignals {
            user_agent: Some("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"),
            path: "/product/42",
            ..Default::default()
        };
        let c = classify(&cfg, &sig);
        assert!(c.is_bot);
        assert_eq!(c.bot_type, BotType::Googlebot);
    }

    #[test]
    fn normal_browser_user_agent_classified_as_human() {
        let cfg = config();
        let sig = RequestSignals {
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36",
            ),
            path: "/product/42",
            ..Default::default()
        };
        let c = classify(&cfg, &sig);
        assert!(!c.is_bot);
        assert_eq!(c.bot_type, BotType::Human);
    }

    #[test]
    fn curl_user_agent_classified_as_bot_via_heuristics() {
        let cfg = config();
        let sig = RequestSignals {
            user_agent: Some("curl/8.4.0"),
            path: "/product/42",
            ..Default::default()
        };
        let c = classify(&cfg, &sig);
        assert!(c.is_bot);
    }

    #[test]
    fn action_is_max_across_all_matching_rules_not_just_highest_priority() {
        use crate::bot_classifier::rules::{BotRule, RuleKind};
        use regex::Regex;

        // The higher-priority rule only allows; a lower-priority rule that
        // also matches asks to block. The spec requires the max action
        // across *all* matching rules, so the result must be `block`.
        let high_priority_allow = BotRule {
            id: "monitoring-allow".to_string(),
            enabled: true,
            kind: RuleKind::UserAgent,
            pattern_compiled: Regex::new("evilbot").unwrap(),
            action: RuleAction::Allow,
            priority: 90,
            bot_type: BotType::Monitoring,
            confidence_floor: 50,
        };
        let low_priority_block = BotRule {
            id: "blocklist".to_string(),
            enabled: true,
            kind: RuleKind::UserAgent,
            pattern_compiled: Regex::new("evil").unwrap(),
            action: RuleAction::Block,
            priority: 10,
            bot_type: BotType::Unknown,
            confidence_floor: 99,
        };

        let cfg = ProxyConfigBuilder::default()
            .target_url("https://example.com")
            .bot_rules(vec![high_priority_allow, low_priority_block])
            .build()
            .unwrap();

        let sig = RequestSignals {
            user_agent: Some("evilbot/1.0"),
            path: "/",
            ..Default::default()
        };
        let c = classify(&cfg, &sig);
        assert_eq!(c.action, RuleAction::Block);
        // botType still comes from the highest-priority matching rule.
        assert_eq!(c.bot_type, BotType::Monitoring);
    }

    #[test]
    fn missing_user_agent_counts_toward_heuristic_score() {
        let cfg = config();
        let sig = RequestSignals {
            user_agent: None,
            path: "/",
            has_x_forwarded_for: true,
            has_via: true,
            ..Default::default()
        };
        let c = classify(&cfg, &sig);
        // 20 (missing ua) + 30 (no browser tokens) + 15 (xff) + 10 (via) = 75
        assert!(c.is_bot);
        assert!(c.confidence > 0.5);
    }
}
