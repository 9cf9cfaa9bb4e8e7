//! Structured fact extraction — the third compression stage.
//!
//! Categories are data: each is a label, a pattern and a cap, applied in
//! order. The default rule set lives in `windowpack_config::default_fact_rules`.

use regex::{Regex, RegexBuilder};
use windowpack_config::{CompressionConfig, FactRuleConfig};
use windowpack_core::error::{Error, Result};

struct FactRule {
    label: String,
    pattern: Regex,
    cap: usize,
    lowercase: bool,
    group: usize,
}

pub struct FactExtractor {
    rules: Vec<FactRule>,
    separator: String,
    fallback_chars: usize,
    strip_labels: Vec<String>,
}

impl FactExtractor {
    pub fn new(config: &CompressionConfig) -> Result<Self> {
        let rules = config
            .fact_rules
            .iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            separator: config.fact_separator.clone(),
            fallback_chars: config.fallback_chars,
            strip_labels: config.strip_labels.clone(),
        })
    }

    /// One `"<Label>: a, b"` entry per category that matched, in rule order.
    pub fn categories(&self, text: &str) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let mut found: Vec<String> = Vec::new();
                for caps in rule.pattern.captures_iter(text) {
                    if found.len() >= rule.cap {
                        break;
                    }
                    let Some(m) = caps.get(rule.group) else {
                        continue;
                    };
                    let value = if rule.lowercase {
                        m.as_str().to_lowercase()
                    } else {
                        m.as_str().to_string()
                    };
                    if !found.contains(&value) {
                        found.push(value);
                    }
                }
                (!found.is_empty()).then(|| format!("{}: {}", rule.label, found.join(", ")))
            })
            .collect()
    }

    /// Extracted facts joined by the separator, or `None` when nothing matched.
    pub fn facts(&self, text: &str) -> Option<String> {
        let categories = self.categories(text);
        (!categories.is_empty()).then(|| categories.join(&self.separator))
    }

    /// Facts, falling back to the leading excerpt of the text.
    pub fn extract(&self, text: &str) -> String {
        self.facts(text).unwrap_or_else(|| self.excerpt(text))
    }

    /// The first `fallback_chars` characters with a leading label removed.
    pub fn excerpt(&self, text: &str) -> String {
        let mut body = text.trim();
        for label in &self.strip_labels {
            if let Some(rest) = body.strip_prefix(label.as_str()) {
                body = rest.trim_start();
                break;
            }
        }
        let excerpt: String = body.chars().take(self.fallback_chars).collect();
        excerpt.trim().to_string()
    }
}

fn compile_rule(rule: &FactRuleConfig) -> Result<FactRule> {
    let pattern = RegexBuilder::new(&rule.pattern)
        .case_insensitive(rule.case_insensitive)
        .build()
        .map_err(|e| Error::config(format!("fact rule '{}': {e}", rule.label)))?;
    Ok(FactRule {
        label: rule.label.clone(),
        pattern,
        cap: rule.cap,
        lowercase: rule.lowercase,
        group: rule.group,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FactExtractor {
        FactExtractor::new(&CompressionConfig::default()).unwrap()
    }

    #[test]
    fn urls_are_capped_and_deduplicated() {
        let text = "see https://a.dev/x and https://a.dev/x then https://b.dev https://c.dev https://d.dev";
        let facts = extractor().facts(text).unwrap();
        assert_eq!(facts, "URL: https://a.dev/x, https://b.dev, https://c.dev");
    }

    #[test]
    fn categories_in_priority_order() {
        let text = "Installed Python 3.12.1 via Docker on 2024-05-01, edited main.py and Cargo.toml";
        let facts = extractor().categories(text);
        assert_eq!(facts.len(), 4);
        assert_eq!(facts[0], "Files: main.py, Cargo.toml");
        assert_eq!(facts[1], "Versions: 3.12.1");
        assert_eq!(facts[2], "Technologies: python, docker");
        assert_eq!(facts[3], "Dates: 2024-05-01");
    }

    #[test]
    fn technologies_lowercased_before_dedup() {
        let facts = extractor().facts("REDIS and redis and Redis").unwrap();
        assert_eq!(facts, "Technologies: redis");
    }

    #[test]
    fn joined_with_separator() {
        let facts = extractor().facts("https://x.io uses rust").unwrap();
        assert_eq!(facts, "URL: https://x.io | Technologies: rust");
    }

    #[test]
    fn fallback_strips_leading_label() {
        let text = format!("Observation: {}", "no facts here ".repeat(20));
        let out = extractor().extract(&text);
        assert!(out.starts_with("no facts here"));
        assert!(out.chars().count() <= 150);
    }

    #[test]
    fn custom_rules_replace_defaults() {
        let config = CompressionConfig {
            fact_rules: vec![FactRuleConfig::new("Tickets", r"[A-Z]+-\d+", 2)],
            ..CompressionConfig::default()
        };
        let ex = FactExtractor::new(&config).unwrap();
        assert_eq!(ex.facts("fixes ABC-1, ABC-2, ABC-3 at https://x.io").unwrap(), "Tickets: ABC-1, ABC-2");
    }

    #[test]
    fn invalid_rule_is_config_error() {
        let config = CompressionConfig {
            fact_rules: vec![FactRuleConfig::new("Bad", "(", 1)],
            ..CompressionConfig::default()
        };
        let err = FactExtractor::new(&config).err().unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }
}
