//! Metric extraction from raw check output.
//!
//! Extraction is per category. A category without an extractor has no
//! numeric signal and is always handed to the LLM.

use crate::config::{Aggregate, MetricRule};
use crate::models::{CheckResults, ExtractedMetric};
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Turns one category's check results into metrics.
pub trait MetricExtractor: Send + Sync {
    fn extract(&self, results: &CheckResults) -> Result<Vec<ExtractedMetric>>;
}

/// Extractors keyed by category.
#[derive(Clone, Default)]
pub struct ExtractorSet {
    extractors: HashMap<String, Arc<dyn MetricExtractor>>,
}

impl ExtractorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one [`RuleExtractor`] per category found in `rules`.
    pub fn from_rules(rules: &[MetricRule]) -> Result<Self> {
        let mut grouped: HashMap<&str, Vec<&MetricRule>> = HashMap::new();
        for rule in rules {
            grouped.entry(rule.category.as_str()).or_default().push(rule);
        }

        let mut set = Self::new();
        for (category, rules) in grouped {
            let extractor = RuleExtractor::new(rules.into_iter().cloned())?;
            set.insert(category, Arc::new(extractor));
        }
        Ok(set)
    }

    pub fn insert(&mut self, category: &str, extractor: Arc<dyn MetricExtractor>) {
        self.extractors.insert(category.to_string(), extractor);
    }

    pub fn has(&self, category: &str) -> bool {
        self.extractors.contains_key(category)
    }

    pub fn get(&self, category: &str) -> Option<Arc<dyn MetricExtractor>> {
        self.extractors.get(category).cloned()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

struct CompiledRule {
    command: String,
    pattern: Regex,
    metric: String,
    unit: String,
    counter: bool,
    aggregate: Aggregate,
}

/// Regex rules applied to the output of specific commands.
pub struct RuleExtractor {
    rules: Vec<CompiledRule>,
}

impl RuleExtractor {
    pub fn new(rules: impl IntoIterator<Item = MetricRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let pattern = Regex::new(&rule.pattern)
                    .with_context(|| format!("Invalid pattern for metric '{}'", rule.metric))?;
                Ok(CompiledRule {
                    command: rule.command,
                    pattern,
                    metric: rule.metric,
                    unit: rule.unit,
                    counter: rule.counter,
                    aggregate: rule.aggregate,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }
}

impl MetricExtractor for RuleExtractor {
    fn extract(&self, results: &CheckResults) -> Result<Vec<ExtractedMetric>> {
        let mut metrics = Vec::new();

        for rule in &self.rules {
            let Some(result) = results.get(&rule.command).filter(|r| r.success) else {
                continue;
            };
            let output = result.output.as_str();

            match rule.aggregate {
                Aggregate::First => rule.first_matches(output, &mut metrics),
                Aggregate::Count => {
                    if !output.trim().is_empty() {
                        let count = rule.pattern.find_iter(output).count();
                        metrics.push(rule.metric(count as f64));
                    }
                }
                Aggregate::Sum | Aggregate::Max => {
                    let values: Vec<f64> = rule
                        .pattern
                        .captures_iter(output)
                        .filter_map(|caps| capture_value(&caps))
                        .collect();
                    if values.is_empty() {
                        continue;
                    }
                    let value = if rule.aggregate == Aggregate::Sum {
                        values.iter().sum()
                    } else {
                        values.iter().copied().fold(f64::MIN, f64::max)
                    };
                    metrics.push(rule.metric(value));
                }
            }
        }

        Ok(metrics)
    }
}

impl CompiledRule {
    fn metric(&self, value: f64) -> ExtractedMetric {
        let mut metric = ExtractedMetric::new(self.metric.as_str(), value, self.unit.as_str());
        metric.is_counter = self.counter;
        metric
    }

    fn first_matches(&self, output: &str, metrics: &mut Vec<ExtractedMetric>) {
        let named = self.pattern.capture_names().any(|n| n == Some("name"));

        for caps in self.pattern.captures_iter(output) {
            let Some(value) = capture_value(&caps) else {
                continue;
            };
            if !named {
                metrics.push(self.metric(value));
                return;
            }

            let Some(name) = caps.name("name").map(|m| m.as_str().trim()) else {
                continue;
            };
            let mut metric = self.metric(value);
            metric.metric = format!("{}_{}", self.metric, slug(name));
            metric.tags.insert("name".to_string(), name.to_string());
            metrics.push(metric);
        }
    }
}

fn capture_value(caps: &regex::Captures<'_>) -> Option<f64> {
    caps.name("value")
        .or_else(|| caps.get(1))
        .and_then(|m| m.as_str().trim().parse::<f64>().ok())
}

/// Lowercase, with runs of non-alphanumerics collapsed to `_`.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}
