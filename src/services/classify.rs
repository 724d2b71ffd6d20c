use regex::Regex;

use crate::models::{LineLevel, OutputLine};

/// A single classification rule.
///
/// A line matches when `pattern` matches and `unless` (if set) does not.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub level: LineLevel,
    pub pattern: Regex,
    pub unless: Option<Regex>,
}

impl ClassificationRule {
    pub fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line) && !self.unless.as_ref().is_some_and(|u| u.is_match(line))
    }
}

/// Classifies compiler output lines for display.
///
/// Rules are checked in order and the first match wins. Lines that match no
/// rule are [`LineLevel::Info`].
///
/// The default rule set:
///
/// 1. `Error`: the line contains `error`, unless the text before its first
///    colon already contains `error`. That prefix form is how banners and
///    summaries read (`Errors: 0`, `Error count: 0`), while real diagnostics
///    look like `plugin.sp(12) : error 017: undefined symbol "x"`.
/// 2. `Warning`: the line contains `warning`.
///
/// All patterns are case-insensitive.
#[derive(Debug, Clone)]
pub struct OutputClassifier {
    rules: Vec<ClassificationRule>,
}

impl OutputClassifier {
    pub fn new() -> Self {
        Self {
            rules: vec![
                ClassificationRule {
                    level: LineLevel::Error,
                    pattern: Regex::new(r"(?i)error").expect("Invalid error regex"),
                    unless: Some(
                        Regex::new(r"(?i)^[^:]*error[^:]*:").expect("Invalid error prefix regex"),
                    ),
                },
                ClassificationRule {
                    level: LineLevel::Warning,
                    pattern: Regex::new(r"(?i)warning").expect("Invalid warning regex"),
                    unless: None,
                },
            ],
        }
    }

    /// Build a classifier from an explicit rule list
    pub fn with_rules(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn level_of(&self, line: &str) -> LineLevel {
        self.rules
            .iter()
            .find(|rule| rule.matches(line))
            .map(|rule| rule.level)
            .unwrap_or(LineLevel::Info)
    }

    pub fn classify(&self, line: impl Into<String>) -> OutputLine {
        let text = line.into();
        let level = self.level_of(&text);
        OutputLine { text, level }
    }
}

impl Default for OutputClassifier {
    fn default() -> Self {
        Self::new()
    }
}
