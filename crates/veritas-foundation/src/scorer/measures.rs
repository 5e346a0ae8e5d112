//! Built-in format, relevance and safety measures.

use regex::RegexSet;
use std::collections::HashSet;
use veritas_kernel::policy::{MeasureError, RelevanceMeasure, SafetyPolicy};
use veritas_kernel::{DimensionScore, OutputFormat};

/// Structural conformance of `text` to `format`. Fails closed: anything
/// malformed scores 0 with the reason recorded.
pub fn format_validity(format: &OutputFormat, text: &str) -> DimensionScore {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DimensionScore::floor("output is empty");
    }
    match format {
        OutputFormat::Text => DimensionScore::measured(1.0),
        OutputFormat::Json { required_fields } => json_validity(trimmed, required_fields),
        OutputFormat::Code => {
            if delimiters_balanced(trimmed) {
                DimensionScore::measured(1.0)
            } else {
                DimensionScore::floor("code has unbalanced delimiters")
            }
        }
    }
}

/// Drop a surrounding markdown code fence, if any.
fn strip_fences(trimmed: &str) -> &str {
    if trimmed.starts_with("```json") {
        trimmed
            .strip_prefix("```json")
            .and_then(|s| s.strip_suffix("```"))
            .map(|s| s.trim())
            .unwrap_or(trimmed)
    } else if trimmed.starts_with("```") {
        trimmed
            .strip_prefix("```")
            .and_then(|s| s.strip_suffix("```"))
            .map(|s| s.trim())
            .unwrap_or(trimmed)
    } else {
        trimmed
    }
}

fn json_validity(trimmed: &str, required_fields: &[String]) -> DimensionScore {
    let value = match serde_json::from_str::<serde_json::Value>(strip_fences(trimmed)) {
        Ok(value) => value,
        Err(e) => return DimensionScore::floor(format!("output is not valid JSON: {e}")),
    };
    if required_fields.is_empty() {
        return DimensionScore::measured(1.0);
    }
    let Some(object) = value.as_object() else {
        return DimensionScore::floor("JSON output is not an object");
    };
    let missing: Vec<&str> = required_fields
        .iter()
        .filter(|f| !object.contains_key(f.as_str()))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        DimensionScore::measured(1.0)
    } else {
        DimensionScore::floor(format!(
            "JSON output is missing required field(s): {}",
            missing.join(", ")
        ))
    }
}

/// Brackets balance outside double-quoted string literals.
fn delimiters_balanced(code: &str) -> bool {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in code.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty() && !in_string
}

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "could", "do", "does", "for",
    "from", "give", "how", "i", "in", "is", "it", "its", "me", "my", "of", "on", "or", "please",
    "should", "tell", "that", "the", "their", "this", "to", "was", "we", "what", "when", "where",
    "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Share of the prompt's content words that the output mentions.
///
/// Words match when equal or when they share a prefix of at least
/// `stem_len` characters ("summarize" / "summary").
#[derive(Debug, Clone)]
pub struct LexicalRelevance {
    stem_len: usize,
}

impl Default for LexicalRelevance {
    fn default() -> Self {
        Self { stem_len: 5 }
    }
}

impl LexicalRelevance {
    fn content_words(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .collect()
    }

    fn related(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        let prefix = a
            .chars()
            .zip(b.chars())
            .take_while(|(x, y)| x == y)
            .count();
        prefix >= self.stem_len
    }
}

impl RelevanceMeasure for LexicalRelevance {
    fn name(&self) -> &str {
        "lexical"
    }

    fn relevance(&self, prompt: &str, output: &str) -> Result<f64, MeasureError> {
        let wanted = Self::content_words(prompt);
        if wanted.is_empty() {
            return Ok(1.0);
        }
        let present = Self::content_words(output);
        let hits = wanted
            .iter()
            .filter(|w| present.iter().any(|p| self.related(w, p)))
            .count();
        Ok(hits as f64 / wanted.len() as f64)
    }
}

/// Readability by words per sentence, ignoring the prompt.
///
/// Outputs averaging at most `max_words_per_sentence` score 1.0; longer
/// run-on sentences decay as `max / average`.
#[derive(Debug, Clone)]
pub struct SentenceFluency {
    max_words_per_sentence: f64,
}

impl Default for SentenceFluency {
    fn default() -> Self {
        Self {
            max_words_per_sentence: 20.0,
        }
    }
}

impl SentenceFluency {
    pub fn score(&self, output: &str) -> f64 {
        let sentences = output
            .chars()
            .filter(|c| matches!(c, '.' | '!' | '?'))
            .count()
            .max(1);
        let average = output.split_whitespace().count() as f64 / sentences as f64;
        if average <= self.max_words_per_sentence {
            1.0
        } else {
            self.max_words_per_sentence / average
        }
    }
}

impl RelevanceMeasure for SentenceFluency {
    fn name(&self) -> &str {
        "fluency"
    }

    fn relevance(&self, _prompt: &str, output: &str) -> Result<f64, MeasureError> {
        Ok(self.score(output))
    }
}

/// Case-insensitive regex blocklist: any match is a violation.
#[derive(Debug, Clone)]
pub struct PatternSafetyPolicy {
    patterns: RegexSet,
}

impl PatternSafetyPolicy {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = RegexSet::new(
            patterns
                .into_iter()
                .map(|p| format!("(?i){}", p.as_ref())),
        )?;
        Ok(Self { patterns })
    }

    /// Blocklist entries matching `output`.
    pub fn violations(&self, output: &str) -> Vec<&str> {
        self.patterns
            .matches(output)
            .iter()
            .map(|i| self.patterns.patterns()[i].trim_start_matches("(?i)"))
            .collect()
    }
}

impl SafetyPolicy for PatternSafetyPolicy {
    fn name(&self) -> &str {
        "pattern"
    }

    fn evaluate(&self, output: &str) -> Result<f64, MeasureError> {
        Ok(if self.patterns.is_match(output) { 0.0 } else { 1.0 })
    }
}
