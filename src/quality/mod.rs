pub mod rules;
pub mod word_forms;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::generation::template::BLANK;
use crate::generation::{ContentType, GeneratedContent};

const TRIVIAL_OPENERS: [&str; 4] = ["this is", "i am", "it is a", "that is"];
const CRITICAL_CEILING: f64 = 0.5;
const MAX_TARGET_REPEATS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Empty,
    MissingTarget,
    ArticleMismatch,
    BeVerbBareForm,
    Capitalization,
    TerminalPunctuation,
    Length,
    TrivialPattern,
    UnfilledPlaceholder,
}

impl IssueKind {
    pub fn category(&self) -> Category {
        match self {
            Self::ArticleMismatch | Self::BeVerbBareForm => Category::Grammar,
            Self::MissingTarget => Category::Vocabulary,
            Self::Capitalization | Self::TerminalPunctuation | Self::UnfilledPlaceholder => {
                Category::Structure
            }
            Self::Empty | Self::Length => Category::Content,
            Self::TrivialPattern => Category::Style,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    fn penalty(&self) -> f64 {
        match self {
            Self::Critical => 1.0,
            Self::High => 0.5,
            Self::Medium => 0.25,
            Self::Low => 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Grammar,
    Vocabulary,
    Structure,
    Content,
    Style,
}

impl Category {
    pub const ALL: [Self; 5] = [
        Self::Grammar,
        Self::Vocabulary,
        Self::Structure,
        Self::Content,
        Self::Style,
    ];

    fn weight(&self) -> f64 {
        match self {
            Self::Grammar => 0.3,
            Self::Vocabulary => 0.25,
            Self::Structure => 0.15,
            Self::Content => 0.15,
            Self::Style => 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    pub confidence: f64,
}

impl QualityIssue {
    pub fn new(kind: IssueKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            confidence: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
    Unacceptable,
}

impl QualityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::Excellent
        } else if score >= 0.75 {
            Self::Good
        } else if score >= 0.6 {
            Self::Fair
        } else if score >= 0.4 {
            Self::Poor
        } else {
            Self::Unacceptable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub score: f64,
    pub level: QualityLevel,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

fn word_window(content_type: ContentType) -> (usize, usize) {
    match content_type {
        ContentType::Sentence => (5, 20),
        ContentType::Exercise => (4, 40),
        ContentType::Explanation | ContentType::Review => (3, 80),
    }
}

fn dedupe_issues(issues: &mut Vec<QualityIssue>) {
    let mut seen = HashSet::new();
    issues.retain(|issue| seen.insert((issue.kind, issue.severity, issue.message.clone())));
}

/// Rule and heuristic scoring of generated text. Never fails; problems are reported as issues.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate;

impl QualityGate {
    pub fn new() -> Self {
        Self
    }

    pub fn accept(&self, score: f64, threshold: f64) -> bool {
        score >= threshold
    }

    pub fn score(
        &self,
        content: &GeneratedContent,
        content_type: ContentType,
        item: &str,
    ) -> QualityReport {
        self.score_text(&content.content, content.answer(), content_type, item)
    }

    pub fn score_text(
        &self,
        text: &str,
        answer: Option<&str>,
        content_type: ContentType,
        item: &str,
    ) -> QualityReport {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return QualityReport {
                score: 0.0,
                level: QualityLevel::Unacceptable,
                issues: vec![QualityIssue::new(
                    IssueKind::Empty,
                    Severity::Critical,
                    "content is empty",
                )],
            };
        }

        let mut issues = Vec::new();
        let (min_words, max_words) = word_window(content_type);

        for line in &lines {
            issues.extend(rules::grammar_issues(line));
            issues.extend(rules::structure_issues(line));

            let words = line.split_whitespace().count();
            if words < min_words || words > max_words {
                issues.push(QualityIssue::new(
                    IssueKind::Length,
                    Severity::Medium,
                    format!("{words} words, expected {min_words}-{max_words}"),
                ));
            }

            let lowered = line.to_lowercase();
            if content_type == ContentType::Sentence
                && TRIVIAL_OPENERS.iter().any(|o| lowered.starts_with(o))
            {
                issues.push(QualityIssue::new(
                    IssueKind::TrivialPattern,
                    Severity::Medium,
                    "formulaic opener",
                ));
            }
        }

        // an answer only stands in for the target when the text has a blank for it
        let target_found = word_forms::contains_word_form(text, item)
            || (text.contains(BLANK)
                && answer.is_some_and(|a| word_forms::contains_word_form(a, item)));
        if !target_found {
            issues.push(QualityIssue::new(
                IssueKind::MissingTarget,
                Severity::Critical,
                format!("target \"{item}\" not used"),
            ));
        } else if word_forms::occurrences(text, item) > MAX_TARGET_REPEATS * lines.len() {
            issues.push(QualityIssue::new(
                IssueKind::TrivialPattern,
                Severity::Low,
                "target repeated unnaturally often",
            ));
        }

        dedupe_issues(&mut issues);
        let score = combine(&issues);
        QualityReport {
            score,
            level: QualityLevel::from_score(score),
            issues,
        }
    }
}

fn combine(issues: &[QualityIssue]) -> f64 {
    let mut score: f64 = Category::ALL
        .iter()
        .map(|category| {
            let penalty: f64 = issues
                .iter()
                .filter(|i| i.kind.category() == *category)
                .map(|i| i.severity.penalty() * i.confidence)
                .sum();
            category.weight() * (1.0 - penalty).clamp(0.0, 1.0)
        })
        .sum();
    if issues.iter().any(|i| i.severity == Severity::Critical) {
        score = score.min(CRITICAL_CEILING);
    }
    score.clamp(0.0, 1.0)
}
