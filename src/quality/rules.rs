use std::sync::OnceLock;

use regex::Regex;

use super::{IssueKind, QualityIssue, Severity};

const RULE_CONFIDENCE: f64 = 0.9;

/// Words starting with a vowel letter but a consonant sound.
const A_EXCEPTIONS: [&str; 6] = ["uni", "use", "usu", "eu", "one", "once"];
/// Words starting with a silent h.
const AN_EXCEPTIONS: [&str; 5] = ["hour", "honest", "honor", "honour", "heir"];

struct Rules {
    a_before_vowel: Option<Regex>,
    an_before_consonant: Option<Regex>,
    be_bare_verb: Option<Regex>,
    placeholder: Option<Regex>,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        a_before_vowel: compile(r"(?i)\ba\s+([aeiou][a-z]*)"),
        an_before_consonant: compile(r"(?i)\ban\s+([b-df-hj-np-tv-z][a-z]*)"),
        be_bare_verb: compile(r"(?i)\b(am|is|are)\s+(go|come|play|study|work|eat|drink|run|walk)\b"),
        placeholder: compile(r"\{[A-Za-z_]+\}"),
    })
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(pattern, error = %e, "quality rule disabled");
            None
        }
    }
}

fn issue(kind: IssueKind, severity: Severity, message: String) -> QualityIssue {
    QualityIssue {
        kind,
        severity,
        message,
        confidence: RULE_CONFIDENCE,
    }
}

pub fn grammar_issues(line: &str) -> Vec<QualityIssue> {
    let rules = rules();
    let mut issues = Vec::new();

    for cap in rules.a_before_vowel.iter().flat_map(|re| re.captures_iter(line)) {
        let word = cap[1].to_ascii_lowercase();
        if !A_EXCEPTIONS.iter().any(|p| word.starts_with(p)) {
            issues.push(issue(
                IssueKind::ArticleMismatch,
                Severity::High,
                format!("use \"an\" before \"{}\"", &cap[1]),
            ));
        }
    }

    for cap in rules.an_before_consonant.iter().flat_map(|re| re.captures_iter(line)) {
        let word = cap[1].to_ascii_lowercase();
        if !AN_EXCEPTIONS.iter().any(|p| word.starts_with(p)) {
            issues.push(issue(
                IssueKind::ArticleMismatch,
                Severity::High,
                format!("use \"a\" before \"{}\"", &cap[1]),
            ));
        }
    }

    for cap in rules.be_bare_verb.iter().flat_map(|re| re.captures_iter(line)) {
        issues.push(issue(
            IssueKind::BeVerbBareForm,
            Severity::Critical,
            format!("\"{} {}\" needs a participle", &cap[1], &cap[2]),
        ));
    }

    issues
}

pub fn structure_issues(line: &str) -> Vec<QualityIssue> {
    let mut issues = Vec::new();
    let trimmed = line.trim();

    if rules().placeholder.as_ref().is_some_and(|re| re.is_match(trimmed)) {
        issues.push(issue(
            IssueKind::UnfilledPlaceholder,
            Severity::Critical,
            "template placeholder left in output".to_string(),
        ));
    }

    if let Some(first) = trimmed.chars().find(|c| c.is_alphabetic()) {
        if first.is_lowercase() {
            issues.push(issue(
                IssueKind::Capitalization,
                Severity::Low,
                "sentence should start with a capital letter".to_string(),
            ));
        }
    }

    let ends_properly = trimmed
        .trim_end_matches(['"', '\'', ')', '”', '’'])
        .ends_with(['.', '!', '?', '。', '！', '？']);
    if !trimmed.is_empty() && !ends_properly {
        issues.push(issue(
            IssueKind::TerminalPunctuation,
            Severity::Low,
            "missing terminal punctuation".to_string(),
        ));
    }

    issues
}
