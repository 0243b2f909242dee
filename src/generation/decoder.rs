use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const MIN_FREE_LINE_CHARS: usize = 10;

const SENTENCE_KEYS: [&str; 5] = ["sentence", "english", "example", "text", "content"];
const TRANSLATION_KEYS: [&str; 3] = ["translation", "chinese", "zh"];
const NOTE_KEYS: [&str; 4] = ["note", "grammar", "grammar_note", "explanation"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("completion was empty")]
    Empty,
    #[error("no usable content in completion")]
    NoContent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedSentence {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredContent {
    pub sentences: Vec<DecodedSentence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl StructuredContent {
    pub fn text(&self) -> String {
        self.sentences
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn first_translation(&self) -> Option<&str> {
        self.sentences.iter().find_map(|s| s.translation.as_deref())
    }

    fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

/// Turns raw completion text into structured content. Accepts a JSON object (optionally
/// fenced or preceded by a reasoning block), labelled lines, or plain prose.
pub fn decode(raw: &str) -> Result<StructuredContent, DecodeError> {
    let body = strip_fences(strip_reasoning(raw.trim()));
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }

    if let Some(decoded) = decode_json(body) {
        return Ok(decoded);
    }

    let labelled = decode_labelled(body);
    if !labelled.is_empty() {
        return Ok(labelled);
    }

    body.lines()
        .map(clean_line)
        .find(|l| l.chars().count() > MIN_FREE_LINE_CHARS && l.chars().any(|c| c.is_ascii_alphabetic()))
        .map(|line| StructuredContent {
            sentences: vec![DecodedSentence {
                text: line.to_string(),
                translation: None,
            }],
            ..Default::default()
        })
        .ok_or(DecodeError::NoContent)
}

fn strip_reasoning(s: &str) -> &str {
    if let Some(end) = s.rfind("</think>") {
        return s[end + "</think>".len()..].trim();
    }
    if s.starts_with("<think>") {
        // unterminated reasoning block
        return "";
    }
    s
}

fn strip_fences(s: &str) -> &str {
    let Some(start) = s.find("```") else {
        return s.trim();
    };
    let after = &s[start + 3..];
    // drop the language tag on the fence line
    let after = match after.find('\n') {
        Some(nl) if !after[..nl].contains(char::is_whitespace) => &after[nl + 1..],
        _ => after,
    };
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => after.trim(),
    }
}

fn string_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(String::from)
}

fn sentence_from_value(value: &Value) -> Option<DecodedSentence> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(DecodedSentence {
            text: s.trim().to_string(),
            translation: None,
        }),
        Value::Object(obj) => string_field(obj, &SENTENCE_KEYS).map(|text| DecodedSentence {
            text,
            translation: string_field(obj, &TRANSLATION_KEYS),
        }),
        _ => None,
    }
}

fn decode_json(body: &str) -> Option<StructuredContent> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: Value = serde_json::from_str(&body[start..=end]).ok()?;
    let obj = value.as_object()?;

    let mut sentences: Vec<DecodedSentence> = obj
        .get("sentences")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(sentence_from_value).collect())
        .unwrap_or_default();
    if sentences.is_empty() {
        sentences.extend(sentence_from_value(&value));
    }

    let decoded = StructuredContent {
        sentences,
        note: string_field(obj, &NOTE_KEYS),
        answer: string_field(obj, &["answer"]),
        hint: string_field(obj, &["hint"]),
    };
    (!decoded.is_empty()).then_some(decoded)
}

enum Label {
    Sentence,
    Translation,
    Note,
    Answer,
    Hint,
}

fn split_label(line: &str) -> Option<(Label, &str)> {
    let (head, rest) = line.split_once([':', '：'])?;
    let label = match head.trim().to_lowercase().as_str() {
        "sentence" | "english" | "example" | "英语例句" | "例句" => Label::Sentence,
        "translation" | "chinese" | "中文翻译" | "翻译" => Label::Translation,
        "grammar" | "note" | "语法重点" => Label::Note,
        "answer" | "答案" => Label::Answer,
        "hint" | "提示" => Label::Hint,
        _ => return None,
    };
    Some((label, rest.trim()))
}

fn clean_line(line: &str) -> &str {
    let line = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(['.', ')']) {
            return rest.trim_start();
        }
    }
    line.trim_matches('*').trim()
}

fn decode_labelled(body: &str) -> StructuredContent {
    let mut decoded = StructuredContent::default();
    for line in body.lines().map(clean_line) {
        let Some((label, value)) = split_label(line) else {
            continue;
        };
        let value = value.trim_matches('*').trim();
        if value.is_empty() {
            continue;
        }
        match label {
            Label::Sentence => decoded.sentences.push(DecodedSentence {
                text: value.to_string(),
                translation: None,
            }),
            Label::Translation => {
                if let Some(last) = decoded.sentences.last_mut() {
                    last.translation.get_or_insert_with(|| value.to_string());
                }
            }
            Label::Note => {
                decoded.note.get_or_insert_with(|| value.to_string());
            }
            Label::Answer => {
                decoded.answer.get_or_insert_with(|| value.to_string());
            }
            Label::Hint => {
                decoded.hint.get_or_insert_with(|| value.to_string());
            }
        }
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_fenced_json_after_reasoning() {
        let raw = "<think>plan the answer</think>\n```json\n{\"sentence\": \"I eat an apple.\", \"translation\": \"我吃一个苹果。\"}\n```";
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.text(), "I eat an apple.");
        assert_eq!(decoded.first_translation(), Some("我吃一个苹果。"));
    }

    #[test]
    fn decodes_sentence_arrays() {
        let raw = r#"{"sentences": [{"english": "The apple is red."}, "She bought apples."], "note": "plural"}"#;
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.sentences.len(), 2);
        assert_eq!(decoded.note.as_deref(), Some("plural"));
    }

    #[test]
    fn decodes_labelled_lines() {
        let raw = "1. Sentence: He ate an apple after lunch.\n   Translation: 他午饭后吃了一个苹果。\n英语例句：Apples grow on trees.\n中文翻译：苹果长在树上。\n语法重点：一般现在时";
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.sentences.len(), 2);
        assert_eq!(decoded.sentences[1].text, "Apples grow on trees.");
        assert_eq!(decoded.sentences[1].translation.as_deref(), Some("苹果长在树上。"));
        assert_eq!(decoded.note.as_deref(), Some("一般现在时"));
    }

    #[test]
    fn falls_back_to_first_prose_line() {
        let decoded = decode("Sure!\nMy brother keeps an apple in his bag.").unwrap();
        assert_eq!(decoded.text(), "My brother keeps an apple in his bag.");
    }

    #[test]
    fn rejects_empty_and_contentless_output() {
        assert_eq!(decode("   "), Err(DecodeError::Empty));
        assert_eq!(decode("<think>never finished"), Err(DecodeError::Empty));
        assert_eq!(decode("OK"), Err(DecodeError::NoContent));
        assert_eq!(decode("{\"foo\": 1}"), Err(DecodeError::NoContent));
    }
}
