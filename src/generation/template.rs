use async_trait::async_trait;

use super::types::{ContentType, GeneratedContent, GenerationError, GenerationMode, GenerationRequest};
use super::ModeGenerator;
use crate::policy::AdaptiveGenerationConfig;
use crate::quality::word_forms::is_vowel;

pub(crate) const BLANK: &str = "_____";

const NOUN_TEMPLATES: [&str; 3] = [
    "I saw {art} {w} at the market yesterday.",
    "My sister keeps {art} {w} in her room.",
    "There is {art} {w} on the kitchen table.",
];
const VERB_TEMPLATES: [&str; 3] = [
    "We often {w} together after school.",
    "They want to {w} this weekend.",
    "I will {w} with my friends tomorrow.",
];
const ADJECTIVE_TEMPLATES: [&str; 2] = [
    "The weather looks very {w} this morning.",
    "She told us {art} {w} story last night.",
];
const ADVERB_TEMPLATES: [&str; 1] = ["He finished his homework {w} this afternoon."];
const GENERIC_TEMPLATES: [&str; 1] = ["We talked about the word \"{w}\" in class today."];

pub fn indefinite_article(word: &str) -> &'static str {
    let lowered = word.trim().to_lowercase();
    let silent_h = ["hour", "honest", "honor", "honour", "heir"];
    let consonant_sound = ["uni", "use", "usu", "eu", "one", "once"];
    if silent_h.iter().any(|p| lowered.starts_with(p)) {
        return "an";
    }
    if consonant_sound.iter().any(|p| lowered.starts_with(p)) {
        return "a";
    }
    match lowered.chars().next() {
        Some(c) if is_vowel(c) => "an",
        _ => "a",
    }
}

fn templates_for(part_of_speech: Option<&str>) -> &'static [&'static str] {
    let pos = part_of_speech.unwrap_or_default().trim().to_lowercase();
    match pos.trim_end_matches('.') {
        "n" | "noun" => &NOUN_TEMPLATES,
        "v" | "verb" | "vt" | "vi" => &VERB_TEMPLATES,
        "adj" | "adjective" => &ADJECTIVE_TEMPLATES,
        "adv" | "adverb" => &ADVERB_TEMPLATES,
        _ => &GENERIC_TEMPLATES,
    }
}

/// Stable per-item choice so repeated renders agree.
fn pick<'a>(templates: &'a [&'a str], item: &str) -> (usize, &'a str) {
    let seed: usize = item.bytes().map(usize::from).sum();
    let index = seed % templates.len().max(1);
    (index, templates.get(index).copied().unwrap_or(GENERIC_TEMPLATES[0]))
}

fn fill(template: &str, word: &str) -> String {
    template
        .replace("{art}", indefinite_article(word))
        .replace("{w}", word)
}

/// Article chosen for `word`, with the word itself blanked out.
fn fill_blank(template: &str, word: &str) -> String {
    template
        .replace("{art}", indefinite_article(word))
        .replace("{w}", BLANK)
}

/// Deterministic rule-based content; never calls a back-end.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, request: &GenerationRequest) -> GeneratedContent {
        let item = request.item.trim();
        let pos = request.context.part_of_speech.as_deref();
        let (index, template) = pick(templates_for(pos), item);
        let sentence = fill(template, item);
        let meaning = request.context.meaning.as_deref();

        let mut content = match request.content_type {
            ContentType::Sentence => GeneratedContent::new(sentence, GenerationMode::TemplateOnly),
            ContentType::Exercise => {
                let prompt = format!("Fill in the blank: {}", fill_blank(template, item));
                let mut exercise = GeneratedContent::new(prompt, GenerationMode::TemplateOnly)
                    .with_meta("answer", item)
                    .with_meta("exercise_type", "fill_blank");
                if let Some(meaning) = meaning {
                    exercise = exercise.with_meta("hint", meaning);
                }
                exercise
            }
            ContentType::Explanation => {
                let text = match meaning {
                    Some(meaning) => format!("The word \"{item}\" means \"{meaning}\". {sentence}"),
                    None => format!("The word \"{item}\" is used like this: {sentence}"),
                };
                GeneratedContent::new(text, GenerationMode::TemplateOnly)
            }
            ContentType::Review => GeneratedContent::new(
                format!("Review the word \"{item}\": {sentence}"),
                GenerationMode::TemplateOnly,
            )
            .with_meta("answer", item),
        };

        content = content.with_meta("template", format!("{}#{index}", pos.unwrap_or("generic")));
        if let Some(meaning) = meaning {
            content = content.with_meta("meaning", meaning);
        }
        content
    }
}

#[async_trait]
impl ModeGenerator for TemplateGenerator {
    fn mode(&self) -> GenerationMode {
        GenerationMode::TemplateOnly
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _adaptive: Option<&AdaptiveGenerationConfig>,
    ) -> Result<GeneratedContent, GenerationError> {
        Ok(self.render(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationContext;
    use crate::quality::QualityGate;

    fn request(content_type: ContentType, item: &str, pos: &str) -> GenerationRequest {
        GenerationRequest {
            content_type,
            item: item.into(),
            topic: "present_simple".into(),
            mode: GenerationMode::TemplateOnly,
            context: GenerationContext::default()
                .with_part_of_speech(pos)
                .with_meaning("meaning"),
        }
    }

    #[test]
    fn articles_follow_pronunciation() {
        assert_eq!(indefinite_article("apple"), "an");
        assert_eq!(indefinite_article("hour"), "an");
        assert_eq!(indefinite_article("university"), "a");
        assert_eq!(indefinite_article("book"), "a");
    }

    #[test]
    fn rendering_is_deterministic() {
        let generator = TemplateGenerator::new();
        let a = generator.render(&request(ContentType::Sentence, "apple", "n."));
        let b = generator.render(&request(ContentType::Sentence, "apple", "n."));
        assert_eq!(a, b);
        assert!(a.content.contains("an apple"));
    }

    #[test]
    fn templates_pass_the_quality_gate() {
        let generator = TemplateGenerator::new();
        let gate = QualityGate::new();
        let cases = [
            ("apple", "noun"),
            ("run", "verb"),
            ("happy", "adj"),
            ("quickly", "adv"),
            ("serendipity", ""),
        ];
        for (item, pos) in cases {
            for content_type in ContentType::ALL {
                let content = generator.render(&request(content_type, item, pos));
                let report = gate.score(&content, content_type, item);
                assert!(
                    report.score >= 0.7,
                    "{item}/{content_type}: {} {:?} {:?}",
                    report.score,
                    content.content,
                    report.issues
                );
            }
        }
    }

    #[test]
    fn exercise_hides_the_answer() {
        let content = TemplateGenerator::new().render(&request(ContentType::Exercise, "apple", "n"));
        assert!(content.content.contains(BLANK));
        assert!(!content.content.contains("apple"));
        assert_eq!(content.answer(), Some("apple"));
    }
}
