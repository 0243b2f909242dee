use super::backend::Prompt;
use super::types::{ContentType, GenerationRequest};
use crate::policy::AdaptiveGenerationConfig;

const SYSTEM_PROMPT: &str = "You write short, natural English practice material for Chinese-speaking \
learners. Always answer with one JSON object and nothing else.";

fn schema(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Sentence => {
            r#"{"sentences": [{"english": "...", "translation": "..."}], "note": "..."}"#
        }
        ContentType::Exercise => {
            r#"{"sentence": "... _____ ...", "answer": "...", "hint": "...", "translation": "..."}"#
        }
        ContentType::Explanation => r#"{"text": "...", "translation": "..."}"#,
        ContentType::Review => r#"{"text": "...", "answer": "..."}"#,
    }
}

fn task(content_type: ContentType, item: &str, count: usize) -> String {
    match content_type {
        ContentType::Sentence => format!(
            "Write {count} different example sentence(s) using the word \"{item}\", each 5 to 20 words long."
        ),
        ContentType::Exercise => format!(
            "Write one fill-in-the-blank exercise where the missing word is \"{item}\" or one of its forms. \
             Mark the blank with _____."
        ),
        ContentType::Explanation => {
            format!("Explain the meaning and typical usage of \"{item}\" in two or three sentences.")
        }
        ContentType::Review => {
            format!("Write a one-line review card that helps recall the word \"{item}\".")
        }
    }
}

pub fn build_prompt(
    request: &GenerationRequest,
    adaptive: Option<&AdaptiveGenerationConfig>,
    scenario: Option<&str>,
) -> Prompt {
    let count = adaptive.map_or(1, |c| c.sentence_complexity.sentence_count());
    let mut user = task(request.content_type, &request.item, count);

    if !request.topic.trim().is_empty() {
        user.push_str(&format!("\nGrammar focus: {}.", request.topic.trim()));
    }
    if let Some(meaning) = request.context.meaning.as_deref() {
        user.push_str(&format!("\nIntended meaning: {meaning}."));
    }
    if let Some(pos) = request.context.part_of_speech.as_deref() {
        user.push_str(&format!("\nPart of speech: {pos}."));
    }
    if let Some(config) = adaptive {
        user.push_str(&format!(
            "\nLearner level: {}. Teaching goal: {}. Sentence complexity: {}.",
            config.difficulty_level.as_str(),
            config.strategy.as_str(),
            config.sentence_complexity.as_str(),
        ));
    }
    if let Some(scenario) = scenario {
        user.push_str(&format!("\nSet the content in this scenario: {}.", scenario.replace('_', " ")));
    }
    if let Some(profile) = request.context.user_profile.as_ref() {
        if !profile.interests.is_empty() {
            user.push_str(&format!("\nLearner interests: {}.", profile.interests.join(", ")));
        }
    }
    user.push_str(&format!("\nRespond as JSON: {}", schema(request.content_type)));

    Prompt::new(SYSTEM_PROMPT, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationContext, GenerationMode};

    #[test]
    fn prompt_mentions_item_topic_and_schema() {
        let request = GenerationRequest {
            content_type: ContentType::Exercise,
            item: "apple".into(),
            topic: "articles".into(),
            mode: GenerationMode::AiEnhanced,
            context: GenerationContext::default().with_meaning("苹果"),
        };
        let prompt = build_prompt(&request, None, Some("daily_life"));
        assert!(prompt.user.contains("\"apple\""));
        assert!(prompt.user.contains("Grammar focus: articles."));
        assert!(prompt.user.contains("daily life"));
        assert!(prompt.user.contains("\"answer\""));
    }
}
