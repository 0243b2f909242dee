use crate::generation::{
    indefinite_article, ContentType, GeneratedContent, GenerationContext, GenerationMode,
};

const PRIMARY_QUALITY: f64 = 0.7;
const SECONDARY_QUALITY: f64 = 0.6;

/// Last-resort content. Pure and infallible; never touches a back-end or the cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackProvider;

impl FallbackProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn safe_content(
        &self,
        content_type: ContentType,
        item: &str,
        context: &GenerationContext,
    ) -> GeneratedContent {
        let item = item.trim();
        let article = indefinite_article(item);
        let meaning = context.meaning.as_deref();

        let (mut content, quality) = match content_type {
            ContentType::Sentence => {
                let mut content = GeneratedContent::new(
                    format!("This is {article} {item}."),
                    GenerationMode::TemplateOnly,
                );
                let translation = match meaning {
                    Some(meaning) => format!("这是一个{meaning}。"),
                    None => format!("这是{item}。"),
                };
                content = content.with_meta("translation", translation);
                (content, PRIMARY_QUALITY)
            }
            ContentType::Exercise => {
                let mut content = GeneratedContent::new(
                    format!("Fill in the blank: This is {article} _____."),
                    GenerationMode::TemplateOnly,
                )
                .with_meta("answer", item)
                .with_meta("exercise_type", "fill_blank");
                if let Some(meaning) = meaning {
                    content = content.with_meta("hint", meaning);
                }
                (content, PRIMARY_QUALITY)
            }
            ContentType::Explanation => {
                let text = match meaning {
                    Some(meaning) => format!("\"{item}\": {meaning}."),
                    None => format!("\"{item}\" is a word to learn."),
                };
                (GeneratedContent::new(text, GenerationMode::TemplateOnly), SECONDARY_QUALITY)
            }
            ContentType::Review => (
                GeneratedContent::new(format!("Review: {item}."), GenerationMode::TemplateOnly)
                    .with_meta("answer", item),
                SECONDARY_QUALITY,
            ),
        };

        content.quality_score = quality;
        content.is_fallback = true;
        content.with_meta("source", "fallback")
    }
}
