//! DOM extraction and the scrape result payload shared by all executors

use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};

use super::text::{truncate_chars, TextProcessor};
use crate::constants::defaults;
use crate::error::TaskError;
use crate::models::{ExecutionOutput, ExecutionStats, ScrapeJob, TaskContext};

/// Raw content pulled from a page before text processing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    pub text: String,
    pub html: String,
    /// Base64 JPEG
    pub screenshot: Option<String>,
}

/// Extracts the selected elements of an HTML document
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    /// Text and inner HTML of every element matching `selector`, or of
    /// `body` when the selector is absent or matches nothing
    pub fn extract(&self, document: &str, selector: Option<&str>) -> Result<ExtractedContent, TaskError> {
        let parsed = Html::parse_document(document);

        if let Some(raw) = selector.filter(|s| !s.trim().is_empty()) {
            let selector = Selector::parse(raw).map_err(|e| {
                TaskError::validation(format!("invalid parameter: selector '{raw}': {e}"))
            })?;
            let matched: Vec<ElementRef<'_>> = parsed.select(&selector).collect();
            if !matched.is_empty() {
                return Ok(collect(&matched));
            }
        }

        let body = Selector::parse("body")
            .map_err(|e| TaskError::extraction(format!("body selector: {e}")))?;
        let matched: Vec<ElementRef<'_>> = parsed.select(&body).collect();
        Ok(collect(&matched))
    }
}

fn collect(elements: &[ElementRef<'_>]) -> ExtractedContent {
    let text = elements
        .iter()
        .map(|e| e.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    let html = elements
        .iter()
        .map(|e| e.inner_html())
        .collect::<Vec<_>>()
        .join("\n");
    ExtractedContent {
        text,
        html,
        screenshot: None,
    }
}

/// Build the result payload and stats for a finished scrape
pub fn build_output(
    job: &ScrapeJob,
    content: ExtractedContent,
    processor: &TextProcessor,
    mut stats: ExecutionStats,
    ctx: &mut TaskContext,
) -> ExecutionOutput {
    let processed = processor.process(&content.text, &job.options);
    let original_length = content.text.chars().count();

    if !job.options.keywords.is_empty() {
        let found = processor.find_keywords(&content.text, &job.options.keywords);
        if found.is_empty() {
            ctx.info("No keywords found");
        } else {
            ctx.info(format!("Keywords found: {}", found.join(", ")));
            stats = stats.with("keywordsFound", json!(found));
        }
    }

    stats = stats
        .with("originalLength", original_length)
        .with("processedLength", processed.chars().count())
        .with("wordCount", processor.word_count(&processed));

    let mut payload = json!({
        "url": job.url.as_str(),
        "text": truncate_chars(&content.text, defaults::TEXT_PREVIEW_CHARS),
        "html": truncate_chars(&content.html, defaults::HTML_PREVIEW_CHARS),
        "processedText": processed,
    });
    if let (Some(screenshot), Value::Object(map)) = (content.screenshot, &mut payload) {
        map.insert("screenshot".to_string(), Value::String(screenshot));
    }

    ctx.info(format!("Extracted {original_length} characters"));
    ExecutionOutput { payload, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ExecutionMethod;
    use crate::models::Task;

    const PAGE: &str = r#"<html><body>
        <h1 class="title">Rust news</h1>
        <div class="item">first</div>
        <div class="item">second</div>
    </body></html>"#;

    #[test]
    fn test_selector_matches() {
        let content = ContentExtractor.extract(PAGE, Some(".item")).unwrap();
        assert_eq!(content.text, "first\nsecond");
        assert_eq!(content.html, "first\nsecond");
    }

    #[test]
    fn test_falls_back_to_body() {
        let content = ContentExtractor.extract(PAGE, Some(".missing")).unwrap();
        assert!(content.text.contains("Rust news"));
        assert!(content.html.contains("class=\"title\""));

        let content = ContentExtractor.extract(PAGE, None).unwrap();
        assert!(content.text.contains("second"));
    }

    #[test]
    fn test_invalid_selector_is_permanent() {
        let err = ContentExtractor.extract(PAGE, Some("div[")).unwrap_err();
        assert!(err.is_permanent());
    }

    #[test]
    fn test_build_output_shape() {
        let task = Task::new("t", "scrape")
            .with_field("url", json!("https://example.com"))
            .with_field("data", json!({"options": {"keywords": ["rust", "go"]}}));
        let job = ScrapeJob::from_task(&task).unwrap();
        let mut ctx = TaskContext::for_task(&task);
        let long_text = "x".repeat(1_500);

        let output = build_output(
            &job,
            ExtractedContent {
                text: format!("rust {long_text}"),
                html: "<p>rust</p>".to_string(),
                screenshot: Some("abc".to_string()),
            },
            &TextProcessor::new(),
            ExecutionStats::new(ExecutionMethod::Light),
            &mut ctx,
        );

        assert_eq!(output.payload["url"], "https://example.com/");
        assert_eq!(output.payload["text"].as_str().unwrap().chars().count(), 1_000);
        assert_eq!(output.payload["screenshot"], "abc");
        assert_eq!(output.stats.extra["keywordsFound"], json!(["rust"]));
        assert_eq!(output.stats.extra["wordCount"], 2);
        assert!(ctx.logs().iter().any(|l| l.message.contains("Keywords found")));
    }
}
