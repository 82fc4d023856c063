use crate::feature::{FeatureKind, Language};
use crate::request::GenerationRequest;

const DEFAULT_QUESTION_TYPE: &str = "multiple-choice";

/// Build the completion prompt for a validated request
pub fn build_prompt(request: &GenerationRequest) -> String {
    let lang = language_name(request.language);
    let field = |name| text_or_empty(request, name);

    let body = match request.feature {
        FeatureKind::Quiz => {
            let count = request.number("numQuestions").unwrap_or(5);
            let question_type = request
                .text("questionType")
                .unwrap_or(DEFAULT_QUESTION_TYPE);
            format!(
                "Create a quiz of exactly {count} {question_type} questions about the material below. \
                 Each question needs the question text, the answer options where relevant, the correct \
                 answer and a one-sentence explanation.\n\nMaterial:\n{}",
                field("topic")
            )
        }
        FeatureKind::Flashcards => {
            let concepts = request.list("concepts");
            let focus = if concepts.is_empty() {
                String::new()
            } else {
                format!("\nFocus on these concepts: {}.", concepts.join(", "))
            };
            format!(
                "Create study flashcards (front and back) from the material below.{focus}\n\nMaterial:\n{}",
                field("topic")
            )
        }
        FeatureKind::Schedule => format!(
            "Build a day-by-day study schedule that ends on the exam date {}. Spread the material \
             evenly and leave the final day for review.\n\nMaterial:\n{}",
            field("examDate"),
            field("topic")
        ),
        FeatureKind::FormulaSheet => format!(
            "Produce a formula sheet for the subject below. For each formula give its name, the formula \
             itself and what every symbol means.\n\nSubject:\n{}",
            field("topic")
        ),
        FeatureKind::SummaryTable => {
            let source = request
                .text("sourceText")
                .map(|text| format!("\n\nSource text:\n{text}"))
                .unwrap_or_default();
            format!(
                "Build a summary table on the topic \"{}\". Add one row per concept with its definition \
                 and a short example. Concepts: {}.{source}",
                field("topic"),
                request.list("concepts").join(", ")
            )
        }
        FeatureKind::Bibliography => format!(
            "Format every source in the text below as a bibliography entry in {} style.\n\nSources:\n{}",
            field("style"),
            field("text")
        ),
        FeatureKind::Charts => format!(
            "Extract the quantitative data in the text below into charts. For each chart give a title, \
             a chart type (bar, line or pie) and the labelled data points.\n\nText:\n{}",
            field("text")
        ),
        FeatureKind::Presentation => format!(
            "Outline a presentation about the material below. Each slide needs a title and three to \
             five bullet points.\n\nMaterial:\n{}",
            field("topic")
        ),
        FeatureKind::Speech => field("text").to_string(),
    };

    if request.feature == FeatureKind::Speech {
        return body;
    }

    let keys: Vec<&str> = request
        .feature
        .spec()
        .result_keys
        .iter()
        .map(|k| k.name)
        .collect();

    format!(
        "{body}\n\nWrite all content in {lang}. Respond with a single JSON object containing a \
         `title` string and the key(s) {}. Do not wrap the JSON in Markdown.",
        keys.iter()
            .map(|k| format!("`{k}`"))
            .collect::<Vec<_>>()
            .join(", ")
    )
}

fn text_or_empty<'a>(request: &'a GenerationRequest, field: &str) -> &'a str {
    request.text(field).unwrap_or_default()
}

fn language_name(language: Language) -> &'static str {
    match language {
        Language::Hebrew => "Hebrew",
        Language::English => "English",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quiz_prompt_mentions_count_type_and_language() {
        let request = GenerationRequest::new(FeatureKind::Quiz, Language::Hebrew)
            .with("topic", "The mitochondria is the powerhouse of the cell.")
            .with("numQuestions", 3);
        let prompt = build_prompt(&request);
        assert!(prompt.contains("exactly 3 multiple-choice questions"));
        assert!(prompt.contains("powerhouse of the cell"));
        assert!(prompt.contains("Hebrew"));
        assert!(prompt.contains("`questions`"));
    }

    #[test]
    fn summary_table_lists_only_filled_concepts() {
        let request = GenerationRequest::new(FeatureKind::SummaryTable, Language::English)
            .with("topic", "Cell biology")
            .with("concepts", json!(["osmosis", "", "diffusion"]));
        let prompt = build_prompt(&request);
        assert!(prompt.contains("Concepts: osmosis, diffusion."));
        assert!(!prompt.contains("Source text"));
        assert!(prompt.contains("English"));
    }

    #[test]
    fn speech_prompt_is_the_text_itself() {
        let request =
            GenerationRequest::new(FeatureKind::Speech, Language::English).with("text", "Hello");
        assert_eq!(build_prompt(&request), "Hello");
    }
}
