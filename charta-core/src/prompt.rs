//! Prompt construction for chart Q&A.
//!
//! Questions about colors or visual appearance get a dedicated instruction block
//! steering the model toward visual description instead of numeric analysis.

/// Keywords marking a question as visual/appearance-related.
pub const VISUAL_KEYWORDS: [&str; 7] = [
    "color",
    "colours",
    "visual",
    "appearance",
    "style",
    "design",
    "scheme",
];

/// Instruction block appended to visual questions.
pub const VISUAL_INSTRUCTIONS: &str = "\nIMPORTANT: Your task is to analyze the visual elements of this chart, with special attention to colors. Please provide:
1. A detailed description of all colors used in the chart
2. What each color represents in the context of the data
3. How colors are used to distinguish between different data points, categories, or values
4. Any color patterns, gradients, or visual indicators of importance
5. How effectively the color scheme communicates the data

Focus primarily on the VISUAL APPEARANCE rather than just the numeric data.";

/// Instruction block appended to everything else.
pub const DATA_INSTRUCTIONS: &str = "\nPlease provide a detailed answer based on the data and question above. When relevant, include observations about the visual elements of the chart, including colors and design.";

/// Case-insensitive keyword match against [`VISUAL_KEYWORDS`].
pub fn is_visual_question(question: &str) -> bool {
    let lower = question.to_lowercase();
    VISUAL_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Build the full prompt for a chart question: title + table + question, then the
/// instruction block matching the question type.
pub fn build_chart_prompt(question: &str, table_data: &str, title: &str) -> String {
    let base = format!("Title: {title}\nData: {table_data}\nQuestion: {question}\n");
    if is_visual_question(question) {
        format!("{base}{VISUAL_INSTRUCTIONS}")
    } else {
        format!("{base}{DATA_INSTRUCTIONS}")
    }
}

/// Build a context-aware conversational prompt from recent session utterances.
pub fn build_chat_prompt(context: &[String], input: &str) -> String {
    format!("{}\n\nUser: {}\nAssistant:", context.join("\n"), input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_question_gets_visual_instructions() {
        let prompt = build_chart_prompt("What color is the tallest bar?", "| A | B |", "Bars");
        assert!(prompt.contains(VISUAL_INSTRUCTIONS));
        assert!(!prompt.contains(DATA_INSTRUCTIONS));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        assert!(is_visual_question("Describe the COLOR SCHEME"));
        assert!(is_visual_question("how is the Appearance?"));
        assert!(!is_visual_question("What is the total of column two?"));
    }

    #[test]
    fn data_question_gets_generic_instructions() {
        let prompt = build_chart_prompt("Which region sold the most?", "| East | 100 |", "Sales");
        assert!(prompt.contains(DATA_INSTRUCTIONS));
        assert!(!prompt.contains(VISUAL_INSTRUCTIONS));
    }

    #[test]
    fn prompt_embeds_title_table_and_question() {
        let prompt = build_chart_prompt("q?", "tbl", "My Chart");
        assert!(prompt.starts_with("Title: My Chart\nData: tbl\nQuestion: q?\n"));
    }

    #[test]
    fn chat_prompt_appends_user_turn_after_context() {
        let context = vec!["User: hi".to_string(), "Assistant: hello".to_string()];
        let prompt = build_chat_prompt(&context, "how are you?");
        assert_eq!(
            prompt,
            "User: hi\nAssistant: hello\n\nUser: how are you?\nAssistant:"
        );
    }
}
