use crate::executor::Row;

pub const MAX_LISTED_ROWS: usize = 10;

pub const DOMAIN_SCOPE_MESSAGE: &str = "I can only help with hospital pricing and quality information. Please ask about medical procedures, costs, or hospital ratings.";
pub const EXECUTION_FAILED_MESSAGE: &str =
    "I had a problem finding an answer for you. Please try again.";
pub const NO_RESULTS_MESSAGE: &str = "I didn't find any hospital pricing or quality information for your question. Please ask another question";

/// Numbered summary of at most [`MAX_LISTED_ROWS`] rows plus an overflow note.
pub fn format_rows(rows: &[Row]) -> String {
    if rows.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
    }

    let mut answer = String::new();
    for (i, row) in rows.iter().take(MAX_LISTED_ROWS).enumerate() {
        answer.push_str(&format!("{}. {row}\n", i + 1));
    }
    if rows.len() > MAX_LISTED_ROWS {
        answer.push_str(&format!(
            "... and {} more results.",
            rows.len() - MAX_LISTED_ROWS
        ));
    }
    answer
}
