//! Helpers for normalizing extracted text before it is persisted and chunked.

/// Clean extractor output.
///
/// Line endings become `\n`, control characters other than newlines and tabs are dropped,
/// horizontal whitespace runs collapse to a single space, three or more consecutive newlines
/// collapse to one blank line, and every line plus the whole text is trimmed.
pub fn clean_extracted_text(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines = Vec::new();
    for line in normalized.split('\n') {
        lines.push(collapse_horizontal_whitespace(line));
    }

    let mut cleaned = String::with_capacity(normalized.len());
    let mut blank_run = 0usize;
    for line in lines {
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !cleaned.is_empty() {
            cleaned.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        cleaned.push_str(&line);
        blank_run = 0;
    }

    cleaned
}

/// Count whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Sanitize arbitrary string input by trimming whitespace and dropping empties.
pub(crate) fn sanitize_string(value: Option<String>) -> Option<String> {
    value.and_then(|input| {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn collapse_horizontal_whitespace(line: &str) -> String {
    let mut collapsed = String::with_capacity(line.len());
    let mut pending_space = false;
    for ch in line.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if ch.is_control() {
            continue;
        }
        if pending_space && !collapsed.is_empty() {
            collapsed.push(' ');
        }
        pending_space = false;
        collapsed.push(ch);
    }
    collapsed
}
