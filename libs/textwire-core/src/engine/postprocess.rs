/// Punctuation stripped from the edges of recognized text. Isolated marks
/// at the borders are almost always misread specks, not content.
const EDGE_PUNCTUATION: &[char] = &['.', ',', '!', '?', '*', '-', '|', '`', '\'', '"'];

/// Normalize raw recognizer output: trim whitespace, collapse runs of
/// spaces, strip stray punctuation from both ends. Deterministic for a
/// given input; an empty result is allowed.
pub fn clean_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut collapsed = String::with_capacity(trimmed.len());
    let mut previous_was_space = false;
    for ch in trimmed.chars() {
        if ch == ' ' {
            if !previous_was_space {
                collapsed.push(' ');
            }
            previous_was_space = true;
        } else {
            collapsed.push(ch);
            previous_was_space = false;
        }
    }

    collapsed.trim_matches(EDGE_PUNCTUATION).to_string()
}
