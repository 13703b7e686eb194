//! HTML to text conversion for episode descriptions.

/// Wrap width handed to the renderer. Wider than any description we send,
/// so paragraphs stay on one line.
const RENDER_WIDTH: usize = 4096;

/// Convert an HTML fragment to text with blank-line separated paragraphs.
///
/// Input without any tags is treated as plain text: its line breaks are kept.
pub fn html_to_text(html: &str) -> String {
    if !html.contains('<') {
        return normalize_breaks(html);
    }

    let rendered = html2text::from_read(html.as_bytes(), RENDER_WIDTH).unwrap_or_default();
    normalize_breaks(&rendered)
}

/// Trim line ends, collapse runs of blank lines into one and trim the result.
fn normalize_breaks(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        result.push_str(line);
        result.push('\n');
    }

    result.trim().to_string()
}
