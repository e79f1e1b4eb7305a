//! Clipboard export formats for a message: plain text, Markdown, HTML.

use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Result, anyhow};
use regex::Regex;

use crate::markdown::MATH_SPAN_PATTERN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFormat {
    Text,
    Markdown,
    Html,
}

impl CopyFormat {
    pub fn label(&self) -> &'static str {
        match self {
            CopyFormat::Text => "plain text",
            CopyFormat::Markdown => "Markdown",
            CopyFormat::Html => "HTML",
        }
    }
}

pub fn format_content(content: &str, format: CopyFormat) -> String {
    match format {
        CopyFormat::Text => to_plain_text(content),
        CopyFormat::Markdown => content.to_string(),
        CopyFormat::Html => to_html(content),
    }
}

/// Strip all math-delimited spans. Removing a span can leave a doubled
/// space behind ("a $x$ b" -> "a  b"), so runs of spaces are collapsed
/// before trimming.
pub fn to_plain_text(content: &str) -> String {
    let math = Regex::new(MATH_SPAN_PATTERN).expect("math span pattern");
    let stripped = math.replace_all(content, "");
    let spaces = Regex::new(r"[ \t]{2,}").expect("space run pattern");
    spaces.replace_all(&stripped, " ").trim().to_string()
}

/// Wrap each newline-delimited line in a paragraph tag. No escaping of
/// existing markup; this is a clipboard convenience, not a sanitizer.
pub fn to_html(content: &str) -> String {
    content
        .split('\n')
        .map(|line| format!("<p>{}</p>", line))
        .collect::<Vec<_>>()
        .join("")
}

/// Pipe text into the platform clipboard helper. Failure is reported to the
/// caller, which logs it; the UI simply skips the "copied" acknowledgment.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    for helper in [
        &["pbcopy"][..],
        &["wl-copy"][..],
        &["xclip", "-selection", "clipboard"][..],
    ] {
        let spawned = Command::new(helper[0])
            .args(&helper[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Ok(mut child) = spawned {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(text.as_bytes())?;
            }
            let status = child.wait()?;
            if status.success() {
                return Ok(());
            }
        }
    }
    Err(anyhow!("no working clipboard helper (pbcopy/wl-copy/xclip)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_strips_math_spans() {
        assert_eq!(to_plain_text("$$x^2$$ hello $y$ world"), "hello world");
    }

    #[test]
    fn plain_text_handles_block_math_spanning_newlines() {
        let content = "before $$\na = b\n$$ after";
        assert_eq!(to_plain_text(content), "before after");
    }

    #[test]
    fn plain_text_without_math_is_trimmed_only() {
        assert_eq!(to_plain_text("  plain words  "), "plain words");
    }

    #[test]
    fn markdown_format_is_identity() {
        let content = "# head\n$x$ body";
        assert_eq!(format_content(content, CopyFormat::Markdown), content);
    }

    #[test]
    fn html_wraps_each_line_in_paragraphs() {
        assert_eq!(to_html("a\nb"), "<p>a</p><p>b</p>");
        assert_eq!(to_html("only"), "<p>only</p>");
    }
}
