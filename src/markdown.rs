//! Message rendering: math/literal segmentation, line-oriented Markdown
//! styling, and a small TeX-to-terminal typesetter.
//!
//! Rendering is a pure function of the input string: the same content always
//! produces the same segment sequence and the same styled text.

use ratatui::layout::Alignment;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use regex::Regex;

use crate::theme::Theme;

/// Alternating matches of block math (`$$...$$`, non-greedy, may span
/// newlines) and inline math (`$...$`, no embedded newline). Everything
/// between matches is literal text.
pub const MATH_SPAN_PATTERN: &str = r"\$\$[\s\S]+?\$\$|\$[^\n$]+?\$";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    InlineMath(String),
    BlockMath(String),
}

impl Segment {
    /// The raw slice of the original message, delimiters included.
    pub fn raw(&self) -> &str {
        match self {
            Segment::Text(s) | Segment::InlineMath(s) | Segment::BlockMath(s) => s,
        }
    }
}

/// Split a message into literal and math segments. No characters are lost:
/// concatenating the raw segments reproduces the input.
pub fn split_segments(content: &str) -> Vec<Segment> {
    let math = Regex::new(MATH_SPAN_PATTERN).expect("math span pattern");
    let mut segments = Vec::new();
    let mut cursor = 0;

    for m in math.find_iter(content) {
        if m.start() > cursor {
            segments.push(Segment::Text(content[cursor..m.start()].to_string()));
        }
        let raw = m.as_str().to_string();
        if raw.starts_with("$$") {
            segments.push(Segment::BlockMath(raw));
        } else {
            segments.push(Segment::InlineMath(raw));
        }
        cursor = m.end();
    }
    if cursor < content.len() {
        segments.push(Segment::Text(content[cursor..].to_string()));
    }
    segments
}

/// A fenced code block extracted from a message, for the copy-code action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

/// Collect the fenced code blocks of a message in order. An unclosed fence
/// yields a block running to the end of the message.
pub fn code_blocks(content: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<CodeBlock> = None;

    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            match current.take() {
                Some(mut block) => {
                    // closing fence; drop the trailing newline
                    if block.code.ends_with('\n') {
                        block.code.pop();
                    }
                    blocks.push(block);
                }
                None => {
                    current = Some(CodeBlock {
                        language: trimmed.trim_start_matches("```").trim().to_string(),
                        code: String::new(),
                    });
                }
            }
            continue;
        }
        if let Some(block) = current.as_mut() {
            block.code.push_str(line);
            block.code.push('\n');
        }
    }

    if let Some(mut block) = current {
        if block.code.ends_with('\n') {
            block.code.pop();
        }
        blocks.push(block);
    }
    blocks
}

/// Render a full message to styled terminal text. Math segments that fail
/// to typeset render an inline error placeholder; they never take the rest
/// of the message down with them.
pub fn render_message(content: &str, theme: &Theme) -> Text<'static> {
    let mut text = Text::default();
    // Inline math has to flow inside the surrounding literal line, so the
    // segment walk keeps one open line of spans at a time.
    let mut open_line: Vec<Span<'static>> = Vec::new();

    for segment in split_segments(content) {
        match segment {
            Segment::Text(literal) => {
                render_literal(&literal, theme, &mut text, &mut open_line);
            }
            Segment::InlineMath(raw) => {
                let formula = raw.trim_matches('$');
                match typeset(formula) {
                    Ok(s) => open_line.push(Span::styled(
                        s,
                        Style::default().fg(theme.math).add_modifier(Modifier::ITALIC),
                    )),
                    Err(_) => open_line.push(math_error_span(&raw, theme)),
                }
            }
            Segment::BlockMath(raw) => {
                flush_line(&mut text, &mut open_line);
                let formula = raw.trim_start_matches('$').trim_end_matches('$').trim();
                match typeset(formula) {
                    Ok(s) => {
                        for formula_line in s.lines() {
                            text.push_line(
                                Line::styled(
                                    formula_line.to_string(),
                                    Style::default()
                                        .fg(theme.math)
                                        .add_modifier(Modifier::BOLD),
                                )
                                .alignment(Alignment::Center),
                            );
                        }
                    }
                    Err(_) => text.push_line(Line::from(math_error_span(&raw, theme))),
                }
            }
        }
    }
    flush_line(&mut text, &mut open_line);
    text
}

fn math_error_span(raw: &str, theme: &Theme) -> Span<'static> {
    Span::styled(
        format!("[math error: {}]", raw),
        Style::default().fg(theme.error),
    )
}

fn flush_line(text: &mut Text<'static>, open_line: &mut Vec<Span<'static>>) {
    if !open_line.is_empty() {
        text.push_line(Line::from(std::mem::take(open_line)));
    }
}

/// Line-oriented Markdown styling for one literal segment. The first line
/// continues the currently open line (inline math may sit mid-sentence);
/// subsequent lines are pushed whole.
fn render_literal(
    literal: &str,
    theme: &Theme,
    text: &mut Text<'static>,
    open_line: &mut Vec<Span<'static>>,
) {
    let mut in_code_block = false;
    let mut first = true;

    for raw_line in literal.split('\n') {
        if !first {
            flush_line(text, open_line);
        }
        first = false;

        let trimmed = raw_line.trim_start();

        if trimmed.starts_with("```") {
            in_code_block = !in_code_block;
            let label = trimmed.trim_start_matches("```").trim();
            let header = if in_code_block && !label.is_empty() {
                format!("┌─ {} ", label)
            } else if in_code_block {
                "┌─".to_string()
            } else {
                "└─".to_string()
            };
            open_line.push(Span::styled(header, Style::default().fg(theme.dim)));
            continue;
        }

        if in_code_block {
            open_line.push(Span::styled("│ ", Style::default().fg(theme.dim)));
            open_line.push(Span::styled(
                raw_line.to_string(),
                Style::default().fg(theme.code_block),
            ));
            continue;
        }

        // Horizontal rule
        if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-') {
            open_line.push(Span::styled(
                "─".repeat(40),
                Style::default().fg(theme.dim),
            ));
            continue;
        }

        // Headings
        let hashes = trimmed.chars().take_while(|&c| c == '#').count();
        if hashes > 0 && trimmed.chars().nth(hashes) == Some(' ') {
            open_line.push(Span::styled(
                trimmed[hashes + 1..].to_string(),
                Style::default().fg(theme.heading).add_modifier(Modifier::BOLD),
            ));
            continue;
        }

        // Blockquote
        if let Some(inner) = trimmed.strip_prefix("> ") {
            open_line.push(Span::styled("▏ ", Style::default().fg(theme.blockquote)));
            open_line.extend(stylize_inline(inner, theme));
            continue;
        }

        // Bullet list
        if let Some(inner) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            open_line.push(Span::styled("• ", Style::default().fg(theme.list_bullet)));
            open_line.extend(stylize_inline(inner, theme));
            continue;
        }

        // Ordered list
        if let Some(pos) = trimmed.find(". ") {
            if pos > 0 && trimmed[..pos].chars().all(|c| c.is_ascii_digit()) {
                open_line.push(Span::styled(
                    format!("{} ", &trimmed[..pos + 1]),
                    Style::default().fg(theme.list_bullet),
                ));
                open_line.extend(stylize_inline(&trimmed[pos + 2..], theme));
                continue;
            }
        }

        open_line.extend(stylize_inline(raw_line, theme));
    }
}

#[derive(Clone, Copy, Default)]
struct InlineState {
    bold: bool,
    italic: bool,
    code: bool,
}

fn inline_style(state: InlineState, theme: &Theme) -> Style {
    let mut style = Style::default().fg(theme.text);
    if state.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if state.italic {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if state.code {
        style = Style::default().fg(theme.inline_code);
    }
    style
}

/// `**bold**`, `*italic*` and `` `code` `` within one line.
fn stylize_inline(input: &str, theme: &Theme) -> Vec<Span<'static>> {
    let chars: Vec<char> = input.chars().collect();
    let mut spans = Vec::new();
    let mut buf = String::new();
    let mut state = InlineState::default();
    let mut i = 0;

    let flush = |spans: &mut Vec<Span<'static>>, buf: &mut String, state: InlineState, theme: &Theme| {
        if !buf.is_empty() {
            spans.push(Span::styled(std::mem::take(buf), inline_style(state, theme)));
        }
    };

    while i < chars.len() {
        if chars[i] == '`' {
            flush(&mut spans, &mut buf, state, theme);
            state.code = !state.code;
            i += 1;
            continue;
        }
        if !state.code {
            if i + 1 < chars.len() && chars[i] == '*' && chars[i + 1] == '*' {
                flush(&mut spans, &mut buf, state, theme);
                state.bold = !state.bold;
                i += 2;
                continue;
            }
            if chars[i] == '*' {
                flush(&mut spans, &mut buf, state, theme);
                state.italic = !state.italic;
                i += 1;
                continue;
            }
        }
        buf.push(chars[i]);
        i += 1;
    }
    flush(&mut spans, &mut buf, state, theme);
    spans
}

/// Best-effort TeX-to-Unicode typesetting for terminal display. Unknown
/// commands pass through literally; structural breakage (unbalanced braces,
/// empty formula) is an error so the caller can show a placeholder.
pub fn typeset(formula: &str) -> Result<String, String> {
    let formula = formula.trim();
    if formula.is_empty() {
        return Err("empty formula".to_string());
    }

    let mut depth: i32 = 0;
    for c in formula.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err("unbalanced braces".to_string());
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unbalanced braces".to_string());
    }

    let mut out = String::with_capacity(formula.len());
    let chars: Vec<char> = formula.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_alphabetic() {
                    end += 1;
                }
                let command: String = chars[start..end].iter().collect();
                match command_symbol(&command) {
                    Some(symbol) => out.push_str(symbol),
                    // keep unknown commands readable rather than erroring
                    None => {
                        out.push('\\');
                        out.push_str(&command);
                    }
                }
                i = end;
            }
            '^' | '_' => {
                let script = chars[i];
                let (arg, next) = script_argument(&chars, i + 1);
                for c in arg.chars() {
                    out.push(script_char(c, script == '^').unwrap_or(c));
                }
                i = next;
            }
            '{' | '}' => i += 1,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// The argument of `^`/`_`: either one character or a `{...}` group.
fn script_argument(chars: &[char], start: usize) -> (String, usize) {
    if start >= chars.len() {
        return (String::new(), start);
    }
    if chars[start] == '{' {
        let mut end = start + 1;
        let mut arg = String::new();
        while end < chars.len() && chars[end] != '}' {
            arg.push(chars[end]);
            end += 1;
        }
        (arg, (end + 1).min(chars.len()))
    } else {
        (chars[start].to_string(), start + 1)
    }
}

fn script_char(c: char, superscript: bool) -> Option<char> {
    let table: &[(char, char, char)] = &[
        ('0', '⁰', '₀'),
        ('1', '¹', '₁'),
        ('2', '²', '₂'),
        ('3', '³', '₃'),
        ('4', '⁴', '₄'),
        ('5', '⁵', '₅'),
        ('6', '⁶', '₆'),
        ('7', '⁷', '₇'),
        ('8', '⁸', '₈'),
        ('9', '⁹', '₉'),
        ('+', '⁺', '₊'),
        ('-', '⁻', '₋'),
        ('n', 'ⁿ', 'ₙ'),
        ('i', 'ⁱ', 'ᵢ'),
    ];
    table
        .iter()
        .find(|(plain, _, _)| *plain == c)
        .map(|(_, sup, sub)| if superscript { *sup } else { *sub })
}

fn command_symbol(command: &str) -> Option<&'static str> {
    let symbol = match command {
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "epsilon" => "ε",
        "theta" => "θ",
        "lambda" => "λ",
        "mu" => "μ",
        "pi" => "π",
        "sigma" => "σ",
        "phi" => "φ",
        "omega" => "ω",
        "Delta" => "Δ",
        "Sigma" => "Σ",
        "Omega" => "Ω",
        "times" => "×",
        "cdot" => "·",
        "pm" => "±",
        "div" => "÷",
        "le" | "leq" => "≤",
        "ge" | "geq" => "≥",
        "ne" | "neq" => "≠",
        "approx" => "≈",
        "infty" => "∞",
        "sum" => "Σ",
        "prod" => "Π",
        "int" => "∫",
        "sqrt" => "√",
        "partial" => "∂",
        "nabla" => "∇",
        "in" => "∈",
        "subset" => "⊂",
        "cup" => "∪",
        "cap" => "∩",
        "to" | "rightarrow" => "→",
        "leftarrow" => "←",
        "Rightarrow" => "⇒",
        "forall" => "∀",
        "exists" => "∃",
        "left" | "right" => "",
        _ => return None,
    };
    Some(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::{Theme, ThemeName};

    fn theme() -> Theme {
        Theme::for_name(ThemeName::Dark)
    }

    #[test]
    fn splits_alternating_math_and_text() {
        let segments = split_segments("a $b$ c $$d$$ e");
        let raw: Vec<&str> = segments.iter().map(|s| s.raw()).collect();
        assert_eq!(raw, vec!["a ", "$b$", " c ", "$$d$$", " e"]);
        assert!(matches!(segments[1], Segment::InlineMath(_)));
        assert!(matches!(segments[3], Segment::BlockMath(_)));
    }

    #[test]
    fn segmentation_loses_no_characters() {
        let content = "x $$a\nb$$ y $c$ z$d$";
        let rejoined: String = split_segments(content).iter().map(|s| s.raw()).collect();
        assert_eq!(rejoined, content);
    }

    #[test]
    fn inline_math_does_not_span_newlines() {
        let segments = split_segments("a $b\nc$ d");
        assert!(segments.iter().all(|s| matches!(s, Segment::Text(_))));
    }

    #[test]
    fn plain_text_is_one_segment() {
        let segments = split_segments("no math here");
        assert_eq!(segments, vec![Segment::Text("no math here".to_string())]);
    }

    #[test]
    fn typeset_maps_known_commands_and_scripts() {
        assert_eq!(typeset("x^2 + \\alpha").unwrap(), "x² + α");
        assert_eq!(typeset("a_{12}").unwrap(), "a₁₂");
        assert_eq!(typeset("\\pi \\ne 3").unwrap(), "π ≠ 3");
    }

    #[test]
    fn typeset_keeps_unknown_commands_literal() {
        assert_eq!(typeset("\\frobnicate x").unwrap(), "\\frobnicate x");
    }

    #[test]
    fn typeset_rejects_unbalanced_braces() {
        assert!(typeset("{x^2").is_err());
        assert!(typeset("x}").is_err());
        assert!(typeset("   ").is_err());
    }

    #[test]
    fn malformed_formula_renders_placeholder_not_panic() {
        let text = render_message("ok $ {broken $ ok2", &theme());
        let flat: String = text
            .lines
            .iter()
            .flat_map(|l| l.spans.iter())
            .map(|s| s.content.clone())
            .collect();
        assert!(flat.contains("[math error:"));
        assert!(flat.contains("ok"));
        assert!(flat.contains("ok2"));
    }

    #[test]
    fn code_blocks_are_extracted_in_order() {
        let content = "intro\n```rust\nfn main() {}\n```\ntext\n```\nplain\n```";
        let blocks = code_blocks(content);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language, "rust");
        assert_eq!(blocks[0].code, "fn main() {}");
        assert_eq!(blocks[1].language, "");
        assert_eq!(blocks[1].code, "plain");
    }

    #[test]
    fn unclosed_fence_runs_to_end() {
        let blocks = code_blocks("```py\nprint(1)");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].code, "print(1)");
    }

    #[test]
    fn rendering_is_deterministic() {
        let content = "# h\n- item with $x^2$\n> quote";
        let a = render_message(content, &theme());
        let b = render_message(content, &theme());
        assert_eq!(a, b);
    }
}
