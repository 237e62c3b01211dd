use std::mem;

use super::{Minify, MinifyError};

/// Words after which a `/` starts a regular expression rather than a division.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

/// Removes comments and redundant whitespace from JavaScript.
///
/// Line breaks are kept wherever dropping them could change automatic
/// semicolon insertion. String, template and regular expression literals are
/// copied verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsMinifier;

impl Minify for JsMinifier {
    fn minify(&self, input: &str) -> Result<String, MinifyError> {
        let chars: Vec<(usize, char)> = input.char_indices().collect();
        let mut out = Output::with_capacity(input.len());
        let mut i = 0;

        while i < chars.len() {
            let (offset, c) = chars[i];
            let next = chars.get(i + 1).map(|&(_, ch)| ch);

            match c {
                '/' if next == Some('/') => {
                    i += 2;
                    while i < chars.len() && !is_line_break(chars[i].1) {
                        i += 1;
                    }
                }
                '/' if next == Some('*') => {
                    let (end, spans_lines) = block_comment_end(&chars, i + 2)
                        .ok_or(MinifyError::UnterminatedComment(offset))?;
                    out.gap(if spans_lines { Gap::Newline } else { Gap::Space });
                    i = end;
                }
                '/' if out.regex_allowed() => {
                    let end = regex_end(&chars, i + 1)
                        .ok_or(MinifyError::UnterminatedRegex(offset))?;
                    out.literal(&chars[i..=end]);
                    i = end + 1;
                }
                '\'' | '"' | '`' => {
                    let end = quote_end(&chars, i + 1, c)
                        .ok_or(MinifyError::UnterminatedString(offset))?;
                    out.literal(&chars[i..=end]);
                    i = end + 1;
                }
                _ if c.is_whitespace() => {
                    out.gap(if is_line_break(c) { Gap::Newline } else { Gap::Space });
                    i += 1;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        }

        Ok(out.finish())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Gap {
    None,
    Space,
    Newline,
}

struct Output {
    text: String,
    gap: Gap,
    last: Option<char>,
    word: String,
}

impl Output {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
            gap: Gap::None,
            last: None,
            word: String::new(),
        }
    }

    fn gap(&mut self, gap: Gap) {
        self.gap = self.gap.max(gap);
    }

    fn push(&mut self, c: char) {
        self.separate(c);
        self.text.push(c);
        self.last = Some(c);
        if is_word(c) {
            self.word.push(c);
        } else {
            self.word.clear();
        }
    }

    fn literal(&mut self, chars: &[(usize, char)]) {
        let Some(&(_, first)) = chars.first() else {
            return;
        };
        self.separate(first);
        self.text.extend(chars.iter().map(|&(_, ch)| ch));
        self.last = chars.last().map(|&(_, ch)| ch);
        self.word.clear();
    }

    /// Emit whatever separator the pending gap requires before `next`.
    fn separate(&mut self, next: char) {
        let gap = mem::replace(&mut self.gap, Gap::None);
        let Some(prev) = self.last else {
            return;
        };

        let separator = match gap {
            Gap::None => None,
            Gap::Newline if ends_statement(prev) && starts_statement(next) => Some('\n'),
            Gap::Space | Gap::Newline => needs_space(prev, next, &self.word).then_some(' '),
        };

        if let Some(separator) = separator {
            self.text.push(separator);
            self.word.clear();
        }
    }

    fn regex_allowed(&self) -> bool {
        match self.last {
            None => true,
            Some(c) if is_word(c) => REGEX_PREFIX_KEYWORDS.contains(&self.word.as_str()),
            Some(')' | ']' | '"' | '\'' | '`') => false,
            Some(_) => true,
        }
    }

    fn finish(self) -> String {
        self.text
    }
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '\\' || !c.is_ascii()
}

fn is_line_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn ends_statement(c: char) -> bool {
    is_word(c) || matches!(c, ')' | ']' | '}' | '+' | '-' | '"' | '\'' | '`')
}

fn starts_statement(c: char) -> bool {
    is_word(c) || matches!(c, '(' | '[' | '{' | '+' | '-' | '!' | '~' | '"' | '\'' | '`')
}

fn needs_space(prev: char, next: char, word: &str) -> bool {
    if is_word(prev) && is_word(next) {
        return true;
    }
    // `1 .toString()` must not become `1.toString()`.
    if next == '.' && !word.is_empty() && word.chars().all(|ch| ch.is_ascii_digit()) {
        return true;
    }
    matches!((prev, next), ('+', '+') | ('-', '-') | ('/', '/') | ('/', '*'))
}

/// Index just past `*/` and whether the comment contained a line break.
fn block_comment_end(chars: &[(usize, char)], from: usize) -> Option<(usize, bool)> {
    let mut spans_lines = false;
    let mut j = from;
    while j + 1 < chars.len() {
        let ch = chars[j].1;
        if ch == '*' && chars[j + 1].1 == '/' {
            return Some((j + 2, spans_lines));
        }
        spans_lines |= is_line_break(ch);
        j += 1;
    }
    None
}

/// Index of the quote closing a literal opened just before `from`. Only
/// template literals may span lines.
fn quote_end(chars: &[(usize, char)], from: usize, quote: char) -> Option<usize> {
    let mut j = from;
    while let Some(&(_, ch)) = chars.get(j) {
        match ch {
            '\\' => j += 2,
            _ if ch == quote => return Some(j),
            _ if quote != '`' && is_line_break(ch) => return None,
            _ => j += 1,
        }
    }
    None
}

/// Index of the `/` closing a regular expression body that starts at `from`.
fn regex_end(chars: &[(usize, char)], from: usize) -> Option<usize> {
    let mut in_class = false;
    let mut j = from;
    while let Some(&(_, ch)) = chars.get(j) {
        match ch {
            '\\' => {
                j += 2;
                continue;
            }
            _ if is_line_break(ch) => return None,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => return Some(j),
            _ => {}
        }
        j += 1;
    }
    None
}
