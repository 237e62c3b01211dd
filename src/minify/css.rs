use super::{Minify, MinifyError};

// No whitespace is needed after these characters...
const TIGHT_AFTER: &[char] = &['{', '}', ';', ',', '>', '~', ':', '('];
// ...or before these.
const TIGHT_BEFORE: &[char] = &['{', '}', ';', ',', '>', '~', '!', ')'];

/// Strips comments, collapses whitespace and drops the last semicolon of
/// each block. Strings are copied verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssMinifier;

impl Minify for CssMinifier {
    fn minify(&self, input: &str) -> Result<String, MinifyError> {
        let chars: Vec<(usize, char)> = input.char_indices().collect();
        let mut out = String::with_capacity(input.len());
        let mut pending_space = false;
        let mut depth = 0_usize;
        let mut i = 0;

        while i < chars.len() {
            let (offset, c) = chars[i];
            let next = chars.get(i + 1).map(|&(_, ch)| ch);

            if c == '/' && next == Some('*') {
                i = skip_comment(&chars, i + 2).ok_or(MinifyError::UnterminatedComment(offset))?;
                pending_space = true;
                continue;
            }

            if c.is_whitespace() {
                pending_space = true;
                i += 1;
                continue;
            }

            if pending_space {
                if let Some(prev) = out.chars().last() {
                    let declaration_colon =
                        c == ':' && depth > 0 && colon_opens_value(&chars, i + 1);
                    if !declaration_colon
                        && !TIGHT_AFTER.contains(&prev)
                        && !TIGHT_BEFORE.contains(&c)
                    {
                        out.push(' ');
                    }
                }
                pending_space = false;
            }

            if c == '"' || c == '\'' {
                let end = string_end(&chars, i + 1, c)
                    .ok_or(MinifyError::UnterminatedString(offset))?;
                out.extend(chars[i..=end].iter().map(|&(_, ch)| ch));
                i = end + 1;
                continue;
            }

            match c {
                '{' => depth += 1,
                '}' => {
                    depth = depth.saturating_sub(1);
                    if out.ends_with(';') {
                        out.pop();
                    }
                }
                _ => {}
            }

            out.push(c);
            i += 1;
        }

        Ok(out)
    }
}

/// Index just past the closing `*/`, scanning from `from`.
fn skip_comment(chars: &[(usize, char)], from: usize) -> Option<usize> {
    let mut j = from;
    while j + 1 < chars.len() {
        if chars[j].1 == '*' && chars[j + 1].1 == '/' {
            return Some(j + 2);
        }
        j += 1;
    }
    None
}

/// Index of the quote closing a string opened just before `from`.
fn string_end(chars: &[(usize, char)], from: usize, quote: char) -> Option<usize> {
    let mut j = from;
    while let Some(&(_, ch)) = chars.get(j) {
        match ch {
            '\\' => j += 2,
            '\n' | '\r' => return None,
            _ if ch == quote => return Some(j),
            _ => j += 1,
        }
    }
    None
}

/// A colon inside a block separates property and value unless a `{` follows
/// before the statement ends, in which case it belongs to a nested selector.
fn colon_opens_value(chars: &[(usize, char)], from: usize) -> bool {
    for &(_, ch) in &chars[from.min(chars.len())..] {
        match ch {
            '{' => return false,
            ';' | '}' => return true,
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min(input: &str) -> String {
        CssMinifier.minify(input).unwrap()
    }

    #[test]
    fn collapses_rules() {
        let input = "/* header */\nbody {\n  margin : 0 ;\n  color: #333;\n}\n\na, b > c {\n  padding: 1px 2px;\n}\n";
        assert_eq!(min(input), "body{margin:0;color:#333}a,b>c{padding:1px 2px}");
    }

    #[test]
    fn keeps_descendant_and_pseudo_selector_spacing() {
        assert_eq!(min("ul  li :hover { x: y }"), "ul li :hover{x:y}");
        assert_eq!(min("a:hover{x:y}"), "a:hover{x:y}");
    }

    #[test]
    fn nested_selectors_inside_media_keep_their_spaces() {
        let input = "@media screen and (max-width: 600px) {\n  nav :focus { outline : none; }\n}";
        assert_eq!(
            min(input),
            "@media screen and (max-width:600px){nav :focus{outline:none}}"
        );
    }

    #[test]
    fn strings_are_verbatim() {
        let input = "a::after { content: \"  /* not a comment */  \"; }";
        assert_eq!(min(input), "a::after{content:\"  /* not a comment */  \"}");
    }

    #[test]
    fn calc_keeps_operator_spacing() {
        assert_eq!(min("a { width: calc(100% - 2px); }"), "a{width:calc(100% - 2px)}");
    }

    #[test]
    fn important_is_tightened() {
        assert_eq!(min("a { color: red !important; }"), "a{color:red!important}");
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        assert_eq!(
            CssMinifier.minify("a{} /* open"),
            Err(MinifyError::UnterminatedComment(4))
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(matches!(
            CssMinifier.minify("a { content: 'open }"),
            Err(MinifyError::UnterminatedString(_))
        ));
    }
}
