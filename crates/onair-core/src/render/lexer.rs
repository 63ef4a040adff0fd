use crate::error::RenderError;

/// A literal run or an embedded expression inside an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    /// Source of a `{...}` replacement field, with its offset in the whole expression.
    Code { source: String, offset: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Str(String),
    FString(Vec<FStringPart>),
    Int(i64),
    Float(f64),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Plus,
    EqEq,
    NotEq,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Char offset into the expression source.
    pub offset: usize,
}

fn syntax(offset: usize, message: impl Into<String>) -> RenderError {
    RenderError::Syntax {
        offset,
        message: message.into(),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Tokenize `source`. `base` is added to every offset, for f-string fields.
pub fn tokenize(source: &str, base: usize) -> Result<Vec<Token>, RenderError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let offset = base + i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // f'...' / f"..."
        if matches!(c, 'f' | 'F') && matches!(chars.get(i + 1), Some('\'' | '"')) {
            let (parts, next) = lex_fstring(&chars, i + 1, base)?;
            tokens.push(Token {
                kind: TokenKind::FString(parts),
                offset,
            });
            i = next;
            continue;
        }

        if c == '\'' || c == '"' {
            let (text, next) = lex_string(&chars, i, base)?;
            tokens.push(Token {
                kind: TokenKind::Str(text),
                offset,
            });
            i = next;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let is_float = chars.get(i) == Some(&'.')
                && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let kind = if is_float {
                text.parse()
                    .map(TokenKind::Float)
                    .map_err(|_| syntax(offset, "invalid number"))?
            } else {
                text.parse()
                    .map(TokenKind::Int)
                    .map_err(|_| syntax(offset, "integer literal too large"))?
            };
            tokens.push(Token { kind, offset });
            continue;
        }

        if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_continue(chars[i]) {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(chars[start..i].iter().collect()),
                offset,
            });
            continue;
        }

        let (kind, width) = match (c, chars.get(i + 1)) {
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('+', _) => (TokenKind::Plus, 1),
            _ => return Err(syntax(offset, format!("unexpected character {c:?}"))),
        };
        tokens.push(Token { kind, offset });
        i += width;
    }

    tokens.push(Token {
        kind: TokenKind::End,
        offset: base + chars.len(),
    });
    Ok(tokens)
}

fn escape(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        '\\' => Some('\\'),
        '\'' => Some('\''),
        '"' => Some('"'),
        _ => None,
    }
}

/// Lex a quoted string starting at the opening quote.
///
/// Returns the text and the index after the closing quote.
fn lex_string(chars: &[char], start: usize, base: usize) -> Result<(String, usize), RenderError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((text, i + 1)),
            '\\' => {
                let next = chars
                    .get(i + 1)
                    .ok_or_else(|| syntax(base + i, "unterminated string"))?;
                // Unknown escapes are kept verbatim.
                match escape(*next) {
                    Some(c) => text.push(c),
                    None => {
                        text.push('\\');
                        text.push(*next);
                    }
                }
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(syntax(base + start, "unterminated string"))
}

fn lex_fstring(
    chars: &[char],
    start: usize,
    base: usize,
) -> Result<(Vec<FStringPart>, usize), RenderError> {
    let quote = chars[start];
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => {
                if !text.is_empty() {
                    parts.push(FStringPart::Text(text));
                }
                return Ok((parts, i + 1));
            }
            '{' if chars.get(i + 1) == Some(&'{') => {
                text.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                text.push('}');
                i += 2;
            }
            '}' => return Err(syntax(base + i, "single '}' in f-string")),
            '{' => {
                if !text.is_empty() {
                    parts.push(FStringPart::Text(std::mem::take(&mut text)));
                }
                let field_start = i + 1;
                let field_end = find_field_end(chars, field_start, quote, base)?;
                let source: String = chars[field_start..field_end].iter().collect();
                if source.trim().is_empty() {
                    return Err(syntax(base + i, "empty expression in f-string"));
                }
                parts.push(FStringPart::Code {
                    source,
                    offset: base + field_start,
                });
                i = field_end + 1;
            }
            '\\' => {
                let next = chars
                    .get(i + 1)
                    .ok_or_else(|| syntax(base + i, "unterminated f-string"))?;
                match escape(*next) {
                    Some(c) => text.push(c),
                    None => {
                        text.push('\\');
                        text.push(*next);
                    }
                }
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(syntax(base + start, "unterminated f-string"))
}

/// Index of the `}` closing a replacement field. Nested strings must use the other quote.
fn find_field_end(
    chars: &[char],
    start: usize,
    quote: char,
    base: usize,
) -> Result<usize, RenderError> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            c if c == quote => break,
            c @ ('\'' | '"') => {
                i += 1;
                while i < chars.len() && chars[i] != c {
                    i += 1;
                }
                if i == chars.len() {
                    break;
                }
            }
            '(' | '{' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '}' if depth == 0 => return Ok(i),
            '}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    Err(syntax(base + start, "unterminated f-string field"))
}
