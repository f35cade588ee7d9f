//! Hand-written tokenizer for the policy language.
//!
//! Tokens: identifiers, `"quoted strings"`, the brackets `( ) [ ] { }`, the
//! punctuation `, ; . @`, and the operators `::`, `==`, `&&`. `//` comments
//! run to end of line.

use std::fmt;

/// A byte-offset span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Dot,
    At,
    PathSep,
    EqEq,
    AndAnd,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "'{s}'"),
            TokenKind::Str(s) => write!(f, "string \"{s}\""),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Semi => write!(f, "';'"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::At => write!(f, "'@'"),
            TokenKind::PathSep => write!(f, "'::'"),
            TokenKind::EqEq => write!(f, "'=='"),
            TokenKind::AndAnd => write!(f, "'&&'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// A syntax error at a byte offset. Converted to line/column by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
}

impl SyntaxError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Compute (line, col) from a byte offset. Both are 1-based; columns count
/// characters, not bytes.
pub fn line_col(input: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in input.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if ch.is_whitespace() {
            continue;
        }

        // Comments (`//` to end of line).
        if ch == '/' {
            if chars.next_if(|&(_, c)| c == '/').is_none() {
                return Err(SyntaxError::new(i, "unexpected character '/'"));
            }
            while chars.next_if(|&(_, c)| c != '\n').is_some() {}
            continue;
        }

        let single = match ch {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            ',' => Some(TokenKind::Comma),
            ';' => Some(TokenKind::Semi),
            '.' => Some(TokenKind::Dot),
            '@' => Some(TokenKind::At),
            _ => None,
        };
        if let Some(kind) = single {
            tokens.push(Token {
                kind,
                span: Span::new(i, i + 1),
            });
            continue;
        }

        let double = match ch {
            ':' => Some((':', TokenKind::PathSep)),
            '=' => Some(('=', TokenKind::EqEq)),
            '&' => Some(('&', TokenKind::AndAnd)),
            _ => None,
        };
        if let Some((second, kind)) = double {
            if chars.next_if(|&(_, c)| c == second).is_none() {
                return Err(SyntaxError::new(
                    i,
                    format!("unexpected character '{ch}', expected '{ch}{second}'"),
                ));
            }
            tokens.push(Token {
                kind,
                span: Span::new(i, i + 2),
            });
            continue;
        }

        if ch == '"' {
            let start = i;
            let mut value = String::new();
            let end = loop {
                let Some((j, c)) = chars.next() else {
                    return Err(SyntaxError::new(start, "unterminated string literal"));
                };
                match c {
                    '"' => break j + 1,
                    '\\' => match chars.next() {
                        Some((_, '"')) => value.push('"'),
                        Some((_, '\\')) => value.push('\\'),
                        Some((_, 'n')) => value.push('\n'),
                        Some((_, 't')) => value.push('\t'),
                        Some((_, '*')) => value.push_str("\\*"),
                        Some((j, other)) => {
                            return Err(SyntaxError::new(
                                j,
                                format!("invalid escape sequence '\\{other}'"),
                            ));
                        }
                        None => {
                            return Err(SyntaxError::new(start, "unterminated string literal"));
                        }
                    },
                    '\n' => {
                        return Err(SyntaxError::new(start, "unterminated string literal"));
                    }
                    _ => value.push(c),
                }
            };
            tokens.push(Token {
                kind: TokenKind::Str(value),
                span: Span::new(start, end),
            });
            continue;
        }

        if is_ident_start(ch) {
            let mut end = i + ch.len_utf8();
            while let Some((j, c)) = chars.next_if(|&(_, c)| is_ident_char(c)) {
                end = j + c.len_utf8();
            }
            tokens.push(Token {
                kind: TokenKind::Ident(input[i..end].to_string()),
                span: Span::new(i, end),
            });
            continue;
        }

        return Err(SyntaxError::new(i, format!("unexpected character '{ch}'")));
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenize_empty_and_comments() {
        assert!(kinds("").is_empty());
        assert!(kinds("  \n // only a comment\n").is_empty());
    }

    #[test]
    fn tokenize_entity_reference() {
        assert_eq!(
            kinds(r#"Net::DnsZone::"example.com""#),
            vec![
                TokenKind::Ident("Net".into()),
                TokenKind::PathSep,
                TokenKind::Ident("DnsZone".into()),
                TokenKind::PathSep,
                TokenKind::Str("example.com".into()),
            ]
        );
    }

    #[test]
    fn tokenize_operators_and_punctuation() {
        assert_eq!(
            kinds("action == x && context.y; @id"),
            vec![
                TokenKind::Ident("action".into()),
                TokenKind::EqEq,
                TokenKind::Ident("x".into()),
                TokenKind::AndAnd,
                TokenKind::Ident("context".into()),
                TokenKind::Dot,
                TokenKind::Ident("y".into()),
                TokenKind::Semi,
                TokenKind::At,
                TokenKind::Ident("id".into()),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\\c""#),
            vec![TokenKind::Str("a\"b\\c".into())]
        );
    }

    #[test]
    fn spans_are_byte_offsets() {
        let tokens = tokenize("permit (").unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 6));
        assert_eq!(tokens[1].span, Span::new(7, 8));
    }

    #[test]
    fn unterminated_string_points_at_open_quote() {
        let err = tokenize("x \"abc").unwrap_err();
        assert_eq!(err.offset, 2);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn lone_colon_is_an_error() {
        let err = tokenize("Host:\"x\"").unwrap_err();
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn line_col_counts_chars() {
        let src = "ab\ncdé f";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 3), (2, 1));
        // 'f' sits after a two-byte char.
        assert_eq!(line_col(src, src.find('f').unwrap()), (2, 5));
        assert_eq!(line_col(src, src.len()), (2, 6));
    }
}
