// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use crate::{ExpressionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character of the token.
    pub offset: usize,
}

// Longest first, so that `**` wins over `*`.
const OPERATORS: [&str; 21] = [
    "**", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "^", "<", ">", "(", ")", "[", "]",
    "{", "}", ",", ":",
];

pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        let kind = if c.is_ascii_digit() || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            let (kind, end) = number(text, pos)?;
            pos = end;
            kind
        } else if c.is_ascii_alphabetic() || c == b'_' || !c.is_ascii() {
            let end = text[pos..]
                .char_indices()
                .find(|(_, ch)| !(ch.is_alphanumeric() || *ch == '_' || *ch == 'µ'))
                .map_or(text.len(), |(i, _)| pos + i);
            if end == start {
                return Err(ExpressionError::Syntax {
                    offset: start,
                    message: "unexpected character".to_string(),
                });
            }
            pos = end;
            TokenKind::Ident(text[start..end].to_string())
        } else if c == b'"' || c == b'\'' {
            let close = text[pos + 1..]
                .find(c as char)
                .ok_or_else(|| ExpressionError::Syntax {
                    offset: start,
                    message: "unterminated string literal".to_string(),
                })?;
            pos = pos + 1 + close + 1;
            TokenKind::Str(text[start + 1..pos - 1].to_string())
        } else if let Some(op) = OPERATORS.iter().find(|op| text[pos..].starts_with(**op)) {
            pos += op.len();
            TokenKind::Op(op)
        } else {
            return Err(ExpressionError::Syntax {
                offset: start,
                message: format!("unexpected character '{}'", c as char),
            });
        };
        tokens.push(Token {
            kind,
            offset: start,
        });
    }
    tokens.push(Token {
        kind: TokenKind::End,
        offset: text.len(),
    });
    Ok(tokens)
}

fn number(text: &str, start: usize) -> Result<(TokenKind, usize)> {
    let bytes = text.as_bytes();
    let syntax = |message: &str| ExpressionError::Syntax {
        offset: start,
        message: message.to_string(),
    };
    if bytes[start] == b'0' && matches!(bytes.get(start + 1), Some(b'x' | b'X')) {
        let end = (start + 2..bytes.len())
            .find(|&i| !(bytes[i].is_ascii_hexdigit() || bytes[i] == b'_'))
            .unwrap_or(bytes.len());
        let digits = text[start + 2..end].replace('_', "");
        // Hex literals are bit patterns: values above i64::MAX keep their bits.
        let value = u64::from_str_radix(&digits, 16).map_err(|_| syntax("invalid hex literal"))?;
        return Ok((TokenKind::Int(value as i64), end));
    }
    let mut end = start;
    let mut is_float = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' | b'_' => {}
            b'.' if !is_float => is_float = true,
            b'e' | b'E' => {
                let mut exp = end + 1;
                if matches!(bytes.get(exp), Some(b'+' | b'-')) {
                    exp += 1;
                }
                if !bytes.get(exp).is_some_and(u8::is_ascii_digit) {
                    break;
                }
                is_float = true;
                end = exp;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                break;
            }
            _ => break,
        }
        end += 1;
    }
    let digits = text[start..end].replace('_', "");
    let kind = if is_float {
        TokenKind::Float(digits.parse().map_err(|_| syntax("invalid number"))?)
    } else {
        match digits.parse::<i64>() {
            Ok(value) => TokenKind::Int(value),
            Err(_) => TokenKind::Float(digits.parse().map_err(|_| syntax("invalid number"))?),
        }
    };
    Ok((kind, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("12 0x1F 1.5 2e3 .5"),
            vec![
                TokenKind::Int(12),
                TokenKind::Int(31),
                TokenKind::Float(1.5),
                TokenKind::Float(2000.0),
                TokenKind::Float(0.5),
                TokenKind::End
            ]
        );
    }

    #[test]
    fn test_large_hex_keeps_bits() {
        assert_eq!(
            kinds("0xfffe100000000000")[0],
            TokenKind::Int(0xfffe_1000_0000_0000_u64 as i64)
        );
    }

    #[test]
    fn test_unit_suffix_and_operators() {
        assert_eq!(
            kinds("10MHz**2 <= x"),
            vec![
                TokenKind::Int(10),
                TokenKind::Ident("MHz".to_string()),
                TokenKind::Op("**"),
                TokenKind::Int(2),
                TokenKind::Op("<="),
                TokenKind::Ident("x".to_string()),
                TokenKind::End
            ]
        );
    }

    #[test]
    fn test_strings_either_quote() {
        assert_eq!(kinds("'a' \"b\"")[..2], [TokenKind::Str("a".into()), TokenKind::Str("b".into())]);
    }

    #[test]
    fn test_offsets() {
        let err = tokenize("1 + $").unwrap_err();
        assert_eq!(
            err,
            ExpressionError::Syntax {
                offset: 4,
                message: "unexpected character '$'".to_string()
            }
        );
    }
}
