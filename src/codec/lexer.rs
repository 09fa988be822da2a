//! JSON tokenizer with line/column tracking

use super::errors::{CodecError, CodecResult};
use super::json_value::JsonLiteral;
use super::location::{JsonLocation, JsonSpan};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    BeginObject,
    EndObject,
    BeginArray,
    EndArray,
    Colon,
    Comma,
    Literal(JsonLiteral),
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    location: JsonLocation,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            location: JsonLocation::default(),
        }
    }

    pub(crate) fn location(&self) -> JsonLocation {
        self.location
    }

    fn peek(&self) -> Option<char> {
        self.input[self.location.offset..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.location.offset += c.len_utf8();
        if c == '\n' {
            self.location.line += 1;
            self.location.column = 1;
        } else {
            self.location.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if matches!(c, ' ' | '\t' | '\n' | '\r') {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> CodecResult<T> {
        Err(CodecError::structural(message, self.location))
    }

    /// Next token with its span, `None` at end of input.
    pub(crate) fn next_token(&mut self) -> CodecResult<Option<(Token, JsonSpan)>> {
        self.skip_whitespace();
        let start = self.location;
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(None),
        };

        let token = match c {
            '{' => {
                self.bump();
                Token::BeginObject
            }
            '}' => {
                self.bump();
                Token::EndObject
            }
            '[' => {
                self.bump();
                Token::BeginArray
            }
            ']' => {
                self.bump();
                Token::EndArray
            }
            ':' => {
                self.bump();
                Token::Colon
            }
            ',' => {
                self.bump();
                Token::Comma
            }
            '"' => Token::Literal(JsonLiteral::String(self.read_string()?)),
            't' => {
                self.expect_word("true")?;
                Token::Literal(JsonLiteral::Boolean(true))
            }
            'f' => {
                self.expect_word("false")?;
                Token::Literal(JsonLiteral::Boolean(false))
            }
            'n' => {
                self.expect_word("null")?;
                Token::Literal(JsonLiteral::Null)
            }
            '-' | '0'..='9' => Token::Literal(self.read_number()?),
            other => return self.error(format!("unexpected character '{}'", other)),
        };

        Ok(Some((token, JsonSpan::new(start, self.location))))
    }

    fn expect_word(&mut self, word: &str) -> CodecResult<()> {
        if self.input[self.location.offset..].starts_with(word) {
            for _ in word.chars() {
                self.bump();
            }
            Ok(())
        } else {
            self.error(format!("invalid literal, expected '{}'", word))
        }
    }

    fn read_string(&mut self) -> CodecResult<String> {
        self.bump();
        let mut out = String::new();
        loop {
            let c = match self.bump() {
                Some(c) => c,
                None => return self.error("unterminated string"),
            };
            match c {
                '"' => return Ok(out),
                '\\' => {
                    let escaped = match self.bump() {
                        Some(e) => e,
                        None => return self.error("unterminated escape sequence"),
                    };
                    match escaped {
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'b' => out.push('\u{0008}'),
                        'f' => out.push('\u{000C}'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        'u' => out.push(self.read_unicode_escape()?),
                        other => return self.error(format!("invalid escape '\\{}'", other)),
                    }
                }
                c if (c as u32) < 0x20 => {
                    return self.error("unescaped control character in string");
                }
                c => out.push(c),
            }
        }
    }

    fn read_hex4(&mut self) -> CodecResult<u32> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = match self.bump().and_then(|c| c.to_digit(16)) {
                Some(d) => d,
                None => return self.error("invalid unicode escape"),
            };
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn read_unicode_escape(&mut self) -> CodecResult<char> {
        let high = self.read_hex4()?;
        if (0xD800..0xDC00).contains(&high) {
            if !self.input[self.location.offset..].starts_with("\\u") {
                return self.error("unpaired surrogate in unicode escape");
            }
            self.bump();
            self.bump();
            let low = self.read_hex4()?;
            if !(0xDC00..0xE000).contains(&low) {
                return self.error("invalid low surrogate in unicode escape");
            }
            let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
            return match char::from_u32(code) {
                Some(c) => Ok(c),
                None => self.error("invalid unicode escape"),
            };
        }
        match char::from_u32(high) {
            Some(c) => Ok(c),
            None => self.error("unpaired surrogate in unicode escape"),
        }
    }

    fn read_digits(&mut self) -> usize {
        let mut count = 0;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
                count += 1;
            } else {
                break;
            }
        }
        count
    }

    /// Integral numbers become the narrowest of integer/long, falling back
    /// to double beyond the long range.
    fn read_number(&mut self) -> CodecResult<JsonLiteral> {
        let start = self.location.offset;
        if self.peek() == Some('-') {
            self.bump();
        }

        match self.peek() {
            Some('0') => {
                self.bump();
                if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    return self.error("leading zeros are not allowed");
                }
            }
            Some(c) if c.is_ascii_digit() => {
                self.read_digits();
            }
            _ => return self.error("invalid number"),
        }

        let mut integral = true;
        if self.peek() == Some('.') {
            self.bump();
            integral = false;
            if self.read_digits() == 0 {
                return self.error("expected digits after decimal point");
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            self.bump();
            integral = false;
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            if self.read_digits() == 0 {
                return self.error("expected digits in exponent");
            }
        }

        let text = &self.input[start..self.location.offset];
        if integral {
            if let Ok(value) = text.parse::<i64>() {
                return Ok(match i32::try_from(value) {
                    Ok(int) => JsonLiteral::Integer(int),
                    Err(_) => JsonLiteral::Long(value),
                });
            }
        }
        match text.parse::<f64>() {
            Ok(value) => Ok(JsonLiteral::Double(value)),
            Err(_) => self.error(format!("invalid number '{}'", text)),
        }
    }
}
