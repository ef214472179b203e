/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! JSON text decoder, driven by the flat token stream from [`super::tokenizer`] (§4.1.2).
//! Container navigation mirrors the binary decoders' lazy-iteration contract exactly (§4.1.3):
//! `decode_list`/`decode_map` hand control to the caller's visitor one element at a time, and an
//! early `Ok(false)` leaves the cursor wherever it happened to land, same as
//! [`crate::binary::fixed::BinaryDecoder`] and [`crate::binary::streaming::StreamingDecoder`] —
//! callers that abort early are expected to be done with the whole buffer, not to resume a
//! sibling read afterwards.

use super::tokenizer::{tokenize, unescape, Token};
use crate::error::{Result, WireError};
use crate::value::{MapKey, ValueDecoder};

/// Text (JSON) decoder over a fixed token table of `MAX_TOKENS` entries (default 64, per §4.1.2).
pub struct TextDecoder<'buf, const MAX_TOKENS: usize = 64> {
    src: &'buf [u8],
    tokens: [Token; MAX_TOKENS],
    count: usize,
    pos: usize,
}

impl<'buf, const MAX_TOKENS: usize> TextDecoder<'buf, MAX_TOKENS> {
    pub fn new(src: &'buf [u8]) -> Result<Self> {
        let mut tokens = [Token::Null; MAX_TOKENS];
        let count = tokenize(src, &mut tokens)?;
        Ok(TextDecoder { src, tokens, count, pos: 0 })
    }

    fn peek(&self) -> Result<Token> {
        self.tokens.get(self.pos).copied().filter(|_| self.pos < self.count).ok_or(WireError::EndOfBuffer)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn expect(&mut self, tok: Token) -> Result<()> {
        if self.peek()? == tok {
            self.advance();
            Ok(())
        } else {
            Err(WireError::UnexpectedType("expected token"))
        }
    }

    fn num_text(&self, start: usize, end: usize) -> Result<&'buf str> {
        std::str::from_utf8(&self.src[start..end]).map_err(|_| WireError::MalformedEncoding)
    }

    /// Returns the decoded string body, invoking `with` with either a zero-copy slice of `src`
    /// (common case) or an unescaped scratch buffer (only when the token contains a `\` escape).
    fn with_str_token(&mut self, with: &mut dyn FnMut(&str) -> Result<()>) -> Result<()> {
        match self.peek()? {
            Token::Str { start, end, escaped } => {
                self.advance();
                if escaped {
                    let mut scratch = Vec::new();
                    unescape(&self.src[start..end], &mut scratch)?;
                    let s = std::str::from_utf8(&scratch).map_err(|_| WireError::InvalidUtf8)?;
                    with(s)
                } else {
                    let s = std::str::from_utf8(&self.src[start..end]).map_err(|_| WireError::InvalidUtf8)?;
                    with(s)
                }
            }
            _ => Err(WireError::UnexpectedType("string")),
        }
    }

    fn skip_value(&mut self) -> Result<()> {
        match self.peek()? {
            Token::LBrace => {
                self.advance();
                self.skip_container(true)
            }
            Token::LBracket => {
                self.advance();
                self.skip_container(false)
            }
            Token::Str { .. } | Token::Num { .. } | Token::Null => {
                self.advance();
                Ok(())
            }
            _ => Err(WireError::MalformedEncoding),
        }
    }

    fn skip_container(&mut self, is_map: bool) -> Result<()> {
        let closer = if is_map { Token::RBrace } else { Token::RBracket };
        if self.peek()? == closer {
            self.advance();
            return Ok(());
        }
        loop {
            self.skip_value()?;
            if is_map {
                self.expect(Token::Colon)?;
                self.skip_value()?;
            }
            if self.peek()? == closer {
                self.advance();
                return Ok(());
            }
            self.expect(Token::Comma)?;
        }
    }
}

impl<'buf, const MAX_TOKENS: usize> ValueDecoder for TextDecoder<'buf, MAX_TOKENS> {
    fn is_forward_only(&self) -> bool {
        false
    }

    fn decode_null(&mut self) -> Result<()> {
        self.expect(Token::Null)
    }

    fn decode_bool(&mut self) -> Result<bool> {
        match self.peek()? {
            Token::Num { start, end } => {
                self.advance();
                match self.num_text(start, end)? {
                    "0" => Ok(false),
                    "1" => Ok(true),
                    _ => Err(WireError::UnexpectedType("0 or 1 boolean")),
                }
            }
            _ => Err(WireError::UnexpectedType("boolean")),
        }
    }

    fn decode_u64(&mut self) -> Result<u64> {
        match self.peek()? {
            Token::Num { start, end } => {
                self.advance();
                self.num_text(start, end)?.parse().map_err(|_| WireError::MalformedEncoding)
            }
            _ => Err(WireError::UnexpectedType("number")),
        }
    }

    fn decode_i64(&mut self) -> Result<i64> {
        match self.peek()? {
            Token::Num { start, end } => {
                self.advance();
                self.num_text(start, end)?.parse().map_err(|_| WireError::MalformedEncoding)
            }
            _ => Err(WireError::UnexpectedType("number")),
        }
    }

    #[cfg(feature = "float")]
    fn decode_f32(&mut self) -> Result<f32> {
        match self.peek()? {
            Token::Num { start, end } => {
                self.advance();
                self.num_text(start, end)?.parse().map_err(|_| WireError::MalformedEncoding)
            }
            _ => Err(WireError::UnexpectedType("number")),
        }
    }
    #[cfg(not(feature = "float"))]
    fn decode_f32(&mut self) -> Result<f32> {
        Err(WireError::NotSupported)
    }

    #[cfg(feature = "float")]
    fn decode_f64(&mut self) -> Result<f64> {
        match self.peek()? {
            Token::Num { start, end } => {
                self.advance();
                self.num_text(start, end)?.parse().map_err(|_| WireError::MalformedEncoding)
            }
            _ => Err(WireError::UnexpectedType("number")),
        }
    }
    #[cfg(not(feature = "float"))]
    fn decode_f64(&mut self) -> Result<f64> {
        Err(WireError::NotSupported)
    }

    fn decode_str(&mut self, visit: &mut dyn FnMut(&str) -> Result<()>) -> Result<()> {
        self.with_str_token(visit)
    }

    fn decode_bytes(&mut self, visit: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        self.with_str_token(&mut |hex: &str| {
            if hex.len() % 2 != 0 {
                return Err(WireError::MalformedEncoding);
            }
            let mut bytes = Vec::with_capacity(hex.len() / 2);
            let digits = hex.as_bytes();
            for pair in digits.chunks_exact(2) {
                let hi = (pair[0] as char).to_digit(16).ok_or(WireError::MalformedEncoding)?;
                let lo = (pair[1] as char).to_digit(16).ok_or(WireError::MalformedEncoding)?;
                bytes.push(((hi << 4) | lo) as u8);
            }
            visit(&bytes)
        })
    }

    fn decode_list(&mut self, visit: &mut dyn FnMut(&mut dyn ValueDecoder) -> Result<bool>) -> Result<()> {
        self.expect(Token::LBracket)?;
        if self.peek()? == Token::RBracket {
            self.advance();
            return Ok(());
        }
        loop {
            let keep_going = visit(self)?;
            match self.peek()? {
                Token::Comma => {
                    self.advance();
                    if !keep_going {
                        return Ok(());
                    }
                }
                Token::RBracket => {
                    self.advance();
                    return Ok(());
                }
                _ => return Err(WireError::MalformedEncoding),
            }
        }
    }

    fn decode_map(
        &mut self,
        visit: &mut dyn FnMut(&mut dyn ValueDecoder, MapKey<'_>) -> Result<bool>,
    ) -> Result<()> {
        self.expect(Token::LBrace)?;
        if self.peek()? == Token::RBrace {
            self.advance();
            return Ok(());
        }
        loop {
            let owned_key = match self.peek()? {
                Token::Str { start, end, escaped } => {
                    self.advance();
                    if escaped {
                        let mut scratch = Vec::new();
                        unescape(&self.src[start..end], &mut scratch)?;
                        OwnedMapKey::Name(
                            String::from_utf8(scratch).map_err(|_| WireError::InvalidUtf8)?,
                        )
                    } else {
                        OwnedMapKey::Name(self.num_text(start, end)?.to_owned())
                    }
                }
                Token::Num { start, end } => {
                    self.advance();
                    let id: u64 = self.num_text(start, end)?.parse().map_err(|_| WireError::MalformedEncoding)?;
                    OwnedMapKey::Id(u16::try_from(id).map_err(|_| WireError::Overflow)?)
                }
                _ => return Err(WireError::MalformedEncoding),
            };
            self.expect(Token::Colon)?;
            let key = match &owned_key {
                OwnedMapKey::Id(id) => MapKey::Id(*id),
                OwnedMapKey::Name(name) => MapKey::Name(name.as_str()),
            };
            let keep_going = visit(self, key)?;
            match self.peek()? {
                Token::Comma => {
                    self.advance();
                    if !keep_going {
                        return Ok(());
                    }
                }
                Token::RBrace => {
                    self.advance();
                    return Ok(());
                }
                _ => return Err(WireError::MalformedEncoding),
            }
        }
    }

    fn skip(&mut self) -> Result<()> {
        self.skip_value()
    }
}

enum OwnedMapKey {
    Id(u16),
    Name(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_map_with_mixed_keys() {
        let src = br#"{"name":"demo","id":768,"flag":1}"#;
        let mut dec = TextDecoder::<64>::new(src).unwrap();
        let mut seen = Vec::new();
        dec.decode_map(&mut |d, key| {
            match key {
                MapKey::Name("name") => {
                    d.decode_str(&mut |s| {
                        seen.push(s.to_owned());
                        Ok(())
                    })?;
                }
                MapKey::Name("id") => {
                    seen.push(d.decode_u64()?.to_string());
                }
                MapKey::Name("flag") => {
                    seen.push(d.decode_bool()?.to_string());
                }
                _ => d.skip()?,
            }
            Ok(true)
        })
        .unwrap();
        assert_eq!(seen, vec!["demo", "768", "true"]);
    }

    #[test]
    fn decodes_nested_array() {
        let src = b"[1,2,3]";
        let mut dec = TextDecoder::<64>::new(src).unwrap();
        let mut total = 0u64;
        dec.decode_list(&mut |d| {
            total += d.decode_u64()?;
            Ok(true)
        })
        .unwrap();
        assert_eq!(total, 6);
    }

    #[test]
    fn decodes_hex_bytes() {
        let src = br#""2a0f""#;
        let mut dec = TextDecoder::<64>::new(src).unwrap();
        let mut got = Vec::new();
        dec.decode_bytes(&mut |b| {
            got = b.to_vec();
            Ok(())
        })
        .unwrap();
        assert_eq!(got, vec![0x2a, 0x0f]);
    }

    #[test]
    fn skip_discards_a_whole_nested_value() {
        let src = br#"{"a":{"x":[1,2]},"b":9}"#;
        let mut dec = TextDecoder::<64>::new(src).unwrap();
        let mut seen = Vec::new();
        dec.decode_map(&mut |d, key| {
            if key == MapKey::Name("b") {
                seen.push(d.decode_u64()?);
            } else {
                d.skip()?;
            }
            Ok(true)
        })
        .unwrap();
        assert_eq!(seen, vec![9]);
    }
}
