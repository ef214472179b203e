/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! A minimal JSON tokenizer into a pre-allocated (fixed-capacity) token buffer, matching the
//! embedded-friendly shape described in §4.1.2: "tokenises the input into a pre-allocated token
//! buffer (default 64 tokens) using an embedded parser and walks tokens by index." Unlike a
//! tree-building parser, this produces one flat array of punctuation/literal tokens; the decoder
//! in [`super::decoder`] does the recursive-descent walk itself, driven by the request engine's
//! `decode_list`/`decode_map` callbacks.

use crate::error::{Result, WireError};

/// One lexical element of the JSON input. Ranges refer to byte offsets into the original buffer;
/// for [`Token::Str`] the range excludes the surrounding quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Comma,
    /// A quoted string literal; `escaped` is true if it contains a backslash escape sequence.
    Str { start: usize, end: usize, escaped: bool },
    /// A bare numeric literal (covers this protocol's `0`/`1` booleans too; §9).
    Num { start: usize, end: usize },
    Null,
}

/// Tokenizes `src` into `out`, a caller-supplied fixed-capacity buffer (mirroring the protocol's
/// default 64-token allocation). Returns the number of tokens written.
///
/// Fails with [`WireError::TooManyTokens`] if `src` contains more tokens than `out` can hold, and
/// with [`WireError::MalformedEncoding`] on invalid JSON syntax.
pub fn tokenize(src: &[u8], out: &mut [Token]) -> Result<usize> {
    let mut i = 0usize;
    let mut n = 0usize;
    let len = src.len();

    let mut push = |tok: Token, n: &mut usize| -> Result<()> {
        let slot = out.get_mut(*n).ok_or(WireError::TooManyTokens)?;
        *slot = tok;
        *n += 1;
        Ok(())
    };

    while i < len {
        match src[i] {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'{' => {
                push(Token::LBrace, &mut n)?;
                i += 1;
            }
            b'}' => {
                push(Token::RBrace, &mut n)?;
                i += 1;
            }
            b'[' => {
                push(Token::LBracket, &mut n)?;
                i += 1;
            }
            b']' => {
                push(Token::RBracket, &mut n)?;
                i += 1;
            }
            b':' => {
                push(Token::Colon, &mut n)?;
                i += 1;
            }
            b',' => {
                push(Token::Comma, &mut n)?;
                i += 1;
            }
            b'"' => {
                let start = i + 1;
                let mut j = start;
                let mut escaped = false;
                loop {
                    if j >= len {
                        return Err(WireError::MalformedEncoding);
                    }
                    match src[j] {
                        b'\\' => {
                            escaped = true;
                            j += 2;
                        }
                        b'"' => break,
                        _ => j += 1,
                    }
                }
                push(Token::Str { start, end: j, escaped }, &mut n)?;
                i = j + 1;
            }
            b'n' => {
                if src[i..].starts_with(b"null") {
                    push(Token::Null, &mut n)?;
                    i += 4;
                } else {
                    return Err(WireError::MalformedEncoding);
                }
            }
            b'-' | b'0'..=b'9' => {
                let start = i;
                let mut j = i;
                if src[j] == b'-' {
                    j += 1;
                }
                while j < len
                    && matches!(src[j], b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')
                {
                    j += 1;
                }
                push(Token::Num { start, end: j }, &mut n)?;
                i = j;
            }
            _ => return Err(WireError::MalformedEncoding),
        }
    }
    Ok(n)
}

/// Unescapes a JSON string body (the minimal escape set §4.1.2 promises on the encode side) into
/// `out`, returning the written length. Used by the decoder only when a token's `escaped` flag is
/// set; the common case borrows directly from the source buffer instead.
pub fn unescape(src: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let mut i = 0;
    while i < src.len() {
        if src[i] == b'\\' {
            i += 1;
            let c = *src.get(i).ok_or(WireError::MalformedEncoding)?;
            match c {
                b'"' => out.push(b'"'),
                b'\\' => out.push(b'\\'),
                b'/' => out.push(b'/'),
                b'b' => out.push(0x08),
                b'f' => out.push(0x0c),
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'u' => {
                    let hex = src.get(i + 1..i + 5).ok_or(WireError::MalformedEncoding)?;
                    let hex = std::str::from_utf8(hex).map_err(|_| WireError::MalformedEncoding)?;
                    let cp = u32::from_str_radix(hex, 16).map_err(|_| WireError::MalformedEncoding)?;
                    let ch = char::from_u32(cp).ok_or(WireError::MalformedEncoding)?;
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                    i += 4;
                }
                _ => return Err(WireError::MalformedEncoding),
            }
            i += 1;
        } else {
            out.push(src[i]);
            i += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_flat_map() {
        let src = br#"{"a":1,"b":"x"}"#;
        let mut buf = [Token::Null; 16];
        let n = tokenize(src, &mut buf).unwrap();
        assert_eq!(
            &buf[..n],
            &[
                Token::LBrace,
                Token::Str { start: 2, end: 3, escaped: false },
                Token::Colon,
                Token::Num { start: 5, end: 6 },
                Token::Comma,
                Token::Str { start: 8, end: 9, escaped: false },
                Token::Colon,
                Token::Str { start: 12, end: 13, escaped: false },
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn too_many_tokens_is_an_error() {
        let src = br#"[1,2,3]"#;
        let mut buf = [Token::Null; 2];
        assert_eq!(tokenize(src, &mut buf), Err(WireError::TooManyTokens));
    }

    #[test]
    fn unescape_handles_basic_sequences() {
        let mut out = Vec::new();
        unescape(br#"a\"b\\c\n"#, &mut out).unwrap();
        assert_eq!(out, b"a\"b\\c\n");
    }
}
