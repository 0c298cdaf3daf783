//! A minimal recursive-descent parser for the UBJSON-like metadata trailer
//! appended after the last event in a replay.
//!
//! The replay format only ever emits a narrow subset of real UBJSON: objects,
//! length-prefixed keys, length-prefixed strings, and big-endian 32-bit signed
//! ints. There is no array marker, no float type, no `null`/`true`/`false` --
//! so rather than pull in a general UBJSON crate we walk that subset by hand
//! and build a [`serde_json::Value`] tree directly.

use crate::error::{Result, SlippcError};
use byteorder::{BigEndian, ByteOrder};
use serde_json::{Map, Value};

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn byte(&mut self) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| SlippcError::MetadataParse("unexpected end of metadata tree".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(SlippcError::MetadataParse("truncated metadata string".into()));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    /// Reads a `U <len> <bytes>` length-prefixed string/key (the `U` marker is
    /// expected to have already been consumed by the caller when it's a key,
    /// or is part of the `S U <len>` sequence when it's a string value).
    fn ubyte_string(&mut self) -> Result<String> {
        let len = self.byte()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn key(&mut self) -> Result<String> {
        let marker = self.byte()?;
        if marker != b'U' {
            return Err(SlippcError::MetadataParse(format!(
                "expected 'U' key marker, found {:#04x}",
                marker
            )));
        }
        self.ubyte_string()
    }

    fn value(&mut self) -> Result<Value> {
        let marker = self.byte()?;
        match marker {
            b'{' => self.object(),
            b'S' => {
                let inner = self.byte()?;
                if inner != b'U' {
                    return Err(SlippcError::MetadataParse(format!(
                        "expected 'U' length marker after 'S', found {:#04x}",
                        inner
                    )));
                }
                Ok(Value::String(self.ubyte_string()?))
            }
            b'l' => {
                let bytes = self.take(4)?;
                Ok(Value::from(BigEndian::read_i32(bytes)))
            }
            other => Err(SlippcError::MetadataParse(format!(
                "unsupported metadata value marker {:#04x}",
                other
            ))),
        }
    }

    fn object(&mut self) -> Result<Value> {
        let mut map = Map::new();
        loop {
            if self.pos >= self.buf.len() {
                return Err(SlippcError::MetadataParse("unterminated metadata object".into()));
            }
            if self.buf[self.pos] == b'}' {
                self.pos += 1;
                break;
            }
            let k = self.key()?;
            let v = self.value()?;
            map.insert(k, v);
        }
        Ok(Value::Object(map))
    }
}

/// Parses the metadata trailer. `buf` should start right after the
/// `"U\x08metadata"` tag and its leading `{`.
pub fn parse(buf: &[u8]) -> Result<Value> {
    let mut cur = Cursor::new(buf);
    let marker = cur.byte()?;
    if marker != b'{' {
        return Err(SlippcError::MetadataParse("metadata tree did not start with '{'".into()));
    }
    cur.object()
}

/// Flattens `players.<port>.names.netplay` and `...names.code` (and the
/// top-level `startAt`/`playedOn`) out of a parsed metadata tree.
pub fn harvest_summary(tree: &Value) -> (Option<String>, Option<String>, Vec<(u8, String)>, Vec<(u8, String)>) {
    let started_at = tree.get("startAt").and_then(Value::as_str).map(String::from);
    let played_on = tree.get("playedOn").and_then(Value::as_str).map(String::from);

    let mut netplay = Vec::new();
    let mut codes = Vec::new();
    if let Some(players) = tree.get("players").and_then(Value::as_object) {
        for (port_str, pdata) in players {
            let Ok(port) = port_str.parse::<u8>() else { continue };
            if let Some(names) = pdata.get("names") {
                if let Some(n) = names.get("netplay").and_then(Value::as_str) {
                    netplay.push((port, n.to_string()));
                }
                if let Some(c) = names.get("code").and_then(Value::as_str) {
                    codes.push((port, c.to_string()));
                }
            }
        }
    }
    (started_at, played_on, netplay, codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }

    #[test]
    fn parses_flat_string_value() {
        let mut buf = s(b"{");
        buf.extend(b"U\x07startAt");
        buf.extend(b"SU\x14");
        buf.extend(b"2023-01-01T00:00Z");
        buf.push(b'}');
        let tree = parse(&buf).unwrap();
        assert_eq!(tree["startAt"], "2023-01-01T00:00Z");
    }

    #[test]
    fn parses_nested_object_and_int() {
        let mut buf = s(b"{");
        buf.extend(b"U\x05count");
        buf.push(b'l');
        buf.extend(42i32.to_be_bytes());
        buf.push(b'}');
        let tree = parse(&buf).unwrap();
        assert_eq!(tree["count"], 42);
    }
}
