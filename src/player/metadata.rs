//! Character-set normalisation of raw metadata replies

use bytes::Bytes;
use log::debug;

use crate::provider::params::{Charset, MetadataKind, MetadataValue};

use super::types::Metadata;

/// Turns a raw reply into text or bytes. ASCII and UTF-8 strings that are
/// not valid UTF-8 are reinterpreted as Latin-1; numbers become decimal
/// text; UTF-16LE is transcoded. Cover art of any charset is passed
/// through untouched. Unsupported charsets yield `None`.
pub fn normalise(kind: MetadataKind, value: MetadataValue) -> Option<Metadata> {
    if value.data.is_empty() {
        return None;
    }
    match value.charset {
        Charset::Ascii | Charset::Utf8 => Some(Metadata::Text(text_from_8bit(&value.data))),
        _ if kind == MetadataKind::CoverArt => Some(Metadata::Binary(value.data)),
        Charset::U32 => le_number(&value.data, 4).map(|n| Metadata::Text(n.to_string())),
        Charset::U64 => le_number(&value.data, 8).map(|n| Metadata::Text(n.to_string())),
        Charset::Utf16Le => {
            let text = text_from_utf16le(&value.data);
            (!text.is_empty()).then_some(Metadata::Text(text))
        }
        Charset::Binary | Charset::Unknown => {
            debug!("PlayerGraph: {:?} has unsupported charset {:?}", kind, value.charset);
            None
        }
    }
}

fn trim_nul(data: &[u8]) -> &[u8] {
    match data.iter().position(|b| *b == 0) {
        Some(end) => &data[..end],
        None => data,
    }
}

fn text_from_8bit(data: &[u8]) -> String {
    let data = trim_nul(data);
    match std::str::from_utf8(data) {
        Ok(s) => s.to_string(),
        Err(_) => data.iter().map(|b| char::from(*b)).collect(),
    }
}

fn text_from_utf16le(data: &Bytes) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|u| *u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

fn le_number(data: &[u8], width: usize) -> Option<u64> {
    let bytes = data.get(..width)?;
    Some(
        bytes
            .iter()
            .rev()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(charset: Charset, data: &'static [u8]) -> MetadataValue {
        MetadataValue {
            charset,
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn test_utf8_passes_through() {
        let out = normalise(MetadataKind::Title, raw(Charset::Utf8, "Café\0".as_bytes()));
        assert_eq!(out, Some(Metadata::Text("Café".into())));
    }

    #[test]
    fn test_latin1_repaired() {
        let out = normalise(MetadataKind::Artist, raw(Charset::Ascii, b"Beyonc\xe9\0"));
        assert_eq!(out, Some(Metadata::Text("Beyoncé".into())));
    }

    #[test]
    fn test_numbers_become_decimal() {
        let out = normalise(MetadataKind::Year, raw(Charset::U32, &[0xd1, 0x07, 0, 0]));
        assert_eq!(out, Some(Metadata::Text("2001".into())));
        let out = normalise(
            MetadataKind::ThumbnailSeekTime,
            raw(Charset::U64, &[0x80, 0x96, 0x98, 0, 0, 0, 0, 0]),
        );
        assert_eq!(out, Some(Metadata::Text("10000000".into())));
        assert!(normalise(MetadataKind::Year, raw(Charset::U32, &[1, 2])).is_none());
    }

    #[test]
    fn test_utf16le_transcoded() {
        let out = normalise(
            MetadataKind::Album,
            raw(Charset::Utf16Le, &[b'h', 0, b'i', 0, 0, 0]),
        );
        assert_eq!(out, Some(Metadata::Text("hi".into())));
    }

    #[test]
    fn test_cover_art_kept_binary() {
        let out = normalise(MetadataKind::CoverArt, raw(Charset::Binary, &[0xff, 0xd8, 0xff]));
        assert_eq!(out, Some(Metadata::Binary(Bytes::from_static(&[0xff, 0xd8, 0xff]))));
        assert!(normalise(MetadataKind::Genre, raw(Charset::Binary, &[1])).is_none());
    }
}
