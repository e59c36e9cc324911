use serde::de::DeserializeOwned;
use simd_json::{prelude::Writable, OwnedValue};

use crate::error::DecodeError;

/// Strategy used by rows and changes to turn JSON fields into caller types.
///
/// `decode_text` is always available. Decoders that can work on an already parsed
/// element advertise it through `supports_elements`, which lets [`decode`] skip the
/// serialize-then-parse round trip.
pub trait DocumentDecoder: Send + Sync {
    fn decode_text<T: DeserializeOwned>(&self, raw: &str) -> Result<T, DecodeError>;

    fn supports_elements(&self) -> bool {
        false
    }

    fn decode_element<T: DeserializeOwned>(&self, element: &OwnedValue) -> Result<T, DecodeError> {
        self.decode_text(&json_text(element))
    }
}

/// Compact JSON text of `value`.
pub fn json_text(value: &OwnedValue) -> String {
    value.encode()
}

/// Decodes `element`, preferring the decoder's fast path when it has one.
pub fn decode<T, D>(decoder: &D, element: &OwnedValue) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
    D: DocumentDecoder + ?Sized,
{
    if decoder.supports_elements() {
        decoder.decode_element(element)
    } else {
        decoder.decode_text(&json_text(element))
    }
}

/// Default decoder, deserializing straight from simd-json trees.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimdJsonDecoder;

impl DocumentDecoder for SimdJsonDecoder {
    fn decode_text<T: DeserializeOwned>(&self, raw: &str) -> Result<T, DecodeError> {
        let mut bytes = raw.as_bytes().to_vec();
        Ok(simd_json::from_slice(&mut bytes)?)
    }

    fn supports_elements(&self) -> bool {
        true
    }

    fn decode_element<T: DeserializeOwned>(&self, element: &OwnedValue) -> Result<T, DecodeError> {
        Ok(simd_json::serde::from_owned_value(element.clone())?)
    }
}

/// Decoder that only understands raw JSON text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextDecoder;

impl DocumentDecoder for TextDecoder {
    fn decode_text<T: DeserializeOwned>(&self, raw: &str) -> Result<T, DecodeError> {
        SimdJsonDecoder.decode_text(raw)
    }
}
