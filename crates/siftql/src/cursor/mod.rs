mod wire;

use crate::value::Value;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use thiserror::Error as ThisError;
use wire::{CursorWire, CursorWireRef};

// Defensive decode bound for untrusted cursor token input.
const MAX_CURSOR_TOKEN_LEN: usize = 8 * 1024;

///
/// Direction
///
/// Traversal direction a cursor was minted for. `Prev` flips the keyset
/// predicate and the physical read order.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    #[default]
    Next,
    Prev,
}

impl Direction {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Prev => "prev",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "next" => Some(Self::Next),
            "prev" => Some(Self::Prev),
            _ => None,
        }
    }
}

///
/// Cursor
///
/// Opaque pagination state carried between requests. `last_id` present means
/// keyset seeking; `offset` is the running position used for limit
/// accounting, the showing-from/to window, and random-order `$skip`-style
/// pagination. `random_seed` zero means unset.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cursor {
    pub last_id: Option<Value>,
    pub last_sort_value: Option<Value>,
    pub offset: u64,
    pub direction: Direction,
    pub random_seed: i64,
}

impl Cursor {
    #[must_use]
    pub const fn is_keyset(&self) -> bool {
        self.last_id.is_some()
    }

    /// Encode to the opaque URL-safe token form.
    ///
    /// The payload is a CBOR map with integer keys 1-5, so decoders ignore
    /// unknown keys and default missing ones; base64 framing keeps the token
    /// usable in URLs and cookies. Deterministic, tamper-evident, unsigned.
    pub fn encode(&self) -> Result<String, CursorError> {
        let bytes = serde_cbor::to_vec(&CursorWireRef(self))
            .map_err(|err| CursorError::Encode(err.to_string()))?;
        Ok(URL_SAFE.encode(bytes))
    }

    /// Decode a cursor token. Empty or whitespace input is "no cursor".
    pub fn decode(token: &str) -> Result<Option<Self>, CursorError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        if token.len() > MAX_CURSOR_TOKEN_LEN {
            return Err(CursorError::TooLong {
                len: token.len(),
                max: MAX_CURSOR_TOKEN_LEN,
            });
        }

        let bytes = URL_SAFE.decode(token)?;
        let wire: CursorWire =
            serde_cbor::from_slice(&bytes).map_err(|err| CursorError::Decode(err.to_string()))?;
        Ok(Some(wire.0))
    }
}

///
/// CursorError
///

#[derive(Debug, ThisError)]
pub enum CursorError {
    #[error("cursor token exceeds max length: {len} chars (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("cursor token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("cursor payload failed to encode: {0}")]
    Encode(String),

    #[error("cursor payload failed to decode: {0}")]
    Decode(String),
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{Cursor, CursorError, Direction};
    use crate::value::Value;
    use proptest::prelude::*;
    use serde_cbor::Value as Cbor;
    use std::collections::BTreeMap;

    fn sample() -> Cursor {
        Cursor {
            last_id: Some(Value::Int(42)),
            last_sort_value: Some(Value::Text("widget".into())),
            offset: 30,
            direction: Direction::Prev,
            random_seed: 7,
        }
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let token = sample().encode().expect("should encode");
        let decoded = Cursor::decode(&token)
            .expect("should decode")
            .expect("token should carry a cursor");
        assert_eq!(decoded, sample());
    }

    #[test]
    fn empty_and_whitespace_decode_to_none() {
        assert!(Cursor::decode("").expect("should decode").is_none());
        assert!(Cursor::decode("  \n ").expect("should decode").is_none());
    }

    #[test]
    fn oversized_token_is_rejected() {
        let token = "A".repeat(super::MAX_CURSOR_TOKEN_LEN + 1);
        let err = Cursor::decode(&token).expect_err("should fail");
        assert!(matches!(err, CursorError::TooLong { .. }));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let err = Cursor::decode("not@base64!").expect_err("should fail");
        assert!(matches!(err, CursorError::Base64(_)));
    }

    #[test]
    fn truncated_token_fails_to_decode() {
        let token = sample().encode().expect("should encode");
        let truncated = &token[..token.len() / 2];
        assert!(Cursor::decode(truncated).is_err());
    }

    #[test]
    fn unknown_wire_keys_are_ignored() {
        let mut map = BTreeMap::new();
        map.insert(Cbor::Integer(3), Cbor::Integer(12));
        map.insert(Cbor::Integer(4), Cbor::Text("next".into()));
        map.insert(Cbor::Integer(5), Cbor::Integer(0));
        map.insert(Cbor::Integer(9), Cbor::Text("from the future".into()));
        let bytes = serde_cbor::to_vec(&Cbor::Map(map)).expect("should encode");
        let token = {
            use base64::Engine as _;
            base64::engine::general_purpose::URL_SAFE.encode(bytes)
        };

        let decoded = Cursor::decode(&token)
            .expect("should decode")
            .expect("cursor");
        assert_eq!(decoded.offset, 12);
        assert_eq!(decoded.direction, Direction::Next);
        assert!(decoded.last_id.is_none());
    }

    #[test]
    fn missing_wire_keys_take_zero_values() {
        let bytes =
            serde_cbor::to_vec(&Cbor::Map(BTreeMap::new())).expect("should encode empty map");
        let token = {
            use base64::Engine as _;
            base64::engine::general_purpose::URL_SAFE.encode(bytes)
        };

        let decoded = Cursor::decode(&token)
            .expect("should decode")
            .expect("cursor");
        assert_eq!(decoded, Cursor::default());
    }

    #[test]
    fn unknown_direction_label_is_a_decode_error() {
        let mut map = BTreeMap::new();
        map.insert(Cbor::Integer(4), Cbor::Text("sideways".into()));
        let bytes = serde_cbor::to_vec(&Cbor::Map(map)).expect("should encode");
        let token = {
            use base64::Engine as _;
            base64::engine::general_purpose::URL_SAFE.encode(bytes)
        };

        let err = Cursor::decode(&token).expect_err("should fail");
        assert!(matches!(err, CursorError::Decode(_)));
    }

    fn scalar_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::Int),
            "[a-zA-Z0-9_:-]{0,24}".prop_map(Value::Text),
            any::<bool>().prop_map(Value::Bool),
            (-1.0e12f64..1.0e12).prop_map(Value::Float),
        ]
    }

    proptest! {
        #[test]
        fn encode_decode_round_trips(
            last_id in proptest::option::of(scalar_value()),
            last_sort_value in proptest::option::of(scalar_value()),
            offset in 0u64..1_000_000,
            prev in any::<bool>(),
            random_seed in any::<i64>(),
        ) {
            let cursor = Cursor {
                last_id,
                last_sort_value,
                offset,
                direction: if prev { Direction::Prev } else { Direction::Next },
                random_seed,
            };
            let token = cursor.encode().expect("should encode");
            let decoded = Cursor::decode(&token).expect("should decode").expect("cursor");
            prop_assert_eq!(decoded, cursor);
        }

        #[test]
        fn single_byte_flips_never_panic(flip_at in 0usize..64, flip_to in any::<u8>()) {
            let token = sample().encode().expect("should encode");
            let mut bytes = token.into_bytes();
            let idx = flip_at % bytes.len();
            bytes[idx] = flip_to;
            let tampered = String::from_utf8_lossy(&bytes).into_owned();
            // Decoding may fail or succeed-with-different-data; it must not panic.
            let _ = Cursor::decode(&tampered);
        }
    }
}
