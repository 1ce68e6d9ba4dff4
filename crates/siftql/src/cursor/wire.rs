use crate::cursor::{Cursor, Direction};
use crate::value::Value;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// Wire keys. Stable; decoders ignore keys they do not know.
const KEY_LAST_ID: u64 = 1;
const KEY_LAST_SORT_VALUE: u64 = 2;
const KEY_OFFSET: u64 = 3;
const KEY_DIRECTION: u64 = 4;
const KEY_RANDOM_SEED: u64 = 5;

///
/// CursorWireRef
///
/// Serialization adapter: a cursor as a CBOR map with integer keys. Absent
/// optional fields are omitted rather than encoded as null.
///

pub(super) struct CursorWireRef<'a>(pub(super) &'a Cursor);

impl Serialize for CursorWireRef<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let cursor = self.0;
        let len = 3
            + usize::from(cursor.last_id.is_some())
            + usize::from(cursor.last_sort_value.is_some());

        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(last_id) = &cursor.last_id {
            map.serialize_entry(&KEY_LAST_ID, last_id)?;
        }
        if let Some(last_sort_value) = &cursor.last_sort_value {
            map.serialize_entry(&KEY_LAST_SORT_VALUE, last_sort_value)?;
        }
        map.serialize_entry(&KEY_OFFSET, &cursor.offset)?;
        map.serialize_entry(&KEY_DIRECTION, cursor.direction.label())?;
        map.serialize_entry(&KEY_RANDOM_SEED, &cursor.random_seed)?;
        map.end()
    }
}

///
/// CursorWire
///
/// Deserialization adapter. Unknown keys are skipped; missing keys take the
/// zero values of their types.
///

pub(super) struct CursorWire(pub(super) Cursor);

impl<'de> Deserialize<'de> for CursorWire {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct WireVisitor;

        impl<'de> Visitor<'de> for WireVisitor {
            type Value = CursorWire;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer-keyed cursor map")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut cursor = Cursor::default();
                while let Some(key) = map.next_key::<u64>()? {
                    match key {
                        KEY_LAST_ID => cursor.last_id = Some(map.next_value::<Value>()?),
                        KEY_LAST_SORT_VALUE => {
                            cursor.last_sort_value = Some(map.next_value::<Value>()?);
                        }
                        KEY_OFFSET => cursor.offset = map.next_value()?,
                        KEY_DIRECTION => {
                            let label = map.next_value::<String>()?;
                            cursor.direction = Direction::from_label(&label).ok_or_else(|| {
                                de::Error::custom(format!("unknown cursor direction {label:?}"))
                            })?;
                        }
                        KEY_RANDOM_SEED => cursor.random_seed = map.next_value()?,
                        _ => {
                            let _ = map.next_value::<de::IgnoredAny>()?;
                        }
                    }
                }
                Ok(CursorWire(cursor))
            }
        }

        deserializer.deserialize_map(WireVisitor)
    }
}
