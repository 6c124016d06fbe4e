//! Conversion between application values and [`Item`]s.
//!
//! A codec is chosen once, when a [`TypedMap`](crate::TypedMap) is created, and every typed
//! operation runs its arguments and results through it.

use aws_sdk_dynamodb::types::AttributeValue;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::dynamodb::Item;
use crate::error::{MapError, Result};

pub trait Codec<T>: Send + Sync + 'static {
    fn encode(&self, value: &T) -> Result<Item>;
    fn decode(&self, item: Item) -> Result<T>;
}

/// Codec for any serde type, backed by `serde_dynamo`.
///
/// The value must serialize to a map (a struct or a map type); each field becomes one
/// attribute.
///
/// ```
/// use dynamodb_map::{Codec, SerdeCodec};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     user_id: String,
///     visits: u32,
/// }
///
/// let codec = SerdeCodec::<User>::new();
/// let item = codec.encode(&User { user_id: "u1".into(), visits: 3 }).unwrap();
/// assert_eq!(item.get_int("visits"), Some(3));
/// ```
pub struct SerdeCodec<T>(PhantomData<fn() -> T>);

impl<T> SerdeCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SerdeCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerdeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerdeCodec<{}>", std::any::type_name::<T>())
    }
}

impl<T> Codec<T> for SerdeCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn encode(&self, value: &T) -> Result<Item> {
        let attributes: HashMap<String, AttributeValue> =
            serde_dynamo::to_item(value).map_err(|e| MapError::Codec(Box::new(e)))?;
        Ok(Item::from(attributes))
    }

    fn decode(&self, item: Item) -> Result<T> {
        serde_dynamo::from_item(item.into_attributes()).map_err(|e| MapError::Codec(Box::new(e)))
    }
}

/// Codec built from a pair of plain functions, for hand-written conversions.
pub struct FnCodec<T> {
    encode: fn(&T) -> Result<Item>,
    decode: fn(Item) -> Result<T>,
}

impl<T> FnCodec<T> {
    pub fn new(encode: fn(&T) -> Result<Item>, decode: fn(Item) -> Result<T>) -> Self {
        Self { encode, decode }
    }
}

impl<T> Clone for FnCodec<T> {
    fn clone(&self) -> Self {
        Self {
            encode: self.encode,
            decode: self.decode,
        }
    }
}

impl<T> fmt::Debug for FnCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnCodec<{}>", std::any::type_name::<T>())
    }
}

impl<T: 'static> Codec<T> for FnCodec<T> {
    fn encode(&self, value: &T) -> Result<Item> {
        (self.encode)(value)
    }

    fn decode(&self, item: Item) -> Result<T> {
        (self.decode)(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Product {
        category: String,
        price: f64,
        stock: i64,
        tags: Vec<String>,
        discontinued: bool,
    }

    fn widget() -> Product {
        Product {
            category: "Widgets".into(),
            price: 9.5,
            stock: 12,
            tags: vec!["blue".into(), "small".into()],
            discontinued: false,
        }
    }

    #[test]
    fn test_serde_codec_encodes_fields_as_attributes() {
        let item = SerdeCodec::new().encode(&widget()).unwrap();

        assert_eq!(item.get_string("category"), Some(&"Widgets".to_string()));
        assert_eq!(item.get_number("price"), Some(9.5));
        assert_eq!(item.get_int("stock"), Some(12));
        assert!(matches!(item.get("tags"), Some(AttributeValue::L(tags)) if tags.len() == 2));
    }

    #[test]
    fn test_serde_codec_decodes_what_it_encoded() {
        let codec = SerdeCodec::<Product>::new();
        let item = codec.encode(&widget()).unwrap();
        assert_eq!(codec.decode(item).unwrap(), widget());
    }

    #[test]
    fn test_serde_codec_reports_missing_fields() {
        let item = Item::new().set_string("category", "Widgets");
        let err = SerdeCodec::<Product>::new().decode(item).unwrap_err();
        assert!(matches!(err, MapError::Codec(_)));
    }

    #[test]
    fn test_serde_codec_rejects_non_map_values() {
        let err = SerdeCodec::<String>::new().encode(&"bare".to_string()).unwrap_err();
        assert!(matches!(err, MapError::Codec(_)));
    }

    #[test]
    fn test_fn_codec() {
        fn encode(name: &String) -> Result<Item> {
            Ok(Item::new().set_string("name", name.as_str()))
        }
        fn decode(item: Item) -> Result<String> {
            item.get_string("name")
                .cloned()
                .ok_or_else(|| MapError::Codec("no name".into()))
        }

        let codec = FnCodec::new(encode, decode);
        let item = codec.encode(&"Ada".to_string()).unwrap();
        assert_eq!(codec.decode(item).unwrap(), "Ada");
        assert!(codec.decode(Item::new()).is_err());
    }
}
