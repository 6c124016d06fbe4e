use aws_sdk_dynamodb::types::ScalarAttributeType;
use std::fmt;
use std::str::FromStr;

use crate::dynamodb::Item;
use crate::error::{MapError, Result};

/// Describes which attributes identify an item in a DynamoDB table.
///
/// Every DynamoDB table must have a primary key, which can be:
/// - **Simple Primary Key**: Consists of just a partition (hash) key.
/// - **Composite Primary Key**: Consists of a partition key and a sort (range) key.
///
/// Items may carry any other attributes; only the key attributes are fixed by the table.
///
/// # Example
///
/// ```
/// use dynamodb_map::{Item, KeySchema, KeyType};
///
/// let schema = KeySchema::new("user_id", KeyType::String)
///     .with_range("timestamp", KeyType::Number);
///
/// let item = Item::new()
///     .set_string("user_id", "u1")
///     .set_int("timestamp", 1700000000)
///     .set_string("message", "hello");
///
/// let key = schema.extract_key(&item).unwrap();
/// assert_eq!(key.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    hash: KeyAttribute,
    range: Option<KeyAttribute>,
}

/// A key attribute name together with its scalar type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    pub name: String,
    pub key_type: KeyType,
}

/// The scalar types DynamoDB allows for key attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    /// Represents a string key.
    #[default]
    String,
    /// Represents a number key.
    Number,
    /// Represents a binary key.
    Binary,
}

impl KeyType {
    pub fn scalar_attribute_type(self) -> ScalarAttributeType {
        match self {
            KeyType::String => ScalarAttributeType::S,
            KeyType::Number => ScalarAttributeType::N,
            KeyType::Binary => ScalarAttributeType::B,
        }
    }

    /// Converts a type reported by DescribeTable. Unknown types fall back to `String`.
    pub fn from_scalar_attribute_type(scalar: &ScalarAttributeType) -> Self {
        match scalar {
            ScalarAttributeType::N => KeyType::Number,
            ScalarAttributeType::B => KeyType::Binary,
            _ => KeyType::String,
        }
    }
}

impl FromStr for KeyType {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "S" | "STRING" => Ok(KeyType::String),
            "N" | "NUMBER" => Ok(KeyType::Number),
            "B" | "BINARY" => Ok(KeyType::Binary),
            other => Err(MapError::InvalidConfig(format!(
                "unknown key type `{other}`, expected S, N or B"
            ))),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            KeyType::String => "S",
            KeyType::Number => "N",
            KeyType::Binary => "B",
        };
        f.write_str(code)
    }
}

impl KeySchema {
    /// Creates a schema with only a hash key.
    pub fn new(hash_key: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            hash: KeyAttribute {
                name: hash_key.into(),
                key_type,
            },
            range: None,
        }
    }

    /// Adds a range key and returns the modified `KeySchema`.
    pub fn with_range(mut self, range_key: impl Into<String>, key_type: KeyType) -> Self {
        self.range = Some(KeyAttribute {
            name: range_key.into(),
            key_type,
        });
        self
    }

    pub fn hash(&self) -> &KeyAttribute {
        &self.hash
    }

    pub fn range(&self) -> Option<&KeyAttribute> {
        self.range.as_ref()
    }

    pub fn hash_key(&self) -> &str {
        &self.hash.name
    }

    pub fn range_key(&self) -> Option<&str> {
        self.range.as_ref().map(|r| r.name.as_str())
    }

    pub fn is_ranged(&self) -> bool {
        self.range.is_some()
    }

    /// Names of all key attributes, hash key first.
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.hash_key()).chain(self.range_key())
    }

    /// Returns the key-only projection of `item`.
    ///
    /// Fails with [`MapError::MissingKeyAttribute`] when the hash key is absent. A missing
    /// range key is left for the remote store to reject. Projecting a key yields the same key.
    pub fn extract_key(&self, item: &Item) -> Result<Item> {
        if !item.exists(self.hash_key()) {
            return Err(MapError::MissingKeyAttribute(self.hash_key().to_string()));
        }
        Ok(item.project(self.key_names()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_operations() {
        let schema = KeySchema::new("field1", KeyType::String).with_range("field2", KeyType::Number);

        assert_eq!(schema.hash_key(), "field1");
        assert_eq!(schema.range_key(), Some("field2"));
        assert!(schema.is_ranged());
        assert_eq!(schema.key_names().collect::<Vec<_>>(), vec!["field1", "field2"]);
        assert_eq!(schema.range().map(|r| r.key_type), Some(KeyType::Number));
    }

    #[test]
    fn test_extract_key_keeps_only_key_attributes() {
        let schema = KeySchema::new("id", KeyType::Number);
        let item = Item::new().set_int("id", 1).set_string("name", "a");

        let key = schema.extract_key(&item).unwrap();
        assert_eq!(key, Item::new().set_int("id", 1));
    }

    #[test]
    fn test_extract_key_is_idempotent() {
        let schema = KeySchema::new("category", KeyType::String).with_range("product", KeyType::String);
        let item = Item::new()
            .set_string("category", "Books")
            .set_string("product", "Rust")
            .set_number("price", 39.99);

        let key = schema.extract_key(&item).unwrap();
        assert_eq!(schema.extract_key(&key).unwrap(), key);
    }

    #[test]
    fn test_extract_key_requires_hash_key() {
        let schema = KeySchema::new("id", KeyType::String);
        let err = schema
            .extract_key(&Item::new().set_string("name", "a"))
            .unwrap_err();
        assert!(matches!(err, MapError::MissingKeyAttribute(name) if name == "id"));
    }

    #[test]
    fn test_key_type_parsing() {
        assert_eq!("s".parse::<KeyType>().unwrap(), KeyType::String);
        assert_eq!("N".parse::<KeyType>().unwrap(), KeyType::Number);
        assert_eq!("binary".parse::<KeyType>().unwrap(), KeyType::Binary);
        assert!("X".parse::<KeyType>().is_err());
        assert_eq!(KeyType::Number.scalar_attribute_type(), ScalarAttributeType::N);
    }
}
