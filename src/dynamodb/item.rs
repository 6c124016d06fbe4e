use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use std::fmt;

/// Represents a DynamoDB item with various attribute types.
///
/// In DynamoDB, an item is a collection of attributes, each with a name and a value.
/// Items are similar to rows or records in other database systems.
///
/// # Item Structure
///
/// - Each item consists of one or more attributes.
/// - Each attribute has a name and a value.
/// - Attribute values can be of various types: String, Number, Binary, Boolean, Null, List, Map,
///   String Set, Number Set and Binary Set.
///
/// # Keys
///
/// A key is an item restricted to the key attributes of a table (hash key, plus range key
/// when the table has one). See [`KeySchema::extract_key`](super::KeySchema::extract_key).
///
/// # Example
///
/// ```
/// use dynamodb_map::Item;
///
/// let item = Item::new()
///     .set_string("user_id", "12345")
///     .set_string("username", "johndoe")
///     .set_number("age", 30.0);
/// ```
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Item {
    pub(crate) attributes: HashMap<String, AttributeValue>,
}

impl Item {
    /// Creates a new empty `Item`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute to any value.
    pub fn set(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Sets a string attribute.
    ///
    /// In DynamoDB, string attributes are used for text data.
    pub fn set_string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, AttributeValue::S(value.into()))
    }

    /// Sets a number attribute.
    ///
    /// In DynamoDB, number attributes are used for numeric data and are stored with high precision.
    pub fn set_number(self, key: impl Into<String>, value: impl Into<f64>) -> Self {
        self.set(key, AttributeValue::N(value.into().to_string()))
    }

    /// Sets an integral number attribute without going through `f64`.
    pub fn set_int(self, key: impl Into<String>, value: i64) -> Self {
        self.set(key, AttributeValue::N(value.to_string()))
    }

    pub fn set_bool(self, key: impl Into<String>, value: bool) -> Self {
        self.set(key, AttributeValue::Bool(value))
    }

    pub fn set_binary(self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.set(key, AttributeValue::B(Blob::new(value)))
    }

    /// Sets the attribute in place, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: AttributeValue) -> Option<AttributeValue> {
        self.attributes.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Gets the value of an attribute as a string.
    ///
    /// Returns `None` if the attribute doesn't exist or is not a string.
    pub fn get_string(&self, key: &str) -> Option<&String> {
        self.attributes.get(key).and_then(|av| av.as_s().ok())
    }

    /// Gets the value of an attribute as a number (f64).
    ///
    /// Returns `None` if the attribute doesn't exist, is not a number, or can't be parsed as f64.
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.attributes
            .get(key)
            .and_then(|av| av.as_n().ok())
            .and_then(|n| n.parse().ok())
    }

    /// Gets the value of an attribute as an `i64`.
    ///
    /// Returns `None` if the attribute is missing, not a number, or not integral.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.attributes
            .get(key)
            .and_then(|av| av.as_n().ok())
            .and_then(|n| n.parse().ok())
    }

    /// Returns true if the attribute exists, even if it is null.
    pub fn exists(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Returns true if the attribute exists and is not null.
    pub fn is_present(&self, key: &str) -> bool {
        matches!(self.attributes.get(key), Some(av) if !av.is_null())
    }

    /// Returns true if the attribute exists but is null.
    pub fn is_null(&self, key: &str) -> bool {
        matches!(self.attributes.get(key), Some(av) if av.is_null())
    }

    /// Returns a new item holding only the given attributes that exist on this one.
    pub fn project<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Item {
        let attributes = keys
            .into_iter()
            .filter_map(|key| {
                self.attributes
                    .get(key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect();
        Item { attributes }
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn into_attributes(self) -> HashMap<String, AttributeValue> {
        self.attributes
    }
}

impl From<HashMap<String, AttributeValue>> for Item {
    fn from(attributes: HashMap<String, AttributeValue>) -> Self {
        Self { attributes }
    }
}

impl From<Item> for HashMap<String, AttributeValue> {
    fn from(item: Item) -> Self {
        item.attributes
    }
}

impl fmt::Display for Item {
    // Sorted so that log lines are stable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.attributes.keys().collect();
        names.sort();
        write!(f, "item{{")?;
        for (i, name) in names.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{:?}", name, self.attributes[name])?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_operations() {
        let item = Item::new()
            .set_string("key1", "value1")
            .set_number("key2", 42.0)
            .set_int("key3", -7)
            .set_bool("key4", true);

        assert_eq!(item.get_string("key1"), Some(&"value1".to_string()));
        assert_eq!(item.get_number("key2"), Some(42.0));
        assert_eq!(item.get_int("key3"), Some(-7));
        assert_eq!(item.get("key4"), Some(&AttributeValue::Bool(true)));
        assert_eq!(item.get_string("non_existent"), None);
        assert_eq!(item.get_number("non_existent"), None);
        assert_eq!(item.len(), 4);
    }

    #[test]
    fn test_null_and_presence() {
        let item = Item::new()
            .set("nothing", AttributeValue::Null(true))
            .set_string("something", "x");

        assert!(item.exists("nothing"));
        assert!(item.is_null("nothing"));
        assert!(!item.is_present("nothing"));
        assert!(item.is_present("something"));
        assert!(!item.is_null("something"));
        assert!(!item.exists("missing"));
        assert!(!item.is_null("missing"));
    }

    #[test]
    fn test_project_skips_missing_attributes() {
        let item = Item::new()
            .set_string("a", "1")
            .set_string("b", "2")
            .set_string("c", "3");

        let projected = item.project(["a", "c", "zzz"]);
        assert_eq!(projected, Item::new().set_string("a", "1").set_string("c", "3"));
    }

    #[test]
    fn test_display_is_sorted() {
        let item = Item::new().set_string("b", "x").set_int("a", 1);
        assert_eq!(item.to_string(), r#"item{a:N("1"), b:S("x")}"#);
    }
}
