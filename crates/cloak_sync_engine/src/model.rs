//! Models and field validation.
//!
//! A model names a table (its [`Model::KIND`]) and describes the fields a
//! row may carry with a [`Shape`]. Every field not named by the shape is an
//! error, so a shape is also the complete list of writable fields.
//!
//! ```
//! use cloak_sync_engine::model::{non_blank, one_of, optional, Model, Shape};
//!
//! struct Todo;
//!
//! impl Model for Todo {
//!     const KIND: &'static str = "todo";
//!
//!     fn shape() -> Shape {
//!         Shape::new()
//!             .field("title", non_blank())
//!             .field("status", optional(one_of(["open", "done"])))
//!     }
//! }
//!
//! let fields = [("title".to_string(), String::new())].into_iter().collect();
//! let errors = Todo::shape().validate(&fields);
//! assert_eq!(errors.get("title"), Some("title cannot be blank"));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Field values of one row, excluding its id.
pub type Fields = BTreeMap<String, String>;

/// A model stored in its own table.
pub trait Model {
    /// Table name and action-kind prefix.
    const KIND: &'static str;

    /// Returns the validators for this model's fields.
    fn shape() -> Shape;

    /// Normalizes input before it is validated and stored.
    fn prepare(fields: Fields) -> Fields {
        fields
    }
}

/// Validation errors keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    /// Creates an empty error set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error for a field.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    /// Returns the error for a field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Returns true if no field failed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of failed fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates `(field, message)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Checks one field. Receives the field name and its value, if present.
pub type Validator = Arc<dyn Fn(&str, Option<&str>) -> Option<String> + Send + Sync>;

fn invalid(key: &str, value: Option<&str>) -> String {
    match value {
        Some(v) => format!("invalid {key}: '{v}'"),
        None => format!("{key} is required"),
    }
}

fn validator<F>(check: F) -> Validator
where
    F: Fn(&str, Option<&str>) -> Option<String> + Send + Sync + 'static,
{
    Arc::new(check)
}

fn basic(check: impl Fn(&str) -> bool + Send + Sync + 'static) -> Validator {
    validator(move |key, value| match value {
        Some(v) if check(v) => None,
        _ => Some(invalid(key, value)),
    })
}

/// Accepts any present value.
pub fn required() -> Validator {
    basic(|_| true)
}

/// Accepts any present, non-empty value.
pub fn non_blank() -> Validator {
    validator(|key, value| match value {
        None => Some(invalid(key, None)),
        Some("") => Some(format!("{key} cannot be blank")),
        Some(_) => None,
    })
}

/// Accepts one of a fixed set of values.
pub fn one_of<I, S>(values: I) -> Validator
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let valid: BTreeSet<String> = values.into_iter().map(Into::into).collect();
    basic(move |v| valid.contains(v))
}

/// Accepts a UUID.
pub fn uuid() -> Validator {
    basic(|v| Uuid::parse_str(v).is_ok())
}

/// Accepts a decimal number such as `12`, `-0.5` or `.25`.
pub fn decimal() -> Validator {
    basic(is_decimal)
}

/// Accepts an absent value, otherwise defers to `inner`.
pub fn optional(inner: Validator) -> Validator {
    validator(move |key, value| value.and_then(|v| inner(key, Some(v))))
}

fn is_decimal(value: &str) -> bool {
    let unsigned = value.strip_prefix(['-', '+']).unwrap_or(value);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (unsigned, None),
    };
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    match fraction {
        Some(f) => digits(whole) && !f.is_empty() && digits(f),
        None => !whole.is_empty() && digits(whole),
    }
}

/// The validators for every field of a model.
#[derive(Clone, Default)]
pub struct Shape {
    fields: BTreeMap<String, Validator>,
}

impl Shape {
    /// Creates an empty shape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    pub fn field(mut self, name: impl Into<String>, validator: Validator) -> Self {
        self.fields.insert(name.into(), validator);
        self
    }

    /// Returns the declared field names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Validates a row's fields.
    ///
    /// Every declared field runs its validator (absent fields see `None`);
    /// every undeclared field fails with `"invalid key"`.
    pub fn validate(&self, data: &Fields) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for (key, check) in &self.fields {
            if let Some(message) = check(key, data.get(key).map(String::as_str)) {
                errors.insert(key.clone(), message);
            }
        }
        for key in data.keys().filter(|k| !self.fields.contains_key(*k)) {
            errors.insert(key.clone(), "invalid key");
        }
        errors
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.fields.keys()).finish()
    }
}
