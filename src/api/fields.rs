//! Field-level parsing of inbound JSON documents.
//!
//! Each reader method either returns the parsed value or records a message
//! against the field name and returns `None`; callers collect every field
//! first and then bail out with all recorded errors at once.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serializer;
use serde_json::{Map, Value};

use crate::error::ValidationErrors;

pub const REQUIRED: &str = "This field is required.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const NOT_BLANK: &str = "This field may not be blank.";
pub const INVALID_STRING: &str = "Not a valid string.";
pub const INVALID_INTEGER: &str = "A valid integer is required.";
pub const INVALID_NUMBER: &str = "A valid number is required.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const INVALID_DATETIME: &str = "Datetime has wrong format. Use one of these formats instead: YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid username pattern"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@([A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}$")
        .expect("valid email pattern")
});

/// Display name of a JSON value's type, as it appears in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Fixed two-place text used for prices on the wire.
pub fn price_text(price: &Decimal) -> String {
    let mut value = *price;
    value.rescale(2);
    value.to_string()
}

pub fn serialize_price<S: Serializer>(price: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&price_text(price))
}

/// RFC 3339 in UTC with a `Z` suffix.
pub fn serialize_datetime<S: Serializer>(
    value: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

pub struct Fields<'a> {
    doc: &'a Map<String, Value>,
    errors: ValidationErrors,
}

impl<'a> Fields<'a> {
    pub fn from_document(doc: &'a Value) -> Result<Self, ValidationErrors> {
        match doc {
            Value::Object(map) => Ok(Self {
                doc: map,
                errors: ValidationErrors::new(),
            }),
            other => Err(ValidationErrors::single(
                "non_field_errors",
                format!(
                    "Invalid data. Expected a dictionary, but got {}.",
                    type_name(other)
                ),
            )),
        }
    }

    pub fn into_errors(self) -> ValidationErrors {
        self.errors
    }

    fn fail(&mut self, name: &str, message: impl Into<String>) {
        self.errors.add(name, message);
    }

    /// Present and non-null value, or a recorded error.
    fn value(&mut self, name: &str) -> Option<&'a Value> {
        let doc = self.doc;
        match doc.get(name) {
            None => {
                self.fail(name, REQUIRED);
                None
            }
            Some(Value::Null) => {
                self.fail(name, NOT_NULL);
                None
            }
            Some(value) => Some(value),
        }
    }

    /// Text field. Numbers are accepted and stringified; surrounding
    /// whitespace is trimmed.
    pub fn text(&mut self, name: &str, max_length: usize, allow_blank: bool) -> Option<String> {
        let text = match self.value(name)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => {
                self.fail(name, INVALID_STRING);
                return None;
            }
        };

        if text.is_empty() && !allow_blank {
            self.fail(name, NOT_BLANK);
            return None;
        }
        if text.chars().count() > max_length {
            self.fail(
                name,
                format!("Ensure this field has no more than {max_length} characters."),
            );
            return None;
        }
        Some(text)
    }

    /// Optional text field defaulting to blank.
    pub fn optional_text(&mut self, name: &str, max_length: usize) -> Option<String> {
        if !self.doc.contains_key(name) {
            return Some(String::new());
        }
        self.text(name, max_length, true)
    }

    pub fn username(&mut self, name: &str, max_length: usize) -> Option<String> {
        let username = self.text(name, max_length, false)?;
        if !USERNAME_RE.is_match(&username) {
            self.fail(name, INVALID_USERNAME);
            return None;
        }
        Some(username)
    }

    /// Optional, blank allowed; anything non-blank must look like an address.
    pub fn email(&mut self, name: &str, max_length: usize) -> Option<String> {
        let email = self.optional_text(name, max_length)?;
        if !email.is_empty() && !EMAIL_RE.is_match(&email) {
            self.fail(name, INVALID_EMAIL);
            return None;
        }
        Some(email)
    }

    pub fn integer(&mut self, name: &str) -> Option<i32> {
        let value = self.value(name)?;
        let Some(parsed) = parse_integer(value) else {
            self.fail(name, INVALID_INTEGER);
            return None;
        };

        if parsed > i64::from(i32::MAX) {
            self.fail(
                name,
                format!("Ensure this value is less than or equal to {}.", i32::MAX),
            );
            return None;
        }
        if parsed < i64::from(i32::MIN) {
            self.fail(
                name,
                format!("Ensure this value is greater than or equal to {}.", i32::MIN),
            );
            return None;
        }
        i32::try_from(parsed).ok()
    }

    pub fn decimal(&mut self, name: &str, max_digits: u32, decimal_places: u32) -> Option<Decimal> {
        let value = self.value(name)?;
        let Some(parsed) = parse_decimal(value) else {
            self.fail(name, INVALID_NUMBER);
            return None;
        };

        let normalized = parsed.normalize();
        let places = normalized.scale();
        let digits = (normalized.mantissa().unsigned_abs().to_string().len() as u32).max(places);
        let whole_digits = digits - places;

        if digits > max_digits {
            self.fail(
                name,
                format!("Ensure that there are no more than {max_digits} digits in total."),
            );
            return None;
        }
        if places > decimal_places {
            self.fail(
                name,
                format!("Ensure that there are no more than {decimal_places} decimal places."),
            );
            return None;
        }
        if whole_digits > max_digits - decimal_places {
            self.fail(
                name,
                format!(
                    "Ensure that there are no more than {} digits before the decimal point.",
                    max_digits - decimal_places
                ),
            );
            return None;
        }
        Some(parsed)
    }

    pub fn datetime(&mut self, name: &str) -> Option<DateTime<Utc>> {
        let parsed = match self.value(name)? {
            Value::String(s) => parse_datetime(s.trim()),
            _ => None,
        };
        if parsed.is_none() {
            self.fail(name, INVALID_DATETIME);
        }
        parsed
    }

    /// List of primary keys. Existence is left to the store.
    pub fn pk_list(&mut self, name: &str) -> Option<Vec<i64>> {
        let items = match self.value(name)? {
            Value::Array(items) => items,
            other => {
                self.fail(
                    name,
                    format!(
                        "Expected a list of items but got type \"{}\".",
                        type_name(other)
                    ),
                );
                return None;
            }
        };

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            match item.as_i64() {
                Some(id) => ids.push(id),
                None => {
                    self.fail(
                        name,
                        format!(
                            "Incorrect type. Expected pk value, received {}.",
                            type_name(item)
                        ),
                    );
                    return None;
                }
            }
        }
        Some(ids)
    }

    /// Optional list of primary keys defaulting to empty, for relations
    /// that may be left blank.
    pub fn optional_pk_list(&mut self, name: &str) -> Option<Vec<i64>> {
        if !self.doc.contains_key(name) {
            return Some(Vec::new());
        }
        self.pk_list(name)
    }
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            // "100.0" and "100.00" are integers too.
            let s = match s.split_once('.') {
                Some((whole, frac)) if frac.chars().all(|c| c == '0') => whole,
                _ => s,
            };
            s.parse().ok()
        }
        _ => None,
    }
}

fn parse_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    text.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(&text).ok())
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}
