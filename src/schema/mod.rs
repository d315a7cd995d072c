//! Schema contracts: structural validators for command payloads, parameters,
//! outputs and service configuration.
//!
//! A [`Schema`] deterministically accepts or rejects a JSON value and, on
//! acceptance, returns its canonical form (unknown object keys stripped,
//! absent optional fields omitted). Rejections enumerate every failing
//! location so a caller gets complete diagnostics in one round trip.
//!
//! ## Example
//!
//! ```
//! use edupage_services::schema::{Field, Schema};
//! use serde_json::json;
//!
//! let credentials = Schema::object([
//!     Field::required("username", Schema::non_empty_string()),
//!     Field::required("password", Schema::non_empty_string()),
//! ]);
//!
//! let err = credentials.validate(&json!({})).unwrap_err();
//! assert_eq!(err.issues().len(), 2);
//!
//! let ok = credentials
//!     .validate(&json!({ "username": "a", "password": "b", "extra": 1 }))
//!     .unwrap();
//! assert_eq!(ok, json!({ "username": "a", "password": "b" }));
//! ```

mod error;

use serde_json::{Map, Value};

pub use error::{Issue, SchemaDefect, ValidationError};

/// A structural validator over JSON values.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Schema {
    /// Placeholder for a contract that has not been specified yet. Accepts anything.
    #[default]
    Unvalidated,
    /// Intentionally schema-less. Accepts anything.
    Opaque,
    Null,
    Boolean,
    String(StringSchema),
    Number(NumberSchema),
    Array(Box<Schema>),
    Object(ObjectSchema),
    /// Accepts `null` or whatever the inner schema accepts.
    Optional(Box<Schema>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringSchema {
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NumberSchema {
    pub integer: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// What an object schema does with keys it does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFields {
    /// Drop them from the canonical value.
    #[default]
    Strip,
    /// Report each one as an issue.
    Reject,
    /// Keep them untouched.
    Passthrough,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    pub fields: Vec<Field>,
    pub unknown: UnknownFields,
}

impl Schema {
    pub fn string() -> Self {
        Schema::String(StringSchema::default())
    }

    pub fn non_empty_string() -> Self {
        Schema::String(StringSchema {
            min_len: Some(1),
            max_len: None,
        })
    }

    pub fn boolean() -> Self {
        Schema::Boolean
    }

    pub fn number() -> Self {
        Schema::Number(NumberSchema::default())
    }

    pub fn integer() -> Self {
        Schema::Number(NumberSchema {
            integer: true,
            ..NumberSchema::default()
        })
    }

    pub fn array(item: Schema) -> Self {
        Schema::Array(Box::new(item))
    }

    pub fn optional(inner: Schema) -> Self {
        Schema::Optional(Box::new(inner))
    }

    pub fn object(fields: impl IntoIterator<Item = Field>) -> Self {
        Schema::Object(ObjectSchema {
            fields: fields.into_iter().collect(),
            unknown: UnknownFields::Strip,
        })
    }

    /// An object with no declared fields; unknown keys are stripped.
    pub fn empty_object() -> Self {
        Self::object([])
    }

    /// Reject undeclared keys instead of stripping them. No-op on non-object schemas.
    pub fn strict(self) -> Self {
        self.with_unknown(UnknownFields::Reject)
    }

    /// Keep undeclared keys. No-op on non-object schemas.
    pub fn passthrough(self) -> Self {
        self.with_unknown(UnknownFields::Passthrough)
    }

    fn with_unknown(self, unknown: UnknownFields) -> Self {
        match self {
            Schema::Object(object) => Schema::Object(ObjectSchema { unknown, ..object }),
            other => other,
        }
    }

    /// True for the two accept-anything variants.
    pub fn is_permissive(&self) -> bool {
        matches!(self, Schema::Unvalidated | Schema::Opaque)
    }

    /// Validate `value`, returning its canonical form or every issue found.
    pub fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        let mut issues = Vec::new();
        let canonical = self.check(value, "", &mut issues);
        if issues.is_empty() {
            Ok(canonical)
        } else {
            Err(ValidationError::new(issues))
        }
    }

    fn check(&self, value: &Value, path: &str, issues: &mut Vec<Issue>) -> Value {
        match self {
            Schema::Unvalidated | Schema::Opaque => value.clone(),
            Schema::Null => {
                if !value.is_null() {
                    issues.push(mismatch(path, "null", value));
                }
                Value::Null
            }
            Schema::Boolean => {
                if !value.is_boolean() {
                    issues.push(mismatch(path, "boolean", value));
                }
                value.clone()
            }
            Schema::String(rules) => {
                match value.as_str() {
                    Some(s) => rules.check(s, path, issues),
                    None => issues.push(mismatch(path, "string", value)),
                }
                value.clone()
            }
            Schema::Number(rules) => {
                if value.is_number() {
                    rules.check(value, path, issues);
                } else {
                    issues.push(mismatch(path, "number", value));
                }
                value.clone()
            }
            Schema::Array(item) => match value.as_array() {
                Some(items) => Value::Array(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, v)| item.check(v, &format!("{path}[{i}]"), issues))
                        .collect(),
                ),
                None => {
                    issues.push(mismatch(path, "array", value));
                    value.clone()
                }
            },
            Schema::Object(object) => match value.as_object() {
                Some(map) => object.check(map, path, issues),
                None => {
                    issues.push(mismatch(path, "object", value));
                    value.clone()
                }
            },
            Schema::Optional(inner) => {
                if value.is_null() {
                    Value::Null
                } else {
                    inner.check(value, path, issues)
                }
            }
        }
    }

    /// Report every way this schema is malformed. Empty means well formed.
    pub fn defects(&self) -> Vec<SchemaDefect> {
        let mut defects = Vec::new();
        self.collect_defects("", &mut defects);
        defects
    }

    fn collect_defects(&self, path: &str, defects: &mut Vec<SchemaDefect>) {
        match self {
            Schema::String(rules) => {
                if let (Some(min), Some(max)) = (rules.min_len, rules.max_len) {
                    if min > max {
                        defects.push(defect(path, format!("min_len {min} exceeds max_len {max}")));
                    }
                }
            }
            Schema::Number(rules) => {
                for (label, bound) in [("min", rules.min), ("max", rules.max)] {
                    if matches!(bound, Some(b) if !b.is_finite()) {
                        defects.push(defect(path, format!("{label} bound is not finite")));
                    }
                }
                if let (Some(min), Some(max)) = (rules.min, rules.max) {
                    if min > max {
                        defects.push(defect(path, format!("min {min} exceeds max {max}")));
                    }
                }
            }
            Schema::Array(item) => item.collect_defects(&format!("{path}[]"), defects),
            Schema::Optional(inner) => inner.collect_defects(path, defects),
            Schema::Object(object) => {
                let mut seen = std::collections::HashSet::new();
                for field in &object.fields {
                    if field.name.is_empty() {
                        defects.push(defect(path, "field with empty name"));
                        continue;
                    }
                    if !seen.insert(field.name.as_str()) {
                        defects.push(defect(path, format!("duplicate field `{}`", field.name)));
                    }
                    field
                        .schema
                        .collect_defects(&child_path(path, &field.name), defects);
                }
            }
            Schema::Unvalidated | Schema::Opaque | Schema::Null | Schema::Boolean => {}
        }
    }
}

impl StringSchema {
    fn check(&self, s: &str, path: &str, issues: &mut Vec<Issue>) {
        let len = s.chars().count();
        if let Some(min) = self.min_len {
            if len < min {
                issues.push(Issue::new(
                    path,
                    format!("must contain at least {min} character(s)"),
                ));
            }
        }
        if let Some(max) = self.max_len {
            if len > max {
                issues.push(Issue::new(
                    path,
                    format!("must contain at most {max} character(s)"),
                ));
            }
        }
    }
}

impl NumberSchema {
    fn check(&self, value: &Value, path: &str, issues: &mut Vec<Issue>) {
        let n = value.as_f64().unwrap_or(f64::NAN);
        let whole = value.is_i64() || value.is_u64() || (n.is_finite() && n.fract() == 0.0);
        if self.integer && !whole {
            issues.push(Issue::new(path, "expected integer, received float"));
        }
        if let Some(min) = self.min {
            if n < min {
                issues.push(Issue::new(path, format!("must be greater than or equal to {min}")));
            }
        }
        if let Some(max) = self.max {
            if n > max {
                issues.push(Issue::new(path, format!("must be less than or equal to {max}")));
            }
        }
    }
}

impl ObjectSchema {
    fn check(&self, map: &Map<String, Value>, path: &str, issues: &mut Vec<Issue>) -> Value {
        let mut canonical = Map::new();

        for field in &self.fields {
            let field_path = child_path(path, &field.name);
            match map.get(&field.name) {
                Some(value) => {
                    let value = field.schema.check(value, &field_path, issues);
                    canonical.insert(field.name.clone(), value);
                }
                None if field.required => issues.push(Issue::new(field_path, "required")),
                None => {}
            }
        }

        for (key, value) in map {
            if self.fields.iter().any(|f| &f.name == key) {
                continue;
            }
            match self.unknown {
                UnknownFields::Strip => {}
                UnknownFields::Reject => {
                    issues.push(Issue::new(child_path(path, key), "unrecognized key"))
                }
                UnknownFields::Passthrough => {
                    canonical.insert(key.clone(), value.clone());
                }
            }
        }

        Value::Object(canonical)
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn defect(path: &str, message: impl Into<String>) -> SchemaDefect {
    SchemaDefect {
        path: path.to_string(),
        message: message.into(),
    }
}

fn mismatch(path: &str, expected: &str, received: &Value) -> Issue {
    Issue::new(
        path,
        format!("expected {expected}, received {}", type_name(received)),
    )
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
