//! Schema-declared form binding and validation.
//!
//! Every form is described by a static [`Schema`]: an ordered list of
//! [`Field`] descriptors, each naming the submitted key, the kind of value it
//! binds to and the [`Rule`]s it must pass. Validation keeps only the first
//! failing rule per field.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use bulletin_types::views::FieldErrors;

use crate::error::AppError;

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}$").expect("valid domain regex")
});

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Lower-case hostname with at least one dot and a TLD of two or more letters.
pub fn is_valid_domain(domain: &str) -> bool {
    DOMAIN_RE.is_match(domain)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Normalize an email for lookup/uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// -- Submitted data --

/// Submitted key/value pairs in arrival order. Repeated keys are kept.
#[derive(Debug, Default, Clone)]
pub struct FormData {
    pairs: Vec<(String, String)>,
}

impl FormData {
    pub fn first(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }
}

impl From<Vec<(String, String)>> for FormData {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

impl<const N: usize> From<[(&str, &str); N]> for FormData {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

// -- Schema --

#[derive(Debug, Clone, Copy)]
pub enum Rule {
    Required,
    Email,
    MinLen(usize),
    MaxLen(usize),
    /// Inclusive numeric range.
    Range(i64, i64),
    OneOf(&'static [&'static str]),
    Domain,
    ContainsUpper,
    ContainsSpecial,
}

impl Rule {
    /// Checks one submitted value; returns the user-facing message on failure.
    fn check(&self, value: &str) -> Result<(), String> {
        let ok = match self {
            Self::Required => !value.trim().is_empty(),
            Self::Email => is_valid_email(value),
            Self::MinLen(min) => value.chars().count() >= *min,
            Self::MaxLen(max) => value.chars().count() <= *max,
            Self::Range(lo, hi) => value.parse::<i64>().is_ok_and(|n| (*lo..=*hi).contains(&n)),
            Self::OneOf(allowed) => allowed.contains(&value),
            Self::Domain => is_valid_domain(value),
            Self::ContainsUpper => value.chars().any(char::is_uppercase),
            Self::ContainsSpecial => value.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
        };

        if ok { Ok(()) } else { Err(self.message()) }
    }

    fn message(&self) -> String {
        match self {
            Self::Required => "This field is required".into(),
            Self::Email => "Email address is invalid".into(),
            Self::MinLen(min) => format!("Should be at least {} characters long", min),
            Self::MaxLen(max) => format!("Should be at most {} characters long", max),
            Self::Range(lo, hi) => format!("Should be a number between {} and {}", lo, hi),
            Self::OneOf(allowed) => format!("Should be one of: {}", allowed.join(", ")),
            Self::Domain => "Invalid domain".into(),
            Self::ContainsUpper => "Should contain at least 1 uppercase character".into(),
            Self::ContainsSpecial => "Should contain at least 1 special character".into(),
        }
    }
}

/// What a field binds into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Checkbox: present with `on`, `true` or `1`.
    Flag,
    Number,
    StringList,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Bound from every occurrence of the key rather than the first.
    pub multi: bool,
    pub rules: &'static [Rule],
}

impl Field {
    pub const fn text(name: &'static str, rules: &'static [Rule]) -> Self {
        Self { name, kind: FieldKind::Text, multi: false, rules }
    }

    pub const fn flag(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Flag, multi: false, rules: &[] }
    }

    pub const fn number(name: &'static str, rules: &'static [Rule]) -> Self {
        Self { name, kind: FieldKind::Number, multi: false, rules }
    }

    /// Multi-select: every repeated key, in submission order.
    pub const fn list(name: &'static str, rules: &'static [Rule]) -> Self {
        Self { name, kind: FieldKind::StringList, multi: true, rules }
    }

    pub const fn multi(self) -> Self {
        Self { multi: true, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("field '{0}' is multi-valued but does not bind into a list of strings")]
    UnsupportedFieldType(&'static str),

    #[error("field '{0}' is not declared by the form schema")]
    UnknownField(&'static str),
}

impl From<BindError> for AppError {
    fn from(e: BindError) -> Self {
        AppError::field("_error", &e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Text(String),
    Flag(bool),
    Number(Option<i64>),
    List(Vec<String>),
}

#[derive(Debug, Clone, Copy)]
pub struct Schema {
    fields: &'static [Field],
}

/// Either the form could not be bound at all or some fields failed their rules.
#[derive(Debug, Error)]
pub enum FormError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("form has invalid fields")]
    Invalid(FieldErrors),
}

impl From<FormError> for AppError {
    fn from(e: FormError) -> Self {
        match e {
            FormError::Bind(e) => e.into(),
            FormError::Invalid(errors) => AppError::Validation(errors),
        }
    }
}

impl Schema {
    pub const fn new(fields: &'static [Field]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Binds every declared field from `form` without checking rules.
    pub fn bind(&self, form: &FormData) -> Result<Bound, BindError> {
        let mut values = HashMap::with_capacity(self.fields.len());

        for field in self.fields {
            let value = match (field.kind, field.multi) {
                (FieldKind::StringList, _) => {
                    Value::List(form.all(field.name).into_iter().map(str::to_string).collect())
                }
                (_, true) => return Err(BindError::UnsupportedFieldType(field.name)),
                (FieldKind::Text, false) => {
                    Value::Text(form.first(field.name).unwrap_or_default().trim().to_string())
                }
                (FieldKind::Flag, false) => Value::Flag(
                    form.first(field.name)
                        .is_some_and(|v| matches!(v, "on" | "true" | "1")),
                ),
                (FieldKind::Number, false) => {
                    Value::Number(form.first(field.name).and_then(|v| v.trim().parse().ok()))
                }
            };
            values.insert(field.name, value);
        }

        Ok(Bound { values })
    }

    /// Binds `form` and checks every rule. Text values are checked trimmed;
    /// list values are checked one by one, with `Required` meaning "at least one".
    pub fn validate(&self, form: &FormData) -> Result<Bound, FormError> {
        let bound = self.bind(form)?;
        let mut errors = FieldErrors::new();

        for field in self.fields {
            let submitted: Vec<String> = match bound.values.get(field.name) {
                Some(Value::List(items)) => items.clone(),
                Some(Value::Text(text)) => vec![text.clone()],
                _ => vec![form.first(field.name).unwrap_or_default().trim().to_string()],
            };

            for rule in field.rules {
                let result = match (rule, field.kind) {
                    (Rule::Required, FieldKind::StringList) if submitted.is_empty() => {
                        Err(rule.message())
                    }
                    _ => submitted.iter().try_for_each(|value| rule.check(value)),
                };

                if let Err(message) = result {
                    errors.add(field.name, message);
                    break;
                }
            }
        }

        if errors.is_empty() {
            Ok(bound)
        } else {
            Err(FormError::Invalid(errors))
        }
    }
}

/// Values bound from a form, keyed by field name.
#[derive(Debug, Clone)]
pub struct Bound {
    values: HashMap<&'static str, Value>,
}

impl Bound {
    pub fn text(&self, name: &'static str) -> Result<String, BindError> {
        match self.values.get(name) {
            Some(Value::Text(text)) => Ok(text.clone()),
            Some(_) => Err(BindError::UnsupportedFieldType(name)),
            None => Err(BindError::UnknownField(name)),
        }
    }

    pub fn flag(&self, name: &'static str) -> Result<bool, BindError> {
        match self.values.get(name) {
            Some(Value::Flag(on)) => Ok(*on),
            Some(_) => Err(BindError::UnsupportedFieldType(name)),
            None => Err(BindError::UnknownField(name)),
        }
    }

    pub fn number(&self, name: &'static str) -> Result<Option<i64>, BindError> {
        match self.values.get(name) {
            Some(Value::Number(n)) => Ok(*n),
            Some(_) => Err(BindError::UnsupportedFieldType(name)),
            None => Err(BindError::UnknownField(name)),
        }
    }

    /// Values of a multi-valued field. Anything but a string list is refused.
    pub fn strings(&self, name: &'static str) -> Result<Vec<String>, BindError> {
        match self.values.get(name) {
            Some(Value::List(items)) => Ok(items.clone()),
            Some(_) => Err(BindError::UnsupportedFieldType(name)),
            None => Err(BindError::UnknownField(name)),
        }
    }
}

/// A typed form with a static schema.
pub trait FromForm: Sized {
    const SCHEMA: Schema;

    fn from_bound(bound: &Bound) -> Result<Self, BindError>;
}

/// Validates `form` against `T::SCHEMA` and builds `T`.
pub fn parse<T: FromForm>(form: &FormData) -> Result<T, FormError> {
    let bound = T::SCHEMA.validate(form)?;
    Ok(T::from_bound(&bound)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNUP: Schema = Schema::new(&[
        Field::text("email", &[Rule::Required, Rule::Email]),
        Field::text(
            "password",
            &[Rule::ContainsSpecial, Rule::ContainsUpper, Rule::MinLen(7), Rule::MaxLen(50)],
        ),
        Field::number("age", &[Rule::Range(18, 130)]),
        Field::text("lang", &[Rule::OneOf(&["en", "fr"])]),
    ]);

    #[test]
    fn reports_first_failing_rule_per_field() {
        let form = FormData::from([("email", ""), ("password", "abc"), ("age", "12"), ("lang", "de")]);
        let Err(FormError::Invalid(errors)) = SIGNUP.validate(&form) else {
            panic!("expected field errors");
        };

        assert_eq!(errors.get("email"), Some("This field is required"));
        assert_eq!(errors.get("password"), Some("Should contain at least 1 special character"));
        assert_eq!(errors.get("age"), Some("Should be a number between 18 and 130"));
        assert_eq!(errors.get("lang"), Some("Should be one of: en, fr"));
    }

    #[test]
    fn valid_form_binds_typed_values() {
        let form = FormData::from([
            ("email", " a@b.io "),
            ("password", "Secret!1"),
            ("age", "40"),
            ("lang", "fr"),
        ]);
        let bound = SIGNUP.validate(&form).unwrap();
        assert_eq!(bound.text("email").unwrap(), "a@b.io");
        assert_eq!(bound.number("age").unwrap(), Some(40));
    }

    #[test]
    fn list_fields_keep_every_repeated_key_in_order() {
        const SCHEMA: Schema = Schema::new(&[Field::list("websites", &[]), Field::flag("staging")]);
        let form = FormData::from([("websites", "3"), ("staging", "on"), ("websites", "1")]);

        let bound = SCHEMA.validate(&form).unwrap();
        assert_eq!(bound.strings("websites").unwrap(), vec!["3", "1"]);
        assert!(bound.flag("staging").unwrap());

        let empty = SCHEMA.validate(&FormData::default()).unwrap();
        assert!(empty.strings("websites").unwrap().is_empty());
        assert!(!empty.flag("staging").unwrap());
    }

    #[test]
    fn required_list_needs_one_value() {
        const SCHEMA: Schema = Schema::new(&[Field::list("websites", &[Rule::Required])]);
        let Err(FormError::Invalid(errors)) = SCHEMA.validate(&FormData::default()) else {
            panic!("expected field errors");
        };
        assert_eq!(errors.get("websites"), Some("This field is required"));
    }

    #[test]
    fn multi_value_into_non_list_is_unsupported() {
        const SCHEMA: Schema = Schema::new(&[Field::number("ids", &[]).multi()]);
        let form = FormData::from([("ids", "1"), ("ids", "2")]);
        assert_eq!(
            SCHEMA.bind(&form).unwrap_err(),
            BindError::UnsupportedFieldType("ids")
        );
    }

    #[test]
    fn reading_a_field_as_the_wrong_kind_is_unsupported() {
        const SCHEMA: Schema = Schema::new(&[Field::text("title", &[])]);
        let bound = SCHEMA.bind(&FormData::from([("title", "x")])).unwrap();
        assert_eq!(bound.strings("title").unwrap_err(), BindError::UnsupportedFieldType("title"));
        assert_eq!(bound.text("missing").unwrap_err(), BindError::UnknownField("missing"));
    }

    #[test]
    fn domain_format() {
        assert!(is_valid_domain("example.com"));
        assert!(is_valid_domain("a-b.example.co"));
        assert!(!is_valid_domain("Example.com"));
        assert!(!is_valid_domain("localhost"));
        assert!(!is_valid_domain("example.c"));
        assert!(!is_valid_domain("-bad.com"));
        assert!(!is_valid_domain("https://example.com"));
    }
}
