//! Declarative per-field rules for edit forms and imported rows.
//!
//! Each field stops at its first failing rule, but every field is checked,
//! so one submission reports all invalid fields at once.

use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    Required,
    /// Absent or null values skip the remaining rules.
    Nullable,
    String,
    Integer,
    Numeric,
    /// Character count for strings, value for numbers.
    Min(f64),
    /// Character count for strings, value for numbers.
    Max(f64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for messages in self.0.values() {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                f.write_str(message)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Integer,
    Numeric,
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    fields: Vec<(&'static str, Vec<Rule>)>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, rules: &[Rule]) -> Self {
        self.fields.push((name, rules.to_vec()));
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    pub fn validate(&self, input: &Map<String, Value>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for (field, rules) in &self.fields {
            if let Some(message) = check_field(field, rules, input.get(*field)) {
                errors.add(*field, message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn check_field(field: &str, rules: &[Rule], value: Option<&Value>) -> Option<String> {
    let label = field.replace('_', " ");
    let value = value.filter(|v| !is_blank(v));
    let kind = rules.iter().find_map(|rule| match rule {
        Rule::String => Some(Kind::Text),
        Rule::Integer => Some(Kind::Integer),
        Rule::Numeric => Some(Kind::Numeric),
        _ => None,
    });

    let Some(value) = value else {
        return rules
            .contains(&Rule::Required)
            .then(|| format!("The {label} field is required."));
    };

    for rule in rules {
        let failure = match *rule {
            Rule::Required | Rule::Nullable => None,
            Rule::String => (!value.is_string()).then(|| format!("The {label} must be a string.")),
            Rule::Integer => {
                as_i64(value).is_none().then(|| format!("The {label} must be an integer."))
            }
            Rule::Numeric => as_f64(value).is_none().then(|| format!("The {label} must be a number.")),
            Rule::Min(bound) => match size_of(kind, value) {
                Some(size) if size < bound => Some(match kind {
                    Some(Kind::Text) => {
                        format!("The {label} must be at least {} characters.", fmt_bound(bound))
                    }
                    _ => format!("The {label} must be at least {}.", fmt_bound(bound)),
                }),
                _ => None,
            },
            Rule::Max(bound) => match size_of(kind, value) {
                Some(size) if size > bound => Some(match kind {
                    Some(Kind::Text) => format!(
                        "The {label} must not be greater than {} characters.",
                        fmt_bound(bound)
                    ),
                    _ => format!("The {label} must not be greater than {}.", fmt_bound(bound)),
                }),
                _ => None,
            },
        };
        if failure.is_some() {
            return failure;
        }
    }
    None
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn size_of(kind: Option<Kind>, value: &Value) -> Option<f64> {
    match kind {
        Some(Kind::Text) => value.as_str().map(|s| s.chars().count() as f64),
        Some(Kind::Integer) => as_i64(value).map(|v| v as f64),
        Some(Kind::Numeric) | None => as_f64(value),
    }
}

fn fmt_bound(bound: f64) -> String {
    if bound.fract() == 0.0 && bound.abs() < 1e15 {
        format!("{}", bound as i64)
    } else {
        format!("{bound}")
    }
}

/// Reads an integer from a JSON number or a numeric string.
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a finite number from a JSON number or a numeric string.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

/// Non-blank trimmed string value of a field.
pub fn text(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

pub fn integer(fields: &Map<String, Value>, name: &str) -> Option<i64> {
    fields.get(name).filter(|v| !is_blank(v)).and_then(as_i64)
}

pub fn number(fields: &Map<String, Value>, name: &str) -> Option<f64> {
    fields.get(name).filter(|v| !is_blank(v)).and_then(as_f64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rules() -> RuleSet {
        RuleSet::new()
            .field("name", &[Rule::Required, Rule::String, Rule::Max(5.0)])
            .field("quantity", &[Rule::Required, Rule::Integer, Rule::Min(1.0)])
            .field("cost", &[Rule::Required, Rule::Numeric, Rule::Min(0.0)])
            .field("note", &[Rule::Nullable, Rule::String, Rule::Max(3.0)])
    }

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn accepts_valid_input_with_null_optional_field() {
        let fields = input(json!({"name": "chair", "quantity": "2", "cost": 3.5, "note": null}));
        rules().validate(&fields).expect("valid");
    }

    #[test]
    fn reports_every_invalid_field_at_once() {
        let fields = input(json!({"name": "", "quantity": 0, "cost": -1, "note": "long"}));
        let errors = rules().validate(&fields).expect_err("invalid");
        assert_eq!(errors.field_names(), vec!["cost", "name", "note", "quantity"]);
        assert_eq!(errors.messages("cost"), ["The cost must be at least 0."]);
        assert_eq!(errors.messages("name"), ["The name field is required."]);
        assert_eq!(
            errors.messages("note"),
            ["The note must not be greater than 3 characters."]
        );
    }

    #[test]
    fn stops_at_first_failing_rule_per_field() {
        let fields = input(json!({"name": "chair", "quantity": "many", "cost": 1}));
        let errors = rules().validate(&fields).expect_err("invalid");
        assert_eq!(errors.messages("quantity"), ["The quantity must be an integer."]);
    }

    #[test]
    fn string_length_counts_characters_not_bytes() {
        let fields = input(json!({"name": "ééééé", "quantity": 1, "cost": 0}));
        rules().validate(&fields).expect("five characters fit");
    }

    #[test]
    fn coercion_helpers_read_strings_and_numbers() {
        let fields = input(json!({"a": " 12 ", "b": 4.0, "c": "  ", "d": "x"}));
        assert_eq!(integer(&fields, "a"), Some(12));
        assert_eq!(integer(&fields, "b"), Some(4));
        assert_eq!(integer(&fields, "c"), None);
        assert_eq!(number(&fields, "d"), None);
        assert_eq!(text(&fields, "a").as_deref(), Some("12"));
        assert_eq!(text(&fields, "c"), None);
    }
}
