//! Decoded point values

use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded reading
///
/// Single-register decodes unwrap to a scalar, multi-register decodes stay a
/// `Sequence` in register order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Sequence(Vec<Reading>),
}

impl Reading {
    /// Unwrap single-element results, keep longer ones as a sequence
    pub fn collapse(mut values: Vec<Reading>) -> Reading {
        if values.len() == 1 {
            values.remove(0)
        } else {
            Reading::Sequence(values)
        }
    }

    /// Numeric view of a scalar reading
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Reading::Integer(v) => Some(*v as f64),
            Reading::Float(v) => Some(*v),
            Reading::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Reading::Text(_) | Reading::Sequence(_) => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Reading::Sequence(_))
    }

    /// Convert a JSON document (e.g. an HTTP response body) into a reading
    ///
    /// Objects are kept as their compact JSON text; `null` yields nothing.
    pub fn from_json(value: serde_json::Value) -> Option<Reading> {
        use serde_json::Value;

        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Reading::Bool(b)),
            Value::Number(n) => n
                .as_i64()
                .map(Reading::Integer)
                .or_else(|| n.as_f64().map(Reading::Float)),
            Value::String(s) => Some(Reading::Text(s)),
            Value::Array(items) => Some(Reading::Sequence(
                items.into_iter().filter_map(Reading::from_json).collect(),
            )),
            object @ Value::Object(_) => Some(Reading::Text(object.to_string())),
        }
    }
}

impl From<f64> for Reading {
    fn from(value: f64) -> Self {
        Reading::Float(value)
    }
}

impl From<i64> for Reading {
    fn from(value: i64) -> Self {
        Reading::Integer(value)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Bool(v) => write!(f, "{v}"),
            Reading::Integer(v) => write!(f, "{v}"),
            Reading::Float(v) => write!(f, "{v}"),
            Reading::Text(v) => f.write_str(v),
            Reading::Sequence(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collapse() {
        assert_eq!(
            Reading::collapse(vec![Reading::Integer(7)]),
            Reading::Integer(7)
        );
        assert_eq!(
            Reading::collapse(vec![Reading::Integer(1), Reading::Integer(2)]),
            Reading::Sequence(vec![Reading::Integer(1), Reading::Integer(2)])
        );
    }

    #[test]
    fn test_untagged_json_shape() {
        let value = Reading::Sequence(vec![Reading::Integer(1), Reading::Float(2.5)]);
        assert_eq!(serde_json::to_value(&value).unwrap(), json!([1, 2.5]));

        let parsed: Reading = serde_json::from_value(json!(12.75)).unwrap();
        assert_eq!(parsed, Reading::Float(12.75));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Reading::from_json(json!(null)), None);
        assert_eq!(Reading::from_json(json!(3)), Some(Reading::Integer(3)));
        assert_eq!(
            Reading::from_json(json!({"t": 1})),
            Some(Reading::Text("{\"t\":1}".to_string()))
        );
        assert_eq!(Reading::Integer(4).to_string(), "4");
    }
}
