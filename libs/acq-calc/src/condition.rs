//! Threshold evaluation

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::codec::round2;
use crate::error::{CalcError, Result};

/// Comparison operators accepted in threshold rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    pub fn compare(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Lt => left < right,
            Self::Le => left <= right,
        }
    }
}

impl FromStr for Operator {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            other => Err(CalcError::unsupported_operator(other)),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a threshold evaluation
///
/// `status` is false when the rule itself is invalid; `result` is then unset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionOutcome {
    pub status: bool,
    pub result: Option<bool>,
    pub message: String,
}

impl ConditionOutcome {
    /// True only for a valid rule that evaluated true
    pub fn passed(&self) -> bool {
        self.status && self.result == Some(true)
    }
}

/// Compare two values rounded to two decimals
///
/// Never fails: an invalid operator is reported through the outcome.
pub fn evaluate_condition(left: f64, operator: &str, right: f64) -> ConditionOutcome {
    match operator.parse::<Operator>() {
        Ok(op) => ConditionOutcome {
            status: true,
            result: Some(op.compare(round2(left), round2(right))),
            message: "condition evaluated".to_string(),
        },
        Err(e) => ConditionOutcome {
            status: false,
            result: None,
            message: format!("condition evaluation failed: {e}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounded_equality() {
        let outcome = evaluate_condition(5.0, "==", 5.001);
        assert!(outcome.status);
        assert_eq!(outcome.result, Some(true));
        assert!(outcome.passed());
    }

    #[test]
    fn test_all_operators() {
        assert_eq!(evaluate_condition(2.0, "!=", 1.0).result, Some(true));
        assert_eq!(evaluate_condition(2.0, ">", 1.0).result, Some(true));
        assert_eq!(evaluate_condition(1.0, ">=", 1.0).result, Some(true));
        assert_eq!(evaluate_condition(2.0, "<", 1.0).result, Some(false));
        assert_eq!(evaluate_condition(1.004, "<=", 1.0).result, Some(true));
    }

    #[test]
    fn test_unsupported_operator() {
        let outcome = evaluate_condition(1.0, "=~", 1.0);
        assert!(!outcome.status);
        assert_eq!(outcome.result, None);
        assert!(outcome.message.contains("=~"));
        assert!(!outcome.passed());
    }
}
