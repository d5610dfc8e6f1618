//! Accumulation actions
//!
//! Each action maps the current accumulated value and a parameter to the next
//! accumulated value. A missing current value or parameter counts as zero for
//! arithmetic actions.

use std::str::FromStr;

use crate::error::CalcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Overwrite,
    Increment,
    Decrement,
    Multiply,
    Divide,
    Reset,
    Keep,
    Fixed,
    Discard,
    Continue,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Increment => "increment",
            Self::Decrement => "decrement",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Reset => "reset",
            Self::Keep => "keep",
            Self::Fixed => "fixed",
            Self::Discard => "discard",
            Self::Continue => "continue",
        }
    }

    pub fn apply(&self, current: Option<f64>, param: Option<f64>) -> Option<f64> {
        let cur = current.unwrap_or(0.0);
        let p = param.unwrap_or(0.0);
        match self {
            Self::Overwrite | Self::Fixed => param,
            Self::Increment => Some(cur + p),
            Self::Decrement => Some(cur - p),
            Self::Multiply => Some(cur * p),
            Self::Divide => match param {
                Some(divisor) if divisor != 0.0 => Some(cur / divisor),
                _ => None,
            },
            Self::Reset => Some(0.0),
            Self::Keep | Self::Discard | Self::Continue => current,
        }
    }
}

impl FromStr for Action {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overwrite" => Ok(Self::Overwrite),
            "increment" => Ok(Self::Increment),
            "decrement" => Ok(Self::Decrement),
            "multiply" => Ok(Self::Multiply),
            "divide" => Ok(Self::Divide),
            "reset" => Ok(Self::Reset),
            "keep" => Ok(Self::Keep),
            "fixed" => Ok(Self::Fixed),
            "discard" => Ok(Self::Discard),
            "continue" => Ok(Self::Continue),
            other => Err(CalcError::unsupported_operation(other)),
        }
    }
}

/// Apply the action named `name`; unknown names yield nothing
pub fn apply_action(name: &str, current: Option<f64>, param: Option<f64>) -> Option<f64> {
    name.parse::<Action>()
        .ok()
        .and_then(|action| action.apply(current, param))
}

/// Increase between two consecutive readings
///
/// With `use_abs` the absolute difference; otherwise the increase, zero when
/// unchanged, nothing when the value went down or either side is missing.
pub fn accumulated_difference(
    new_value: Option<f64>,
    previous: Option<f64>,
    use_abs: bool,
) -> Option<f64> {
    let (new_value, previous) = (new_value?, previous?);
    if use_abs {
        Some((new_value - previous).abs())
    } else if new_value > previous {
        Some(new_value - previous)
    } else if new_value == previous {
        Some(0.0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_actions() {
        assert_eq!(apply_action("increment", Some(2.0), Some(3.0)), Some(5.0));
        assert_eq!(apply_action("increment", None, Some(3.0)), Some(3.0));
        assert_eq!(apply_action("decrement", Some(2.0), Some(3.0)), Some(-1.0));
        assert_eq!(apply_action("multiply", Some(2.0), Some(3.0)), Some(6.0));
        assert_eq!(apply_action("divide", Some(6.0), Some(3.0)), Some(2.0));
    }

    #[test]
    fn test_divide_by_zero_yields_none() {
        assert_eq!(apply_action("divide", Some(6.0), Some(0.0)), None);
        assert_eq!(apply_action("divide", Some(6.0), None), None);
    }

    #[test]
    fn test_state_actions() {
        assert_eq!(apply_action("overwrite", Some(1.0), Some(9.0)), Some(9.0));
        assert_eq!(apply_action("fixed", Some(1.0), Some(4.0)), Some(4.0));
        assert_eq!(apply_action("reset", Some(7.0), None), Some(0.0));
        assert_eq!(apply_action("keep", Some(7.0), Some(1.0)), Some(7.0));
        assert_eq!(apply_action("discard", Some(7.0), Some(1.0)), Some(7.0));
        assert_eq!(apply_action("continue", None, Some(1.0)), None);
    }

    #[test]
    fn test_unknown_action() {
        assert_eq!(apply_action("explode", Some(1.0), Some(1.0)), None);
    }

    #[test]
    fn test_accumulated_difference() {
        assert_eq!(accumulated_difference(Some(10.0), Some(7.0), false), Some(3.0));
        assert_eq!(accumulated_difference(Some(7.0), Some(7.0), false), Some(0.0));
        assert_eq!(accumulated_difference(Some(5.0), Some(7.0), false), None);
        assert_eq!(accumulated_difference(Some(5.0), Some(7.0), true), Some(2.0));
        assert_eq!(accumulated_difference(None, Some(7.0), true), None);
    }
}
