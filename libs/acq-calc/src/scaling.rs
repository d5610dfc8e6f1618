//! Linear scaling of raw values onto engineering ranges

use crate::codec::round2;
use crate::error::{CalcError, Result};

/// Input/output ranges of a linear scaling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearRange {
    pub input_min: Option<f64>,
    pub input_max: Option<f64>,
    pub output_min: f64,
    pub output_max: f64,
}

/// Scale `value` according to `range`
///
/// - both input bounds: linear remap of `[input_min, input_max]` onto
///   `[output_min, output_max]`
/// - one input bound: proportional extrapolation anchored at that bound
///   (`output_min / input_min` or `output_max / input_max`)
/// - no input bound: `InvalidRange`
///
/// The result is rounded to three decimals, then to two.
pub fn convert_by_linearization(value: f64, range: &LinearRange) -> Result<f64> {
    let scaled = match (range.input_min, range.input_max) {
        (Some(in_min), Some(in_max)) => {
            if in_min == in_max {
                return Err(CalcError::invalid_range("input min equals input max"));
            }
            (value - in_min) / (in_max - in_min) * (range.output_max - range.output_min)
                + range.output_min
        },
        (Some(in_min), None) => proportional(value, in_min, range.output_min)?,
        (None, Some(in_max)) => proportional(value, in_max, range.output_max)?,
        (None, None) => {
            return Err(CalcError::invalid_range(
                "both input min and input max are missing",
            ))
        },
    };

    if !scaled.is_finite() {
        return Err(CalcError::invalid_range(format!(
            "scaling of {value} is not finite"
        )));
    }

    Ok(round2((scaled * 1000.0).round() / 1000.0))
}

fn proportional(value: f64, anchor_in: f64, anchor_out: f64) -> Result<f64> {
    if anchor_in == 0.0 {
        return Err(CalcError::invalid_range("anchor input bound is zero"));
    }
    let ratio = anchor_out / anchor_in;
    Ok(if value < anchor_in {
        anchor_out * (value / anchor_in)
    } else {
        anchor_out + (value - anchor_in) * ratio
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn range(input_min: Option<f64>, input_max: Option<f64>, out_min: f64, out_max: f64) -> LinearRange {
        LinearRange {
            input_min,
            input_max,
            output_min: out_min,
            output_max: out_max,
        }
    }

    #[test]
    fn test_two_point_remap() {
        // 4-20 mA onto 0-100 %
        let r = range(Some(4.0), Some(20.0), 0.0, 100.0);
        assert_eq!(convert_by_linearization(12.0, &r).unwrap(), 50.0);
        assert_eq!(convert_by_linearization(4.0, &r).unwrap(), 0.0);
        assert_eq!(convert_by_linearization(20.0, &r).unwrap(), 100.0);
    }

    #[test]
    fn test_rounds_to_two_decimals() {
        let r = range(Some(0.0), Some(3.0), 0.0, 1.0);
        assert_eq!(convert_by_linearization(1.0, &r).unwrap(), 0.33);
        assert_eq!(convert_by_linearization(2.0, &r).unwrap(), 0.67);
        // below the input range
        assert_eq!(convert_by_linearization(-2.0, &r).unwrap(), -0.67);

        // 0.3349 -> 0.335 -> 0.34
        let r = range(Some(0.0), Some(10_000.0), 0.0, 1.0);
        assert_eq!(convert_by_linearization(3349.0, &r).unwrap(), 0.34);
    }

    #[test]
    fn test_single_bound_extrapolation() {
        let min_only = range(Some(10.0), None, 50.0, 0.0);
        assert_eq!(convert_by_linearization(5.0, &min_only).unwrap(), 25.0);
        assert_eq!(convert_by_linearization(20.0, &min_only).unwrap(), 100.0);

        let max_only = range(None, Some(4.0), 0.0, 8.0);
        assert_eq!(convert_by_linearization(2.0, &max_only).unwrap(), 4.0);
    }

    #[test]
    fn test_invalid_ranges() {
        let equal = range(Some(1.0), Some(1.0), 0.0, 10.0);
        assert!(matches!(
            convert_by_linearization(1.0, &equal),
            Err(CalcError::InvalidRange(_))
        ));

        let none = range(None, None, 0.0, 10.0);
        assert!(matches!(
            convert_by_linearization(1.0, &none),
            Err(CalcError::InvalidRange(_))
        ));

        let zero_anchor = range(Some(0.0), None, 0.0, 10.0);
        assert!(convert_by_linearization(1.0, &zero_anchor).is_err());
    }

    proptest! {
        #[test]
        fn prop_input_min_maps_to_output_min(
            in_min in -1000i32..1000,
            span in 1i32..1000,
            out_min in -1000i32..1000,
            out_span in -1000i32..1000,
        ) {
            let r = range(
                Some(f64::from(in_min)),
                Some(f64::from(in_min + span)),
                f64::from(out_min),
                f64::from(out_min + out_span),
            );
            let scaled = convert_by_linearization(f64::from(in_min), &r).unwrap();
            prop_assert!((scaled - f64::from(out_min)).abs() < 0.01);
        }
    }
}
