//! Processed-value derivation for decoded readings

use acq_model::{ConvertMeta, ConvertMethod, Reading};

use crate::error::Result;
use crate::scaling::{convert_by_linearization, LinearRange};
use crate::units::convert_by_unit;

/// Derive the processed value of a decoded reading
///
/// Returns `Ok(None)` when the point does not derive a value, when the reading
/// is not a numeric scalar, or when the unit pair is unknown. Scaling errors
/// are returned so the caller can record them while keeping the raw reading.
pub fn derive(
    reading: &Reading,
    is_reading: bool,
    convert: Option<&ConvertMeta>,
) -> Result<Option<f64>> {
    if !is_reading {
        return Ok(None);
    }
    let Some(value) = reading.as_f64() else {
        return Ok(None);
    };

    let Some(convert) = convert.filter(|c| c.is_active) else {
        return Ok(Some(value));
    };

    match &convert.method {
        ConvertMethod::Automatic {
            unit_input,
            unit_output,
        } => Ok(convert_by_unit(value, unit_input, unit_output)),
        ConvertMethod::Manually {
            input_min,
            input_max,
            output_min,
            output_max,
        } => {
            let range = LinearRange {
                input_min: *input_min,
                input_max: *input_max,
                output_min: *output_min,
                output_max: *output_max,
            };
            convert_by_linearization(value, &range).map(Some)
        },
    }
}
