//! Physical unit conversion
//!
//! Every unit maps to a base unit of its dimension through
//! `base = (value + offset) * factor`. Conversion is only defined between
//! units of the same dimension.

use crate::error::{CalcError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Length,
    Mass,
    Temperature,
    Pressure,
    Volume,
    Energy,
    Power,
    Time,
    Current,
    Voltage,
    Frequency,
}

struct UnitDef {
    dimension: Dimension,
    factor: f64,
    offset: f64,
}

const fn linear(dimension: Dimension, factor: f64) -> UnitDef {
    UnitDef {
        dimension,
        factor,
        offset: 0.0,
    }
}

fn lookup(unit: &str) -> Option<UnitDef> {
    use Dimension::*;

    let def = match unit {
        // Length, base metre
        "mm" => linear(Length, 1e-3),
        "cm" => linear(Length, 1e-2),
        "m" => linear(Length, 1.0),
        "km" => linear(Length, 1e3),
        "in" => linear(Length, 0.0254),
        "ft" => linear(Length, 0.3048),
        "yd" => linear(Length, 0.9144),
        "mi" => linear(Length, 1609.344),

        // Mass, base kilogram
        "mg" => linear(Mass, 1e-6),
        "g" => linear(Mass, 1e-3),
        "kg" => linear(Mass, 1.0),
        "t" => linear(Mass, 1e3),
        "oz" => linear(Mass, 0.028_349_523_125),
        "lb" => linear(Mass, 0.453_592_37),

        // Temperature, base kelvin
        "K" => linear(Temperature, 1.0),
        "C" => UnitDef {
            dimension: Temperature,
            factor: 1.0,
            offset: 273.15,
        },
        "F" => UnitDef {
            dimension: Temperature,
            factor: 5.0 / 9.0,
            offset: 459.67,
        },

        // Pressure, base pascal
        "Pa" => linear(Pressure, 1.0),
        "kPa" => linear(Pressure, 1e3),
        "MPa" => linear(Pressure, 1e6),
        "mbar" => linear(Pressure, 100.0),
        "bar" => linear(Pressure, 1e5),
        "psi" => linear(Pressure, 6_894.757_293_168),
        "atm" => linear(Pressure, 101_325.0),
        "mmHg" => linear(Pressure, 133.322_387_415),

        // Volume, base cubic metre
        "ml" | "mL" => linear(Volume, 1e-6),
        "l" | "L" => linear(Volume, 1e-3),
        "m3" => linear(Volume, 1.0),
        "gal" => linear(Volume, 0.003_785_411_784),

        // Energy, base joule
        "J" => linear(Energy, 1.0),
        "kJ" => linear(Energy, 1e3),
        "MJ" => linear(Energy, 1e6),
        "Wh" => linear(Energy, 3.6e3),
        "kWh" => linear(Energy, 3.6e6),
        "MWh" => linear(Energy, 3.6e9),
        "cal" => linear(Energy, 4.184),
        "kcal" => linear(Energy, 4_184.0),

        // Power, base watt
        "W" => linear(Power, 1.0),
        "kW" => linear(Power, 1e3),
        "MW" => linear(Power, 1e6),
        "hp" => linear(Power, 745.699_871_582_270_2),

        // Time, base second
        "ms" => linear(Time, 1e-3),
        "s" => linear(Time, 1.0),
        "min" => linear(Time, 60.0),
        "h" => linear(Time, 3_600.0),
        "d" => linear(Time, 86_400.0),

        // Electrical
        "mA" => linear(Current, 1e-3),
        "A" => linear(Current, 1.0),
        "kA" => linear(Current, 1e3),
        "mV" => linear(Voltage, 1e-3),
        "V" => linear(Voltage, 1.0),
        "kV" => linear(Voltage, 1e3),
        "Hz" => linear(Frequency, 1.0),
        "kHz" => linear(Frequency, 1e3),

        _ => return None,
    };
    Some(def)
}

/// Convert `value` from `from` to `to`
pub fn convert_unit(value: f64, from: &str, to: &str) -> Result<f64> {
    let (Some(src), Some(dst)) = (lookup(from), lookup(to)) else {
        return Err(CalcError::unsupported_unit(from, to));
    };
    if src.dimension != dst.dimension {
        return Err(CalcError::unsupported_unit(from, to));
    }

    let base = (value + src.offset) * src.factor;
    Ok(base / dst.factor - dst.offset)
}

/// Unit conversion that yields nothing instead of failing
pub fn convert_by_unit(value: f64, from: &str, to: &str) -> Option<f64> {
    match convert_unit(value, from, to) {
        Ok(converted) => Some(converted),
        Err(e) => {
            tracing::debug!("{}", e);
            None
        },
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_temperature() {
        assert!(approx(convert_by_unit(100.0, "C", "F").unwrap(), 212.0));
        assert!(approx(convert_by_unit(32.0, "F", "C").unwrap(), 0.0));
        assert!(approx(convert_by_unit(0.0, "C", "K").unwrap(), 273.15));
    }

    #[test]
    fn test_linear_units() {
        assert!(approx(convert_by_unit(1.5, "kWh", "Wh").unwrap(), 1500.0));
        assert!(approx(convert_by_unit(1.0, "bar", "kPa").unwrap(), 100.0));
        assert!(approx(convert_by_unit(90.0, "min", "h").unwrap(), 1.5));
    }

    #[test]
    fn test_unsupported_pairs_yield_none() {
        assert_eq!(convert_by_unit(1.0, "kg", "m"), None);
        assert_eq!(convert_by_unit(1.0, "furlong", "m"), None);
        assert!(matches!(
            convert_unit(1.0, "kg", "m"),
            Err(CalcError::UnsupportedUnit { .. })
        ));
    }
}
