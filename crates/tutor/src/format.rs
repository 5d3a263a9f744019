//! Display formats for bound values.

use crate::value::{Value, format_number};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCode {
    /// Round to the nearest integer.
    Integer,
    Fixed1,
    Fixed2,
    /// Fraction shown as a whole percentage.
    Percent,
    Percent1,
    /// Two decimals with an explicit sign.
    Signed,
}

impl FormatCode {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "int" => Some(Self::Integer),
            "fixed1" => Some(Self::Fixed1),
            "fixed2" => Some(Self::Fixed2),
            "percent" => Some(Self::Percent),
            "percent1" => Some(Self::Percent1),
            "signed" => Some(Self::Signed),
            _ => None,
        }
    }

    pub fn apply(self, number: f64) -> String {
        if !number.is_finite() {
            return format_number(number);
        }
        match self {
            Self::Integer => format_number(round_half_up(number)),
            Self::Fixed1 => format!("{number:.1}"),
            Self::Fixed2 => format!("{number:.2}"),
            Self::Percent => format!("{:.0}%", number * 100.0),
            Self::Percent1 => format!("{:.1}%", number * 100.0),
            Self::Signed => format!("{number:+.2}"),
        }
    }
}

/// Half-way values round towards positive infinity: `2.5` to `3`, `-2.5` to `-2`.
pub fn round_half_up(number: f64) -> f64 {
    (number + 0.5).floor()
}

/// Formats `value` with an optional format code.
///
/// Unknown codes and non-numeric values pass through as their plain display.
pub fn format_value(value: &Value, code: Option<&str>) -> String {
    match (value, code.and_then(FormatCode::parse)) {
        (Value::Number(number), Some(format)) => format.apply(*number),
        _ => value.to_string(),
    }
}
