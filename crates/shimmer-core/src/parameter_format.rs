//! Parameter value formatting and parsing.
//!
//! The [`Formatter`] converts between plain parameter values and display strings.
//! Value text and unit are kept apart:
//! - `text()` returns the bare value (e.g. "375", "0.40")
//! - `unit()` returns the unit string (e.g. "ms", "st")
//!
//! AU parameter trees carry the unit separately from the value string, and
//! [`ParameterDescriptor::display`](crate::ParameterDescriptor::display) joins the
//! two for UIs.

/// Parameter value formatter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Formatter {
    /// Generic float with configurable precision (e.g., "0.40").
    Float {
        /// Number of decimal places.
        precision: usize,
    },

    /// Milliseconds formatter.
    ///
    /// Format: "375" (unit "ms" via `unit()`)
    Milliseconds {
        /// Number of decimal places.
        precision: usize,
    },

    /// Semitones formatter for pitch shifting, rounded to whole semitones.
    ///
    /// Format: "12", "-7" (unit "st" via `unit()`)
    Semitones,
}

impl Formatter {
    /// Convert a plain value to a display string (without unit).
    pub fn text(&self, value: f64) -> String {
        match self {
            Formatter::Float { precision } | Formatter::Milliseconds { precision } => {
                format!("{:.prec$}", value, prec = *precision)
            }

            Formatter::Semitones => {
                let st = value.round() as i64;
                format!("{}", st)
            }
        }
    }

    /// Parse a display string to a plain value.
    ///
    /// Returns `None` if the string cannot be parsed. The unit suffix is optional.
    pub fn parse(&self, s: &str) -> Option<f64> {
        let s = s.trim();

        let trimmed = match self {
            Formatter::Float { .. } => s,
            Formatter::Milliseconds { .. } => s
                .strip_suffix("ms")
                .unwrap_or(s)
                .trim(),
            Formatter::Semitones => s
                .strip_suffix("st")
                .unwrap_or(s)
                .trim()
                .trim_start_matches('+'),
        };

        let value: f64 = trimmed.parse().ok()?;
        value.is_finite().then_some(value)
    }

    /// Get the unit string for this formatter.
    pub fn unit(&self) -> &'static str {
        match self {
            Formatter::Float { .. } => "",
            Formatter::Milliseconds { .. } => "ms",
            Formatter::Semitones => "st",
        }
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Formatter::Float { precision: 2 }
    }
}
