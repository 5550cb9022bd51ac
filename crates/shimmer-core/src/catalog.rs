//! Static parameter catalog.
//!
//! This module provides the fixed table of effect parameters:
//! - [`ParameterUnit`] - Display unit of a parameter
//! - [`ParameterDescriptor`] - Immutable description of one parameter
//! - [`ParameterCatalog`] - Dense, id-ordered table of descriptors
//! - [`EffectParameter`] - Typed names for the catalog's ids
//!
//! The catalog never changes after construction, so it can be read from any
//! thread (including the render thread) without synchronization.

use crate::error::{PluginError, PluginResult};
use crate::parameter_format::Formatter;
use crate::types::{ParameterId, ParameterValue, MAX_PARAMETERS};

/// Display unit of a parameter.
///
/// The discriminants match Apple's `AudioUnitParameterUnit` values so they can be
/// handed to an AU parameter tree unchanged.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ParameterUnit {
    /// Unitless ratio (mix amounts, feedback, size).
    #[default]
    Ratio = 0,
    /// Relative pitch in semitones.
    Semitones = 10,
    /// Time in milliseconds.
    Milliseconds = 24,
}

impl ParameterUnit {
    /// Raw `AudioUnitParameterUnit` value.
    pub const fn as_au_unit(self) -> u32 {
        self as u32
    }

    /// Formatter used to display values of this unit.
    pub const fn formatter(self) -> Formatter {
        match self {
            Self::Ratio => Formatter::Float { precision: 2 },
            Self::Semitones => Formatter::Semitones,
            Self::Milliseconds => Formatter::Milliseconds { precision: 0 },
        }
    }
}

/// Immutable description of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterDescriptor {
    /// Dense catalog address.
    pub id: ParameterId,
    /// Stable string identifier, used as the key in saved state.
    pub identifier: &'static str,
    /// Human readable name.
    pub name: &'static str,
    /// Minimum plain value.
    pub min: ParameterValue,
    /// Maximum plain value.
    pub max: ParameterValue,
    /// Default plain value.
    pub default: ParameterValue,
    /// Display unit.
    pub unit: ParameterUnit,
}

impl ParameterDescriptor {
    /// Create a new descriptor.
    pub const fn new(
        id: ParameterId,
        identifier: &'static str,
        name: &'static str,
        min: ParameterValue,
        max: ParameterValue,
        default: ParameterValue,
        unit: ParameterUnit,
    ) -> Self {
        Self {
            id,
            identifier,
            name,
            min,
            max,
            default,
            unit,
        }
    }

    /// Clamp a value into `[min, max]`.
    ///
    /// NaN has no meaningful position in the range and maps to the default.
    #[inline]
    pub fn clamp(&self, value: ParameterValue) -> ParameterValue {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// Format a value for display, including its unit ("375 ms", "12 st", "0.40").
    pub fn display(&self, value: ParameterValue) -> String {
        let formatter = self.unit.formatter();
        let text = formatter.text(value as f64);
        match formatter.unit() {
            "" => text,
            unit => format!("{} {}", text, unit),
        }
    }

    /// Parse a user-entered string into a clamped plain value.
    pub fn parse(&self, text: &str) -> Option<ParameterValue> {
        self.unit
            .formatter()
            .parse(text)
            .map(|v| self.clamp(v as ParameterValue))
    }
}

/// Typed names for the catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EffectParameter {
    DelayTime = 0,
    DelayFeedback = 1,
    DelayMix = 2,
    ReverbSize = 3,
    ReverbMix = 4,
    ShimmerAmount = 5,
    ShimmerPitch = 6,
    DryWet = 7,
}

impl EffectParameter {
    /// Number of parameters.
    pub const COUNT: usize = 8;

    /// All parameters in catalog order.
    pub const ALL: [EffectParameter; Self::COUNT] = [
        Self::DelayTime,
        Self::DelayFeedback,
        Self::DelayMix,
        Self::ReverbSize,
        Self::ReverbMix,
        Self::ShimmerAmount,
        Self::ShimmerPitch,
        Self::DryWet,
    ];

    /// Catalog id of this parameter.
    #[inline]
    pub const fn id(self) -> ParameterId {
        self as ParameterId
    }

    /// Look up the typed name for a raw id.
    pub fn from_id(id: ParameterId) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }
}

impl From<EffectParameter> for ParameterId {
    fn from(parameter: EffectParameter) -> Self {
        parameter.id()
    }
}

static EFFECT_DESCRIPTORS: [ParameterDescriptor; EffectParameter::COUNT] = [
    // Dotted eighth at 120 BPM
    ParameterDescriptor::new(
        0,
        "delayTime",
        "Delay Time",
        10.0,
        2000.0,
        375.0,
        ParameterUnit::Milliseconds,
    ),
    ParameterDescriptor::new(1, "delayFeedback", "Feedback", 0.0, 0.95, 0.4, ParameterUnit::Ratio),
    ParameterDescriptor::new(2, "delayMix", "Delay Mix", 0.0, 1.0, 0.5, ParameterUnit::Ratio),
    ParameterDescriptor::new(3, "reverbSize", "Reverb Size", 0.0, 1.0, 0.7, ParameterUnit::Ratio),
    ParameterDescriptor::new(4, "reverbMix", "Reverb Mix", 0.0, 1.0, 0.3, ParameterUnit::Ratio),
    ParameterDescriptor::new(5, "shimmerAmount", "Shimmer", 0.0, 1.0, 0.2, ParameterUnit::Ratio),
    // One octave up
    ParameterDescriptor::new(
        6,
        "shimmerPitch",
        "Shimmer Pitch",
        -12.0,
        12.0,
        12.0,
        ParameterUnit::Semitones,
    ),
    ParameterDescriptor::new(7, "dryWet", "Dry/Wet", 0.0, 1.0, 0.5, ParameterUnit::Ratio),
];

/// Dense table of parameter descriptors keyed by id.
#[derive(Debug, Clone, Copy)]
pub struct ParameterCatalog {
    descriptors: &'static [ParameterDescriptor],
}

impl ParameterCatalog {
    /// The effect's fixed catalog.
    pub const fn effect() -> Self {
        Self {
            descriptors: &EFFECT_DESCRIPTORS,
        }
    }

    /// Build a catalog from a custom table.
    ///
    /// Returns an error if the table violates the catalog invariants.
    pub fn from_static(descriptors: &'static [ParameterDescriptor]) -> PluginResult<Self> {
        let catalog = Self { descriptors };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Describe a parameter.
    #[inline]
    pub fn describe(&self, id: ParameterId) -> PluginResult<&'static ParameterDescriptor> {
        self.descriptors
            .get(id as usize)
            .ok_or(PluginError::UnknownParameter(id))
    }

    /// Find a descriptor by its string identifier.
    pub fn find(&self, identifier: &str) -> Option<&'static ParameterDescriptor> {
        self.descriptors.iter().find(|d| d.identifier == identifier)
    }

    /// Number of parameters.
    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the catalog has no parameters.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Iterate descriptors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &'static ParameterDescriptor> {
        self.descriptors.iter()
    }

    /// Check that ids are contiguous from zero, identifiers are unique and every
    /// default lies within its range.
    pub fn validate(&self) -> PluginResult<()> {
        if self.descriptors.len() > MAX_PARAMETERS {
            return Err(PluginError::ResourceAllocationFailure(format!(
                "catalog has {} parameters, at most {} are supported",
                self.descriptors.len(),
                MAX_PARAMETERS
            )));
        }

        for (index, descriptor) in self.descriptors.iter().enumerate() {
            if descriptor.id as usize != index {
                return Err(PluginError::ResourceAllocationFailure(format!(
                    "parameter '{}' has id {} at position {}",
                    descriptor.identifier, descriptor.id, index
                )));
            }
            if !(descriptor.min <= descriptor.default && descriptor.default <= descriptor.max) {
                return Err(PluginError::ResourceAllocationFailure(format!(
                    "parameter '{}' default {} outside [{}, {}]",
                    descriptor.identifier, descriptor.default, descriptor.min, descriptor.max
                )));
            }
            let duplicate = self.descriptors[..index]
                .iter()
                .any(|other| other.identifier == descriptor.identifier);
            if duplicate {
                return Err(PluginError::ResourceAllocationFailure(format!(
                    "duplicate parameter identifier '{}'",
                    descriptor.identifier
                )));
            }
        }

        Ok(())
    }
}

impl Default for ParameterCatalog {
    fn default() -> Self {
        Self::effect()
    }
}
