//! Typed control bindings for editors.
//!
//! An editor addresses its controls by [`ControlId`] (section, slot) and looks up
//! the bound [`EffectParameter`] in a [`ControlLayout`] built once up front, so no
//! widget ever needs to carry a raw parameter id around.

use crate::catalog::EffectParameter;
use crate::error::{PluginError, PluginResult};
use crate::tree::ParameterAutomationTree;
use crate::types::ParameterValue;

/// Position of a control in the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlId {
    /// Index into [`ControlLayout::sections`].
    pub section: usize,
    /// Index within the section.
    pub slot: usize,
}

/// A titled group of controls.
#[derive(Debug, Clone, Copy)]
pub struct ControlSection {
    /// Heading shown above the group.
    pub title: &'static str,
    /// Parameters in display order.
    pub parameters: &'static [EffectParameter],
}

static EFFECT_SECTIONS: [ControlSection; 4] = [
    ControlSection {
        title: "DELAY",
        parameters: &[
            EffectParameter::DelayTime,
            EffectParameter::DelayFeedback,
            EffectParameter::DelayMix,
        ],
    },
    ControlSection {
        title: "REVERB",
        parameters: &[EffectParameter::ReverbSize, EffectParameter::ReverbMix],
    },
    ControlSection {
        title: "SHIMMER MAGIC",
        parameters: &[EffectParameter::ShimmerAmount, EffectParameter::ShimmerPitch],
    },
    ControlSection {
        title: "MASTER",
        parameters: &[EffectParameter::DryWet],
    },
];

/// Association table between editor controls and parameters.
#[derive(Debug, Clone)]
pub struct ControlLayout {
    sections: &'static [ControlSection],
    /// Reverse lookup indexed by parameter id.
    controls: [Option<ControlId>; EffectParameter::COUNT],
}

impl ControlLayout {
    /// The effect's editor layout.
    pub fn effect() -> PluginResult<Self> {
        Self::from_sections(&EFFECT_SECTIONS)
    }

    /// Build a layout, checking that every parameter is bound exactly once.
    pub fn from_sections(sections: &'static [ControlSection]) -> PluginResult<Self> {
        let mut controls = [None; EffectParameter::COUNT];

        for (section_index, section) in sections.iter().enumerate() {
            for (slot, parameter) in section.parameters.iter().enumerate() {
                let entry = &mut controls[parameter.id() as usize];
                if entry.is_some() {
                    return Err(PluginError::State(format!(
                        "{:?} is bound to more than one control",
                        parameter
                    )));
                }
                *entry = Some(ControlId {
                    section: section_index,
                    slot,
                });
            }
        }

        if let Some(missing) = EffectParameter::ALL
            .iter()
            .find(|p| controls[p.id() as usize].is_none())
        {
            return Err(PluginError::State(format!("{:?} has no control", missing)));
        }

        Ok(Self { sections, controls })
    }

    /// Sections in display order.
    pub fn sections(&self) -> &'static [ControlSection] {
        self.sections
    }

    /// Parameter bound to a control.
    pub fn binding(&self, control: ControlId) -> Option<EffectParameter> {
        self.sections
            .get(control.section)?
            .parameters
            .get(control.slot)
            .copied()
    }

    /// Control bound to a parameter.
    pub fn control_for(&self, parameter: EffectParameter) -> ControlId {
        // from_sections guarantees every parameter has an entry
        self.controls[parameter.id() as usize].unwrap_or(ControlId {
            section: 0,
            slot: 0,
        })
    }

    /// Write a control's value into the tree. Returns the clamped value.
    pub fn apply(
        &self,
        control: ControlId,
        value: ParameterValue,
        tree: &ParameterAutomationTree,
    ) -> PluginResult<ParameterValue> {
        let parameter = self.binding(control).ok_or_else(|| {
            PluginError::State(format!(
                "no control at section {} slot {}",
                control.section, control.slot
            ))
        })?;
        tree.set_value(parameter.id(), value)
    }

    /// Display text for a parameter's current value, e.g. "375 ms".
    pub fn label(
        &self,
        parameter: EffectParameter,
        tree: &ParameterAutomationTree,
    ) -> PluginResult<String> {
        let descriptor = tree.catalog().describe(parameter.id())?;
        Ok(descriptor.display(tree.get_value(parameter.id())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ParameterCatalog;

    #[test]
    fn test_effect_layout() {
        let layout = ControlLayout::effect().unwrap();
        let titles: Vec<_> = layout.sections().iter().map(|s| s.title).collect();
        assert_eq!(titles, ["DELAY", "REVERB", "SHIMMER MAGIC", "MASTER"]);

        for parameter in EffectParameter::ALL {
            let control = layout.control_for(parameter);
            assert_eq!(layout.binding(control), Some(parameter));
        }
        assert_eq!(
            layout.control_for(EffectParameter::ShimmerPitch),
            ControlId { section: 2, slot: 1 }
        );
        assert_eq!(layout.binding(ControlId { section: 4, slot: 0 }), None);
    }

    #[test]
    fn test_apply_and_label() {
        let layout = ControlLayout::effect().unwrap();
        let tree = ParameterAutomationTree::new(ParameterCatalog::effect()).unwrap();

        let time = layout.control_for(EffectParameter::DelayTime);
        assert_eq!(layout.apply(time, 9000.0, &tree).unwrap(), 2000.0);
        assert_eq!(layout.label(EffectParameter::DelayTime, &tree).unwrap(), "2000 ms");
        assert_eq!(layout.label(EffectParameter::ShimmerPitch, &tree).unwrap(), "12 st");
        assert_eq!(layout.label(EffectParameter::ReverbMix, &tree).unwrap(), "0.30");

        assert!(layout.apply(ControlId { section: 0, slot: 9 }, 1.0, &tree).is_err());
    }

    #[test]
    fn test_incomplete_layout_is_rejected() {
        static PARTIAL: [ControlSection; 1] = [ControlSection {
            title: "ONLY",
            parameters: &[EffectParameter::DryWet],
        }];
        assert!(ControlLayout::from_sections(&PARTIAL).is_err());

        static TWICE: [ControlSection; 2] = [
            ControlSection {
                title: "A",
                parameters: &EffectParameter::ALL,
            },
            ControlSection {
                title: "B",
                parameters: &[EffectParameter::DryWet],
            },
        ];
        assert!(ControlLayout::from_sections(&TWICE).is_err());
    }
}
