//! Process-wide factory registration.
//!
//! The C-ABI creates instances without knowing which DSP core or config the
//! binary ships. The plugin crate registers both once at load time; every
//! `shimmer_au_create_instance` call then builds an [`EffectInstance`] from them.

use std::sync::OnceLock;

use shimmer_core::{Config, DspCore, PluginResult};

use crate::lifecycle::EffectInstance;

/// Factory function type for creating DSP cores.
pub type CoreFactory = fn() -> PluginResult<Box<dyn DspCore>>;

struct Registration {
    factory: CoreFactory,
    config: &'static Config,
}

static REGISTRATION: OnceLock<Registration> = OnceLock::new();

/// Register the core factory and plugin config.
///
/// Only one effect per binary is supported. Returns `false` (and keeps the
/// first registration) if called again.
pub fn register_factory(factory: CoreFactory, config: &'static Config) -> bool {
    if REGISTRATION.set(Registration { factory, config }).is_err() {
        log::warn!(
            "AU factory already registered, ignoring registration of {}",
            config.name
        );
        return false;
    }

    log::debug!(
        "AU factory registered: {} ({} {})",
        config.name,
        config.manufacturer,
        config.subtype
    );
    true
}

/// Create a new instance using the registered factory.
///
/// Returns `None` if no factory has been registered.
pub fn create_instance() -> Option<PluginResult<EffectInstance>> {
    REGISTRATION
        .get()
        .map(|registration| EffectInstance::new(registration.config, registration.factory))
}

/// Get the plugin configuration.
pub fn plugin_config() -> Option<&'static Config> {
    REGISTRATION.get().map(|registration| registration.config)
}

/// Check if a factory has been registered.
pub fn is_registered() -> bool {
    REGISTRATION.get().is_some()
}

#[cfg(test)]
pub(crate) mod testing {
    use shimmer_core::{Category, Config, Subcategory};

    pub(crate) static TEST_CONFIG: Config = Config::new("Test Shimmer", Category::Effect, "Test", "tsh1")
        .with_vendor("Test Vendor")
        .with_version("1.2.3")
        .with_subcategories(&[Subcategory::Delay, Subcategory::Reverb]);

    /// Register the reference core once for the whole test binary.
    pub(crate) fn register() {
        super::register_factory(shimmer_dsp::ShimmerCore::boxed, &TEST_CONFIG);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_registration_is_rejected() {
        testing::register();
        assert!(is_registered());
        assert!(!register_factory(
            shimmer_dsp::ShimmerCore::boxed,
            &testing::TEST_CONFIG
        ));
        assert_eq!(plugin_config().map(|c| c.name), Some("Test Shimmer"));
    }

    #[test]
    fn test_create_instance() {
        testing::register();
        let instance = create_instance().unwrap().unwrap();
        assert_eq!(instance.tree().len(), 8);
        assert!(!instance.is_allocated());
    }
}
