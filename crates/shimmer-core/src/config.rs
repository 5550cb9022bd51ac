//! Plugin configuration.
//!
//! Static metadata and AU identity for a plugin, plus the default render
//! format the host starts from before it negotiates its own.
//!
//! # Example
//!
//! ```ignore
//! use shimmer_core::{Config, config::Category};
//!
//! pub static CONFIG: Config = Config::new("Shimmer", Category::Effect, "Edgl", "edgl")
//!     .with_vendor("Edgl")
//!     .with_version(env!("CARGO_PKG_VERSION"));
//! ```

// =========================================================================
// FourCharCode
// =========================================================================

/// Four-character code (FourCC) for AU identifiers.
///
/// Used for component type, manufacturer and subtype codes.
/// Must be exactly 4 ASCII characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCharCode(pub [u8; 4]);

impl FourCharCode {
    /// Create a new FourCharCode from a 4-byte array.
    ///
    /// # Panics
    /// Debug builds will panic if any byte is not ASCII.
    pub const fn new(bytes: &[u8; 4]) -> Self {
        debug_assert!(bytes[0].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[1].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[2].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[3].is_ascii(), "FourCC bytes must be ASCII");
        Self(*bytes)
    }

    /// Get the FourCC as a 32-bit value (big-endian).
    pub const fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the FourCC as a string slice.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for FourCharCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =========================================================================
// Category / Subcategory
// =========================================================================

/// Plugin type - determines the AU component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Audio effect (`aufx`)
    Effect,
    /// Effect that also accepts MIDI (`aumf`)
    MusicEffect,
}

impl Category {
    /// Convert to AU component type code (FourCC as u32, big-endian)
    pub const fn to_au_component_type(&self) -> u32 {
        match self {
            Category::Effect => u32::from_be_bytes(*b"aufx"),
            Category::MusicEffect => u32::from_be_bytes(*b"aumf"),
        }
    }
}

/// Plugin subcategory, reported to hosts as AU tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subcategory {
    /// Delay, Multi-tap Delay, Ping-Pong Delay
    Delay,
    /// Reverberation, Room Simulation
    Reverb,
    /// Pitch Processing
    PitchShift,
    /// Stereo only plug-in
    Stereo,
}

impl Subcategory {
    /// AU tag string.
    pub const fn to_au_tag(&self) -> &'static str {
        match self {
            Subcategory::Delay => "Delay",
            Subcategory::Reverb => "Reverb",
            Subcategory::PitchShift => "Pitch",
            Subcategory::Stereo => "Stereo",
        }
    }
}

// =========================================================================
// Config
// =========================================================================

/// Default output sample rate before the host negotiates a format.
pub const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;

/// Default output channel count.
pub const DEFAULT_CHANNEL_COUNT: u32 = 2;

/// Default `maximumFramesToRender`.
pub const DEFAULT_MAX_FRAMES: u32 = 512;

/// Plugin configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Plugin name displayed in the host.
    pub name: &'static str,

    /// Plugin category (determines the AU component type).
    pub category: Category,

    /// Vendor name.
    pub vendor: &'static str,

    /// Version string.
    pub version: &'static str,

    /// Subcategories reported as AU tags.
    pub subcategories: &'static [Subcategory],

    /// AU manufacturer code.
    pub manufacturer: FourCharCode,

    /// AU subtype code.
    pub subtype: FourCharCode,

    /// Sample rate of the default output format.
    pub sample_rate: f64,

    /// Channel count of the default output format.
    pub channel_count: u32,

    /// Default maximum frames per render call.
    pub max_frames: u32,
}

/// Helper to convert a string literal to a 4-byte array at compile time.
const fn str_to_four_bytes(s: &str) -> [u8; 4] {
    let bytes = s.as_bytes();
    assert!(bytes.len() == 4, "FourCC string must be exactly 4 bytes");
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

impl Config {
    /// Create a new configuration with stereo 44.1 kHz defaults.
    ///
    /// # Panics
    /// Panics at compile time if either code is not exactly 4 bytes.
    pub const fn new(
        name: &'static str,
        category: Category,
        manufacturer_code: &str,
        plugin_code: &str,
    ) -> Self {
        Self {
            name,
            category,
            vendor: "",
            version: "0.0.0",
            subcategories: &[],
            manufacturer: FourCharCode::new(&str_to_four_bytes(manufacturer_code)),
            subtype: FourCharCode::new(&str_to_four_bytes(plugin_code)),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channel_count: DEFAULT_CHANNEL_COUNT,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }

    /// Set the vendor name.
    pub const fn with_vendor(mut self, vendor: &'static str) -> Self {
        self.vendor = vendor;
        self
    }

    /// Set the version string.
    pub const fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Set the subcategories.
    pub const fn with_subcategories(mut self, subcategories: &'static [Subcategory]) -> Self {
        self.subcategories = subcategories;
        self
    }

    /// AU component type as u32.
    pub const fn component_type_u32(&self) -> u32 {
        self.category.to_au_component_type()
    }

    /// Manufacturer code as u32.
    pub const fn manufacturer_u32(&self) -> u32 {
        self.manufacturer.as_u32()
    }

    /// Subtype code as u32.
    pub const fn subtype_u32(&self) -> u32 {
        self.subtype.as_u32()
    }

    /// AU tags joined by commas, e.g. "Delay,Reverb".
    pub fn au_tags(&self) -> String {
        self.subcategories
            .iter()
            .map(|s| s.to_au_tag())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Packed AU version (0xMMMMmmbb) parsed from `version`.
    ///
    /// Missing or malformed components count as zero.
    pub fn au_version(&self) -> u32 {
        let mut parts = self
            .version
            .split('.')
            .map(|p| p.trim().parse::<u32>().unwrap_or(0));
        let major = parts.next().unwrap_or(0).min(0xFFFF);
        let minor = parts.next().unwrap_or(0).min(0xFF);
        let patch = parts.next().unwrap_or(0).min(0xFF);
        (major << 16) | (minor << 8) | patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static CONFIG: Config = Config::new("Test", Category::Effect, "Edgl", "edgl")
        .with_vendor("Edgl")
        .with_version("1.2.3")
        .with_subcategories(&[Subcategory::Delay, Subcategory::Reverb]);

    #[test]
    fn test_four_char_code() {
        const CODE: FourCharCode = FourCharCode::new(b"aufx");
        assert_eq!(CODE.as_u32(), 0x6175_6678);
        assert_eq!(CODE.to_string(), "aufx");
    }

    #[test]
    fn test_codes() {
        assert_eq!(CONFIG.component_type_u32(), u32::from_be_bytes(*b"aufx"));
        assert_eq!(CONFIG.manufacturer_u32(), u32::from_be_bytes(*b"Edgl"));
        assert_eq!(CONFIG.subtype_u32(), u32::from_be_bytes(*b"edgl"));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(CONFIG.sample_rate, 44_100.0);
        assert_eq!(CONFIG.channel_count, 2);
        assert_eq!(CONFIG.max_frames, 512);
    }

    #[test]
    fn test_tags_and_version() {
        assert_eq!(CONFIG.au_tags(), "Delay,Reverb");
        assert_eq!(CONFIG.au_version(), 0x0001_0203);
        assert_eq!(Config::new("X", Category::Effect, "Abcd", "abcd").au_version(), 0);
    }
}
