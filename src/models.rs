//! Known mower models, keyed by the `(device type, variant)` pair of `deviceType`.

use serde::Serialize;
use std::fmt;

/// Brand a model is sold under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Manufacturer {
    /// Husqvarna Automower
    Husqvarna,
    /// Gardena
    Gardena,
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Husqvarna => write!(f, "Husqvarna"),
            Self::Gardena => write!(f, "Gardena"),
        }
    }
}

/// A mower model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MowerModel {
    /// Device type byte
    pub device_type: u8,
    /// Variant byte
    pub variant: u8,
    /// Model name
    pub name: &'static str,
    /// Brand
    pub manufacturer: Manufacturer,
}

impl MowerModel {
    /// Placeholder for a pair missing from the table
    ///
    /// Unknown models are assumed to use the Husqvarna state numbering.
    #[must_use]
    pub const fn unknown(device_type: u8, variant: u8) -> Self {
        model(device_type, variant, "Unknown", Manufacturer::Husqvarna)
    }

    /// Whether the firmware uses the Husqvarna state numbering
    #[must_use]
    pub fn is_husqvarna(&self) -> bool {
        self.manufacturer == Manufacturer::Husqvarna
    }
}

impl fmt::Display for MowerModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.manufacturer, self.name)
    }
}

const fn model(device_type: u8, variant: u8, name: &'static str, manufacturer: Manufacturer) -> MowerModel {
    MowerModel {
        device_type,
        variant,
        name,
        manufacturer,
    }
}

/// Every model known to this library
pub const MODELS: &[MowerModel] = &[
    model(19, 1, "115H", Manufacturer::Husqvarna),
    model(23, 1, "305", Manufacturer::Husqvarna),
    model(23, 2, "310MarkII", Manufacturer::Husqvarna),
    model(23, 3, "315MarkII", Manufacturer::Husqvarna),
    model(11, 0, "310", Manufacturer::Husqvarna),
    model(12, 0, "315", Manufacturer::Husqvarna),
    model(12, 1, "315X", Manufacturer::Husqvarna),
    model(12, 23, "315XLimitedEdition", Manufacturer::Husqvarna),
    model(5, 0, "420", Manufacturer::Husqvarna),
    model(7, 0, "430X", Manufacturer::Husqvarna),
    model(7, 1, "430XH", Manufacturer::Husqvarna),
    model(15, 0, "440", Manufacturer::Husqvarna),
    model(8, 0, "450X", Manufacturer::Husqvarna),
    model(8, 1, "450XH", Manufacturer::Husqvarna),
    model(17, 0, "520", Manufacturer::Husqvarna),
    model(17, 1, "520H", Manufacturer::Husqvarna),
    model(16, 0, "550", Manufacturer::Husqvarna),
    model(16, 1, "550H", Manufacturer::Husqvarna),
    model(27, 1, "LibertyPilotEPAC", Manufacturer::Husqvarna),
    model(27, 2, "LibertyPilotNA", Manufacturer::Husqvarna),
    model(27, 3, "LibertyPilotHiCut", Manufacturer::Husqvarna),
    model(28, 1, "405X", Manufacturer::Husqvarna),
    model(28, 2, "415X", Manufacturer::Husqvarna),
    model(20, 0, "435XAWD", Manufacturer::Husqvarna),
    model(21, 0, "535AWD", Manufacturer::Husqvarna),
    model(26, 3, "520EPOS", Manufacturer::Husqvarna),
    model(26, 4, "520HEPOS", Manufacturer::Husqvarna),
    model(26, 1, "550EPOS", Manufacturer::Husqvarna),
    model(26, 2, "550HEPOS", Manufacturer::Husqvarna),
    model(40, 1, "450XEPOS", Manufacturer::Husqvarna),
    model(40, 2, "450XHEPOS", Manufacturer::Husqvarna),
    model(24, 2, "Ceora544EPOS", Manufacturer::Husqvarna),
    model(24, 1, "Ceora546EPOS", Manufacturer::Husqvarna),
    model(14, 1, "SilenoCity250", Manufacturer::Gardena),
    model(29, 2, "Minimo", Manufacturer::Gardena),
    model(29, 3, "Minimo-500", Manufacturer::Gardena),
    model(31, 1, "320Nera", Manufacturer::Husqvarna),
    model(31, 2, "430XNera", Manufacturer::Husqvarna),
    model(31, 3, "450XNera", Manufacturer::Husqvarna),
    model(32, 1, "AspireR4", Manufacturer::Husqvarna),
    model(33, 1, "430XEgalite", Manufacturer::Husqvarna),
    model(39, 2, "310ENera", Manufacturer::Husqvarna),
    model(39, 5, "410XENera", Manufacturer::Husqvarna),
];

/// Find a model by its `(device type, variant)` pair
#[must_use]
pub fn lookup(device_type: u8, variant: u8) -> Option<&'static MowerModel> {
    MODELS
        .iter()
        .find(|m| m.device_type == device_type && m.variant == variant)
}

/// Like [`lookup`], falling back to [`MowerModel::unknown`]
#[must_use]
pub fn lookup_or_unknown(device_type: u8, variant: u8) -> MowerModel {
    lookup(device_type, variant)
        .copied()
        .unwrap_or_else(|| MowerModel::unknown(device_type, variant))
}
