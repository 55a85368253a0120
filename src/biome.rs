use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Terrain and feature classifications a mapgen2 center can carry.
///
/// Declaration order is palette order; it decides the order of materials and
/// primitives in the exported scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Biome {
    // Features
    Ocean,
    Coast,
    Lakeshore,
    Lake,
    River,
    Marsh,
    Ice,
    Beach,
    Road1,
    Road2,
    Road3,
    Bridge,
    Lava,

    // Terrain
    Snow,
    Tundra,
    Bare,
    Scorched,
    Taiga,
    Shrubland,
    TemperateDesert,
    TemperateRainForest,
    TemperateDeciduousForest,
    Grassland,
    SubtropicalDesert,
    TropicalRainForest,
    TropicalSeasonalForest,
}

impl Biome {
    pub const ALL: [Biome; 26] = [
        Biome::Ocean,
        Biome::Coast,
        Biome::Lakeshore,
        Biome::Lake,
        Biome::River,
        Biome::Marsh,
        Biome::Ice,
        Biome::Beach,
        Biome::Road1,
        Biome::Road2,
        Biome::Road3,
        Biome::Bridge,
        Biome::Lava,
        Biome::Snow,
        Biome::Tundra,
        Biome::Bare,
        Biome::Scorched,
        Biome::Taiga,
        Biome::Shrubland,
        Biome::TemperateDesert,
        Biome::TemperateRainForest,
        Biome::TemperateDeciduousForest,
        Biome::Grassland,
        Biome::SubtropicalDesert,
        Biome::TropicalRainForest,
        Biome::TropicalSeasonalForest,
    ];

    /// Name as written in mapgen2 XML.
    pub fn name(self) -> &'static str {
        match self {
            Biome::Ocean => "OCEAN",
            Biome::Coast => "COAST",
            Biome::Lakeshore => "LAKESHORE",
            Biome::Lake => "LAKE",
            Biome::River => "RIVER",
            Biome::Marsh => "MARSH",
            Biome::Ice => "ICE",
            Biome::Beach => "BEACH",
            Biome::Road1 => "ROAD1",
            Biome::Road2 => "ROAD2",
            Biome::Road3 => "ROAD3",
            Biome::Bridge => "BRIDGE",
            Biome::Lava => "LAVA",
            Biome::Snow => "SNOW",
            Biome::Tundra => "TUNDRA",
            Biome::Bare => "BARE",
            Biome::Scorched => "SCORCHED",
            Biome::Taiga => "TAIGA",
            Biome::Shrubland => "SHRUBLAND",
            Biome::TemperateDesert => "TEMPERATE_DESERT",
            Biome::TemperateRainForest => "TEMPERATE_RAIN_FOREST",
            Biome::TemperateDeciduousForest => "TEMPERATE_DECIDUOUS_FOREST",
            Biome::Grassland => "GRASSLAND",
            Biome::SubtropicalDesert => "SUBTROPICAL_DESERT",
            Biome::TropicalRainForest => "TROPICAL_RAIN_FOREST",
            Biome::TropicalSeasonalForest => "TROPICAL_SEASONAL_FOREST",
        }
    }

    /// Packed 0xRRGGBB display color.
    pub fn packed_color(self) -> u32 {
        match self {
            Biome::Ocean => 0x44447a,
            Biome::Coast => 0x33335a,
            Biome::Lakeshore => 0x225588,
            Biome::Lake => 0x336699,
            Biome::River => 0x225588,
            Biome::Marsh => 0x2f6666,
            Biome::Ice => 0x99ffff,
            Biome::Beach => 0xa09077,
            Biome::Road1 => 0x442211,
            Biome::Road2 => 0x553322,
            Biome::Road3 => 0x664433,
            Biome::Bridge => 0x686860,
            Biome::Lava => 0xcc3333,
            Biome::Snow => 0xffffff,
            Biome::Tundra => 0xbbbbaa,
            Biome::Bare => 0x888888,
            Biome::Scorched => 0x555555,
            Biome::Taiga => 0x99aa77,
            Biome::Shrubland => 0x889977,
            Biome::TemperateDesert => 0xc9d29b,
            Biome::TemperateRainForest => 0x448855,
            Biome::TemperateDeciduousForest => 0x679459,
            Biome::Grassland => 0x88aa55,
            Biome::SubtropicalDesert => 0xd2b98b,
            Biome::TropicalRainForest => 0x337755,
            Biome::TropicalSeasonalForest => 0x559944,
        }
    }

    pub fn color(self) -> Rgb {
        Rgb::from_packed(self.packed_color())
    }
}

impl fmt::Display for Biome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("biome '{0}' is not in the palette")]
pub struct UnknownBiomeName(pub String);

impl FromStr for Biome {
    type Err = UnknownBiomeName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Biome::ALL
            .iter()
            .copied()
            .find(|biome| biome.name() == s)
            .ok_or_else(|| UnknownBiomeName(s.to_string()))
    }
}

/// Normalized color, each channel in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub fn from_packed(packed: u32) -> Self {
        let channel = |shift: u32| ((packed >> shift) & 0xff) as f32 / 255.0;
        Self {
            r: channel(16),
            g: channel(8),
            b: channel(0),
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}
