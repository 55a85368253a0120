pub mod biome;
pub mod collada;
pub mod config;
pub mod converter;
pub mod graph;
pub mod logging;
pub mod mesh;

pub use biome::Biome;
pub use config::{ConvertConfig, MaterialPolicy};
pub use converter::{ConversionReport, ConvertError, Converter};
pub use graph::MapGraph;
pub use mesh::TerrainMesh;
