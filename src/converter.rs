use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::biome::Biome;
use crate::collada::{Asset, ExportError, SceneDocument};
use crate::config::ConvertConfig;
use crate::graph::{self, GraphError, MapGraph};
use crate::mesh::{self, MeshError, TerrainMesh};

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("input file '{}' is not a valid file", .0.display())]
    InputNotFound(PathBuf),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Summary of one conversion run.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub output: PathBuf,
    pub generator_url: Option<String>,
    pub generator_timestamp: Option<String>,
    pub centers: usize,
    pub corners: usize,
    pub edges: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub triangles_per_biome: BTreeMap<Biome, usize>,
    pub materials: usize,
    pub bytes_written: usize,
}

impl ConversionReport {
    pub fn write_json(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json + "\n")
    }
}

/// Load → link → triangulate → bucket → export, driven by one config.
pub struct Converter {
    config: ConvertConfig,
}

impl Converter {
    pub fn new(config: ConvertConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Loads and links the map at `input`.
    pub fn load(&self, input: impl AsRef<Path>) -> Result<MapGraph, ConvertError> {
        let input = input.as_ref();
        if !input.is_file() {
            return Err(ConvertError::InputNotFound(input.to_path_buf()));
        }
        let graph = graph::load_from_path(input)?;
        info!(
            path = %input.display(),
            centers = graph.centers().len(),
            corners = graph.corners().len(),
            edges = graph.edges().len(),
            "loaded map"
        );
        Ok(graph)
    }

    pub fn triangulate(&self, graph: &MapGraph) -> Result<TerrainMesh, ConvertError> {
        Ok(mesh::triangulate(graph, &self.config.scale)?)
    }

    pub fn scene(&self, graph: &MapGraph, mesh: &TerrainMesh) -> SceneDocument {
        let asset = Asset::for_map(graph.generator().timestamp.as_deref());
        SceneDocument::from_mesh(mesh, self.config.materials, asset)
    }

    /// Converts an already loaded map. Nothing is written unless every
    /// earlier stage succeeded.
    pub fn convert_graph(
        &self,
        graph: &MapGraph,
        output: impl AsRef<Path>,
    ) -> Result<ConversionReport, ConvertError> {
        let output = output.as_ref();
        let mesh = self.triangulate(graph)?;
        let scene = self.scene(graph, &mesh);
        let bytes_written = scene.write_to_path(output)?;
        info!(
            path = %output.display(),
            bytes = bytes_written,
            materials = scene.materials.len(),
            primitives = scene.geometry.primitives.len(),
            "exported scene"
        );

        let generator = graph.generator();
        Ok(ConversionReport {
            output: output.to_path_buf(),
            generator_url: generator.url.clone(),
            generator_timestamp: generator.timestamp.clone(),
            centers: graph.centers().len(),
            corners: graph.corners().len(),
            edges: graph.edges().len(),
            vertices: mesh.vertices().len(),
            triangles: mesh.triangle_count(),
            triangles_per_biome: mesh
                .buckets()
                .map(|(biome, triangles)| (biome, triangles.len()))
                .collect(),
            materials: scene.materials.len(),
            bytes_written,
        })
    }

    pub fn convert(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<ConversionReport, ConvertError> {
        let graph = self.load(input)?;
        self.convert_graph(&graph, output)
    }
}
