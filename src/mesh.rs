//! Triangulation of the dual graph into a biome-bucketed terrain mesh.

use std::collections::{BTreeMap, HashMap};

use glam::{DVec2, Vec3};
use thiserror::Error;
use tracing::{debug, info};

use crate::biome::Biome;
use crate::config::ScaleConfig;
use crate::graph::{CornerIndex, MapGraph};

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("center '{center}' has biome '{biome}', which is not in the palette")]
    UnknownBiome { center: String, biome: String },
    #[error("too many vertices for 32-bit indices: {count}")]
    TooManyVertices { count: usize },
    #[error("{owner} scales to a position outside the 32-bit float range")]
    CoordinateOutOfRange { owner: String },
}

/// Shared vertex buffer plus one triangle list per biome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainMesh {
    vertices: Vec<Vec3>,
    buckets: BTreeMap<Biome, Vec<[u32; 3]>>,
}

impl TerrainMesh {
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Non-empty triangle lists in palette order.
    pub fn buckets(&self) -> impl Iterator<Item = (Biome, &[[u32; 3]])> {
        self.buckets
            .iter()
            .map(|(biome, triangles)| (*biome, triangles.as_slice()))
    }

    pub fn triangles(&self, biome: Biome) -> &[[u32; 3]] {
        self.buckets.get(&biome).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn used_biomes(&self) -> impl Iterator<Item = Biome> + '_ {
        self.buckets.keys().copied()
    }

    pub fn triangle_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    fn push_vertex(&mut self, position: Vec3) -> Result<u32, MeshError> {
        let index = u32::try_from(self.vertices.len()).map_err(|_| MeshError::TooManyVertices {
            count: self.vertices.len() + 1,
        })?;
        self.vertices.push(position);
        Ok(index)
    }

    fn push_triangle(&mut self, biome: Biome, triangle: [u32; 3]) {
        self.buckets.entry(biome).or_default().push(triangle);
    }
}

/// Builds the terrain mesh by fanning each center out to its edges.
///
/// Every center gets its own vertex plus private copies of its corners, so
/// neighbouring cells never share vertices. Triangles facing the edge from
/// `center0` are wound (corner1, corner0, center); from `center1` they are
/// wound (center, corner0, corner1). Edges missing a corner are skipped.
pub fn triangulate(graph: &MapGraph, scale: &ScaleConfig) -> Result<TerrainMesh, MeshError> {
    let mut mesh = TerrainMesh::default();
    let mut corner_vertices: HashMap<CornerIndex, u32> = HashMap::new();

    for (center_index, center) in graph.centers().iter().enumerate() {
        let biome: Biome = center.biome.parse().map_err(|_| MeshError::UnknownBiome {
            center: center.id.clone(),
            biome: center.biome.clone(),
        })?;

        let position = scaled(scale, center.position, center.elevation, || {
            format!("center '{}'", center.id)
        })?;
        let center_vertex = mesh.push_vertex(position)?;
        corner_vertices.clear();
        for &corner_index in &center.corners {
            corner_vertex(&mut mesh, &mut corner_vertices, graph, scale, corner_index)?;
        }

        let mut emitted = 0usize;
        for &edge_index in &center.edges {
            let edge = graph.edge(edge_index);
            let Some((corner0, corner1)) = edge.corners() else {
                continue;
            };
            let is_center0 = edge.center0 == Some(center_index);
            if !is_center0 && edge.center1 != Some(center_index) {
                continue;
            }

            let v0 = corner_vertex(&mut mesh, &mut corner_vertices, graph, scale, corner0)?;
            let v1 = corner_vertex(&mut mesh, &mut corner_vertices, graph, scale, corner1)?;
            let triangle = if is_center0 {
                [v1, v0, center_vertex]
            } else {
                [center_vertex, v0, v1]
            };
            mesh.push_triangle(biome, triangle);
            emitted += 1;
        }
        debug!(center = %center, %biome, triangles = emitted, "triangulated center");
    }

    info!(
        vertices = mesh.vertices.len(),
        triangles = mesh.triangle_count(),
        biomes = mesh.buckets.len(),
        "triangulated map"
    );
    Ok(mesh)
}

/// Vertex of `corner_index` private to the current center, created on first use.
fn corner_vertex(
    mesh: &mut TerrainMesh,
    corner_vertices: &mut HashMap<CornerIndex, u32>,
    graph: &MapGraph,
    scale: &ScaleConfig,
    corner_index: CornerIndex,
) -> Result<u32, MeshError> {
    if let Some(&vertex) = corner_vertices.get(&corner_index) {
        return Ok(vertex);
    }
    let corner = graph.corner(corner_index);
    let position = scaled(scale, corner.position, corner.elevation, || {
        format!("corner '{}'", corner.id)
    })?;
    let vertex = mesh.push_vertex(position)?;
    corner_vertices.insert(corner_index, vertex);
    Ok(vertex)
}

fn scaled(
    scale: &ScaleConfig,
    position: DVec2,
    elevation: f64,
    owner: impl FnOnce() -> String,
) -> Result<Vec3, MeshError> {
    let vertex = scale.apply(position, elevation);
    if vertex.is_finite() {
        Ok(vertex)
    } else {
        Err(MeshError::CoordinateOutOfRange { owner: owner() })
    }
}
