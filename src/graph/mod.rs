//! Arena storage for the mapgen2 dual graph.
//!
//! Centers, corners and edges live in flat vectors in document order and refer
//! to each other by index. Indices are resolved once by the loader's link pass;
//! nothing is mutated afterwards.

pub mod loader;

use std::collections::HashMap;
use std::fmt;

use glam::DVec2;

pub use loader::{load_from_path, parse_str, EntityKind, GraphError};

pub type CenterIndex = usize;
pub type CornerIndex = usize;
pub type EdgeIndex = usize;

/// Informational header written by the map generator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generator {
    pub url: Option<String>,
    pub timestamp: Option<String>,
}

/// A Voronoi cell site.
#[derive(Debug, Clone, PartialEq)]
pub struct Center {
    pub id: String,
    pub position: DVec2,
    pub elevation: f64,
    pub moisture: f64,
    /// Raw biome name; checked against the palette when the mesh is bucketed.
    pub biome: String,
    pub water: bool,
    pub coast: bool,
    pub ocean: bool,
    pub border: bool,
    /// Incident corners in document order.
    pub corners: Vec<CornerIndex>,
    /// Incident edges in document order.
    pub edges: Vec<EdgeIndex>,
}

impl fmt::Display for Center {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Center id={} ({}, {}, {})>",
            self.id, self.position.x, self.position.y, self.elevation
        )
    }
}

/// A Voronoi vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct Corner {
    pub id: String,
    pub position: DVec2,
    pub elevation: f64,
    pub moisture: f64,
    pub water: bool,
    pub coast: bool,
    pub ocean: bool,
    pub border: bool,
    /// Corner that water flows toward; may be the corner itself.
    pub downslope: Option<CornerIndex>,
    pub river: f64,
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Corner id={} ({}, {}, {})>",
            self.id, self.position.x, self.position.y, self.elevation
        )
    }
}

/// Dual edge between two corners, bordering up to two centers.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    pub corner0: Option<CornerIndex>,
    pub corner1: Option<CornerIndex>,
    pub center0: Option<CenterIndex>,
    pub center1: Option<CenterIndex>,
    pub midpoint: Option<DVec2>,
}

impl Edge {
    /// Both corner endpoints, or `None` for an incomplete boundary edge.
    pub fn corners(&self) -> Option<(CornerIndex, CornerIndex)> {
        Some((self.corner0?, self.corner1?))
    }

    pub fn is_boundary(&self) -> bool {
        self.corners().is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapGraph {
    generator: Generator,
    centers: Vec<Center>,
    corners: Vec<Corner>,
    edges: Vec<Edge>,
    center_ids: HashMap<String, CenterIndex>,
    corner_ids: HashMap<String, CornerIndex>,
    edge_ids: HashMap<String, EdgeIndex>,
}

impl MapGraph {
    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn centers(&self) -> &[Center] {
        &self.centers
    }

    pub fn corners(&self) -> &[Corner] {
        &self.corners
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn center(&self, index: CenterIndex) -> &Center {
        &self.centers[index]
    }

    pub fn corner(&self, index: CornerIndex) -> &Corner {
        &self.corners[index]
    }

    pub fn edge(&self, index: EdgeIndex) -> &Edge {
        &self.edges[index]
    }

    pub fn center_index(&self, id: &str) -> Option<CenterIndex> {
        self.center_ids.get(id).copied()
    }

    pub fn corner_index(&self, id: &str) -> Option<CornerIndex> {
        self.corner_ids.get(id).copied()
    }

    pub fn edge_index(&self, id: &str) -> Option<EdgeIndex> {
        self.edge_ids.get(id).copied()
    }
}
