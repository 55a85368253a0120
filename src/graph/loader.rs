//! mapgen2 XML loading.
//!
//! quick-xml maps the document onto raw records whose attributes are all
//! optional strings. Typed records are built from those in a first pass, then a
//! second pass resolves id references into arena indices.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glam::DVec2;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{Center, Corner, Edge, Generator, MapGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Center,
    Corner,
    Edge,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Center => "center",
            EntityKind::Corner => "corner",
            EntityKind::Edge => "edge",
        })
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to read map file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed map XML: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("{kind} '{id}' is missing required attribute '{attribute}'")]
    MissingAttribute {
        kind: EntityKind,
        id: String,
        attribute: &'static str,
    },
    #[error("{kind} '{id}' has invalid {attribute} '{value}' (expected {expected})")]
    InvalidAttribute {
        kind: EntityKind,
        id: String,
        attribute: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: EntityKind, id: String },
    #[error("{kind} '{id}' references unknown {target} '{reference}'")]
    UnknownReference {
        kind: EntityKind,
        id: String,
        target: EntityKind,
        reference: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawMap {
    #[serde(default)]
    generator: Option<RawGenerator>,
    centers: RawCenters,
    corners: RawCorners,
    edges: RawEdges,
}

#[derive(Debug, Deserialize)]
struct RawGenerator {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@timestamp")]
    timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCenters {
    #[serde(rename = "center", default)]
    items: Vec<RawCenter>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCorners {
    #[serde(rename = "corner", default)]
    items: Vec<RawCorner>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEdges {
    #[serde(rename = "edge", default)]
    items: Vec<RawEdge>,
}

#[derive(Debug, Deserialize)]
struct RawRef {
    #[serde(rename = "@id")]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCenter {
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@x")]
    x: Option<String>,
    #[serde(rename = "@y")]
    y: Option<String>,
    #[serde(rename = "@elevation")]
    elevation: Option<String>,
    #[serde(rename = "@moisture")]
    moisture: Option<String>,
    #[serde(rename = "@biome")]
    biome: Option<String>,
    #[serde(rename = "@water")]
    water: Option<String>,
    #[serde(rename = "@coast")]
    coast: Option<String>,
    #[serde(rename = "@ocean")]
    ocean: Option<String>,
    #[serde(rename = "@border")]
    border: Option<String>,
    #[serde(rename = "corner", default)]
    corners: Vec<RawRef>,
    #[serde(rename = "edge", default)]
    edges: Vec<RawRef>,
}

#[derive(Debug, Deserialize)]
struct RawCorner {
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@x")]
    x: Option<String>,
    #[serde(rename = "@y")]
    y: Option<String>,
    #[serde(rename = "@elevation")]
    elevation: Option<String>,
    #[serde(rename = "@moisture")]
    moisture: Option<String>,
    #[serde(rename = "@water")]
    water: Option<String>,
    #[serde(rename = "@coast")]
    coast: Option<String>,
    #[serde(rename = "@ocean")]
    ocean: Option<String>,
    #[serde(rename = "@border")]
    border: Option<String>,
    #[serde(rename = "@downslope")]
    downslope: Option<String>,
    #[serde(rename = "@river")]
    river: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEdge {
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@corner0")]
    corner0: Option<String>,
    #[serde(rename = "@corner1")]
    corner1: Option<String>,
    #[serde(rename = "@center0")]
    center0: Option<String>,
    #[serde(rename = "@center1")]
    center1: Option<String>,
    #[serde(rename = "@x")]
    x: Option<String>,
    #[serde(rename = "@y")]
    y: Option<String>,
}

/// Reads and links a mapgen2 XML file.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<MapGraph, GraphError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&text)
}

/// Parses and links a mapgen2 XML document.
pub fn parse_str(text: &str) -> Result<MapGraph, GraphError> {
    let raw: RawMap = quick_xml::de::from_str(text)?;
    debug!(
        centers = raw.centers.items.len(),
        corners = raw.corners.items.len(),
        edges = raw.edges.items.len(),
        "parsed raw map records"
    );

    let mut graph = MapGraph {
        generator: raw
            .generator
            .as_ref()
            .map(|generator| Generator {
                url: generator.url.clone(),
                timestamp: generator.timestamp.clone(),
            })
            .unwrap_or_default(),
        ..MapGraph::default()
    };

    for (position, record) in raw.centers.items.iter().enumerate() {
        let center = build_center(record, position)?;
        register(&mut graph.center_ids, EntityKind::Center, &center.id, position)?;
        graph.centers.push(center);
    }
    for (position, record) in raw.corners.items.iter().enumerate() {
        let corner = build_corner(record, position)?;
        register(&mut graph.corner_ids, EntityKind::Corner, &corner.id, position)?;
        graph.corners.push(corner);
    }
    for (position, record) in raw.edges.items.iter().enumerate() {
        let edge = build_edge(record, position)?;
        register(&mut graph.edge_ids, EntityKind::Edge, &edge.id, position)?;
        graph.edges.push(edge);
    }

    link(&mut graph, &raw)?;
    Ok(graph)
}

fn register(
    ids: &mut HashMap<String, usize>,
    kind: EntityKind,
    id: &str,
    index: usize,
) -> Result<(), GraphError> {
    match ids.entry(id.to_string()) {
        Entry::Occupied(_) => Err(GraphError::DuplicateId {
            kind,
            id: id.to_string(),
        }),
        Entry::Vacant(slot) => {
            slot.insert(index);
            Ok(())
        }
    }
}

/// Typed access to one record's string attributes, for error reporting.
struct Attributes {
    kind: EntityKind,
    id: String,
}

impl Attributes {
    fn identify(kind: EntityKind, id: &Option<String>, position: usize) -> Result<Self, GraphError> {
        match id {
            Some(id) => Ok(Self {
                kind,
                id: id.clone(),
            }),
            None => Err(GraphError::MissingAttribute {
                kind,
                id: format!("#{position}"),
                attribute: "id",
            }),
        }
    }

    fn required<'v>(
        &self,
        attribute: &'static str,
        value: &'v Option<String>,
    ) -> Result<&'v str, GraphError> {
        value.as_deref().ok_or_else(|| self.missing(attribute))
    }

    fn missing(&self, attribute: &'static str) -> GraphError {
        GraphError::MissingAttribute {
            kind: self.kind,
            id: self.id.clone(),
            attribute,
        }
    }

    fn number(&self, attribute: &'static str, value: &Option<String>) -> Result<f64, GraphError> {
        let text = self.required(attribute, value)?;
        self.parse_number(attribute, text)
    }

    fn optional_number(
        &self,
        attribute: &'static str,
        value: &Option<String>,
    ) -> Result<Option<f64>, GraphError> {
        value
            .as_deref()
            .map(|text| self.parse_number(attribute, text))
            .transpose()
    }

    fn parse_number(&self, attribute: &'static str, text: &str) -> Result<f64, GraphError> {
        match text.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(number),
            _ => Err(self.invalid(attribute, text, "a finite number")),
        }
    }

    fn flag(&self, attribute: &'static str, value: &Option<String>) -> Result<bool, GraphError> {
        match self.required(attribute, value)? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(self.invalid(attribute, other, "'true' or 'false'")),
        }
    }

    fn invalid(&self, attribute: &'static str, value: &str, expected: &'static str) -> GraphError {
        GraphError::InvalidAttribute {
            kind: self.kind,
            id: self.id.clone(),
            attribute,
            value: value.to_string(),
            expected,
        }
    }
}

fn build_center(record: &RawCenter, position: usize) -> Result<Center, GraphError> {
    let attrs = Attributes::identify(EntityKind::Center, &record.id, position)?;
    Ok(Center {
        position: DVec2::new(attrs.number("x", &record.x)?, attrs.number("y", &record.y)?),
        elevation: attrs.number("elevation", &record.elevation)?,
        moisture: attrs.number("moisture", &record.moisture)?,
        biome: attrs.required("biome", &record.biome)?.to_string(),
        water: attrs.flag("water", &record.water)?,
        coast: attrs.flag("coast", &record.coast)?,
        ocean: attrs.flag("ocean", &record.ocean)?,
        border: attrs.flag("border", &record.border)?,
        corners: Vec::with_capacity(record.corners.len()),
        edges: Vec::with_capacity(record.edges.len()),
        id: attrs.id,
    })
}

fn build_corner(record: &RawCorner, position: usize) -> Result<Corner, GraphError> {
    let attrs = Attributes::identify(EntityKind::Corner, &record.id, position)?;
    attrs.number("downslope", &record.downslope)?;
    Ok(Corner {
        position: DVec2::new(attrs.number("x", &record.x)?, attrs.number("y", &record.y)?),
        elevation: attrs.number("elevation", &record.elevation)?,
        moisture: attrs.number("moisture", &record.moisture)?,
        water: attrs.flag("water", &record.water)?,
        coast: attrs.flag("coast", &record.coast)?,
        ocean: attrs.flag("ocean", &record.ocean)?,
        border: attrs.flag("border", &record.border)?,
        downslope: None,
        river: attrs.number("river", &record.river)?,
        id: attrs.id,
    })
}

fn build_edge(record: &RawEdge, position: usize) -> Result<Edge, GraphError> {
    let attrs = Attributes::identify(EntityKind::Edge, &record.id, position)?;
    let x = attrs.optional_number("x", &record.x)?;
    let y = attrs.optional_number("y", &record.y)?;
    let midpoint = match (x, y) {
        (Some(x), Some(y)) => Some(DVec2::new(x, y)),
        (None, None) => None,
        (Some(_), None) => return Err(attrs.missing("y")),
        (None, Some(_)) => return Err(attrs.missing("x")),
    };
    Ok(Edge {
        id: attrs.id,
        corner0: None,
        corner1: None,
        center0: None,
        center1: None,
        midpoint,
    })
}

/// Second pass: every record exists, so id references can be resolved.
fn link(graph: &mut MapGraph, raw: &RawMap) -> Result<(), GraphError> {
    let resolver = Resolver {
        centers: &graph.center_ids,
        corners: &graph.corner_ids,
        edges: &graph.edge_ids,
    };

    for (center, record) in graph.centers.iter_mut().zip(&raw.centers.items) {
        for reference in &record.corners {
            let index = resolver.reference(EntityKind::Center, &center.id, EntityKind::Corner, reference)?;
            center.corners.push(index);
        }
        for reference in &record.edges {
            let index = resolver.reference(EntityKind::Center, &center.id, EntityKind::Edge, reference)?;
            center.edges.push(index);
        }
    }

    // mapgen2 writes a non-corner number (usually -1) when water has nowhere to go.
    for (corner, record) in graph.corners.iter_mut().zip(&raw.corners.items) {
        corner.downslope = record
            .downslope
            .as_deref()
            .and_then(|id| resolver.corners.get(id.trim()).copied());
    }

    for (edge, record) in graph.edges.iter_mut().zip(&raw.edges.items) {
        edge.corner0 = resolver.optional(EntityKind::Edge, &edge.id, EntityKind::Corner, &record.corner0)?;
        edge.corner1 = resolver.optional(EntityKind::Edge, &edge.id, EntityKind::Corner, &record.corner1)?;
        edge.center0 = resolver.optional(EntityKind::Edge, &edge.id, EntityKind::Center, &record.center0)?;
        edge.center1 = resolver.optional(EntityKind::Edge, &edge.id, EntityKind::Center, &record.center1)?;
    }

    Ok(())
}

struct Resolver<'a> {
    centers: &'a HashMap<String, usize>,
    corners: &'a HashMap<String, usize>,
    edges: &'a HashMap<String, usize>,
}

impl Resolver<'_> {
    fn optional(
        &self,
        kind: EntityKind,
        id: &str,
        target: EntityKind,
        reference: &Option<String>,
    ) -> Result<Option<usize>, GraphError> {
        let Some(reference) = reference else {
            return Ok(None);
        };
        let ids = match target {
            EntityKind::Center => self.centers,
            EntityKind::Corner => self.corners,
            EntityKind::Edge => self.edges,
        };
        ids.get(reference)
            .copied()
            .map(Some)
            .ok_or_else(|| GraphError::UnknownReference {
                kind,
                id: id.to_string(),
                target,
                reference: reference.clone(),
            })
    }

    fn reference(
        &self,
        kind: EntityKind,
        id: &str,
        target: EntityKind,
        reference: &RawRef,
    ) -> Result<usize, GraphError> {
        match self.optional(kind, id, target, &reference.id)? {
            Some(index) => Ok(index),
            None => Err(GraphError::MissingAttribute {
                kind,
                id: id.to_string(),
                attribute: match target {
                    EntityKind::Edge => "edge/@id",
                    _ => "corner/@id",
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CENTER_ATTRS: &str =
        r#"x="0" y="0" elevation="0.5" moisture="0.2" water="false" coast="false" ocean="false" border="false""#;

    fn corner(id: &str, x: f64, y: f64) -> String {
        format!(
            r#"<corner id="{id}" x="{x}" y="{y}" elevation="0.1" moisture="0.3" water="false" coast="false" ocean="false" border="false" downslope="-1" river="0"/>"#
        )
    }

    fn document(centers: &str, corners: &str, edges: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<map>
  <generator url="http://example.test/mapgen2/" timestamp="2010-09-16T13:32:59-07:00"/>
  <centers>{centers}</centers>
  <corners>{corners}</corners>
  <edges>{edges}</edges>
</map>"#
        )
    }

    fn fan_document() -> String {
        let centers = format!(
            r#"<center id="c0" biome="GRASSLAND" {CENTER_ATTRS}>
                 <center id="c9"/>
                 <corner id="k0"/><corner id="k1"/><corner id="k2"/>
                 <edge id="e0"/><edge id="e1"/><edge id="e2"/>
               </center>"#
        );
        let corners = [corner("k0", 1.0, 0.0), corner("k1", 0.0, 1.0), corner("k2", -1.0, -1.0)].concat();
        let edges = r#"
            <edge id="e0" corner0="k0" corner1="k1" center0="c0" x="0.5" y="0.5"/>
            <edge id="e1" corner0="k1" corner1="k2" center0="c0"/>
            <edge id="e2" corner0="k2" corner1="k0" center0="c0"/>"#;
        document(&centers, &corners, edges)
    }

    #[test]
    fn parses_and_links_a_fan() {
        let graph = parse_str(&fan_document()).unwrap();
        assert_eq!(graph.centers().len(), 1);
        assert_eq!(graph.corners().len(), 3);
        assert_eq!(graph.edges().len(), 3);
        assert_eq!(
            graph.generator().url.as_deref(),
            Some("http://example.test/mapgen2/")
        );

        let center = graph.center(0);
        assert_eq!(center.biome, "GRASSLAND");
        assert_eq!(center.elevation, 0.5);
        assert!(!center.water);
        assert_eq!(center.corners, vec![0, 1, 2]);
        assert_eq!(center.edges, vec![0, 1, 2]);

        let edge = graph.edge(0);
        assert_eq!(edge.corners(), Some((0, 1)));
        assert_eq!(edge.center0, Some(0));
        assert_eq!(edge.center1, None);
        assert_eq!(edge.midpoint, Some(DVec2::new(0.5, 0.5)));
        assert_eq!(graph.edge(1).midpoint, None);

        assert_eq!(graph.corner(2).downslope, None);
        assert_eq!(graph.corner_index("k1"), Some(1));
    }

    #[test]
    fn forward_references_resolve() {
        // Edges reference centers declared in the same document regardless of order.
        let graph = parse_str(&fan_document()).unwrap();
        assert_eq!(graph.center_index("c0"), Some(0));
        assert_eq!(graph.edge_index("e2"), Some(2));
    }

    #[test]
    fn absent_corner_reference_is_boundary() {
        let centers = format!(r#"<center id="c0" biome="OCEAN" {CENTER_ATTRS}><edge id="e0"/></center>"#);
        let corners = corner("k1", 1.0, 1.0);
        let edges = r#"<edge id="e0" corner1="k1" center0="c0"/>"#;
        let graph = parse_str(&document(&centers, &corners, edges)).unwrap();
        assert!(graph.edge(0).is_boundary());
    }

    #[test]
    fn malformed_number_is_rejected() {
        let centers = r#"<center id="c0" biome="OCEAN" x="1.0" y="abc" elevation="0" moisture="0" water="false" coast="false" ocean="false" border="false"/>"#;
        let err = parse_str(&document(centers, "", "")).unwrap_err();
        match err {
            GraphError::InvalidAttribute {
                kind,
                id,
                attribute,
                value,
                ..
            } => {
                assert_eq!(kind, EntityKind::Center);
                assert_eq!(id, "c0");
                assert_eq!(attribute, "y");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_attribute_is_rejected() {
        let centers = r#"<center id="c0" biome="OCEAN" x="1.0" y="2.0" moisture="0" water="false" coast="false" ocean="false" border="false"/>"#;
        let err = parse_str(&document(centers, "", "")).unwrap_err();
        assert!(matches!(
            err,
            GraphError::MissingAttribute { attribute: "elevation", .. }
        ));
    }

    #[test]
    fn booleans_must_be_literal() {
        let centers = r#"<center id="c0" biome="OCEAN" x="1.0" y="2.0" elevation="0" moisture="0" water="yes" coast="false" ocean="false" border="false"/>"#;
        let err = parse_str(&document(centers, "", "")).unwrap_err();
        assert!(matches!(
            err,
            GraphError::InvalidAttribute { attribute: "water", .. }
        ));
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let corners = r#"<corner id="k0" x="NaN" y="0" elevation="0" moisture="0" water="false" coast="false" ocean="false" border="false" downslope="-1" river="0"/>"#;
        let err = parse_str(&document("", corners, "")).unwrap_err();
        assert!(matches!(err, GraphError::InvalidAttribute { attribute: "x", .. }));
    }

    fn numbered_corner(id: &str, downslope: &str) -> String {
        format!(
            r#"<corner id="{id}" x="0" y="0" elevation="0" moisture="0" water="false" coast="false" ocean="false" border="false" downslope="{downslope}" river="0"/>"#
        )
    }

    #[test]
    fn downslope_resolves_only_known_corners() {
        let corners = [
            numbered_corner("0", "-1"),
            numbered_corner("1", "0"),
            numbered_corner("2", "7"),
        ]
        .concat();
        let graph = parse_str(&document("", &corners, "")).unwrap();
        assert_eq!(graph.corner(0).downslope, None);
        assert_eq!(graph.corner(1).downslope, Some(0));
        assert_eq!(graph.corner(2).downslope, None);
    }

    #[test]
    fn downslope_must_be_numeric() {
        let corners = numbered_corner("0", "uphill");
        let err = parse_str(&document("", &corners, "")).unwrap_err();
        assert!(matches!(
            err,
            GraphError::InvalidAttribute { attribute: "downslope", .. }
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let corners = [corner("k0", 0.0, 0.0), corner("k0", 1.0, 1.0)].concat();
        let err = parse_str(&document("", &corners, "")).unwrap_err();
        assert!(matches!(
            err,
            GraphError::DuplicateId { kind: EntityKind::Corner, .. }
        ));
    }

    #[test]
    fn unknown_references_are_rejected() {
        let edges = r#"<edge id="e0" corner0="missing"/>"#;
        let err = parse_str(&document("", "", edges)).unwrap_err();
        match err {
            GraphError::UnknownReference {
                target, reference, ..
            } => {
                assert_eq!(target, EntityKind::Corner);
                assert_eq!(reference, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn half_a_midpoint_is_rejected() {
        let edges = r#"<edge id="e0" x="1.0"/>"#;
        let err = parse_str(&document("", "", edges)).unwrap_err();
        assert!(matches!(err, GraphError::MissingAttribute { attribute: "y", .. }));
    }

    #[test]
    fn missing_collections_fail_to_parse() {
        let err = parse_str("<map><centers/></map>").unwrap_err();
        assert!(matches!(err, GraphError::Xml(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_from_path("does/not/exist.xml").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.xml"));
    }
}
