//! COLLADA 1.4.1 scene export.
//!
//! The scene graph is assembled as plain data first, then serialized in one
//! pass into memory. The output file is only touched once serialization has
//! succeeded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use glam::Vec3;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;
use tracing::debug;

use crate::biome::{Biome, Rgb};
use crate::config::MaterialPolicy;
use crate::mesh::TerrainMesh;

const COLLADA_NAMESPACE: &str = "http://www.collada.org/2005/11/COLLADASchema";
const GEOMETRY_ID: &str = "terrain-geometry";
const VERTEX_SOURCE_ID: &str = "terrain-verts-array";
const NODE_ID: &str = "node0";
const SCENE_ID: &str = "scene0";
const UP_AXIS: &str = "Z_UP";
const UNIX_EPOCH: &str = "1970-01-01T00:00:00Z";
/// `Date.toString()` form written by the Flash map generator.
const MAPGEN2_TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S GMT%z %Y";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write scene to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("scene serialization failed: {0}")]
    Io(#[from] io::Error),
    #[error("scene serialization failed: {0}")]
    Xml(#[from] quick_xml::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub authoring_tool: String,
    /// xs:dateTime used for both `created` and `modified`.
    pub created: String,
}

impl Asset {
    /// Asset block for a map, dated by its generator timestamp so that output
    /// does not depend on the wall clock.
    pub fn for_map(generator_timestamp: Option<&str>) -> Self {
        Self {
            authoring_tool: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            created: normalize_timestamp(generator_timestamp),
        }
    }
}

/// Converts a generator timestamp to UTC xs:dateTime, or the Unix epoch when
/// it cannot be read.
pub fn normalize_timestamp(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .and_then(|text| {
            DateTime::parse_from_rfc3339(text)
                .or_else(|_| DateTime::parse_from_str(text, MAPGEN2_TIMESTAMP_FORMAT))
                .ok()
        })
        .map(|timestamp| {
            timestamp
                .with_timezone(&Utc)
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string()
        })
        .unwrap_or_else(|| UNIX_EPOCH.to_string())
}

/// Flat-shaded phong effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub id: String,
    pub diffuse: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub id: String,
    pub effect_id: String,
}

/// Indexed triangle list bound to one material symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleSet {
    pub material: String,
    pub indices: Vec<[u32; 3]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub id: String,
    pub positions: Vec<Vec3>,
    pub primitives: Vec<TriangleSet>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub geometry_id: String,
    /// Material ids bound on the geometry instance; symbol and target share the id.
    pub bindings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneDocument {
    pub asset: Asset,
    pub effects: Vec<Effect>,
    pub materials: Vec<Material>,
    pub geometry: Geometry,
    pub scene_id: String,
    pub node: Node,
}

pub fn effect_id(biome: Biome) -> String {
    format!("effect-{}", biome.name())
}

pub fn material_id(biome: Biome) -> String {
    format!("material-{}", biome.name())
}

impl SceneDocument {
    pub fn from_mesh(mesh: &TerrainMesh, policy: MaterialPolicy, asset: Asset) -> Self {
        let palette: Vec<Biome> = match policy {
            MaterialPolicy::All => Biome::ALL.to_vec(),
            MaterialPolicy::Used => mesh.used_biomes().collect(),
        };

        let effects = palette
            .iter()
            .map(|&biome| Effect {
                id: effect_id(biome),
                diffuse: biome.color(),
            })
            .collect();
        let materials: Vec<Material> = palette
            .iter()
            .map(|&biome| Material {
                id: material_id(biome),
                effect_id: effect_id(biome),
            })
            .collect();
        let primitives = mesh
            .buckets()
            .map(|(biome, triangles)| TriangleSet {
                material: material_id(biome),
                indices: triangles.to_vec(),
            })
            .collect();

        Self {
            asset,
            effects,
            node: Node {
                id: NODE_ID.to_string(),
                geometry_id: GEOMETRY_ID.to_string(),
                bindings: materials.iter().map(|material| material.id.clone()).collect(),
            },
            materials,
            geometry: Geometry {
                id: GEOMETRY_ID.to_string(),
                positions: mesh.vertices().to_vec(),
                primitives,
            },
            scene_id: SCENE_ID.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let mut out = XmlOut::new();
        out.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        out.open("COLLADA", &[("xmlns", COLLADA_NAMESPACE), ("version", "1.4.1")])?;
        self.write_asset(&mut out)?;
        // COLLADA libraries must not be empty.
        if !self.effects.is_empty() {
            self.write_effects(&mut out)?;
        }
        if !self.materials.is_empty() {
            self.write_materials(&mut out)?;
        }
        self.write_geometry(&mut out)?;
        self.write_visual_scene(&mut out)?;
        out.open("scene", &[])?;
        out.empty("instance_visual_scene", &[("url", format!("#{}", self.scene_id).as_str())])?;
        out.close("scene")?;
        out.close("COLLADA")?;

        let mut bytes = out.writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Serializes the whole document, then writes it to `path`.
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<usize, ExportError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        fs::write(path, &bytes).map_err(|source| ExportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "wrote scene document");
        Ok(bytes.len())
    }

    fn write_asset(&self, out: &mut XmlOut) -> Result<(), ExportError> {
        out.open("asset", &[])?;
        out.open("contributor", &[])?;
        out.text_element("authoring_tool", &[], &self.asset.authoring_tool)?;
        out.close("contributor")?;
        out.text_element("created", &[], &self.asset.created)?;
        out.text_element("modified", &[], &self.asset.created)?;
        out.empty("unit", &[("name", "meter"), ("meter", "1.0")])?;
        out.text_element("up_axis", &[], UP_AXIS)?;
        out.close("asset")
    }

    fn write_effects(&self, out: &mut XmlOut) -> Result<(), ExportError> {
        out.open("library_effects", &[])?;
        for effect in &self.effects {
            out.open("effect", &[("id", effect.id.as_str()), ("name", effect.id.as_str())])?;
            out.open("profile_COMMON", &[])?;
            out.open("technique", &[("sid", "common")])?;
            out.open("phong", &[])?;
            out.open("diffuse", &[])?;
            let Rgb { r, g, b } = effect.diffuse;
            out.text_element("color", &[], &format!("{r} {g} {b} 1"))?;
            out.close("diffuse")?;
            out.close("phong")?;
            out.close("technique")?;
            out.close("profile_COMMON")?;
            out.close("effect")?;
        }
        out.close("library_effects")
    }

    fn write_materials(&self, out: &mut XmlOut) -> Result<(), ExportError> {
        out.open("library_materials", &[])?;
        for material in &self.materials {
            out.open("material", &[("id", material.id.as_str()), ("name", material.id.as_str())])?;
            out.empty("instance_effect", &[("url", format!("#{}", material.effect_id).as_str())])?;
            out.close("material")?;
        }
        out.close("library_materials")
    }

    fn write_geometry(&self, out: &mut XmlOut) -> Result<(), ExportError> {
        let geometry = &self.geometry;
        let array_id = format!("{VERTEX_SOURCE_ID}-array");
        let vertices_id = format!("{}-vertices", geometry.id);
        let vertex_count = geometry.positions.len().to_string();
        let float_count = (geometry.positions.len() * 3).to_string();
        let floats = join(geometry.positions.iter().flat_map(|position| position.to_array()));

        out.open("library_geometries", &[])?;
        out.open("geometry", &[("id", geometry.id.as_str()), ("name", geometry.id.as_str())])?;
        out.open("mesh", &[])?;

        out.open("source", &[("id", VERTEX_SOURCE_ID)])?;
        out.text_element("float_array", &[("id", array_id.as_str()), ("count", float_count.as_str())], &floats)?;
        out.open("technique_common", &[])?;
        out.open(
            "accessor",
            &[
                ("source", format!("#{array_id}").as_str()),
                ("count", vertex_count.as_str()),
                ("stride", "3"),
            ],
        )?;
        for axis in ["X", "Y", "Z"] {
            out.empty("param", &[("name", axis), ("type", "float")])?;
        }
        out.close("accessor")?;
        out.close("technique_common")?;
        out.close("source")?;

        out.open("vertices", &[("id", vertices_id.as_str())])?;
        out.empty(
            "input",
            &[("semantic", "POSITION"), ("source", format!("#{VERTEX_SOURCE_ID}").as_str())],
        )?;
        out.close("vertices")?;

        for primitive in &geometry.primitives {
            let count = primitive.indices.len().to_string();
            out.open("triangles", &[("count", count.as_str()), ("material", primitive.material.as_str())])?;
            out.empty(
                "input",
                &[
                    ("offset", "0"),
                    ("semantic", "VERTEX"),
                    ("source", format!("#{vertices_id}").as_str()),
                ],
            )?;
            let indices = join(primitive.indices.iter().flatten());
            out.text_element("p", &[], &indices)?;
            out.close("triangles")?;
        }

        out.close("mesh")?;
        out.close("geometry")?;
        out.close("library_geometries")
    }

    fn write_visual_scene(&self, out: &mut XmlOut) -> Result<(), ExportError> {
        let node = &self.node;
        out.open("library_visual_scenes", &[])?;
        out.open("visual_scene", &[("id", self.scene_id.as_str())])?;
        out.open("node", &[("id", node.id.as_str()), ("name", node.id.as_str())])?;
        out.open("instance_geometry", &[("url", format!("#{}", node.geometry_id).as_str())])?;
        if !node.bindings.is_empty() {
            out.open("bind_material", &[])?;
            out.open("technique_common", &[])?;
            for material in &node.bindings {
                out.empty(
                    "instance_material",
                    &[("symbol", material.as_str()), ("target", format!("#{material}").as_str())],
                )?;
            }
            out.close("technique_common")?;
            out.close("bind_material")?;
        }
        out.close("instance_geometry")?;
        out.close("node")?;
        out.close("visual_scene")?;
        out.close("library_visual_scenes")
    }
}

fn join<T: ToString>(values: impl IntoIterator<Item = T>) -> String {
    values
        .into_iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn start<'a>(name: &'a str, attributes: &[(&'a str, &'a str)]) -> BytesStart<'a> {
        let mut start = BytesStart::new(name);
        for &attribute in attributes {
            start.push_attribute(attribute);
        }
        start
    }

    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), ExportError> {
        self.writer.write_event(Event::Start(Self::start(name, attributes)))?;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<(), ExportError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), ExportError> {
        self.writer.write_event(Event::Empty(Self::start(name, attributes)))?;
        Ok(())
    }

    fn text_element(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> Result<(), ExportError> {
        self.open(name, attributes)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScaleConfig;
    use crate::graph::parse_str;
    use crate::mesh::triangulate;

    const FAN: &str = r#"<map>
  <generator url="http://example.test/" timestamp="2010-09-16T13:32:59-07:00"/>
  <centers>
    <center id="0" biome="BEACH" x="0" y="0" elevation="0.5" moisture="0" water="false" coast="true" ocean="false" border="false">
      <corner id="0"/><corner id="1"/><corner id="2"/>
      <edge id="0"/><edge id="1"/><edge id="2"/>
    </center>
  </centers>
  <corners>
    <corner id="0" x="1" y="0" elevation="0" moisture="0" water="false" coast="false" ocean="false" border="false" downslope="0" river="0"/>
    <corner id="1" x="0" y="1" elevation="0" moisture="0" water="false" coast="false" ocean="false" border="false" downslope="1" river="0"/>
    <corner id="2" x="-1" y="-1" elevation="0" moisture="0" water="false" coast="false" ocean="false" border="false" downslope="2" river="0"/>
  </corners>
  <edges>
    <edge id="0" corner0="0" corner1="1" center0="0"/>
    <edge id="1" corner0="1" corner1="2" center0="0"/>
    <edge id="2" corner0="2" corner1="0" center0="0"/>
  </edges>
</map>"#;

    fn fan_mesh() -> TerrainMesh {
        triangulate(&parse_str(FAN).unwrap(), &ScaleConfig::default()).unwrap()
    }

    fn document(policy: MaterialPolicy) -> SceneDocument {
        SceneDocument::from_mesh(&fan_mesh(), policy, Asset::for_map(Some("2010-09-16T13:32:59-07:00")))
    }

    #[test]
    fn all_policy_creates_every_palette_material() {
        let scene = document(MaterialPolicy::All);
        assert_eq!(scene.effects.len(), Biome::ALL.len());
        assert_eq!(scene.materials.len(), Biome::ALL.len());
        assert_eq!(scene.node.bindings.len(), Biome::ALL.len());
        assert_eq!(scene.geometry.primitives.len(), 1);
        assert_eq!(scene.geometry.primitives[0].material, "material-BEACH");
    }

    #[test]
    fn used_policy_prunes_unused_materials() {
        let scene = document(MaterialPolicy::Used);
        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.materials[0].id, "material-BEACH");
        assert_eq!(scene.materials[0].effect_id, "effect-BEACH");
        assert_eq!(scene.effects[0].diffuse, Biome::Beach.color());
        assert_eq!(scene.node.bindings, vec!["material-BEACH".to_string()]);
    }

    #[test]
    fn serialized_document_is_z_up_collada() {
        let xml = String::from_utf8(document(MaterialPolicy::Used).to_bytes().unwrap()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains(r#"<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">"#));
        assert!(xml.contains("<up_axis>Z_UP</up_axis>"));
        assert!(xml.contains("<created>2010-09-16T20:32:59Z</created>"));
        assert!(xml.contains(r#"<float_array id="terrain-verts-array-array" count="12">0 0 50 1 0 0 0 1 0 -1 -1 0</float_array>"#));
        assert!(xml.contains(r#"<triangles count="3" material="material-BEACH">"#));
        assert!(xml.contains("<p>2 1 0 3 2 0 1 3 0</p>"));
        assert!(xml.contains(r##"<instance_material symbol="material-BEACH" target="#material-BEACH"/>"##));
        assert!(xml.contains(r##"<instance_visual_scene url="#scene0"/>"##));
    }

    #[test]
    fn empty_libraries_are_omitted() {
        let scene = SceneDocument::from_mesh(
            &TerrainMesh::default(),
            MaterialPolicy::Used,
            Asset::for_map(None),
        );
        assert!(scene.materials.is_empty());

        let xml = String::from_utf8(scene.to_bytes().unwrap()).unwrap();
        assert!(!xml.contains("library_effects"));
        assert!(!xml.contains("library_materials"));
        assert!(!xml.contains("bind_material"));
        assert!(!xml.contains("<triangles"));
        assert!(xml.contains(r#"<float_array id="terrain-verts-array-array" count="0">"#));
        assert!(xml.contains(r##"<instance_geometry url="#terrain-geometry">"##));
    }

    #[test]
    fn serialization_is_deterministic() {
        let first = document(MaterialPolicy::All).to_bytes().unwrap();
        let second = document(MaterialPolicy::All).to_bytes().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn write_to_path_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fan.dae");
        let written = document(MaterialPolicy::Used).write_to_path(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len() as usize, written);
    }

    #[test]
    fn timestamps_normalize_to_utc() {
        assert_eq!(
            normalize_timestamp(Some("2010-09-16T13:32:59-07:00")),
            "2010-09-16T20:32:59Z"
        );
        assert_eq!(
            normalize_timestamp(Some("Thu Sep 16 13:32:59 GMT-0700 2010")),
            "2010-09-16T20:32:59Z"
        );
        assert_eq!(normalize_timestamp(Some("yesterday")), UNIX_EPOCH);
        assert_eq!(normalize_timestamp(None), UNIX_EPOCH);
    }
}
