//! Binary glTF 2.0 (GLB) export
//!
//! Writes a single-mesh, single-node scene. The layout is:
//!
//! ```text
//! header   magic "glTF" | version 2 | total length
//! chunk 0  JSON, padded with spaces to 4 bytes
//! chunk 1  BIN, padded with zeros to 4 bytes
//! ```
//!
//! All attribute data is little-endian; indices are always `u32`.

use super::Mesh;
use serde_json::{json, Value};
use std::io::Cursor;
use thiserror::Error;

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;
const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

// glTF enums
const COMPONENT_FLOAT: u32 = 5126;
const COMPONENT_UNSIGNED_INT: u32 = 5125;
const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;
const MODE_TRIANGLES: u32 = 4;
const FILTER_LINEAR: u32 = 9729;
const WRAP_CLAMP_TO_EDGE: u32 = 33071;

#[derive(Debug, Error)]
pub enum GlbError {
    #[error("Mesh has no triangles")]
    EmptyMesh,

    #[error("Triangle index {index} out of range for {vertices} vertices")]
    IndexOutOfRange { index: u32, vertices: usize },

    #[error("Attribute {name} has {actual} entries, mesh has {expected} vertices")]
    AttributeLength {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Texture encoding failed: {0}")]
    Texture(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed GLB: {0}")]
    Malformed(String),
}

/// Accumulates the BIN chunk plus the bufferView/accessor JSON describing it
#[derive(Default)]
struct BinBuilder {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

impl BinBuilder {
    fn push_view(&mut self, bytes: &[u8], target: Option<u32>) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let mut view = json!({
            "buffer": 0,
            "byteOffset": self.bin.len(),
            "byteLength": bytes.len(),
        });
        if let Some(target) = target {
            view["target"] = json!(target);
        }
        self.bin.extend_from_slice(bytes);
        self.views.push(view);
        self.views.len() - 1
    }

    fn push_accessor(&mut self, accessor: Value) -> usize {
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn push_vec3(&mut self, data: &[[f32; 3]], with_bounds: bool) -> usize {
        let view = self.push_view(&f32_bytes(bytemuck::cast_slice(data)), Some(TARGET_ARRAY_BUFFER));
        let mut accessor = json!({
            "bufferView": view,
            "componentType": COMPONENT_FLOAT,
            "count": data.len(),
            "type": "VEC3",
        });
        if with_bounds {
            let (min, max) = vec3_bounds(data);
            accessor["min"] = json!(min);
            accessor["max"] = json!(max);
        }
        self.push_accessor(accessor)
    }

    fn push_vec2(&mut self, data: &[[f32; 2]]) -> usize {
        let view = self.push_view(&f32_bytes(bytemuck::cast_slice(data)), Some(TARGET_ARRAY_BUFFER));
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": COMPONENT_FLOAT,
            "count": data.len(),
            "type": "VEC2",
        }))
    }

    fn push_indices(&mut self, indices: &[u32]) -> usize {
        let bytes = if cfg!(target_endian = "little") {
            bytemuck::cast_slice::<u32, u8>(indices).to_vec()
        } else {
            indices.iter().flat_map(|i| i.to_le_bytes()).collect()
        };
        let view = self.push_view(&bytes, Some(TARGET_ELEMENT_ARRAY_BUFFER));
        self.push_accessor(json!({
            "bufferView": view,
            "componentType": COMPONENT_UNSIGNED_INT,
            "count": indices.len(),
            "type": "SCALAR",
        }))
    }
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        bytemuck::cast_slice::<f32, u8>(values).to_vec()
    } else {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}

fn vec3_bounds(data: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for p in data {
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }
    (min, max)
}

fn check_len(name: &'static str, expected: usize, actual: usize) -> Result<(), GlbError> {
    if expected == actual {
        Ok(())
    } else {
        Err(GlbError::AttributeLength {
            name,
            expected,
            actual,
        })
    }
}

/// Serialize `mesh` as a GLB byte buffer
///
/// Positions and indices are always written; normals, vertex colours and the
/// UV set with its embedded PNG texture are written when present.
pub fn export_glb(mesh: &Mesh) -> Result<Vec<u8>, GlbError> {
    if mesh.is_empty() {
        return Err(GlbError::EmptyMesh);
    }
    let vertices = mesh.vertex_count();
    if let Some(&index) = mesh.indices.iter().find(|i| **i as usize >= vertices) {
        return Err(GlbError::IndexOutOfRange { index, vertices });
    }

    let mut builder = BinBuilder::default();
    let mut attributes = serde_json::Map::new();

    let position = builder.push_vec3(&mesh.positions, true);
    attributes.insert("POSITION".into(), json!(position));

    if !mesh.normals.is_empty() {
        check_len("NORMAL", vertices, mesh.normals.len())?;
        let normal = builder.push_vec3(&mesh.normals, false);
        attributes.insert("NORMAL".into(), json!(normal));
    }

    if let Some(colors) = &mesh.colors {
        check_len("COLOR_0", vertices, colors.len())?;
        let color = builder.push_vec3(colors, false);
        attributes.insert("COLOR_0".into(), json!(color));
    }

    let mut material = json!({
        "name": "surface",
        "pbrMetallicRoughness": {
            "baseColorFactor": [1.0, 1.0, 1.0, 1.0],
            "metallicFactor": 0.0,
            "roughnessFactor": 1.0,
        },
        "doubleSided": false,
    });

    let mut images = Vec::new();
    if let (Some(uvs), Some(texture)) = (&mesh.uvs, &mesh.texture) {
        check_len("TEXCOORD_0", vertices, uvs.len())?;
        let uv = builder.push_vec2(uvs);
        attributes.insert("TEXCOORD_0".into(), json!(uv));

        let mut png = Vec::new();
        texture.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
        let view = builder.push_view(&png, None);
        images.push(json!({ "bufferView": view, "mimeType": "image/png" }));
        material["pbrMetallicRoughness"]["baseColorTexture"] = json!({ "index": 0 });
    }

    let indices = builder.push_indices(&mesh.indices);
    while builder.bin.len() % 4 != 0 {
        builder.bin.push(0);
    }

    let mut document = json!({
        "asset": { "version": "2.0", "generator": concat!("photomesh ", env!("CARGO_PKG_VERSION")) },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": attributes,
                "indices": indices,
                "material": 0,
                "mode": MODE_TRIANGLES,
            }],
        }],
        "materials": [material],
        "buffers": [{ "byteLength": builder.bin.len() }],
        "bufferViews": builder.views,
        "accessors": builder.accessors,
    });
    if !images.is_empty() {
        document["images"] = json!(images);
        document["samplers"] = json!([{
            "magFilter": FILTER_LINEAR,
            "minFilter": FILTER_LINEAR,
            "wrapS": WRAP_CLAMP_TO_EDGE,
            "wrapT": WRAP_CLAMP_TO_EDGE,
        }]);
        document["textures"] = json!([{ "sampler": 0, "source": 0 }]);
    }

    let mut json_chunk = serde_json::to_vec(&document)?;
    while json_chunk.len() % 4 != 0 {
        json_chunk.push(b' ');
    }
    let bin_chunk = builder.bin;

    let total = HEADER_LEN + CHUNK_HEADER_LEN + json_chunk.len() + CHUNK_HEADER_LEN + bin_chunk.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json_chunk);
    out.extend_from_slice(&(bin_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin_chunk);

    tracing::debug!(bytes = out.len(), vertices, "exported GLB");
    Ok(out)
}

/// Structural view of a GLB file
#[derive(Debug, Clone)]
pub struct GlbSummary {
    pub json: Value,
    pub bin_len: usize,
}

impl GlbSummary {
    fn primitive(&self) -> &Value {
        &self.json["meshes"][0]["primitives"][0]
    }

    /// Whether the first primitive carries the named vertex attribute
    pub fn has_attribute(&self, name: &str) -> bool {
        self.primitive()["attributes"].get(name).is_some()
    }

    fn accessor_count(&self, accessor: &Value) -> Option<usize> {
        let index = accessor.as_u64()? as usize;
        self.json["accessors"][index]["count"]
            .as_u64()
            .map(|c| c as usize)
    }

    pub fn vertex_count(&self) -> usize {
        self.accessor_count(&self.primitive()["attributes"]["POSITION"])
            .unwrap_or(0)
    }

    pub fn triangle_count(&self) -> usize {
        self.accessor_count(&self.primitive()["indices"])
            .unwrap_or(0)
            / 3
    }

    pub fn has_texture(&self) -> bool {
        self.json["images"]
            .as_array()
            .is_some_and(|images| !images.is_empty())
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, GlbError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| GlbError::Malformed(format!("truncated at byte {offset}")))
}

/// Validate the container framing and parse the JSON chunk
pub fn inspect_glb(bytes: &[u8]) -> Result<GlbSummary, GlbError> {
    if read_u32(bytes, 0)? != GLB_MAGIC {
        return Err(GlbError::Malformed("bad magic".into()));
    }
    let version = read_u32(bytes, 4)?;
    if version != GLB_VERSION {
        return Err(GlbError::Malformed(format!("unsupported version {version}")));
    }
    let total = read_u32(bytes, 8)? as usize;
    if total != bytes.len() {
        return Err(GlbError::Malformed(format!(
            "header length {total} does not match {} bytes",
            bytes.len()
        )));
    }

    let json_len = read_u32(bytes, HEADER_LEN)? as usize;
    if read_u32(bytes, HEADER_LEN + 4)? != CHUNK_JSON {
        return Err(GlbError::Malformed("first chunk is not JSON".into()));
    }
    let json_start = HEADER_LEN + CHUNK_HEADER_LEN;
    let json_bytes = bytes
        .get(json_start..json_start + json_len)
        .ok_or_else(|| GlbError::Malformed("JSON chunk overruns file".into()))?;
    let json: Value = serde_json::from_slice(json_bytes)?;

    let bin_header = json_start + json_len;
    let bin_len = if bin_header < bytes.len() {
        let len = read_u32(bytes, bin_header)? as usize;
        if read_u32(bytes, bin_header + 4)? != CHUNK_BIN {
            return Err(GlbError::Malformed("second chunk is not BIN".into()));
        }
        if bin_header + CHUNK_HEADER_LEN + len > bytes.len() {
            return Err(GlbError::Malformed("BIN chunk overruns file".into()));
        }
        len
    } else {
        0
    };

    Ok(GlbSummary { json, bin_len })
}
