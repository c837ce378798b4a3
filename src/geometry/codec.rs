//! Binary geometry exchange format.
//!
//! Positions and uvs are flat little-endian single-precision floats, the
//! triangle index list is 16- or 32-bit unsigned (whichever the vertex
//! count fits in), and topology faces are length-prefixed variable index
//! lists. This is the only persisted geometry shape; everything derived
//! (normals, bounds) is recomputed on decode.

use super::MeshGeometry;

const MAGIC: &[u8; 4] = b"MGEO";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("not a geometry blob (bad magic)")]
    BadMagic,
    #[error("truncated input: needed {needed} more bytes")]
    Truncated { needed: usize },
    #[error("index {index} out of range for vertex count {vertex_count}")]
    IndexOutOfRange { index: u32, vertex_count: u32 },
}

pub type Result<T> = std::result::Result<T, CodecError>;

fn wide_indices(vertex_count: usize) -> bool {
    vertex_count > u16::MAX as usize
}

pub fn encode_geometry(geometry: &MeshGeometry) -> Vec<u8> {
    let vertex_count = geometry.positions.len() as u32;
    let wide = wide_indices(geometry.positions.len());

    let mut out = Vec::with_capacity(
        16 + geometry.positions.len() * 12
            + geometry.uvs.len() * 8
            + geometry.indices.len() * if wide { 4 } else { 2 },
    );
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&vertex_count.to_le_bytes());
    out.extend_from_slice(&(geometry.indices.len() as u32).to_le_bytes());
    out.extend_from_slice(&(geometry.faces.len() as u32).to_le_bytes());

    for p in &geometry.positions {
        for c in p {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }
    for uv in &geometry.uvs {
        for c in uv {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }
    let mut push_index = |out: &mut Vec<u8>, index: u32| {
        if wide {
            out.extend_from_slice(&index.to_le_bytes());
        } else {
            out.extend_from_slice(&(index as u16).to_le_bytes());
        }
    };
    for &index in &geometry.indices {
        push_index(&mut out, index);
    }
    for face in &geometry.faces {
        out.extend_from_slice(&(face.len() as u32).to_le_bytes());
        for &index in face {
            push_index(&mut out, index);
        }
    }
    out
}

struct Reader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.cursor.checked_add(len).ok_or(CodecError::Truncated {
            needed: len,
        })?;
        if end > self.bytes.len() {
            return Err(CodecError::Truncated {
                needed: end - self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn f32(&mut self) -> Result<f32> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn index(&mut self, wide: bool, vertex_count: u32) -> Result<u32> {
        let index = if wide {
            self.u32()?
        } else {
            self.u16()? as u32
        };
        if index >= vertex_count {
            return Err(CodecError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }
        Ok(index)
    }
}

/// Capacity hint clamped by how many `elem_bytes`-sized records the
/// remaining input can actually hold. Header counts are untrusted; a
/// corrupt count near `u32::MAX` must not reserve gigabytes before the
/// first truncation error.
fn bounded_capacity(count: u32, elem_bytes: usize, remaining: usize) -> usize {
    (count as usize).min(remaining / elem_bytes.max(1))
}

pub fn decode_geometry(bytes: &[u8]) -> Result<MeshGeometry> {
    let mut reader = Reader { bytes, cursor: 0 };
    if reader.take(4)? != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let vertex_count = reader.u32()?;
    let index_count = reader.u32()?;
    let face_count = reader.u32()?;
    let wide = wide_indices(vertex_count as usize);
    let index_bytes = if wide { 4 } else { 2 };

    let mut positions = Vec::with_capacity(bounded_capacity(vertex_count, 12, reader.remaining()));
    for _ in 0..vertex_count {
        positions.push([reader.f32()?, reader.f32()?, reader.f32()?]);
    }
    let mut uvs = Vec::with_capacity(bounded_capacity(vertex_count, 8, reader.remaining()));
    for _ in 0..vertex_count {
        uvs.push([reader.f32()?, reader.f32()?]);
    }
    let mut indices =
        Vec::with_capacity(bounded_capacity(index_count, index_bytes, reader.remaining()));
    for _ in 0..index_count {
        indices.push(reader.index(wide, vertex_count)?);
    }
    let mut faces = Vec::with_capacity(bounded_capacity(face_count, 4, reader.remaining()));
    for _ in 0..face_count {
        let len = reader.u32()?;
        let mut face = Vec::with_capacity(bounded_capacity(len, index_bytes, reader.remaining()));
        for _ in 0..len {
            face.push(reader.index(wide, vertex_count)?);
        }
        faces.push(face);
    }
    Ok(MeshGeometry::from_buffers(positions, uvs, indices, faces))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::unit_quad;

    #[test]
    fn quad_roundtrip() {
        let quad = unit_quad();
        let bytes = encode_geometry(&quad);
        let decoded = decode_geometry(&bytes).unwrap();
        assert_eq!(decoded.positions, quad.positions);
        assert_eq!(decoded.uvs, quad.uvs);
        assert_eq!(decoded.indices, quad.indices);
        assert_eq!(decoded.faces, quad.faces);
    }

    #[test]
    fn small_meshes_use_16_bit_indices() {
        let quad = unit_quad();
        let bytes = encode_geometry(&quad);
        // header 16 + 4*12 positions + 4*8 uvs + 6*2 indices + (4 + 4*2) face
        assert_eq!(bytes.len(), 16 + 48 + 32 + 12 + 12);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = encode_geometry(&unit_quad());
        bytes[0] = b'X';
        assert!(matches!(decode_geometry(&bytes), Err(CodecError::BadMagic)));
    }

    #[test]
    fn truncation_is_reported() {
        let bytes = encode_geometry(&unit_quad());
        let result = decode_geometry(&bytes[..bytes.len() - 3]);
        assert!(matches!(result, Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn corrupt_counts_do_not_reserve_oversized_buffers() {
        // 100 remaining bytes hold at most 8 positions, whatever the
        // header claims.
        assert_eq!(bounded_capacity(u32::MAX, 12, 100), 8);
        assert_eq!(bounded_capacity(4, 12, 100), 4);

        // A header claiming u32::MAX vertices over a 4-byte payload must
        // fail with truncation, not attempt a multi-gigabyte allocation.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&u32::MAX.to_le_bytes()); // vertex count
        bytes.extend_from_slice(&0u32.to_le_bytes()); // index count
        bytes.extend_from_slice(&0u32.to_le_bytes()); // face count
        bytes.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            decode_geometry(&bytes),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut quad = unit_quad();
        quad.indices[0] = 0; // keep valid, corrupt the wire bytes instead
        let mut bytes = encode_geometry(&quad);
        // First index starts after header + positions + uvs.
        let index_offset = 16 + 48 + 32;
        bytes[index_offset] = 0xFF;
        bytes[index_offset + 1] = 0xFF;
        assert!(matches!(
            decode_geometry(&bytes),
            Err(CodecError::IndexOutOfRange { .. })
        ));
    }
}
