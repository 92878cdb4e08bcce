//! Defines the self-describing on-disk format for a single product snapshot.
//! This module is the single source of truth for serialization and
//! deserialization of every container level.
//!
//! Layout:
//!
//! ```text
//! magic "EDRP" | version u16 | level u8 | meta_len u32 | meta JSON
//! array_count u16
//! per array (sorted by name):
//!   name (u16-prefixed UTF-8) | ndim u8 | dims u32 each | f64 LE payload
//! ```
//!
//! The writer sorts array names and the metadata block uses ordered maps, so
//! serialization is deterministic: identical containers produce byte-identical
//! files. The reader validates every declared length against the buffer before
//! allocating, and either fully succeeds or fails with `MalformedProduct`.

use crate::error::DrpError;
use crate::types::DataLevel;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

//==================================================================================
// Format Constants
//==================================================================================
/// The magic number identifying a persisted reduction product.
pub const PRODUCT_MAGIC: &[u8; 4] = b"EDRP";
/// The current version of the product file format.
pub const PRODUCT_FORMAT_VERSION: u16 = 1;

/// The minimum possible size of a valid product file in bytes.
const MIN_PRODUCT_SIZE: usize = 13; // magic(4) + ver(2) + level(1) + meta_len(4) + count(2)
/// A reasonable limit to prevent OOM from malformed metadata lengths. (16MB)
const MAX_REASONABLE_META_LEN: usize = 16 * 1024 * 1024;
/// Upper bound on elements in a single array extension (2 GiB of f64).
const MAX_ARRAY_ELEMENTS: usize = 1 << 28;

//==================================================================================
// Public Structs
//==================================================================================

/// A named bulk-data extension: an n-dimensional f64 array stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayExtension {
    pub dims: Vec<usize>,
    pub data: Vec<f64>,
}

impl ArrayExtension {
    pub fn new(dims: Vec<usize>, data: Vec<f64>) -> Result<Self, DrpError> {
        let expected: usize = dims.iter().product();
        if expected != data.len() {
            return Err(DrpError::Internal(format!(
                "array extension dims {:?} do not match {} elements",
                dims,
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }
}

/// The generic persisted form of a container: a level tag, a JSON metadata
/// block (header, provenance, structural descriptors) and the bulk arrays.
/// Each container level maps itself to and from this struct.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFile {
    pub level: DataLevel,
    pub meta_json: String,
    pub arrays: BTreeMap<String, ArrayExtension>,
}

//==================================================================================
// Core Implementation
//==================================================================================

impl ProductFile {
    /// Serializes the product into a canonical, final byte vector.
    ///
    /// This is the authoritative writer for the product format. The BTreeMap
    /// guarantees arrays are emitted in sorted name order, which keeps the
    /// output deterministic.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DrpError> {
        let meta = self.meta_json.as_bytes();
        if meta.len() > MAX_REASONABLE_META_LEN {
            return Err(DrpError::MalformedProduct(format!(
                "metadata block ({} bytes) exceeds maximum allowed size ({})",
                meta.len(),
                MAX_REASONABLE_META_LEN
            )));
        }

        let payload_size: usize = self.arrays.values().map(|a| a.data.len() * 8).sum();
        let mut buf = Vec::with_capacity(MIN_PRODUCT_SIZE + meta.len() + payload_size);

        let map_err = |e: std::io::Error| DrpError::MalformedProduct(e.to_string());

        buf.write_all(PRODUCT_MAGIC).map_err(map_err)?;
        buf.write_all(&PRODUCT_FORMAT_VERSION.to_le_bytes())
            .map_err(map_err)?;
        buf.write_all(&[self.level.as_byte()]).map_err(map_err)?;
        buf.write_all(&(meta.len() as u32).to_le_bytes())
            .map_err(map_err)?;
        buf.write_all(meta).map_err(map_err)?;

        buf.write_all(&(self.arrays.len() as u16).to_le_bytes())
            .map_err(map_err)?;
        for (name, ext) in &self.arrays {
            write_prefixed_string(&mut buf, name)?;
            buf.write_all(&[ext.dims.len() as u8]).map_err(map_err)?;
            for dim in &ext.dims {
                buf.write_all(&(*dim as u32).to_le_bytes()).map_err(map_err)?;
            }
            // f64 payloads are written via a Pod cast; the format is LE and
            // the supported targets are LE.
            buf.write_all(bytemuck::cast_slice(&ext.data))
                .map_err(map_err)?;
        }

        Ok(buf)
    }

    /// Deserializes a full byte slice into a `ProductFile`.
    ///
    /// Every length is validated against the remaining buffer before the
    /// corresponding allocation; a failure at any point returns
    /// `MalformedProduct` without exposing a partial result.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DrpError> {
        if bytes.len() < MIN_PRODUCT_SIZE {
            return Err(DrpError::MalformedProduct(format!(
                "product file too small to be valid: minimum {}, got {}",
                MIN_PRODUCT_SIZE,
                bytes.len()
            )));
        }

        let mut cursor = Cursor::new(bytes);
        let map_err = |e: std::io::Error| DrpError::MalformedProduct(e.to_string());

        let mut magic_buf = [0u8; 4];
        cursor.read_exact(&mut magic_buf).map_err(map_err)?;
        if magic_buf != *PRODUCT_MAGIC {
            return Err(DrpError::MalformedProduct(
                "invalid product magic number".into(),
            ));
        }

        let mut u16_buf = [0u8; 2];
        cursor.read_exact(&mut u16_buf).map_err(map_err)?;
        let version = u16::from_le_bytes(u16_buf);
        if version != PRODUCT_FORMAT_VERSION {
            return Err(DrpError::MalformedProduct(format!(
                "unsupported product version: expected {}, got {}",
                PRODUCT_FORMAT_VERSION, version
            )));
        }

        let mut level_buf = [0u8; 1];
        cursor.read_exact(&mut level_buf).map_err(map_err)?;
        let level = DataLevel::from_byte(level_buf[0]).ok_or_else(|| {
            DrpError::MalformedProduct(format!("unknown data level tag {}", level_buf[0]))
        })?;

        let mut u32_buf = [0u8; 4];
        cursor.read_exact(&mut u32_buf).map_err(map_err)?;
        let meta_len = u32::from_le_bytes(u32_buf) as usize;
        if meta_len > MAX_REASONABLE_META_LEN {
            return Err(DrpError::MalformedProduct(format!(
                "declared metadata length ({}) exceeds maximum allowed size ({})",
                meta_len, MAX_REASONABLE_META_LEN
            )));
        }
        if bytes.len() - (cursor.position() as usize) < meta_len {
            return Err(DrpError::MalformedProduct(
                "metadata length exceeds buffer size".into(),
            ));
        }
        let mut meta_buf = vec![0u8; meta_len];
        cursor.read_exact(&mut meta_buf).map_err(map_err)?;
        let meta_json = String::from_utf8(meta_buf)
            .map_err(|e| DrpError::MalformedProduct(e.to_string()))?;

        cursor.read_exact(&mut u16_buf).map_err(map_err)?;
        let array_count = u16::from_le_bytes(u16_buf);

        let mut arrays = BTreeMap::new();
        for _ in 0..array_count {
            let name = read_prefixed_string(&mut cursor)?;
            let mut ndim_buf = [0u8; 1];
            cursor.read_exact(&mut ndim_buf).map_err(map_err)?;
            let mut dims = Vec::with_capacity(ndim_buf[0] as usize);
            for _ in 0..ndim_buf[0] {
                cursor.read_exact(&mut u32_buf).map_err(map_err)?;
                dims.push(u32::from_le_bytes(u32_buf) as usize);
            }
            // Declared dims are untrusted; an unchecked product could wrap
            // past MAX_ARRAY_ELEMENTS.
            let elements = dims
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .filter(|&n| n <= MAX_ARRAY_ELEMENTS)
                .ok_or_else(|| {
                    DrpError::MalformedProduct(format!(
                        "array '{}' declares dims {:?}, exceeding the element maximum",
                        name, dims
                    ))
                })?;
            let remaining = bytes.len() - cursor.position() as usize;
            if remaining < elements * 8 {
                return Err(DrpError::MalformedProduct(format!(
                    "array '{}' payload is truncated",
                    name
                )));
            }
            let mut payload = vec![0u8; elements * 8];
            cursor.read_exact(&mut payload).map_err(map_err)?;
            let data: Vec<f64> = bytemuck::try_cast_slice(&payload)?.to_vec();
            if arrays.insert(name.clone(), ArrayExtension { dims, data }).is_some() {
                return Err(DrpError::MalformedProduct(format!(
                    "duplicate array extension '{}'",
                    name
                )));
            }
        }

        if cursor.position() as usize != bytes.len() {
            return Err(DrpError::MalformedProduct(
                "trailing bytes after the final array payload".into(),
            ));
        }

        Ok(Self {
            level,
            meta_json,
            arrays,
        })
    }

    /// Writes the serialized product to a file path.
    pub fn write_to(&self, path: &Path) -> Result<(), DrpError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Reads and deserializes a product from a file path.
    pub fn read_from(path: &Path) -> Result<Self, DrpError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Removes a named array extension, failing if it is absent. Container
    /// readers use this to consume exactly the extensions their metadata
    /// declares.
    pub fn take_array(&mut self, name: &str) -> Result<ArrayExtension, DrpError> {
        self.arrays.remove(name).ok_or_else(|| {
            DrpError::MalformedProduct(format!("missing array extension '{}'", name))
        })
    }
}

//==================================================================================
// Private Helpers
//==================================================================================

fn write_prefixed_string(buf: &mut Vec<u8>, s: &str) -> Result<(), DrpError> {
    if s.len() > u16::MAX as usize {
        return Err(DrpError::MalformedProduct(format!(
            "array name length ({}) exceeds the u16 prefix",
            s.len()
        )));
    }
    let map_err = |e: std::io::Error| DrpError::MalformedProduct(e.to_string());
    buf.write_all(&(s.len() as u16).to_le_bytes()).map_err(map_err)?;
    buf.write_all(s.as_bytes()).map_err(map_err)
}

fn read_prefixed_string(cursor: &mut Cursor<&[u8]>) -> Result<String, DrpError> {
    let map_err = |e: std::io::Error| DrpError::MalformedProduct(e.to_string());
    let mut len_buf = [0u8; 2];
    cursor.read_exact(&mut len_buf).map_err(map_err)?;
    let len = u16::from_le_bytes(len_buf) as usize;
    let mut str_buf = vec![0u8; len];
    cursor.read_exact(&mut str_buf).map_err(map_err)?;
    String::from_utf8(str_buf).map_err(|e| DrpError::MalformedProduct(e.to_string()))
}

//==================================================================================
// Unit Tests
//==================================================================================
