use bincode::{DefaultOptions, Options, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{InventoryError, Result};
use crate::product::Product;
use crate::storage::StorageError;

/// Most bytes a snapshot may decompress to
pub const SNAPSHOT_LIMIT: u64 = 64 * 1024 * 1024;

/// Write a gzip-compressed bincode snapshot of the catalog to `path`
pub fn save_catalog(products: &[Product], path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path).map_err(StorageError::from)?;
    write_snapshot(products, file)
}

/// Read a snapshot written by [`save_catalog`]
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<Product>> {
    let file = File::open(path).map_err(StorageError::from)?;
    read_snapshot(file)
}

/// Serialize the catalog snapshot to a memory buffer
pub fn catalog_to_bytes(products: &[Product]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_snapshot(products, &mut buffer)?;
    Ok(buffer)
}

/// Deserialize a catalog snapshot from a memory buffer
pub fn catalog_from_bytes(buffer: &[u8]) -> Result<Vec<Product>> {
    read_snapshot(buffer)
}

fn write_snapshot(products: &[Product], sink: impl Write) -> Result<()> {
    let encoder = GzEncoder::new(sink, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serialize_into(&mut writer, products).map_err(|e| InventoryError::Export(e.to_string()))?;

    // Flush the buffer and the gzip trailer explicitly so errors surface here
    let encoder = writer
        .into_inner()
        .map_err(|e| StorageError::from(e.into_error()))?;
    encoder.finish().map_err(StorageError::from)?;
    Ok(())
}

fn read_snapshot(source: impl Read) -> Result<Vec<Product>> {
    let decoder = GzDecoder::new(source);
    let mut reader = BufReader::new(decoder);

    // Same layout as `serialize_into`, but length prefixes are checked against
    // the limit before anything is allocated
    DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(SNAPSHOT_LIMIT)
        .deserialize_from(&mut reader)
        .map_err(|e| InventoryError::Decode(e.to_string()))
}
