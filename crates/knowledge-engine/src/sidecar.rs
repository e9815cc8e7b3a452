//! Sidecar codec (C4): deterministic gzip-framed per-chunk embedding
//! files plus the sorted-key JSON manifest that tracks them.
//!
//! The byte layout is hand-assembled rather than produced by
//! `flate2::GzBuilder` (which stamps the current time into MTIME by
//! default and does not expose the fixed xfl/os bytes this format
//! pins) — see spec §6.5. `flate2`'s raw `DeflateEncoder`/`DeflateDecoder`
//! supply the payload; the ten-byte header and eight-byte trailer are
//! assembled by hand around it.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use knowledge_engine_core::embedding::{blob_to_vec, vec_to_blob};
use knowledge_engine_core::models::{ManifestEntry, SidecarManifest};
use knowledge_engine_core::store::Store;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const METHOD_DEFLATE: u8 = 0x08;
const FLAGS_NONE: u8 = 0x00;
const MTIME_ZERO: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
const XFL: u8 = 0x00;
const OS_UNKNOWN: u8 = 0xFF;

/// Encode a raw byte payload into the deterministic gzip frame of §6.5.
pub fn encode_sidecar_bytes(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(6));
    encoder.write_all(raw)?;
    let payload = encoder.finish()?;

    let mut crc = crc32fast::Hasher::new();
    crc.update(raw);
    let crc32 = crc.finalize();

    let mut out = Vec::with_capacity(10 + payload.len() + 8);
    out.extend_from_slice(&GZIP_MAGIC);
    out.push(METHOD_DEFLATE);
    out.push(FLAGS_NONE);
    out.extend_from_slice(&MTIME_ZERO);
    out.push(XFL);
    out.push(OS_UNKNOWN);
    out.extend_from_slice(&payload);
    out.extend_from_slice(&crc32.to_le_bytes());
    out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
    Ok(out)
}

/// Decode a sidecar frame written by [`encode_sidecar_bytes`], validating
/// the fixed header fields and the CRC32/ISIZE trailer.
pub fn decode_sidecar_bytes(frame: &[u8]) -> Result<Vec<u8>> {
    if frame.len() < 18 {
        bail!("sidecar frame too short: {} bytes", frame.len());
    }
    if frame[0..2] != GZIP_MAGIC {
        bail!("sidecar frame missing gzip magic");
    }
    if frame[2] != METHOD_DEFLATE {
        bail!("sidecar frame uses unsupported compression method {}", frame[2]);
    }
    if frame[3] != FLAGS_NONE {
        bail!("sidecar frame has unexpected flags byte {}", frame[3]);
    }
    if frame[4..8] != MTIME_ZERO {
        bail!("sidecar frame has non-zero mtime");
    }

    let payload = &frame[10..frame.len() - 8];
    let trailer = &frame[frame.len() - 8..];
    let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let expected_isize = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);

    let mut decoder = DeflateDecoder::new(payload);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw).context("failed to inflate sidecar payload")?;

    if raw.len() as u32 != expected_isize {
        bail!("sidecar ISIZE mismatch: frame says {}, inflated {} bytes", expected_isize, raw.len());
    }
    let mut crc = crc32fast::Hasher::new();
    crc.update(&raw);
    if crc.finalize() != expected_crc {
        bail!("sidecar CRC32 mismatch");
    }

    Ok(raw)
}

/// SHA-256 of a vector's raw little-endian f32 bytes, lowercase hex.
pub fn checksum_for(vector: &[f32]) -> String {
    let blob = vec_to_blob(vector);
    let mut hasher = Sha256::new();
    hasher.update(&blob);
    format!("{:x}", hasher.finalize())
}

/// `{data_dir}/{store_type_path}/{chunk_id}.emb.gz`, with `store_type`'s
/// dot-separated segments becoming nested directories (§6.4).
pub fn sidecar_path(data_dir: &Path, store_type: &str, chunk_id: &str) -> PathBuf {
    let mut path = data_dir.to_path_buf();
    for segment in store_type.split('.') {
        path.push(segment);
    }
    path.push(format!("{chunk_id}.emb.gz"));
    path
}

// `data_dir` is already the sidecar root (the CLI's `--sidecar-dir`,
// conventionally named `.embeddings`); per-chunk frames nest under it
// directly via `sidecar_path`, so the manifest lives right alongside
// them rather than in a further `.embeddings/` subdirectory.
const MANIFEST_RELATIVE_PATH: &str = "metadata.json";

/// Owns the sidecar tree and its manifest for one data directory.
///
/// Every write is checksum-guarded: a `chunk_id` whose manifest entry
/// already matches the new vector's checksum is skipped entirely (§4.4
/// "idempotence"), which is what keeps repeated ingestion byte-stable
/// for Git.
pub struct SidecarStore {
    data_dir: PathBuf,
    manifest_path: PathBuf,
    manifest: SidecarManifest,
}

impl SidecarStore {
    pub fn open(data_dir: impl Into<PathBuf>, model: impl Into<String>, dims: usize) -> Result<Self> {
        let data_dir = data_dir.into();
        let manifest_path = data_dir.join(MANIFEST_RELATIVE_PATH);

        let manifest = if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)
                .with_context(|| format!("failed to read manifest at {}", manifest_path.display()))?;
            serde_json::from_str(&content).context("failed to parse sidecar manifest")?
        } else {
            SidecarManifest::new(model, dims)
        };

        Ok(Self { data_dir, manifest_path, manifest })
    }

    pub fn manifest(&self) -> &SidecarManifest {
        &self.manifest
    }

    /// Write one chunk's vector, skipping the write if the manifest
    /// already records the same checksum. Returns `true` if a write
    /// actually happened.
    pub fn write_chunk(&mut self, store_type: &str, chunk_id: &str, vector: &[f32]) -> Result<bool> {
        let checksum = checksum_for(vector);
        if let Some(existing) = self.manifest.entries.get(chunk_id) {
            if existing.checksum == checksum {
                return Ok(false);
            }
        }

        let path = sidecar_path(&self.data_dir, store_type, chunk_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = vec_to_blob(vector);
        let frame = encode_sidecar_bytes(&raw)?;
        std::fs::write(&path, &frame)?;

        let relative = path
            .strip_prefix(&self.data_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        self.manifest.entries.insert(
            chunk_id.to_string(),
            ManifestEntry {
                file: relative,
                checksum,
                file_size: frame.len() as u64,
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        Ok(true)
    }

    /// Read back a chunk's vector from its sidecar file.
    pub fn read_chunk(&self, chunk_id: &str) -> Result<Vec<f32>> {
        let entry = self
            .manifest
            .entries
            .get(chunk_id)
            .with_context(|| format!("no manifest entry for chunk {chunk_id}"))?;
        let path = self.data_dir.join(&entry.file);
        let frame = std::fs::read(&path).with_context(|| format!("failed to read sidecar at {}", path.display()))?;
        let raw = decode_sidecar_bytes(&frame)?;
        Ok(blob_to_vec(&raw))
    }

    /// Persist the manifest, sorted-keys JSON (`BTreeMap` gives this for
    /// free), pretty-printed.
    pub fn save_manifest(&self) -> Result<()> {
        if let Some(parent) = self.manifest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.manifest)?;
        std::fs::write(&self.manifest_path, json)?;
        Ok(())
    }

    /// Sync operation (§4.4): iterate every chunk the store currently
    /// holds, reconstruct its vector, and write any sidecar whose
    /// checksum is missing or stale. Returns the number of sidecars
    /// actually written.
    pub async fn sync(&mut self, store: &dyn Store) -> Result<usize> {
        let indexed = store.get_indexed_chunks().await?;
        let mut written = 0usize;
        for row in indexed {
            if !row.is_chunk {
                continue;
            }
            if let Some(vector) = store.get_embedding(&row.chunk_id).await? {
                if self.write_chunk(&row.store_type, &row.chunk_id, &vector)? {
                    written += 1;
                }
            }
        }
        self.save_manifest()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_vector_through_the_gzip_frame() {
        let vector = vec![1.0f32, -2.5, 0.0, 3.125];
        let raw = vec_to_blob(&vector);
        let frame = encode_sidecar_bytes(&raw).unwrap();
        assert_eq!(&frame[0..2], &GZIP_MAGIC);
        assert_eq!(frame[4..8], MTIME_ZERO);
        let decoded = decode_sidecar_bytes(&frame).unwrap();
        assert_eq!(blob_to_vec(&decoded), vector);
    }

    #[test]
    fn encoding_the_same_vector_twice_is_byte_identical() {
        let vector = vec![0.5f32, 0.25, -0.75];
        let raw = vec_to_blob(&vector);
        let a = encode_sidecar_bytes(&raw).unwrap();
        let b = encode_sidecar_bytes(&raw).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_a_truncated_frame() {
        let vector = vec![1.0f32];
        let raw = vec_to_blob(&vector);
        let frame = encode_sidecar_bytes(&raw).unwrap();
        assert!(decode_sidecar_bytes(&frame[..frame.len() - 4]).is_err());
    }

    #[test]
    fn sidecar_path_nests_by_store_type_segments() {
        let path = sidecar_path(Path::new("/data"), "github.repos", "github.repos.acme.core");
        assert_eq!(path, PathBuf::from("/data/github/repos/github.repos.acme.core.emb.gz"));
    }

    #[test]
    fn write_chunk_skips_when_checksum_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SidecarStore::open(dir.path(), "hash-stub", 4).unwrap();
        let vector = vec![1.0f32, 2.0, 3.0, 4.0];
        assert!(store.write_chunk("notes", "notes.x.main", &vector).unwrap());
        assert!(!store.write_chunk("notes", "notes.x.main", &vector).unwrap());
    }

    #[test]
    fn write_chunk_rewrites_when_vector_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SidecarStore::open(dir.path(), "hash-stub", 4).unwrap();
        assert!(store.write_chunk("notes", "notes.x.main", &[1.0, 2.0]).unwrap());
        assert!(store.write_chunk("notes", "notes.x.main", &[9.0, 9.0]).unwrap());
    }

    #[test]
    fn read_chunk_reverses_write_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SidecarStore::open(dir.path(), "hash-stub", 3).unwrap();
        let vector = vec![1.0f32, -2.0, 3.5];
        store.write_chunk("notes", "notes.x.main", &vector).unwrap();
        store.save_manifest().unwrap();
        let reloaded = SidecarStore::open(dir.path(), "hash-stub", 3).unwrap();
        let read_back = reloaded.read_chunk("notes.x.main").unwrap();
        assert_eq!(read_back, vector);
    }
}
