//! On-disk index format and the memory-mapped reader.
//!
//! Layout, all little endian:
//!
//! ```text
//! [0..4)    magic "LVIX"
//! [4..6)    format version
//! [6..8)    reserved
//! [8..12)   dimension
//! [12..16)  node count
//! [16..20)  max degree
//! [20..24)  entry point (u32::MAX when empty)
//! [24..56)  sha256 of the embedding model id
//! [56..64)  reserved
//! vectors   count * dimension f32
//! adjacency count * (1 + max_degree) u32: length then padded ids
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;

use super::graph::MemoryGraph;
use super::GraphView;
use crate::knowledge::error::KnowledgeError;

pub(crate) const MAGIC: &[u8; 4] = b"LVIX";
pub(crate) const FORMAT_VERSION: u16 = 1;
pub(crate) const HEADER_SIZE: usize = 64;
const NO_ENTRY: u32 = u32::MAX;
const PAD: u32 = u32::MAX;

/// Parsed header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub dimension: u32,
    pub count: u32,
    pub max_degree: u32,
    pub entry: u32,
    pub fingerprint: [u8; 32],
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&self.dimension.to_le_bytes());
        buf[12..16].copy_from_slice(&self.count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.max_degree.to_le_bytes());
        buf[20..24].copy_from_slice(&self.entry.to_le_bytes());
        buf[24..56].copy_from_slice(&self.fingerprint);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self, KnowledgeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(corrupt("file shorter than header"));
        }
        if &bytes[0..4] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", version)));
        }

        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(&bytes[24..56]);

        Ok(Self {
            dimension: read_u32(bytes, 8),
            count: read_u32(bytes, 12),
            max_degree: read_u32(bytes, 16),
            entry: read_u32(bytes, 20),
            fingerprint,
        })
    }

    fn vectors_len(&self) -> usize {
        self.count as usize * self.dimension as usize * 4
    }

    fn adjacency_len(&self) -> usize {
        self.count as usize * (1 + self.max_degree as usize) * 4
    }

    fn file_len(&self) -> usize {
        HEADER_SIZE + self.vectors_len() + self.adjacency_len()
    }
}

fn corrupt(message: impl Into<String>) -> KnowledgeError {
    KnowledgeError::Index(format!("corrupt index file: {}", message.into()))
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

#[inline]
fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

/// Write `graph` to `path` through a temp file and rename.
pub(crate) fn write(
    path: &Path,
    graph: &MemoryGraph,
    max_degree: usize,
    fingerprint: [u8; 32],
) -> Result<(), KnowledgeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| KnowledgeError::io(parent, e))?;
    }

    let count = graph.node_count();
    let header = Header {
        dimension: graph.dimension as u32,
        count: count as u32,
        max_degree: max_degree as u32,
        entry: if count == 0 { NO_ENTRY } else { graph.entry },
        fingerprint,
    };

    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp).map_err(|e| KnowledgeError::io(&tmp, e))?;
        let mut out = BufWriter::new(file);
        let mut put = |bytes: &[u8]| out.write_all(bytes).map_err(|e| KnowledgeError::io(&tmp, e));

        put(&header.encode())?;
        for x in &graph.vectors {
            put(&x.to_le_bytes())?;
        }
        for list in &graph.adjacency {
            put(&(list.len() as u32).to_le_bytes())?;
            for slot in 0..max_degree {
                let id = list.get(slot).copied().unwrap_or(PAD);
                put(&id.to_le_bytes())?;
            }
        }

        let file = out.into_inner().map_err(|e| KnowledgeError::io(&tmp, e.into_error()))?;
        file.sync_all().map_err(|e| KnowledgeError::io(&tmp, e))?;
    }

    fs::rename(&tmp, path).map_err(|e| KnowledgeError::io(path, e))?;
    Ok(())
}

/// Read-only graph served straight from a memory map.
pub(crate) struct DiskGraph {
    mmap: Mmap,
    header: Header,
}

impl std::fmt::Debug for DiskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskGraph").field("header", &self.header).finish()
    }
}

impl DiskGraph {
    /// Map `path` and validate its header and size.
    pub(crate) fn open(path: &Path) -> Result<Self, KnowledgeError> {
        let file = File::open(path).map_err(|e| KnowledgeError::io(path, e))?;
        // SAFETY: index files are replaced by rename, never written in place.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| KnowledgeError::io(path, e))?;

        let header = Header::decode(&mmap)?;
        if mmap.len() != header.file_len() {
            return Err(corrupt(format!(
                "expected {} bytes, found {}",
                header.file_len(),
                mmap.len()
            )));
        }
        if header.count > 0 && header.entry >= header.count {
            return Err(corrupt(format!("entry point {} out of range", header.entry)));
        }
        if header.count > 0 && header.dimension == 0 {
            return Err(corrupt("zero dimension"));
        }

        Ok(Self { mmap, header })
    }

    pub(crate) fn header(&self) -> &Header {
        &self.header
    }

    fn adjacency_offset(&self, id: u32) -> usize {
        HEADER_SIZE
            + self.header.vectors_len()
            + id as usize * (1 + self.header.max_degree as usize) * 4
    }
}

impl GraphView for DiskGraph {
    fn node_count(&self) -> usize {
        self.header.count as usize
    }

    fn dimension(&self) -> usize {
        self.header.dimension as usize
    }

    fn entry_point(&self) -> u32 {
        self.header.entry
    }

    fn distance_to(&self, id: u32, query: &[f32]) -> f32 {
        let dim = self.header.dimension as usize;
        let start = HEADER_SIZE + id as usize * dim * 4;
        let mut dot = 0.0f32;
        for (i, q) in query.iter().enumerate().take(dim) {
            dot += read_f32(&self.mmap, start + i * 4) * q;
        }
        1.0 - dot
    }

    fn neighbors(&self, id: u32) -> Vec<u32> {
        let offset = self.adjacency_offset(id);
        let len = (read_u32(&self.mmap, offset) as usize).min(self.header.max_degree as usize);
        (0..len)
            .map(|slot| read_u32(&self.mmap, offset + 4 + slot * 4))
            .filter(|n| *n != PAD && *n < self.header.count)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::vector::IndexParams;

    fn graph() -> MemoryGraph {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]];
        MemoryGraph::build(
            &vectors,
            &IndexParams {
                max_degree: 2,
                construction_beam: 8,
                search_beam: 8,
            },
        )
    }

    #[test]
    fn test_disk_graph_matches_memory_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("code.lvix");
        let mem = graph();
        write(&path, &mem, 2, [7u8; 32]).unwrap();

        let disk = DiskGraph::open(&path).unwrap();
        assert_eq!(disk.node_count(), 3);
        assert_eq!(disk.dimension(), 2);
        assert_eq!(disk.entry_point(), mem.entry_point());
        assert_eq!(disk.header().fingerprint, [7u8; 32]);
        for id in 0..3 {
            assert_eq!(disk.neighbors(id), mem.neighbors(id));
            let q = [0.6, 0.8];
            assert!((disk.distance_to(id, &q) - mem.distance_to(id, &q)).abs() < 1e-6);
        }
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_truncated_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("code.lvix");
        write(&path, &graph(), 2, [0u8; 32]).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        let err = DiskGraph::open(&path).unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.lvix");
        fs::write(&path, vec![0u8; 128]).unwrap();
        assert!(matches!(DiskGraph::open(&path), Err(KnowledgeError::Index(_))));
    }
}
