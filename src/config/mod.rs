use serde::{Deserialize, Serialize};

/// Chunk-cache configuration for one open array, in the backend's terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkCacheConfig {
    /// Number of hash slots. Two chunks hashing to the same slot evict each other.
    pub nslots: usize,
    /// Total bytes of chunk data kept resident.
    pub nbytes: u64,
    /// Preemption weight in [0, 1].
    pub w0: f64,
}

impl Default for ChunkCacheConfig {
    fn default() -> Self {
        ChunkCacheConfig {
            nslots: 521,
            nbytes: 1024 * 1024,
            w0: 0.75,
        }
    }
}

/// How the read cache of a new 1-D dataset is sized from its chunk geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSizing {
    pub nslots: usize,
    /// How many whole chunks the byte budget should hold.
    pub resident_chunks: u64,
    pub w0: f64,
}

impl Default for CacheSizing {
    fn default() -> Self {
        CacheSizing {
            nslots: 101,
            resident_chunks: 3,
            w0: 0.75,
        }
    }
}

impl CacheSizing {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn for_chunk(&self, chunk_elements: u64, element_size: usize) -> ChunkCacheConfig {
        ChunkCacheConfig {
            nslots: self.nslots,
            nbytes: chunk_elements
                .saturating_mul(element_size as u64)
                .saturating_mul(self.resident_chunks),
            w0: self.w0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::CacheSizing;

    #[test]
    fn test_budget_holds_resident_chunks() {
        let cfg = CacheSizing::default().for_chunk(4, 8);
        assert_eq!(cfg.nslots, 101);
        assert_eq!(cfg.nbytes, 4 * 8 * 3);
        assert_eq!(cfg.w0, 0.75);
    }

    #[test]
    fn test_from_json_fills_defaults() -> anyhow::Result<()> {
        let sizing = CacheSizing::from_json(r#"{"resident_chunks": 8}"#)?;
        assert_eq!(sizing.resident_chunks, 8);
        assert_eq!(sizing.nslots, 101);
        assert!(CacheSizing::from_json("{\"nslots\": \"many\"}").is_err());
        Ok(())
    }
}
