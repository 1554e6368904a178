//! Description of the target machine used to size tiles and vector loops.

use serde::{Serialize, Deserialize};

/// Cache and vector-unit parameters of the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetInfo {
    pub name: String,
    /// L1 data cache size in bytes
    pub l1_size: i64,
    pub l1_associativity: i64,
    /// L2 cache size in bytes
    pub l2_size: i64,
    pub l2_associativity: i64,
    /// Vector lanes used for prevectorization
    pub simd_width: i64,
    /// Width of one vector register in bits
    pub vector_register_bits: i64,
    /// Cycles before an FMA result can be consumed
    pub fma_latency: i64,
    /// FMAs issued per cycle
    pub fma_throughput: i64,
}

impl TargetInfo {
    /// A modest SSE-class core.
    pub fn generic() -> Self {
        Self {
            name: "generic".to_string(),
            l1_size: 32 * 1024,
            l1_associativity: 8,
            l2_size: 256 * 1024,
            l2_associativity: 8,
            simd_width: 4,
            vector_register_bits: 128,
            fma_latency: 8,
            fma_throughput: 1,
        }
    }

    pub fn avx2() -> Self {
        Self {
            name: "avx2".to_string(),
            l2_associativity: 4,
            simd_width: 8,
            vector_register_bits: 256,
            fma_latency: 5,
            fma_throughput: 2,
            ..Self::generic()
        }
    }

    pub fn avx512() -> Self {
        Self {
            name: "avx512".to_string(),
            l1_size: 48 * 1024,
            l1_associativity: 12,
            l2_size: 2 * 1024 * 1024,
            l2_associativity: 16,
            simd_width: 16,
            vector_register_bits: 512,
            fma_latency: 4,
            fma_throughput: 2,
            ..Self::generic()
        }
    }

    /// Look up a preset by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "generic" => Some(Self::generic()),
            "avx2" => Some(Self::avx2()),
            "avx512" => Some(Self::avx512()),
            _ => None,
        }
    }
}

impl Default for TargetInfo {
    fn default() -> Self {
        Self::generic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(TargetInfo::by_name("generic"), Some(TargetInfo::generic()));
        assert_eq!(TargetInfo::by_name("avx512").unwrap().simd_width, 16);
        assert!(TargetInfo::by_name("riscv").is_none());
    }

    #[test]
    fn test_partial_json() {
        let target: TargetInfo = serde_json::from_str(r#"{ "simd_width": 2, "cache_line_size": 64 }"#).unwrap();
        assert_eq!(target.simd_width, 2);
        assert_eq!(target.l1_size, 32 * 1024);
    }
}
