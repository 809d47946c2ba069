//! Static preset tables used to prefill calculator inputs.
//!
//! Nothing in here is consulted by the compute functions; presets only
//! produce values for the input records.

use serde::Serialize;

use crate::params::{ComputeInput, SharedExpertScope};
use crate::speed::SpeedInput;

// ============================================================================
// GPU Presets
// ============================================================================

/// Common GPUs with their VRAM and peak memory bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuPreset {
    /// No GPU in this slot.
    None,
    Rtx3090,
    Rtx4090,
    Rtx5090,
    Rx7900Xtx,
    A100_80,
    H100Sxm,
}

impl GpuPreset {
    pub const ALL: [GpuPreset; 7] = [
        Self::None,
        Self::Rtx3090,
        Self::Rtx4090,
        Self::Rtx5090,
        Self::Rx7900Xtx,
        Self::A100_80,
        Self::H100Sxm,
    ];

    /// Parse from string, case-insensitive.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "rtx3090" | "3090" => Some(Self::Rtx3090),
            "rtx4090" | "4090" => Some(Self::Rtx4090),
            "rtx5090" | "5090" => Some(Self::Rtx5090),
            "rx7900xtx" | "7900xtx" => Some(Self::Rx7900Xtx),
            "a100" | "a100_80" => Some(Self::A100_80),
            "h100" | "h100_sxm" => Some(Self::H100Sxm),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rtx3090 => "rtx3090",
            Self::Rtx4090 => "rtx4090",
            Self::Rtx5090 => "rtx5090",
            Self::Rx7900Xtx => "rx7900xtx",
            Self::A100_80 => "a100_80",
            Self::H100Sxm => "h100_sxm",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Rtx3090 => "NVIDIA RTX 3090",
            Self::Rtx4090 => "NVIDIA RTX 4090",
            Self::Rtx5090 => "NVIDIA RTX 5090",
            Self::Rx7900Xtx => "AMD RX 7900 XTX",
            Self::A100_80 => "NVIDIA A100 80GB",
            Self::H100Sxm => "NVIDIA H100 SXM",
        }
    }

    pub fn vram_gb(&self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Rtx3090 => 24.0,
            Self::Rtx4090 => 24.0,
            Self::Rtx5090 => 32.0,
            Self::Rx7900Xtx => 24.0,
            Self::A100_80 => 80.0,
            Self::H100Sxm => 80.0,
        }
    }

    /// Peak memory bandwidth in GB/s.
    pub fn bandwidth_gbps(&self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Rtx3090 => 936.0,
            Self::Rtx4090 => 1008.0,
            Self::Rtx5090 => 1792.0,
            Self::Rx7900Xtx => 960.0,
            Self::A100_80 => 2039.0,
            Self::H100Sxm => 3350.0,
        }
    }
}

// ============================================================================
// System Memory Presets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPreset {
    Ddr4_3200Dual,
    Ddr5_5600Dual,
    Ddr5_6400Quad,
    Ddr5_4800Octa,
    M2Ultra,
}

impl MemoryPreset {
    pub const ALL: [MemoryPreset; 5] = [
        Self::Ddr4_3200Dual,
        Self::Ddr5_5600Dual,
        Self::Ddr5_6400Quad,
        Self::Ddr5_4800Octa,
        Self::M2Ultra,
    ];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ddr4_3200" | "ddr4_3200_dual" => Some(Self::Ddr4_3200Dual),
            "ddr5_5600" | "ddr5_5600_dual" => Some(Self::Ddr5_5600Dual),
            "ddr5_6400_quad" => Some(Self::Ddr5_6400Quad),
            "ddr5_4800_octa" | "epyc" => Some(Self::Ddr5_4800Octa),
            "m2_ultra" | "m2ultra" => Some(Self::M2Ultra),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Ddr4_3200Dual => "ddr4_3200_dual",
            Self::Ddr5_5600Dual => "ddr5_5600_dual",
            Self::Ddr5_6400Quad => "ddr5_6400_quad",
            Self::Ddr5_4800Octa => "ddr5_4800_octa",
            Self::M2Ultra => "m2_ultra",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ddr4_3200Dual => "DDR4-3200 dual channel",
            Self::Ddr5_5600Dual => "DDR5-5600 dual channel",
            Self::Ddr5_6400Quad => "DDR5-6400 quad channel",
            Self::Ddr5_4800Octa => "DDR5-4800 8-channel (server)",
            Self::M2Ultra => "Apple M2 Ultra unified",
        }
    }

    /// Theoretical bandwidth in GB/s (channels * 8 bytes * MT/s).
    pub fn bandwidth_gbps(&self) -> f64 {
        match self {
            Self::Ddr4_3200Dual => 51.2,
            Self::Ddr5_5600Dual => 89.6,
            Self::Ddr5_6400Quad => 204.8,
            Self::Ddr5_4800Octa => 307.2,
            Self::M2Ultra => 800.0,
        }
    }
}

// ============================================================================
// Model Presets (speed calculator)
// ============================================================================

/// Parameter counts of well-known MoE models, in billions.
/// KV cache sizes assume an 8K context at FP16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPreset {
    Mixtral8x7b,
    Qwen3_30bA3b,
    Qwen3_235bA22b,
    DeepSeekV3,
}

impl ModelPreset {
    pub const ALL: [ModelPreset; 4] = [
        Self::Mixtral8x7b,
        Self::Qwen3_30bA3b,
        Self::Qwen3_235bA22b,
        Self::DeepSeekV3,
    ];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mixtral" | "mixtral_8x7b" => Some(Self::Mixtral8x7b),
            "qwen3_30b" | "qwen3_30b_a3b" => Some(Self::Qwen3_30bA3b),
            "qwen3_235b" | "qwen3_235b_a22b" => Some(Self::Qwen3_235bA22b),
            "deepseek_v3" | "deepseekv3" => Some(Self::DeepSeekV3),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Mixtral8x7b => "mixtral_8x7b",
            Self::Qwen3_30bA3b => "qwen3_30b_a3b",
            Self::Qwen3_235bA22b => "qwen3_235b_a22b",
            Self::DeepSeekV3 => "deepseek_v3",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mixtral8x7b => "Mixtral 8x7B",
            Self::Qwen3_30bA3b => "Qwen3-30B-A3B",
            Self::Qwen3_235bA22b => "Qwen3-235B-A22B",
            Self::DeepSeekV3 => "DeepSeek-V3",
        }
    }

    pub fn total_params_b(&self) -> f64 {
        match self {
            Self::Mixtral8x7b => 46.7,
            Self::Qwen3_30bA3b => 30.5,
            Self::Qwen3_235bA22b => 235.1,
            Self::DeepSeekV3 => 671.0,
        }
    }

    /// Always-active parameters: attention, embeddings, norms, shared experts.
    pub fn dense_params_b(&self) -> f64 {
        match self {
            Self::Mixtral8x7b => 1.6,
            Self::Qwen3_30bA3b => 1.5,
            Self::Qwen3_235bA22b => 7.8,
            Self::DeepSeekV3 => 17.1,
        }
    }

    /// Routed expert parameters read per token.
    pub fn active_moe_params_b(&self) -> f64 {
        match self {
            Self::Mixtral8x7b => 11.3,   // 2 of 8 experts
            Self::Qwen3_30bA3b => 1.8,   // 8 of 128
            Self::Qwen3_235bA22b => 14.2, // 8 of 128
            Self::DeepSeekV3 => 20.4,    // 8 of 256
        }
    }

    pub fn kv_cache_gb(&self) -> f64 {
        match self {
            Self::Mixtral8x7b => 1.07,
            Self::Qwen3_30bA3b => 0.81,
            Self::Qwen3_235bA22b => 1.58,
            Self::DeepSeekV3 => 0.58, // MLA compressed latent
        }
    }

    /// Overwrite the model half of `input` with this preset.
    pub fn apply(&self, input: &mut SpeedInput) {
        input.total_params_b = self.total_params_b();
        input.dense_params_b = self.dense_params_b();
        input.active_moe_params_b = self.active_moe_params_b();
        input.kv_cache_gb = self.kv_cache_gb();
    }
}

// ============================================================================
// Architecture Presets (parameter calculator)
// ============================================================================

/// Complete tensor-shape inputs for well-known MoE architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchitecturePreset {
    Mixtral8x7b,
    Qwen3_30bA3b,
    /// One dense layer, two shared experts and MLA attention.
    DeepSeekV2Lite,
}

impl ArchitecturePreset {
    pub const ALL: [ArchitecturePreset; 3] =
        [Self::Mixtral8x7b, Self::Qwen3_30bA3b, Self::DeepSeekV2Lite];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mixtral" | "mixtral_8x7b" => Some(Self::Mixtral8x7b),
            "qwen3_30b" | "qwen3_30b_a3b" => Some(Self::Qwen3_30bA3b),
            "deepseek_v2_lite" | "dsv2lite" => Some(Self::DeepSeekV2Lite),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Mixtral8x7b => "mixtral_8x7b",
            Self::Qwen3_30bA3b => "qwen3_30b_a3b",
            Self::DeepSeekV2Lite => "deepseek_v2_lite",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mixtral8x7b => "Mixtral 8x7B",
            Self::Qwen3_30bA3b => "Qwen3-30B-A3B",
            Self::DeepSeekV2Lite => "DeepSeek-V2-Lite",
        }
    }

    pub fn input(&self) -> ComputeInput {
        match self {
            Self::Mixtral8x7b => ComputeInput {
                dense_layers: 0,
                moe_layers: 32,
                dense_shapes: String::new(),
                moe_base_shapes: concat!(
                    "q_proj [4096, 4096]\n",
                    "k_proj [1024, 4096]\n",
                    "v_proj [1024, 4096]\n",
                    "o_proj [4096, 4096]\n",
                    "norms [4096] [4096]\n",
                    "router [8, 4096]",
                )
                .to_string(),
                expert_shapes: "w1 [14336, 4096]\nw2 [4096, 14336]\nw3 [14336, 4096]".to_string(),
                experts_per_layer: 8,
                active_experts: 2,
                has_shared_expert: false,
                shared_expert_shapes: String::new(),
                shared_experts: 0,
                shared_scope: SharedExpertScope::PerLayer,
                embedding_shapes: "embed [32000, 4096]\nlm_head [32000, 4096]\nnorm [4096]"
                    .to_string(),
            },
            Self::Qwen3_30bA3b => ComputeInput {
                dense_layers: 0,
                moe_layers: 48,
                dense_shapes: String::new(),
                moe_base_shapes: concat!(
                    "q_proj [4096, 2048]\n",
                    "k_proj [512, 2048]\n",
                    "v_proj [512, 2048]\n",
                    "o_proj [2048, 4096]\n",
                    "q_norm [128] k_norm [128]\n",
                    "norms [2048] [2048]\n",
                    "router [128, 2048]",
                )
                .to_string(),
                expert_shapes: "gate [768, 2048]\nup [768, 2048]\ndown [2048, 768]".to_string(),
                experts_per_layer: 128,
                active_experts: 8,
                has_shared_expert: false,
                shared_expert_shapes: String::new(),
                shared_experts: 0,
                shared_scope: SharedExpertScope::PerLayer,
                embedding_shapes: "embed [151936, 2048]\nlm_head [151936, 2048]\nnorm [2048]"
                    .to_string(),
            },
            Self::DeepSeekV2Lite => {
                let attention = concat!(
                    "q_proj [3072, 2048]\n",
                    "kv_a_proj_with_mqa [576, 2048]\n",
                    "kv_a_layernorm [512]\n",
                    "kv_b_proj [4096, 512]\n",
                    "o_proj [2048, 2048]\n",
                    "norms [2048] [2048]\n",
                );
                ComputeInput {
                    dense_layers: 1,
                    moe_layers: 26,
                    dense_shapes: format!(
                        "{attention}gate [10944, 2048]\nup [10944, 2048]\ndown [2048, 10944]"
                    ),
                    moe_base_shapes: format!("{attention}router [64, 2048]"),
                    expert_shapes: "gate [1408, 2048]\nup [1408, 2048]\ndown [2048, 1408]"
                        .to_string(),
                    experts_per_layer: 64,
                    active_experts: 6,
                    has_shared_expert: true,
                    shared_expert_shapes: "gate [1408, 2048]\nup [1408, 2048]\ndown [2048, 1408]"
                        .to_string(),
                    shared_experts: 2,
                    shared_scope: SharedExpertScope::PerLayer,
                    embedding_shapes: "embed [102400, 2048]\nlm_head [102400, 2048]\nnorm [2048]"
                        .to_string(),
                }
            }
        }
    }
}

/// Flattened preset tables for the browser page.
#[derive(Debug, Clone, Serialize)]
pub struct PresetCatalog {
    pub gpus: Vec<GpuEntry>,
    pub memory: Vec<MemoryEntry>,
    pub models: Vec<ModelEntry>,
    pub architectures: Vec<ArchitectureEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GpuEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub vram_gb: f64,
    pub bw_gbps: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub bw_gbps: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub total_params_b: f64,
    pub dense_params_b: f64,
    pub active_moe_params_b: f64,
    pub kv_cache_gb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchitectureEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub input: ComputeInput,
}

pub fn catalog() -> PresetCatalog {
    PresetCatalog {
        gpus: GpuPreset::ALL
            .iter()
            .map(|g| GpuEntry {
                id: g.id(),
                name: g.name(),
                vram_gb: g.vram_gb(),
                bw_gbps: g.bandwidth_gbps(),
            })
            .collect(),
        memory: MemoryPreset::ALL
            .iter()
            .map(|m| MemoryEntry {
                id: m.id(),
                name: m.name(),
                bw_gbps: m.bandwidth_gbps(),
            })
            .collect(),
        models: ModelPreset::ALL
            .iter()
            .map(|m| ModelEntry {
                id: m.id(),
                name: m.name(),
                total_params_b: m.total_params_b(),
                dense_params_b: m.dense_params_b(),
                active_moe_params_b: m.active_moe_params_b(),
                kv_cache_gb: m.kv_cache_gb(),
            })
            .collect(),
        architectures: ArchitecturePreset::ALL
            .iter()
            .map(|a| ArchitectureEntry {
                id: a.id(),
                name: a.name(),
                input: a.input(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip() {
        for g in GpuPreset::ALL {
            assert_eq!(GpuPreset::from_str(g.id()), Some(g));
        }
        for m in MemoryPreset::ALL {
            assert_eq!(MemoryPreset::from_str(m.id()), Some(m));
        }
        for m in ModelPreset::ALL {
            assert_eq!(ModelPreset::from_str(m.id()), Some(m));
        }
        for a in ArchitecturePreset::ALL {
            assert_eq!(ArchitecturePreset::from_str(a.id()), Some(a));
        }
        assert_eq!(GpuPreset::from_str("RTX4090"), Some(GpuPreset::Rtx4090));
        assert_eq!(GpuPreset::from_str("voodoo2"), None);
    }

    #[test]
    fn test_model_presets_are_consistent() {
        for m in ModelPreset::ALL {
            assert!(m.dense_params_b() + m.active_moe_params_b() <= m.total_params_b());
            let mut input = SpeedInput::default();
            m.apply(&mut input);
            assert!(input.validate().is_ok(), "{}", m.name());
        }
    }

    #[test]
    fn test_catalog_lists_everything() {
        let c = catalog();
        assert_eq!(c.gpus.len(), GpuPreset::ALL.len());
        assert_eq!(c.memory.len(), MemoryPreset::ALL.len());
        assert_eq!(c.models.len(), ModelPreset::ALL.len());
        assert_eq!(c.architectures.len(), ArchitecturePreset::ALL.len());

        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["gpus"][2]["id"], "rtx4090");
        assert_eq!(json["architectures"][0]["input"]["moe_layers"], 32);
    }
}
