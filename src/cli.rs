//! Command-line interface for the MoE calculator.
//!
//! Parameters are organized into categories:
//!
//! ## Hardware (speed calculator)
//! - `--gpu1`, `--gpu2`: GPU presets (set VRAM + bandwidth; override manual values)
//! - `--ram`: System memory preset (sets bandwidth; overrides `--sys-bw-gbps`)
//!
//! ## Model (speed calculator)
//! - `--model`: Model preset (sets parameter counts and KV cache size)
//! - `--quant-bits`: Weight quantization width
//!
//! ## Parameter calculator (used with `--params`)
//! - `--arch`: Architecture preset providing every shape list
//! - Shape lists: `--dense-shapes`, `--moe-base-shapes`, `--expert-shapes`, ...
//!   Each takes free text such as `"[4096, 2048] [512, 2048]"`.
//!
//! ## Modes
//! - default: speed estimate
//! - `--params`: parameter counts
//! - `--sweep`: CSV sweep over quantization bits and RAM bandwidth
//! - `--serve`: browser calculator on `--host:--port`

use clap::Parser;

use crate::error::SpeedInputError;
use crate::params::{ComputeInput, SharedExpertScope};
use crate::presets::{ArchitecturePreset, GpuPreset, MemoryPreset, ModelPreset};
use crate::speed::SpeedInput;

#[derive(Parser, Debug)]
#[command(name = "moecalc")]
#[command(author, version, about = "MoE parameter counter and bandwidth-bound token speed estimator")]
pub struct Cli {
    // =========================================================================
    // Hardware
    // =========================================================================

    /// GPU 1 preset: none, rtx3090, rtx4090, rtx5090, rx7900xtx, a100, h100
    #[arg(long, help_heading = "Hardware")]
    pub gpu1: Option<String>,

    /// GPU 1 VRAM in GB (ignored if --gpu1 is set)
    #[arg(long, default_value = "24", help_heading = "Hardware")]
    pub gpu1_vram_gb: f64,

    /// GPU 1 memory bandwidth in GB/s (ignored if --gpu1 is set)
    #[arg(long, default_value = "1008", help_heading = "Hardware")]
    pub gpu1_bw_gbps: f64,

    /// GPU 2 preset (holds expert weights first)
    #[arg(long, help_heading = "Hardware")]
    pub gpu2: Option<String>,

    /// GPU 2 VRAM in GB (ignored if --gpu2 is set)
    #[arg(long, default_value = "24", help_heading = "Hardware")]
    pub gpu2_vram_gb: f64,

    /// GPU 2 memory bandwidth in GB/s (ignored if --gpu2 is set)
    #[arg(long, default_value = "936", help_heading = "Hardware")]
    pub gpu2_bw_gbps: f64,

    /// System memory preset: ddr4_3200, ddr5_5600, ddr5_6400_quad, ddr5_4800_octa, m2_ultra
    #[arg(long, help_heading = "Hardware")]
    pub ram: Option<String>,

    /// System RAM bandwidth in GB/s (ignored if --ram is set)
    #[arg(long, default_value = "89.6", help_heading = "Hardware")]
    pub sys_bw_gbps: f64,

    // =========================================================================
    // Model
    // =========================================================================

    /// Model preset: mixtral_8x7b, qwen3_30b_a3b, qwen3_235b_a22b, deepseek_v3
    #[arg(long, help_heading = "Model")]
    pub model: Option<String>,

    /// Total parameters in billions (ignored if --model is set)
    #[arg(long, default_value = "46.7", help_heading = "Model")]
    pub total_params_b: f64,

    /// Always-active parameters in billions (ignored if --model is set)
    #[arg(long, default_value = "1.6", help_heading = "Model")]
    pub dense_params_b: f64,

    /// Routed expert parameters active per token, in billions (ignored if --model is set)
    #[arg(long, default_value = "11.3", help_heading = "Model")]
    pub active_moe_params_b: f64,

    /// KV cache size in GB (ignored if --model is set)
    #[arg(long, default_value = "1.07", help_heading = "Model")]
    pub kv_cache_gb: f64,

    /// Weight quantization in bits per parameter (e.g. 4.5 for Q4_K)
    #[arg(long, default_value = "4.5", help_heading = "Model")]
    pub quant_bits: f64,

    // =========================================================================
    // Parameter calculator
    // =========================================================================

    /// Architecture preset: mixtral_8x7b, qwen3_30b_a3b, deepseek_v2_lite
    #[arg(long, help_heading = "Parameter Calculator")]
    pub arch: Option<String>,

    /// Number of dense layers
    #[arg(long, help_heading = "Parameter Calculator")]
    pub dense_layers: Option<u64>,

    /// Number of MoE layers
    #[arg(long, help_heading = "Parameter Calculator")]
    pub moe_layers: Option<u64>,

    /// Shapes of one dense layer
    #[arg(long, help_heading = "Parameter Calculator")]
    pub dense_shapes: Option<String>,

    /// Non-expert shapes of one MoE layer (attention, norms, router)
    #[arg(long, help_heading = "Parameter Calculator")]
    pub moe_base_shapes: Option<String>,

    /// Shapes of one routed expert
    #[arg(long, help_heading = "Parameter Calculator")]
    pub expert_shapes: Option<String>,

    /// Routed experts per MoE layer
    #[arg(long, help_heading = "Parameter Calculator")]
    pub experts_per_layer: Option<u64>,

    /// Routed experts active per token (clamped to --experts-per-layer)
    #[arg(long, help_heading = "Parameter Calculator")]
    pub active_experts: Option<u64>,

    /// The model has always-on shared experts
    #[arg(long, default_value = "false", help_heading = "Parameter Calculator")]
    pub shared_expert: bool,

    /// Shapes of one shared expert
    #[arg(long, help_heading = "Parameter Calculator")]
    pub shared_expert_shapes: Option<String>,

    /// Shared experts per MoE layer (or in total with --shared-scope global)
    #[arg(long, help_heading = "Parameter Calculator")]
    pub shared_experts: Option<u64>,

    /// Shared expert scope: per_layer or global
    #[arg(long, help_heading = "Parameter Calculator")]
    pub shared_scope: Option<String>,

    /// Embedding table, output head and final norm shapes
    #[arg(long, help_heading = "Parameter Calculator")]
    pub embedding_shapes: Option<String>,

    /// Also list every shape group with its product
    #[arg(long, default_value = "false", help_heading = "Parameter Calculator")]
    pub breakdown: bool,

    // =========================================================================
    // Modes
    // =========================================================================

    /// Run the parameter calculator instead of the speed estimate
    #[arg(long, default_value = "false", help_heading = "Modes")]
    pub params: bool,

    /// Enable sweep mode (CSV output)
    #[arg(long, default_value = "false", help_heading = "Modes")]
    pub sweep: bool,

    /// Quantization widths to sweep (comma-separated bits)
    #[arg(long, default_value = "2.5,3.5,4.5,5.5,6.5,8.5,16", help_heading = "Modes")]
    pub sweep_bits: String,

    /// System RAM bandwidths to sweep (comma-separated GB/s)
    #[arg(long, default_value = "51.2,89.6,204.8,307.2", help_heading = "Modes")]
    pub sweep_ram: String,

    /// Print results as JSON instead of a table
    #[arg(long, default_value = "false", help_heading = "Modes")]
    pub json: bool,

    /// Serve the browser calculator
    #[arg(long, default_value = "false", help_heading = "Modes")]
    pub serve: bool,

    /// Address to bind with --serve
    #[arg(long, default_value = "127.0.0.1", help_heading = "Modes")]
    pub host: String,

    /// Port to bind with --serve
    #[arg(long, default_value = "8080", help_heading = "Modes")]
    pub port: u16,
}

impl Cli {
    /// Convert CLI args to a validated speed input.
    /// Presets override the matching manual values.
    pub fn to_speed_input(&self) -> Result<SpeedInput, SpeedInputError> {
        let mut input = SpeedInput {
            gpu1_vram_gb: self.gpu1_vram_gb,
            gpu1_bw_gbps: self.gpu1_bw_gbps,
            gpu2_vram_gb: self.gpu2_vram_gb,
            gpu2_bw_gbps: self.gpu2_bw_gbps,
            sys_bw_gbps: self.sys_bw_gbps,
            total_params_b: self.total_params_b,
            dense_params_b: self.dense_params_b,
            active_moe_params_b: self.active_moe_params_b,
            kv_cache_gb: self.kv_cache_gb,
            quant_bits: self.quant_bits,
        };

        if let Some(gpu) = self.gpu1.as_deref().and_then(GpuPreset::from_str) {
            input.gpu1_vram_gb = gpu.vram_gb();
            input.gpu1_bw_gbps = gpu.bandwidth_gbps();
        }
        if let Some(gpu) = self.gpu2.as_deref().and_then(GpuPreset::from_str) {
            input.gpu2_vram_gb = gpu.vram_gb();
            input.gpu2_bw_gbps = gpu.bandwidth_gbps();
        }
        if let Some(ram) = self.ram.as_deref().and_then(MemoryPreset::from_str) {
            input.sys_bw_gbps = ram.bandwidth_gbps();
        }
        if let Some(model) = self.model.as_deref().and_then(ModelPreset::from_str) {
            model.apply(&mut input);
        }

        input.validate()?;
        Ok(input)
    }

    /// Convert CLI args to parameter calculator input.
    /// Starts from `--arch` (or empty) and overrides with every flag given.
    pub fn to_compute_input(&self) -> ComputeInput {
        let mut input = self
            .arch
            .as_deref()
            .and_then(ArchitecturePreset::from_str)
            .map(|a| a.input())
            .unwrap_or_default();

        if let Some(v) = self.dense_layers {
            input.dense_layers = v;
        }
        if let Some(v) = self.moe_layers {
            input.moe_layers = v;
        }
        if let Some(v) = &self.dense_shapes {
            input.dense_shapes = v.clone();
        }
        if let Some(v) = &self.moe_base_shapes {
            input.moe_base_shapes = v.clone();
        }
        if let Some(v) = &self.expert_shapes {
            input.expert_shapes = v.clone();
        }
        if let Some(v) = self.experts_per_layer {
            input.experts_per_layer = v;
        }
        if let Some(v) = self.active_experts {
            input.active_experts = v;
        }
        if self.shared_expert {
            input.has_shared_expert = true;
        }
        if let Some(v) = &self.shared_expert_shapes {
            input.shared_expert_shapes = v.clone();
        }
        if let Some(v) = self.shared_experts {
            input.shared_experts = v;
        }
        if let Some(v) = &self.shared_scope {
            input.shared_scope = SharedExpertScope::from_str_lenient(v);
        }
        if let Some(v) = &self.embedding_shapes {
            input.embedding_shapes = v.clone();
        }

        input
    }

    /// Parse sweep quantization widths. Zero bits is not a valid width.
    pub fn parse_sweep_bits(&self) -> Vec<f64> {
        parse_list(&self.sweep_bits)
            .into_iter()
            .filter(|&b| b > 0.0)
            .collect()
    }

    /// Parse sweep RAM bandwidths. Zero is kept and gives an infinite time.
    pub fn parse_sweep_ram(&self) -> Vec<f64> {
        parse_list(&self.sweep_ram)
    }
}

fn parse_list(s: &str) -> Vec<f64> {
    s.split(',')
        .filter_map(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_speed_default() {
        let cli = Cli::parse_from(["moecalc"]);
        assert_eq!(cli.to_speed_input().unwrap(), SpeedInput::default());
    }

    #[test]
    fn test_presets_override_manual_values() {
        let cli = Cli::parse_from([
            "moecalc",
            "--gpu1", "h100",
            "--gpu1-bw-gbps", "1",
            "--gpu2", "none",
            "--ram", "ddr4_3200",
            "--model", "qwen3_30b_a3b",
        ]);
        let input = cli.to_speed_input().unwrap();
        assert_eq!(input.gpu1_bw_gbps, 3350.0);
        assert_eq!(input.gpu2_vram_gb, 0.0);
        assert_eq!(input.sys_bw_gbps, 51.2);
        assert_eq!(input.total_params_b, 30.5);
    }

    #[test]
    fn test_unknown_preset_keeps_manual_values() {
        let cli = Cli::parse_from(["moecalc", "--gpu1", "potato", "--gpu1-bw-gbps", "500"]);
        assert_eq!(cli.to_speed_input().unwrap().gpu1_bw_gbps, 500.0);
    }

    #[test]
    fn test_invalid_speed_flags_rejected() {
        let cli = Cli::parse_from(["moecalc", "--quant-bits", "0"]);
        assert_eq!(cli.to_speed_input(), Err(SpeedInputError::ZeroQuantBits));
    }

    #[test]
    fn test_arch_then_overrides() {
        let cli = Cli::parse_from([
            "moecalc", "--params", "--arch", "mixtral", "--active-experts", "4",
        ]);
        let input = cli.to_compute_input();
        assert_eq!(input.moe_layers, 32);
        assert_eq!(input.experts_per_layer, 8);
        assert_eq!(input.active_experts, 4);
    }

    #[test]
    fn test_manual_shapes() {
        let cli = Cli::parse_from([
            "moecalc", "--params",
            "--moe-layers", "2",
            "--expert-shapes", "[2,3]",
            "--experts-per-layer", "4",
            "--shared-expert",
            "--shared-scope", "global",
        ]);
        let input = cli.to_compute_input();
        assert_eq!(input.moe_layers, 2);
        assert_eq!(input.expert_shapes, "[2,3]");
        assert!(input.has_shared_expert);
        assert_eq!(input.shared_scope, SharedExpertScope::Global);
    }

    #[test]
    fn test_parse_lists_skip_garbage() {
        let cli = Cli::parse_from(["moecalc", "--sweep-bits", "4, x, 8,,-1"]);
        assert_eq!(cli.parse_sweep_bits(), vec![4.0, 8.0]);
    }

    #[test]
    fn test_sweep_ram_keeps_zero() {
        let cli = Cli::parse_from([
            "moecalc", "--sweep-ram", "0, 51.2, -5, inf", "--sweep-bits", "0,4.5",
        ]);
        assert_eq!(cli.parse_sweep_ram(), vec![0.0, 51.2]);
        assert_eq!(cli.parse_sweep_bits(), vec![4.5]);
    }
}
