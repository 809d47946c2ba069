//! Bandwidth-bound token generation speed estimate.
//!
//! Decoding one token streams every active weight through memory once. The
//! estimate splits that traffic into three serial paths:
//!
//! 1. GPU 1 reads the dense weights and the KV cache.
//! 2. GPU 2 reads the share of active expert weights it holds.
//! 3. System RAM serves the remaining active expert weights.
//!
//! Each path costs `gigabytes / bandwidth`; the paths run back to back so the
//! per-token time is their sum.
//!
//! # Degenerate inputs
//!
//! A zero bandwidth yields an infinite time on that path, an infinite total and
//! zero tokens/s. A path with nothing to load costs exactly zero whatever its
//! bandwidth, so an unused zero-bandwidth device never poisons the total.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::SpeedInputError;

/// Validated inputs to the speed calculator.
/// Sizes in GB, bandwidths in GB/s, parameter counts in billions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedInput {
    pub gpu1_vram_gb: f64,
    pub gpu1_bw_gbps: f64,
    pub gpu2_vram_gb: f64,
    pub gpu2_bw_gbps: f64,
    /// System RAM bandwidth.
    pub sys_bw_gbps: f64,
    pub total_params_b: f64,
    /// Always-active parameters (attention, embeddings, shared experts).
    pub dense_params_b: f64,
    /// Routed expert parameters activated per token.
    pub active_moe_params_b: f64,
    pub kv_cache_gb: f64,
    pub quant_bits: f64,
}

impl Default for SpeedInput {
    fn default() -> Self {
        // Mixtral 8x7B at 4.5 bits on an RTX 4090 + RTX 3090 with DDR5 dual channel
        Self {
            gpu1_vram_gb: 24.0,
            gpu1_bw_gbps: 1008.0,
            gpu2_vram_gb: 24.0,
            gpu2_bw_gbps: 936.0,
            sys_bw_gbps: 89.6,
            total_params_b: 46.7,
            dense_params_b: 1.6,
            active_moe_params_b: 11.3,
            kv_cache_gb: 1.07,
            quant_bits: 4.5,
        }
    }
}

/// Parse one required, finite, non-negative number.
pub fn parse_field(
    fields: &HashMap<String, String>,
    field: &'static str,
) -> Result<f64, SpeedInputError> {
    let raw = fields
        .get(field)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or(SpeedInputError::Missing { field })?;

    let value: f64 = raw.parse().map_err(|_| SpeedInputError::InvalidNumber {
        field,
        value: raw.to_string(),
    })?;
    if !value.is_finite() {
        return Err(SpeedInputError::InvalidNumber {
            field,
            value: raw.to_string(),
        });
    }
    if value < 0.0 {
        return Err(SpeedInputError::Negative {
            field,
            value: raw.to_string(),
        });
    }
    Ok(value)
}

impl SpeedInput {
    /// Validate raw form fields. The first bad field aborts the computation.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, SpeedInputError> {
        let input = Self {
            gpu1_vram_gb: parse_field(fields, "gpu1_vram_gb")?,
            gpu1_bw_gbps: parse_field(fields, "gpu1_bw_gbps")?,
            gpu2_vram_gb: parse_field(fields, "gpu2_vram_gb")?,
            gpu2_bw_gbps: parse_field(fields, "gpu2_bw_gbps")?,
            sys_bw_gbps: parse_field(fields, "sys_bw_gbps")?,
            total_params_b: parse_field(fields, "total_params_b")?,
            dense_params_b: parse_field(fields, "dense_params_b")?,
            active_moe_params_b: parse_field(fields, "active_moe_params_b")?,
            kv_cache_gb: parse_field(fields, "kv_cache_gb")?,
            quant_bits: parse_field(fields, "quant_bits")?,
        };
        input.validate()?;
        Ok(input)
    }

    /// Checks that also apply to inputs built from CLI flags.
    pub fn validate(&self) -> Result<(), SpeedInputError> {
        let named = [
            ("gpu1_vram_gb", self.gpu1_vram_gb),
            ("gpu1_bw_gbps", self.gpu1_bw_gbps),
            ("gpu2_vram_gb", self.gpu2_vram_gb),
            ("gpu2_bw_gbps", self.gpu2_bw_gbps),
            ("sys_bw_gbps", self.sys_bw_gbps),
            ("total_params_b", self.total_params_b),
            ("dense_params_b", self.dense_params_b),
            ("active_moe_params_b", self.active_moe_params_b),
            ("kv_cache_gb", self.kv_cache_gb),
            ("quant_bits", self.quant_bits),
        ];
        for (field, value) in named {
            if !value.is_finite() {
                return Err(SpeedInputError::InvalidNumber {
                    field,
                    value: value.to_string(),
                });
            }
            if value < 0.0 {
                return Err(SpeedInputError::Negative {
                    field,
                    value: value.to_string(),
                });
            }
        }
        if self.quant_bits == 0.0 {
            return Err(SpeedInputError::ZeroQuantBits);
        }
        Ok(())
    }

    #[inline]
    pub fn bytes_per_param(&self) -> f64 {
        self.quant_bits / 8.0
    }
}

/// Which path dominates the per-token time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bottleneck {
    Gpu1,
    Gpu2,
    SystemRam,
    /// Nothing to load.
    None,
}

impl Bottleneck {
    /// Machine-readable name, the same spelling serde uses.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Gpu1 => "gpu1",
            Self::Gpu2 => "gpu2",
            Self::SystemRam => "system_ram",
            Self::None => "none",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gpu1 => "GPU 1 (dense + KV)",
            Self::Gpu2 => "GPU 2 (experts)",
            Self::SystemRam => "System RAM (experts)",
            Self::None => "none",
        }
    }
}

/// Result of a speed estimate. Sizes in GB, times in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedResult {
    pub bytes_per_param: f64,
    pub model_gb: f64,
    pub dense_gb: f64,
    /// All routed expert weights, active or not.
    pub moe_total_gb: f64,
    /// Routed expert weights read per token.
    pub active_moe_gb: f64,
    /// Dense weights plus KV cache, all read from GPU 1.
    pub gpu1_load_gb: f64,
    /// How far GPU 1's resident set exceeds its VRAM (0 when it fits).
    pub gpu1_overflow_gb: f64,
    /// Expert weights resident on GPU 2.
    pub gpu2_moe_gb: f64,
    /// Fraction of expert weights on GPU 2.
    pub gpu2_share: f64,
    /// Fraction of expert weights in system RAM.
    pub ram_share: f64,
    pub gpu2_active_gb: f64,
    pub ram_active_gb: f64,
    pub gpu1_ms: f64,
    pub gpu2_ms: f64,
    pub ram_ms: f64,
    /// Per-token load time; infinite when a used path has zero bandwidth.
    pub total_ms: f64,
    /// 0 when `total_ms` is infinite.
    pub tokens_per_sec: f64,
    pub bottleneck: Bottleneck,
}

/// Milliseconds to stream `load_gb` at `bw_gbps`.
/// Zero load costs zero; zero bandwidth with a non-zero load is infinite.
#[inline]
pub fn path_ms(load_gb: f64, bw_gbps: f64) -> f64 {
    if load_gb <= 0.0 {
        0.0
    } else {
        load_gb / bw_gbps * 1000.0
    }
}

/// Estimate per-token load time and throughput.
pub fn estimate_speed(input: &SpeedInput) -> SpeedResult {
    let bpp = input.bytes_per_param();

    let dense_gb = input.dense_params_b * bpp;
    let moe_total_gb = (input.total_params_b - input.dense_params_b).max(0.0) * bpp;
    let active_moe_gb = input.active_moe_params_b * bpp;
    let model_gb = dense_gb + moe_total_gb;

    let gpu1_load_gb = dense_gb + input.kv_cache_gb;
    let gpu1_overflow_gb = (gpu1_load_gb - input.gpu1_vram_gb).max(0.0);

    // Experts fill GPU 2 first, the remainder stays in system RAM
    let gpu2_moe_gb = moe_total_gb.min(input.gpu2_vram_gb);
    let gpu2_share = if moe_total_gb > 0.0 {
        gpu2_moe_gb / moe_total_gb
    } else {
        0.0
    };
    let ram_share = 1.0 - gpu2_share;

    let gpu2_active_gb = active_moe_gb * gpu2_share;
    let ram_active_gb = active_moe_gb * ram_share;

    let gpu1_ms = path_ms(gpu1_load_gb, input.gpu1_bw_gbps);
    let gpu2_ms = path_ms(gpu2_active_gb, input.gpu2_bw_gbps);
    let ram_ms = path_ms(ram_active_gb, input.sys_bw_gbps);
    let total_ms = gpu1_ms + gpu2_ms + ram_ms;

    let tokens_per_sec = if total_ms.is_infinite() {
        0.0
    } else {
        1000.0 / total_ms
    };

    let bottleneck = if total_ms <= 0.0 {
        Bottleneck::None
    } else if gpu1_ms >= gpu2_ms && gpu1_ms >= ram_ms {
        Bottleneck::Gpu1
    } else if gpu2_ms >= ram_ms {
        Bottleneck::Gpu2
    } else {
        Bottleneck::SystemRam
    };

    SpeedResult {
        bytes_per_param: bpp,
        model_gb,
        dense_gb,
        moe_total_gb,
        active_moe_gb,
        gpu1_load_gb,
        gpu1_overflow_gb,
        gpu2_moe_gb,
        gpu2_share,
        ram_share,
        gpu2_active_gb,
        ram_active_gb,
        gpu1_ms,
        gpu2_ms,
        ram_ms,
        total_ms,
        tokens_per_sec,
        bottleneck,
    }
}
