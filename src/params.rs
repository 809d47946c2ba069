//! Parameter aggregation for mixture-of-experts models.
//!
//! Combines per-layer shape lists into dense, routed-expert and shared-expert
//! totals. Every derived field is documented below as a lettered identity;
//! the render layer prints the same letters next to each result row.
//!
//! # Identities
//!
//! ```text
//! A  dense_layer_params      = Σ dense shapes
//! B  dense_layers_total      = A × dense_layers
//! C  moe_layer_base_params   = Σ MoE base shapes (attention, norms, router)
//! D  moe_base_total          = C × moe_layers
//! E  expert_params           = Σ expert shapes
//! F  routed_per_layer        = E × experts_per_layer
//! G  routed_total            = F × moe_layers
//! H  active_experts          = clamp(active_experts, 0, experts_per_layer)
//! I  active_routed_per_layer = E × H
//! J  active_routed_total     = I × moe_layers
//! K  shared_expert_unit      = Σ shared shapes × shared_experts (0 if absent)
//! L  shared_total            = K × moe_layers (per-layer) | K (global)
//! M  shared_per_layer        = K (per-layer) | L / moe_layers (global)
//! N  embedding_params        = Σ embedding/head shapes
//! O  moe_layer_total         = C + F + M
//! P  moe_layer_active        = C + I + M
//! Q  moe_total               = G
//! R  dense_active            = B + D + L + N
//! S  active_params           = R + J
//! T  inactive_params         = Q − J
//! U  total_layers            = dense_layers + moe_layers
//! V  avg_params_per_layer    = (B + D + G + L) / U
//! W  avg_active_per_layer    = (B + D + J + L) / U
//! X  active_pct              = S / AJ
//! Y  inactive_pct            = T / AJ
//! Z  moe_pct                 = Q / AJ
//! AA dense_pct               = R / AJ
//! AB expert_activation_pct   = H / experts_per_layer
//! AC shared_pct_of_active    = L / S
//! AD routed_pct_of_active    = J / S
//! AE embedding_pct           = N / AJ
//! AF routed_utilization_pct  = J / Q
//! AG total_experts           = experts_per_layer × moe_layers
//! AH total_active_experts    = H × moe_layers
//! AI sparsity_ratio          = AJ / S
//! AJ total_params            = R + Q
//! ```
//!
//! Percentages are scaled by 100. Any division by zero yields 0.

use std::collections::HashMap;

use serde::Serialize;

use crate::shapes::sum_shapes;

/// How the shared-expert shape list is scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedExpertScope {
    /// Shapes describe the shared experts of a single MoE layer.
    #[default]
    PerLayer,
    /// Shapes already cover the shared experts of the whole model.
    Global,
}

impl SharedExpertScope {
    /// Lenient parse: `global` (any case) selects [`Self::Global`],
    /// everything else is per-layer.
    pub fn from_str_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "global" | "model" | "total" => Self::Global,
            _ => Self::PerLayer,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PerLayer => "per_layer",
            Self::Global => "global",
        }
    }
}

/// Inputs to the parameter calculator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComputeInput {
    /// Number of dense (non-MoE) transformer layers.
    pub dense_layers: u64,
    /// Number of MoE transformer layers.
    pub moe_layers: u64,
    /// Shapes of one dense layer (attention + MLP + norms).
    pub dense_shapes: String,
    /// Non-expert shapes of one MoE layer (attention, norms, router).
    pub moe_base_shapes: String,
    /// Shapes of one routed expert.
    pub expert_shapes: String,
    /// Routed experts per MoE layer.
    pub experts_per_layer: u64,
    /// Routed experts activated per token.
    pub active_experts: u64,
    /// Whether the model carries always-on shared experts.
    pub has_shared_expert: bool,
    /// Shapes of one shared expert.
    pub shared_expert_shapes: String,
    /// Shared experts per MoE layer (or in total for [`SharedExpertScope::Global`]).
    pub shared_experts: u64,
    pub shared_scope: SharedExpertScope,
    /// Embedding table, output head and final norm.
    pub embedding_shapes: String,
}

/// Parse a count field; missing or malformed values become 0.
fn lenient_u64(fields: &HashMap<String, String>, key: &str) -> u64 {
    fields
        .get(key)
        .map(|s| s.trim().replace(['_', ','], ""))
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0)
}

fn lenient_bool(fields: &HashMap<String, String>, key: &str) -> bool {
    fields
        .get(key)
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "on" | "yes"))
        .unwrap_or(false)
}

impl ComputeInput {
    /// Build from raw form fields. Never fails: anything missing or
    /// unparseable defaults to zero / empty / false.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let text = |key: &str| fields.get(key).cloned().unwrap_or_default();
        Self {
            dense_layers: lenient_u64(fields, "dense_layers"),
            moe_layers: lenient_u64(fields, "moe_layers"),
            dense_shapes: text("dense_shapes"),
            moe_base_shapes: text("moe_base_shapes"),
            expert_shapes: text("expert_shapes"),
            experts_per_layer: lenient_u64(fields, "experts_per_layer"),
            active_experts: lenient_u64(fields, "active_experts"),
            has_shared_expert: lenient_bool(fields, "has_shared_expert"),
            shared_expert_shapes: text("shared_expert_shapes"),
            shared_experts: lenient_u64(fields, "shared_experts"),
            shared_scope: fields
                .get("shared_scope")
                .map(|s| SharedExpertScope::from_str_lenient(s))
                .unwrap_or_default(),
            embedding_shapes: text("embedding_shapes"),
        }
    }
}

/// Result of a parameter computation. Field comments carry the identity letter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComputeResult {
    /// (A)
    pub dense_layer_params: u64,
    /// (B)
    pub dense_layers_total: u64,
    /// (C)
    pub moe_layer_base_params: u64,
    /// (D)
    pub moe_base_total: u64,
    /// (E)
    pub expert_params: u64,
    /// (F)
    pub routed_per_layer: u64,
    /// (G)
    pub routed_total: u64,
    /// (H) active experts after clamping.
    pub active_experts: u64,
    /// (I)
    pub active_routed_per_layer: u64,
    /// (J)
    pub active_routed_total: u64,
    /// (K)
    pub shared_expert_unit: u64,
    /// (L)
    pub shared_total: u64,
    /// (M)
    pub shared_per_layer: u64,
    /// (N)
    pub embedding_params: u64,
    /// (O)
    pub moe_layer_total: u64,
    /// (P)
    pub moe_layer_active: u64,
    /// (Q)
    pub moe_total: u64,
    /// (R)
    pub dense_active: u64,
    /// (S)
    pub active_params: u64,
    /// (T)
    pub inactive_params: u64,
    /// (U)
    pub total_layers: u64,
    /// (V)
    pub avg_params_per_layer: f64,
    /// (W)
    pub avg_active_per_layer: f64,
    /// (X)
    pub active_pct: f64,
    /// (Y)
    pub inactive_pct: f64,
    /// (Z)
    pub moe_pct: f64,
    /// (AA)
    pub dense_pct: f64,
    /// (AB)
    pub expert_activation_pct: f64,
    /// (AC)
    pub shared_pct_of_active: f64,
    /// (AD)
    pub routed_pct_of_active: f64,
    /// (AE)
    pub embedding_pct: f64,
    /// (AF)
    pub routed_utilization_pct: f64,
    /// (AG)
    pub total_experts: u64,
    /// (AH)
    pub total_active_experts: u64,
    /// (AI) total / active.
    pub sparsity_ratio: f64,
    /// (AJ)
    pub total_params: u64,
}

/// `num / den`, or 0 when `den` is 0.
#[inline]
pub fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// `100 * num / den`, or 0 when `den` is 0.
#[inline]
pub fn pct(num: u64, den: u64) -> f64 {
    100.0 * ratio(num, den)
}

/// Compute every derived parameter count from scratch.
pub fn compute_results(input: &ComputeInput) -> ComputeResult {
    let moe_layers = input.moe_layers;

    let dense_layer_params = sum_shapes(&input.dense_shapes); // A
    let dense_layers_total = dense_layer_params.saturating_mul(input.dense_layers); // B
    let moe_layer_base_params = sum_shapes(&input.moe_base_shapes); // C
    let moe_base_total = moe_layer_base_params.saturating_mul(moe_layers); // D

    let expert_params = sum_shapes(&input.expert_shapes); // E
    let routed_per_layer = expert_params.saturating_mul(input.experts_per_layer); // F
    let routed_total = routed_per_layer.saturating_mul(moe_layers); // G
    let active_experts = input.active_experts.min(input.experts_per_layer); // H
    let active_routed_per_layer = expert_params.saturating_mul(active_experts); // I
    let active_routed_total = active_routed_per_layer.saturating_mul(moe_layers); // J

    // K, L, M
    let shared_expert_unit = if input.has_shared_expert {
        sum_shapes(&input.shared_expert_shapes).saturating_mul(input.shared_experts)
    } else {
        0
    };
    let (shared_total, shared_per_layer) = match input.shared_scope {
        SharedExpertScope::PerLayer => {
            (shared_expert_unit.saturating_mul(moe_layers), shared_expert_unit)
        }
        SharedExpertScope::Global => (
            shared_expert_unit,
            shared_expert_unit.checked_div(moe_layers).unwrap_or(0),
        ),
    };

    let embedding_params = sum_shapes(&input.embedding_shapes); // N

    let moe_layer_total = moe_layer_base_params
        .saturating_add(routed_per_layer)
        .saturating_add(shared_per_layer); // O
    let moe_layer_active = moe_layer_base_params
        .saturating_add(active_routed_per_layer)
        .saturating_add(shared_per_layer); // P

    let moe_total = routed_total; // Q
    let dense_active = dense_layers_total
        .saturating_add(moe_base_total)
        .saturating_add(shared_total)
        .saturating_add(embedding_params); // R
    let active_params = dense_active.saturating_add(active_routed_total); // S
    let inactive_params = moe_total.saturating_sub(active_routed_total); // T
    let total_params = dense_active.saturating_add(moe_total); // AJ

    let total_layers = input.dense_layers.saturating_add(moe_layers); // U
    let layer_body = dense_layers_total
        .saturating_add(moe_base_total)
        .saturating_add(shared_total);
    let avg_params_per_layer = ratio(layer_body.saturating_add(routed_total), total_layers); // V
    let avg_active_per_layer = ratio(layer_body.saturating_add(active_routed_total), total_layers); // W

    ComputeResult {
        dense_layer_params,
        dense_layers_total,
        moe_layer_base_params,
        moe_base_total,
        expert_params,
        routed_per_layer,
        routed_total,
        active_experts,
        active_routed_per_layer,
        active_routed_total,
        shared_expert_unit,
        shared_total,
        shared_per_layer,
        embedding_params,
        moe_layer_total,
        moe_layer_active,
        moe_total,
        dense_active,
        active_params,
        inactive_params,
        total_layers,
        avg_params_per_layer,
        avg_active_per_layer,
        active_pct: pct(active_params, total_params),                     // X
        inactive_pct: pct(inactive_params, total_params),                 // Y
        moe_pct: pct(moe_total, total_params),                            // Z
        dense_pct: pct(dense_active, total_params),                       // AA
        expert_activation_pct: pct(active_experts, input.experts_per_layer), // AB
        shared_pct_of_active: pct(shared_total, active_params),           // AC
        routed_pct_of_active: pct(active_routed_total, active_params),    // AD
        embedding_pct: pct(embedding_params, total_params),               // AE
        routed_utilization_pct: pct(active_routed_total, moe_total),      // AF
        total_experts: input.experts_per_layer.saturating_mul(moe_layers), // AG
        total_active_experts: active_experts.saturating_mul(moe_layers),  // AH
        sparsity_ratio: ratio(total_params, active_params),               // AI
        total_params,
    }
}
