//! Presentation of calculator results.
//!
//! Each result record is first flattened into [`Row`]s (identity, label,
//! formatted value, formula with the numbers substituted) and then written
//! out either as HTML table rows for the browser or as a plain-text table for
//! the terminal.

use crate::params::{ComputeInput, ComputeResult, SharedExpertScope};
use crate::shapes::parse_groups;
use crate::speed::{SpeedInput, SpeedResult};

/// One line of a results table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Identity letter (parameter calculator) or empty.
    pub id: &'static str,
    pub label: &'static str,
    pub value: String,
    pub formula: String,
    /// Highlight the row (warnings, headline numbers).
    pub emphasis: bool,
}

impl Row {
    fn new(id: &'static str, label: &'static str, value: String, formula: String) -> Self {
        Self {
            id,
            label,
            value,
            formula,
            emphasis: false,
        }
    }

    fn emphasized(mut self) -> Self {
        self.emphasis = true;
        self
    }
}

// ============================================================================
// Number formatting
// ============================================================================

/// Format a parameter count with a K/M/B/T suffix.
pub fn format_params(n: u64) -> String {
    let x = n as f64;
    if x >= 1e12 {
        format!("{:.2}T", x / 1e12)
    } else if x >= 1e9 {
        format!("{:.2}B", x / 1e9)
    } else if x >= 1e6 {
        format!("{:.2}M", x / 1e6)
    } else if x >= 1e3 {
        format!("{:.1}K", x / 1e3)
    } else {
        format!("{}", n)
    }
}

/// Format a fractional parameter count (per-layer averages).
pub fn format_params_f(x: f64) -> String {
    format_params(x.round() as u64)
}

/// Format an integer with thousands separators.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn format_gb(gb: f64) -> String {
    format!("{:.2} GB", gb)
}

/// Format milliseconds; infinite times render as `∞`.
pub fn format_ms(ms: f64) -> String {
    if ms.is_infinite() {
        "∞ ms".to_string()
    } else if ms >= 1000.0 {
        format!("{:.2} s", ms / 1000.0)
    } else {
        format!("{:.2} ms", ms)
    }
}

/// Format tokens per second.
pub fn format_tps(tps: f64) -> String {
    if tps.is_infinite() {
        "∞ tok/s".to_string()
    } else if tps >= 1000.0 {
        format!("{:.1}K tok/s", tps / 1000.0)
    } else {
        format!("{:.1} tok/s", tps)
    }
}

/// Format an already-scaled percentage.
pub fn format_pct(pct: f64) -> String {
    format!("{:.1}%", pct)
}

/// Format billions of parameters as typed in the speed form.
fn format_billions(b: f64) -> String {
    format!("{:.2}B", b)
}

/// Escape text for inclusion in HTML element content or attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Parameter calculator
// ============================================================================

/// Rows for every lettered identity, in letter order.
pub fn params_rows(input: &ComputeInput, r: &ComputeResult) -> Vec<Row> {
    let p = format_params;
    let shared_l = match input.shared_scope {
        SharedExpertScope::PerLayer => format!("{} × {}", p(r.shared_expert_unit), input.moe_layers),
        SharedExpertScope::Global => format!("{} (global)", p(r.shared_expert_unit)),
    };
    let shared_m = match input.shared_scope {
        SharedExpertScope::PerLayer => format!("{} (per layer)", p(r.shared_expert_unit)),
        SharedExpertScope::Global => format!("{} / {}", p(r.shared_total), input.moe_layers),
    };
    let shared_k = if input.has_shared_expert {
        format!(
            "{} × {}",
            p(r.shared_expert_unit.checked_div(input.shared_experts).unwrap_or(0)),
            input.shared_experts
        )
    } else {
        "no shared expert".to_string()
    };

    vec![
        Row::new("A", "Dense layer params", p(r.dense_layer_params), "Σ dense shapes".into()),
        Row::new("B", "All dense layers", p(r.dense_layers_total),
            format!("{} × {}", p(r.dense_layer_params), input.dense_layers)),
        Row::new("C", "MoE layer base params", p(r.moe_layer_base_params),
            "Σ attention/norm/router shapes".into()),
        Row::new("D", "All MoE layer bases", p(r.moe_base_total),
            format!("{} × {}", p(r.moe_layer_base_params), input.moe_layers)),
        Row::new("E", "Params per expert", p(r.expert_params), "Σ expert shapes".into()),
        Row::new("F", "Routed experts per layer", p(r.routed_per_layer),
            format!("{} × {}", p(r.expert_params), input.experts_per_layer)),
        Row::new("G", "Routed experts, all layers", p(r.routed_total),
            format!("{} × {}", p(r.routed_per_layer), input.moe_layers)),
        Row::new("H", "Active experts per token", r.active_experts.to_string(),
            format!("clamp({}, 0, {})", input.active_experts, input.experts_per_layer)),
        Row::new("I", "Active routed per layer", p(r.active_routed_per_layer),
            format!("{} × {}", p(r.expert_params), r.active_experts)),
        Row::new("J", "Active routed, all layers", p(r.active_routed_total),
            format!("{} × {}", p(r.active_routed_per_layer), input.moe_layers)),
        Row::new("K", "Shared experts per unit", p(r.shared_expert_unit), shared_k),
        Row::new("L", "Shared experts, all layers", p(r.shared_total), shared_l),
        Row::new("M", "Shared experts per layer", p(r.shared_per_layer), shared_m),
        Row::new("N", "Embeddings and head", p(r.embedding_params), "Σ embedding shapes".into()),
        Row::new("O", "MoE layer total", p(r.moe_layer_total),
            format!("{} + {} + {}", p(r.moe_layer_base_params), p(r.routed_per_layer), p(r.shared_per_layer))),
        Row::new("P", "MoE layer active", p(r.moe_layer_active),
            format!("{} + {} + {}", p(r.moe_layer_base_params), p(r.active_routed_per_layer), p(r.shared_per_layer))),
        Row::new("Q", "MoE total", p(r.moe_total), format!("= G = {}", p(r.routed_total))),
        Row::new("R", "Dense (always active)", p(r.dense_active),
            format!("{} + {} + {} + {}", p(r.dense_layers_total), p(r.moe_base_total), p(r.shared_total), p(r.embedding_params))),
        Row::new("S", "Active params", p(r.active_params),
            format!("{} + {}", p(r.dense_active), p(r.active_routed_total))).emphasized(),
        Row::new("T", "Inactive params", p(r.inactive_params),
            format!("{} − {}", p(r.moe_total), p(r.active_routed_total))),
        Row::new("U", "Total layers", r.total_layers.to_string(),
            format!("{} + {}", input.dense_layers, input.moe_layers)),
        Row::new("V", "Avg params per layer", format_params_f(r.avg_params_per_layer),
            format!("(B + D + G + L) / {}", r.total_layers)),
        Row::new("W", "Avg active per layer", format_params_f(r.avg_active_per_layer),
            format!("(B + D + J + L) / {}", r.total_layers)),
        Row::new("X", "Active share", format_pct(r.active_pct),
            format!("{} / {}", p(r.active_params), p(r.total_params))).emphasized(),
        Row::new("Y", "Inactive share", format_pct(r.inactive_pct),
            format!("{} / {}", p(r.inactive_params), p(r.total_params))),
        Row::new("Z", "MoE share of total", format_pct(r.moe_pct),
            format!("{} / {}", p(r.moe_total), p(r.total_params))),
        Row::new("AA", "Dense share of total", format_pct(r.dense_pct),
            format!("{} / {}", p(r.dense_active), p(r.total_params))),
        Row::new("AB", "Experts activated", format_pct(r.expert_activation_pct),
            format!("{} / {}", r.active_experts, input.experts_per_layer)),
        Row::new("AC", "Shared share of active", format_pct(r.shared_pct_of_active),
            format!("{} / {}", p(r.shared_total), p(r.active_params))),
        Row::new("AD", "Routed share of active", format_pct(r.routed_pct_of_active),
            format!("{} / {}", p(r.active_routed_total), p(r.active_params))),
        Row::new("AE", "Embedding share of total", format_pct(r.embedding_pct),
            format!("{} / {}", p(r.embedding_params), p(r.total_params))),
        Row::new("AF", "Routed utilization", format_pct(r.routed_utilization_pct),
            format!("{} / {}", p(r.active_routed_total), p(r.moe_total))),
        Row::new("AG", "Experts in model", format_count(r.total_experts),
            format!("{} × {}", input.experts_per_layer, input.moe_layers)),
        Row::new("AH", "Experts used per token", format_count(r.total_active_experts),
            format!("{} × {}", r.active_experts, input.moe_layers)),
        Row::new("AI", "Total / active", format!("{:.2}×", r.sparsity_ratio),
            format!("{} / {}", p(r.total_params), p(r.active_params))),
        Row::new("AJ", "Total params", p(r.total_params),
            format!("{} + {}", p(r.dense_active), p(r.moe_total))).emphasized(),
    ]
}

/// Rows listing each shape group of one shape list with its product.
/// Groups that parsed as zero are emphasized so malformed input stands out.
pub fn shape_breakdown_rows(text: &str) -> Vec<Row> {
    parse_groups(text)
        .into_iter()
        .map(|g| {
            let formula = if g.dims.is_empty() {
                "unparseable, counted as 0".to_string()
            } else {
                g.dims
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(" × ")
            };
            let value = format!("[{}] = {}", g.raw, format_count(g.product));
            let row = Row::new("", "", value, formula);
            if g.product == 0 {
                row.emphasized()
            } else {
                row
            }
        })
        .collect()
}

// ============================================================================
// Speed calculator
// ============================================================================

pub fn speed_rows(input: &SpeedInput, r: &SpeedResult) -> Vec<Row> {
    let mut rows = vec![
        Row::new("", "Bytes per parameter", format!("{:.4} B", r.bytes_per_param),
            format!("{} bits / 8", input.quant_bits)),
        Row::new("", "Dense weights", format_gb(r.dense_gb),
            format!("{} × {:.4} B", format_billions(input.dense_params_b), r.bytes_per_param)),
        Row::new("", "Expert weights (all)", format_gb(r.moe_total_gb),
            format!("({} − {}) × {:.4} B", format_billions(input.total_params_b),
                format_billions(input.dense_params_b), r.bytes_per_param)),
        Row::new("", "Active expert weights", format_gb(r.active_moe_gb),
            format!("{} × {:.4} B", format_billions(input.active_moe_params_b), r.bytes_per_param)),
        Row::new("", "Model size", format_gb(r.model_gb),
            format!("{} + {}", format_gb(r.dense_gb), format_gb(r.moe_total_gb))),
        Row::new("", "GPU 1 resident", format_gb(r.gpu1_load_gb),
            format!("{} dense + {} KV", format_gb(r.dense_gb), format_gb(input.kv_cache_gb))),
    ];

    if r.gpu1_overflow_gb > 0.0 {
        rows.push(
            Row::new("", "GPU 1 over capacity", format_gb(r.gpu1_overflow_gb),
                format!("{} − {} VRAM", format_gb(r.gpu1_load_gb), format_gb(input.gpu1_vram_gb)))
            .emphasized(),
        );
    }

    rows.extend([
        Row::new("", "Experts on GPU 2", format_gb(r.gpu2_moe_gb),
            format!("min({}, {}) → {} of experts", format_gb(r.moe_total_gb),
                format_gb(input.gpu2_vram_gb), format_pct(100.0 * r.gpu2_share))),
        Row::new("", "GPU 1 time", format_ms(r.gpu1_ms),
            format!("{} / {} GB/s", format_gb(r.gpu1_load_gb), input.gpu1_bw_gbps)),
        Row::new("", "GPU 2 time", format_ms(r.gpu2_ms),
            format!("{} × {} / {} GB/s", format_gb(r.active_moe_gb),
                format_pct(100.0 * r.gpu2_share), input.gpu2_bw_gbps)),
        Row::new("", "System RAM time", format_ms(r.ram_ms),
            format!("{} × {} / {} GB/s", format_gb(r.active_moe_gb),
                format_pct(100.0 * r.ram_share), input.sys_bw_gbps)),
        Row::new("", "Load time per token", format_ms(r.total_ms),
            format!("{} + {} + {}", format_ms(r.gpu1_ms), format_ms(r.gpu2_ms), format_ms(r.ram_ms)))
            .emphasized(),
        Row::new("", "Throughput", format_tps(r.tokens_per_sec),
            format!("1000 / {}", format_ms(r.total_ms)))
            .emphasized(),
        Row::new("", "Bottleneck", r.bottleneck.name().to_string(), String::new()),
    ]);

    rows
}

// ============================================================================
// Output
// ============================================================================

/// HTML `<tr>` elements for a result table.
pub fn rows_to_html(rows: &[Row]) -> String {
    let mut out = String::new();
    for row in rows {
        let class = if row.emphasis { " class=\"em\"" } else { "" };
        out.push_str(&format!(
            "<tr{}><td class=\"id\">{}</td><td>{}</td><td class=\"val\">{}</td><td class=\"formula\">{}</td></tr>\n",
            class,
            escape_html(row.id),
            escape_html(row.label),
            escape_html(&row.value),
            escape_html(&row.formula),
        ));
    }
    out
}

/// Aligned plain-text table.
pub fn rows_to_text(rows: &[Row]) -> String {
    let label_w = rows.iter().map(|r| r.label.chars().count()).max().unwrap_or(0);
    let value_w = rows.iter().map(|r| r.value.chars().count()).max().unwrap_or(0);

    let mut out = String::new();
    for row in rows {
        let marker = if row.emphasis { '*' } else { ' ' };
        let line = format!(
            "{marker}{:>3}  {:<label_w$}  {:>value_w$}  {}",
            row.id, row.label, row.value, row.formula
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

pub fn render_params(input: &ComputeInput, result: &ComputeResult) -> String {
    rows_to_html(&params_rows(input, result))
}

pub fn render_params_text(input: &ComputeInput, result: &ComputeResult) -> String {
    rows_to_text(&params_rows(input, result))
}

pub fn render_speed(input: &SpeedInput, result: &SpeedResult) -> String {
    rows_to_html(&speed_rows(input, result))
}

pub fn render_speed_text(input: &SpeedInput, result: &SpeedResult) -> String {
    rows_to_text(&speed_rows(input, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::compute_results;
    use crate::speed::estimate_speed;

    #[test]
    fn test_format_params() {
        assert_eq!(format_params(0), "0");
        assert_eq!(format_params(999), "999");
        assert_eq!(format_params(12_345), "12.3K");
        assert_eq!(format_params(4_718_592), "4.72M");
        assert_eq!(format_params(30_532_122_624), "30.53B");
        assert_eq!(format_params(671_000_000_000_000), "671.00T");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(4_718_592), "4,718,592");
    }

    #[test]
    fn test_format_infinite_values() {
        assert_eq!(format_ms(f64::INFINITY), "∞ ms");
        assert_eq!(format_ms(12.5), "12.50 ms");
        assert_eq!(format_ms(2500.0), "2.50 s");
        assert_eq!(format_tps(0.0), "0.0 tok/s");
        assert_eq!(format_tps(1500.0), "1.5K tok/s");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn test_params_rows_cover_every_identity() {
        let input = ComputeInput::default();
        let rows = params_rows(&input, &compute_results(&input));
        assert_eq!(rows.len(), 36);
        assert_eq!(rows.first().map(|r| r.id), Some("A"));
        assert_eq!(rows.last().map(|r| r.id), Some("AJ"));
    }

    #[test]
    fn test_params_html_escapes_shape_text() {
        let input = ComputeInput {
            dense_layers: 1,
            dense_shapes: "[2,3] <script>".into(),
            ..Default::default()
        };
        let html = render_params(&input, &compute_results(&input));
        assert!(html.contains("<td class=\"id\">AJ</td>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_shape_breakdown_flags_zero_groups() {
        let rows = shape_breakdown_rows("[2,3] [abc]");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, "[2,3] = 6");
        assert_eq!(rows[0].formula, "2 × 3");
        assert!(!rows[0].emphasis);
        assert!(rows[1].emphasis);
        assert_eq!(rows[1].formula, "unparseable, counted as 0");
    }

    #[test]
    fn test_speed_rows_show_overflow_only_when_needed() {
        let input = SpeedInput::default();
        let rows = speed_rows(&input, &estimate_speed(&input));
        assert!(!rows.iter().any(|r| r.label == "GPU 1 over capacity"));

        let small = SpeedInput { gpu1_vram_gb: 0.5, ..input };
        let rows = speed_rows(&small, &estimate_speed(&small));
        assert!(rows.iter().any(|r| r.label == "GPU 1 over capacity" && r.emphasis));
    }

    #[test]
    fn test_speed_text_renders_infinity() {
        let input = SpeedInput { gpu1_bw_gbps: 0.0, ..SpeedInput::default() };
        let text = render_speed_text(&input, &estimate_speed(&input));
        assert!(text.contains("∞ ms"));
        assert!(text.contains("0.0 tok/s"));
    }
}
