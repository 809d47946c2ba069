//! Sensitivity sweep for the speed estimate.
//!
//! Re-runs [`estimate_speed`] over a grid of quantization widths and system
//! RAM bandwidths, the two knobs that move offloaded MoE throughput the most.

use serde::Serialize;

use crate::speed::{estimate_speed, Bottleneck, SpeedInput};

/// Single result from a speed sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepRow {
    pub quant_bits: f64,
    pub sys_bw_gbps: f64,
    pub model_gb: f64,
    pub gpu2_share: f64,
    pub gpu1_ms: f64,
    pub gpu2_ms: f64,
    pub ram_ms: f64,
    pub total_ms: f64,
    pub tokens_per_sec: f64,
    pub bottleneck: Bottleneck,
}

impl SweepRow {
    /// CSV header.
    pub fn csv_header() -> &'static str {
        "quant_bits,sys_bw_gbps,model_gb,gpu2_share,gpu1_ms,gpu2_ms,ram_ms,total_ms,tok_per_sec,bottleneck"
    }

    /// Format as CSV row.
    pub fn to_csv(&self) -> String {
        format!(
            "{},{:.1},{:.2},{:.3},{:.3},{:.3},{:.3},{:.3},{:.2},{}",
            self.quant_bits,
            self.sys_bw_gbps,
            self.model_gb,
            self.gpu2_share,
            self.gpu1_ms,
            self.gpu2_ms,
            self.ram_ms,
            self.total_ms,
            self.tokens_per_sec,
            self.bottleneck.id()
        )
    }
}

/// Evaluate every (bits, bandwidth) pair, bits-major.
pub fn speed_sweep(base: &SpeedInput, bits_values: &[f64], sys_bw_values: &[f64]) -> Vec<SweepRow> {
    let mut rows = Vec::with_capacity(bits_values.len() * sys_bw_values.len());

    for &bits in bits_values {
        for &bw in sys_bw_values {
            let input = SpeedInput {
                quant_bits: bits,
                sys_bw_gbps: bw,
                ..*base
            };
            let r = estimate_speed(&input);
            rows.push(SweepRow {
                quant_bits: bits,
                sys_bw_gbps: bw,
                model_gb: r.model_gb,
                gpu2_share: r.gpu2_share,
                gpu1_ms: r.gpu1_ms,
                gpu2_ms: r.gpu2_ms,
                ram_ms: r.ram_ms,
                total_ms: r.total_ms,
                tokens_per_sec: r.tokens_per_sec,
                bottleneck: r.bottleneck,
            });
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_produces_grid() {
        let rows = speed_sweep(&SpeedInput::default(), &[4.0, 8.0], &[50.0, 100.0, 200.0]);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].quant_bits, 4.0);
        assert_eq!(rows[0].sys_bw_gbps, 50.0);
        assert_eq!(rows[5].quant_bits, 8.0);
        assert_eq!(rows[5].sys_bw_gbps, 200.0);
    }

    #[test]
    fn test_more_ram_bandwidth_never_slower() {
        let rows = speed_sweep(&SpeedInput::default(), &[4.0], &[25.0, 50.0, 100.0, 400.0]);
        for pair in rows.windows(2) {
            assert!(pair[1].tokens_per_sec >= pair[0].tokens_per_sec);
        }
    }

    #[test]
    fn test_csv_shape() {
        let rows = speed_sweep(&SpeedInput::default(), &[4.0], &[50.0]);
        let cols = SweepRow::csv_header().split(',').count();
        assert_eq!(rows[0].to_csv().split(',').count(), cols);
    }

    #[test]
    fn test_csv_bottleneck_matches_json() {
        let rows = speed_sweep(&SpeedInput::default(), &[4.5], &[0.0, 89.6]);
        for row in &rows {
            let json = serde_json::to_value(row.bottleneck).unwrap();
            let csv = row.to_csv();
            assert_eq!(csv.rsplit(',').next(), json.as_str());
        }
        assert!(rows[0].to_csv().ends_with(",system_ram"));
    }

    #[test]
    fn test_zero_ram_bandwidth_row() {
        let rows = speed_sweep(&SpeedInput::default(), &[4.5], &[0.0]);
        assert!(rows[0].total_ms.is_infinite());
        assert_eq!(rows[0].tokens_per_sec, 0.0);
    }
}
