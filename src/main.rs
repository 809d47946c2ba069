//! MoE Calculator
//!
//! Counts parameters of Mixture-of-Experts transformers from their tensor
//! shapes, and estimates bandwidth-bound decode speed when the weights are
//! split across two GPUs and system RAM.

mod cli;
mod error;
mod params;
mod presets;
mod render;
mod server;
mod shapes;
mod speed;
mod sweep;


use std::process;

use clap::Parser;
use log::{debug, error, info};

use cli::Cli;
use params::compute_results;
use presets::{ArchitecturePreset, GpuPreset, MemoryPreset, ModelPreset};
use render::{
    format_params, format_tps, render_params_text, render_speed_text, rows_to_text,
    shape_breakdown_rows,
};
use speed::estimate_speed;
use sweep::{speed_sweep, SweepRow};

fn main() {
    env_logger::init();
    let args = Cli::parse();

    if args.serve {
        if let Err(e) = server::run_server(&args.host, args.port) {
            error!("server failed: {}", e);
            eprintln!("error: cannot serve on {}:{}: {}", args.host, args.port, e);
            process::exit(1);
        }
        return;
    }

    if args.params {
        run_params(&args);
        return;
    }

    if args.sweep {
        run_sweep(&args);
        return;
    }

    run_speed(&args);
}

fn run_params(args: &Cli) {
    let input = args.to_compute_input();
    let result = compute_results(&input);
    debug!("parameter input: {:?}", input);

    if args.json {
        print_json(&result);
        return;
    }

    println!("=== MoE Parameter Calculator ===\n");
    if let Some(arch) = args.arch.as_deref().and_then(ArchitecturePreset::from_str) {
        println!("Architecture Preset: {}\n", arch.name());
    }

    if args.breakdown {
        let lists = [
            ("Dense layer shapes", &input.dense_shapes),
            ("MoE layer base shapes", &input.moe_base_shapes),
            ("Expert shapes", &input.expert_shapes),
            ("Shared expert shapes", &input.shared_expert_shapes),
            ("Embedding shapes", &input.embedding_shapes),
        ];
        for (title, text) in lists {
            let rows = shape_breakdown_rows(text);
            if rows.is_empty() {
                continue;
            }
            println!("--- {} ---", title);
            print!("{}", rows_to_text(&rows));
            println!();
        }
    }

    println!("--- Results ---");
    print!("{}", render_params_text(&input, &result));
    println!();
    println!(
        "Total {} / active {} per token",
        format_params(result.total_params),
        format_params(result.active_params)
    );
}

fn run_speed(args: &Cli) {
    let input = match args.to_speed_input() {
        Ok(input) => input,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    };
    let result = estimate_speed(&input);
    info!(
        "estimated {:.2} tok/s, bottleneck {}",
        result.tokens_per_sec,
        result.bottleneck.name()
    );

    if args.json {
        print_json(&result);
        return;
    }

    println!("=== MoE Token Speed Estimator ===\n");

    let presets = [
        ("GPU 1", args.gpu1.as_deref().and_then(GpuPreset::from_str).map(|p| p.name())),
        ("GPU 2", args.gpu2.as_deref().and_then(GpuPreset::from_str).map(|p| p.name())),
        ("System RAM", args.ram.as_deref().and_then(MemoryPreset::from_str).map(|p| p.name())),
        ("Model", args.model.as_deref().and_then(ModelPreset::from_str).map(|p| p.name())),
    ];
    for (slot, name) in presets {
        if let Some(name) = name {
            println!("{:<11} {}", format!("{}:", slot), name);
        }
    }
    println!();

    print!("{}", render_speed_text(&input, &result));
    println!();
    println!("Estimated speed: {}", format_tps(result.tokens_per_sec));
}

fn run_sweep(args: &Cli) {
    let base = match args.to_speed_input() {
        Ok(input) => input,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    };
    let bits = args.parse_sweep_bits();
    let ram = args.parse_sweep_ram();
    info!("sweeping {} bit widths x {} RAM bandwidths", bits.len(), ram.len());

    let rows = speed_sweep(&base, &bits, &ram);

    if args.json {
        print_json(&rows);
        return;
    }

    println!("{}", SweepRow::csv_header());
    for row in &rows {
        println!("{}", row.to_csv());
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => {
            eprintln!("error: cannot serialize result: {}", e);
            process::exit(1);
        }
    }
}
