//! Synthetic microbenchmark: depth decode + tick aggregation
//! Replays one generated depthUpdate message 100k times

use std::time::Instant;

use depth_ladder::source::synthetic::generate_update;
use depth_ladder::{aggregate, decode_str, Side, SyntheticConfig, TickSize};
use rand::rngs::StdRng;
use rand::SeedableRng;

const ITERATIONS: u64 = 100_000;

fn main() {
    let mut rng = StdRng::seed_from_u64(42);
    let update = generate_update(&SyntheticConfig::default(), 1, 1_700_000_000_000, &mut rng);
    let sample = serde_json::to_string(&update).expect("sample encodes");

    // Warm up
    for _ in 0..1_000 {
        let update = decode_str(&sample).expect("sample decodes");
        std::hint::black_box(aggregate(&update.bids, TickSize::Tenth, Side::Bid));
    }

    let t0 = Instant::now();

    let mut levels: usize = 0;
    for _ in 0..ITERATIONS {
        let update = decode_str(&sample).expect("sample decodes");
        levels += aggregate(&update.bids, TickSize::Tenth, Side::Bid).len();
        levels += aggregate(&update.asks, TickSize::Tenth, Side::Ask).len();
    }

    // Prevent DCE
    std::hint::black_box(levels);

    let elapsed = t0.elapsed();
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    let per_iter_ns = elapsed.as_nanos() as f64 / ITERATIONS as f64;
    let throughput = ITERATIONS as f64 / elapsed.as_secs_f64();

    println!("depth decode + aggregate benchmark");
    println!("  Message size: {} bytes", sample.len());
    println!("  Iterations: {}", group_thousands(ITERATIONS));
    println!("  Total time: {:.1} ms", elapsed_ms);
    println!("  Per iteration: {:.0} ns", per_iter_ns);
    println!("  Throughput: {} msgs/sec", group_thousands(throughput as u64));
    println!("  (levels={} to prevent DCE)", levels);
}

/// `1234567` -> `"1,234,567"`.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let lead = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.char_indices() {
        if i > 0 && (i + 3 - lead) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}
