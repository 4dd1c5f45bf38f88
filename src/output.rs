use std::io::Write;

use depth_ladder::{AggregatedLevel, Result, Side, Snapshot, TickSize};

/// Write one snapshot to `writer`.
///
/// TSV mode prints one row per level, bids first (best first), then asks:
///   side \t price \t qty \t ratio
/// followed by a summary row:
///   summary \t tick \t spread \t mid
/// where missing values are written as `-`. JSON mode writes one object per
/// snapshot on a single line.
pub fn write_snapshot<W: Write>(
    snapshot: &Snapshot,
    tick: TickSize,
    json_mode: bool,
    buf: &mut String,
    writer: &mut W,
) -> Result<()> {
    buf.clear();

    if json_mode {
        // Manual JSON construction to avoid serde_json::to_string allocation overhead.
        buf.push_str("{\"tick\":\"");
        buf.push_str(&tick.to_string());
        buf.push_str("\",\"spread\":");
        format_opt_f64(buf, snapshot.spread(), "null");
        buf.push_str(",\"mid\":");
        format_opt_f64(buf, snapshot.mid(), "null");
        buf.push_str(",\"bids\":");
        push_json_levels(buf, &snapshot.bids);
        buf.push_str(",\"asks\":");
        push_json_levels(buf, &snapshot.asks);
        buf.push_str("}\n");
    } else {
        for (side, levels) in [(Side::Bid, &snapshot.bids), (Side::Ask, &snapshot.asks)] {
            for level in levels {
                buf.push_str(side.as_str());
                buf.push('\t');
                format_f64(buf, level.price);
                buf.push('\t');
                format_f64(buf, level.quantity);
                buf.push('\t');
                format_f64(buf, snapshot.fill_ratio(level));
                buf.push('\n');
            }
        }
        buf.push_str("summary\t");
        buf.push_str(&tick.to_string());
        buf.push('\t');
        format_opt_f64(buf, snapshot.spread(), "-");
        buf.push('\t');
        format_opt_f64(buf, snapshot.mid(), "-");
        buf.push('\n');
    }

    writer.write_all(buf.as_bytes())?;
    writer.flush()?;

    Ok(())
}

fn push_json_levels(buf: &mut String, levels: &[AggregatedLevel]) {
    buf.push('[');
    for (i, level) in levels.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        buf.push('[');
        format_f64(buf, level.price);
        buf.push(',');
        format_f64(buf, level.quantity);
        buf.push(']');
    }
    buf.push(']');
}

/// Fast f64 formatting via `ryu`.
fn format_f64(buf: &mut String, val: f64) {
    let mut b = ryu::Buffer::new();
    buf.push_str(b.format(val));
}

fn format_opt_f64(buf: &mut String, val: Option<f64>, missing: &str) {
    match val {
        Some(v) => format_f64(buf, v),
        None => buf.push_str(missing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            bids: vec![AggregatedLevel::new(100.0, 2.0)],
            asks: vec![AggregatedLevel::new(101.0, 4.0)],
        }
    }

    #[test]
    fn tsv_rows_and_summary() {
        let mut buf = String::new();
        let mut out = Vec::new();
        write_snapshot(&snapshot(), TickSize::One, false, &mut buf, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "bid\t100.0\t2.0\t0.5\nask\t101.0\t4.0\t1.0\nsummary\t1\t1.0\t100.5\n"
        );
    }

    #[test]
    fn json_line_is_valid_json() {
        let mut buf = String::new();
        let mut out = Vec::new();
        write_snapshot(&snapshot(), TickSize::Tenth, true, &mut buf, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["tick"], "0.1");
        assert_eq!(value["spread"], 1.0);
        assert_eq!(value["bids"][0][0], 100.0);
        assert_eq!(value["asks"][0][1], 4.0);
    }

    #[test]
    fn missing_spread_is_marked() {
        let one_sided = Snapshot {
            bids: vec![AggregatedLevel::new(100.0, 2.0)],
            asks: vec![],
        };
        let mut buf = String::new();
        let mut out = Vec::new();
        write_snapshot(&one_sided, TickSize::One, true, &mut buf, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(value["spread"].is_null());
        assert!(value["mid"].is_null());
    }
}
