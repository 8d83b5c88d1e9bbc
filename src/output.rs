//! Report rendering.

use serde_json::json;

use crate::client::BenchmarkReport;
use crate::stats::{bps_to_human, bytes_to_human, Protocol};

pub fn output_plain(report: &BenchmarkReport) -> String {
    let mut output = String::new();

    output.push_str("─".repeat(60).as_str());
    output.push('\n');
    output.push_str("  netburst results\n");
    output.push_str("─".repeat(60).as_str());
    output.push('\n');
    output.push('\n');

    output.push_str(&format!("  Server:      {}\n", report.server.addr));
    output.push_str(&format!(
        "  Requested:   {} per transfer\n",
        bytes_to_human(report.file_size)
    ));
    output.push('\n');

    for transfer in &report.transfers {
        match &transfer.result {
            Ok(stats) => {
                // UDP speed is nominal: distinct segments at the full
                // payload size, the same basis as the success rate.
                let bps = match transfer.protocol {
                    Protocol::Tcp => stats.throughput_bps(),
                    Protocol::Udp => stats.segment_throughput_bps(),
                };
                output.push_str(&format!(
                    "  [{}] {} {} in {:.2}s @ {}",
                    transfer.transfer_id,
                    transfer.protocol,
                    bytes_to_human(stats.bytes_received),
                    stats.elapsed.as_secs_f64(),
                    bps_to_human(bps),
                ));
                if transfer.protocol == Protocol::Udp {
                    match stats.segments_expected {
                        Some(total) => output.push_str(&format!(
                            "  ({}/{} segments, {:.1}% delivered)",
                            stats.segments_received,
                            total,
                            stats.success_rate()
                        )),
                        None => output.push_str("  (no segments arrived, 0.0% delivered)"),
                    }
                }
                output.push('\n');
            }
            Err(e) => {
                output.push_str(&format!(
                    "  [{}] {} FAILED: {}\n",
                    transfer.transfer_id, transfer.protocol, e
                ));
            }
        }
    }
    output.push('\n');

    output.push_str(&format!(
        "  Total:       {} in {:.2}s wall time\n",
        bytes_to_human(report.total_bytes),
        report.wall_time.as_secs_f64()
    ));
    output.push_str(&format!(
        "  Aggregate:   {}\n",
        bps_to_human(report.aggregate_bps())
    ));
    if report.failures() > 0 {
        output.push_str(&format!(
            "  Failures:    {}/{}\n",
            report.failures(),
            report.transfers.len()
        ));
    }
    output.push_str("─".repeat(60).as_str());
    output.push('\n');

    output
}

pub fn output_json(report: &BenchmarkReport) -> String {
    let transfers: Vec<_> = report
        .transfers
        .iter()
        .map(|transfer| match &transfer.result {
            Ok(stats) => json!({
                "id": transfer.transfer_id,
                "protocol": transfer.protocol,
                "bytes": stats.bytes_received,
                "elapsed_ms": stats.elapsed.as_millis() as u64,
                "bits_per_second": match transfer.protocol {
                    Protocol::Tcp => stats.throughput_bps(),
                    Protocol::Udp => stats.segment_throughput_bps(),
                },
                "segments_received": (transfer.protocol == Protocol::Udp)
                    .then_some(stats.segments_received),
                "segments_expected": (transfer.protocol == Protocol::Udp)
                    .then_some(stats.segments_expected)
                    .flatten(),
                "success_rate": (transfer.protocol == Protocol::Udp)
                    .then(|| stats.success_rate()),
            }),
            Err(e) => json!({
                "id": transfer.transfer_id,
                "protocol": transfer.protocol,
                "error": e,
            }),
        })
        .collect();

    let value = json!({
        "server": report.server.addr.to_string(),
        "file_size": report.file_size,
        "transfers": transfers,
        "total_bytes": report.total_bytes,
        "busy_time_ms": report.busy_time.as_millis() as u64,
        "wall_time_ms": report.wall_time.as_millis() as u64,
        "aggregate_bits_per_second": report.aggregate_bps(),
    });

    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TransferOutcome;
    use crate::discover::ServerOffer;
    use crate::stats::TransferStats;
    use std::time::Duration;

    fn sample_report() -> BenchmarkReport {
        BenchmarkReport {
            server: ServerOffer {
                addr: "192.168.1.10".parse().unwrap(),
                udp_port: 13117,
                tcp_port: 12345,
            },
            file_size: 5000,
            transfers: vec![
                TransferOutcome {
                    transfer_id: 0,
                    protocol: Protocol::Tcp,
                    result: Ok(TransferStats {
                        transfer_id: 0,
                        protocol: Protocol::Tcp,
                        bytes_received: 5000,
                        elapsed: Duration::from_millis(100),
                        segments_received: 0,
                        segments_expected: Some(0),
                    }),
                },
                TransferOutcome {
                    transfer_id: 1,
                    protocol: Protocol::Udp,
                    result: Err("connection refused".to_string()),
                },
            ],
            total_bytes: 5000,
            busy_time: Duration::from_millis(100),
            wall_time: Duration::from_millis(120),
        }
    }

    #[test]
    fn test_plain_lists_failures() {
        let text = output_plain(&sample_report());
        assert!(text.contains("TCP"));
        assert!(text.contains("FAILED: connection refused"));
        assert!(text.contains("Failures:    1/2"));
    }

    #[test]
    fn test_json_is_valid() {
        let text = output_json(&sample_report());
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["total_bytes"], 5000);
        assert_eq!(value["transfers"][1]["error"], "connection refused");
    }
}
