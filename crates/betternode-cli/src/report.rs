//! Human-readable rendering of a [`RunReport`].

use std::fmt::Write;

use betternode_evictor::RunReport;

pub fn format_report(report: &RunReport, dry_run: bool) -> String {
    let mut out = String::new();

    if report.is_noop() {
        let _ = writeln!(out, "no pods to evict ({} evaluated)", report.evaluated);
    }

    for decision in &report.decisions {
        let status = if decision.evicted {
            "evicted"
        } else if dry_run {
            "dry-run"
        } else {
            "not evicted"
        };
        let _ = writeln!(
            out,
            "{}: {} (score {}) -> {} (score {}) [{}]",
            decision.pod,
            decision.current_node,
            decision.current_score,
            decision.target_node,
            decision.target_score,
            status
        );
    }

    for skipped in &report.skipped {
        let _ = writeln!(out, "skipped {}: {}", skipped.pod, skipped.reason);
    }

    out
}
