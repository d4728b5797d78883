//! Check report rendering.

use hcacheck_core::{CheckLevel, CheckReport, CheckResult, CheckStatus, GatewayResolution, NoGatewayReason};

use super::tables::{print_separator, truncate_string};

const NAME_WIDTH: usize = 24;
const STATUS_WIDTH: usize = 9;
const DEVICE_WIDTH: usize = 20;
const VALUE_WIDTH: usize = 28;

const fn status_label(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Normal => "normal",
        CheckStatus::Abnormal => "ABNORMAL",
        CheckStatus::Skipped => "skipped",
    }
}

const fn level_label(level: CheckLevel) -> &'static str {
    match level {
        CheckLevel::Info => "info",
        CheckLevel::Warning => "warning",
        CheckLevel::Critical => "critical",
    }
}

/// One table row: name, status, device, current, expected.
pub fn format_result_row(result: &CheckResult) -> String {
    format!(
        "{:<NAME_WIDTH$} {:<STATUS_WIDTH$} {:<DEVICE_WIDTH$} {:<VALUE_WIDTH$} {}",
        result.name,
        status_label(result.status),
        truncate_string(&result.device, DEVICE_WIDTH),
        truncate_string(&result.current, VALUE_WIDTH),
        result.expected,
    )
}

pub fn print_report(report: &CheckReport) {
    let mut results: Vec<&CheckResult> = report.results.iter().collect();
    results.sort_by(|a, b| a.name.cmp(&b.name));

    println!(
        "{:<NAME_WIDTH$} {:<STATUS_WIDTH$} {:<DEVICE_WIDTH$} {:<VALUE_WIDTH$} EXPECTED",
        "CHECK", "STATUS", "DEVICE", "CURRENT"
    );
    print_separator(NAME_WIDTH + STATUS_WIDTH + DEVICE_WIDTH + VALUE_WIDTH + 12);
    for result in &results {
        println!("{}", format_result_row(result));
    }
    for result in results.iter().filter(|r| r.is_abnormal() && !r.detail.is_empty()) {
        println!("  {} [{}]: {}", result.name, level_label(result.level), result.detail);
    }
    println!();
    println!(
        "{} at {} (level {})",
        status_label(report.status()),
        report.checked_at.format("%Y-%m-%d %H:%M:%S UTC"),
        level_label(report.level())
    );
}

/// Human wording for a gateway resolution.
pub fn describe_gateway(resolution: &GatewayResolution) -> String {
    match resolution {
        GatewayResolution::Resolved(addr) => addr.to_string(),
        GatewayResolution::Ipv6Only => "IPv6 only (no IPv4 address)".to_string(),
        GatewayResolution::NoGateway(NoGatewayReason::InfiniBandLinkLayer) => {
            "none (InfiniBand link layer)".to_string()
        }
        GatewayResolution::NoGateway(NoGatewayReason::InterfaceDown) => {
            "none (interface down)".to_string()
        }
        GatewayResolution::NoGateway(NoGatewayReason::UnknownLinkLayer) => {
            "none (unknown link layer)".to_string()
        }
    }
}
