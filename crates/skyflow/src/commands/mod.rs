pub mod apply;
pub mod destroy;
pub mod import;
pub mod show;

use colored::Colorize;
use skyflow_cloud::ApplyResult;

/// Print one line per resource followed by a totals line
pub fn print_report(report: &ApplyResult) {
    for ok in &report.succeeded {
        println!("  {} {} ({})", "✓".green(), ok.address.cyan(), ok.message);
    }
    for failed in &report.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failed.address.cyan(),
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }

    println!();
    let totals = format!(
        "{} succeeded, {} failed in {}ms",
        report.succeeded.len(),
        report.failed.len(),
        report.duration_ms
    );
    if report.is_success() {
        println!("{}", totals.green().bold());
    } else {
        println!("{}", totals.red().bold());
    }
}
