//! UI helpers for the installer CLI.
//!
//! Provides consistent formatting for console output during installation.

use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use og_cloud::acm::ResourceRecord;
use og_cloud::kubectl::LoadBalancerTarget;

/// Print the OpenGovernance banner.
pub fn print_banner() {
    println!();
    println!(
        "{}",
        r"
   ___                    ____
  / _ \ _ __   ___ _ __  / ___| _____   _____ _ __ _ __   __ _ _ __   ___ ___
 | | | | '_ \ / _ \ '_ \| |  _ / _ \ \ / / _ \ '__| '_ \ / _` | '_ \ / __/ _ \
 | |_| | |_) |  __/ | | | |_| | (_) \ V /  __/ |  | | | | (_| | | | | (_|  __/
  \___/| .__/ \___|_| |_|\____|\___/ \_/ \___|_|  |_| |_|\__,_|_| |_|\___\___|
       |_|
"
        .cyan()
    );
    println!("  {}", "Kubernetes Installer".bright_black());
    println!();
}

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_black());
    println!("{}", title.cyan().bold());
    println!("{}", "═".repeat(70).bright_black());
    println!();
}

/// Print a step indicator with message.
pub fn print_step(message: &str) {
    println!("{} {}", "▶".cyan(), message.bold());
}

/// Print a progress step with step number.
pub fn print_progress_step(current: usize, total: usize, message: &str) {
    println!(
        "{} {} {}",
        format!("[{current}/{total}]").bright_black(),
        "▶".cyan(),
        message.bold()
    );
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print prerequisite check result.
pub fn print_check_result(name: &str, passed: bool, message: Option<&str>) {
    let status = if passed { "✓".green() } else { "✗".red() };

    let text = if let Some(msg) = message {
        format!("{name} - {msg}")
    } else {
        name.to_string()
    };

    println!("  {status} {text}");
}

/// Print pod readiness as a bar on a single, rewritten line.
pub fn print_pod_progress(ready: usize, total: usize) {
    use std::io::Write;

    let pct = if total > 0 { (ready * 100) / total } else { 0 };

    let bar_width = 30;
    let filled = (pct * bar_width) / 100;
    let bar = format!(
        "{}{}",
        "█".repeat(filled).green(),
        "░".repeat(bar_width - filled).bright_black()
    );

    print!("\r  {} Pods: [{bar}] {ready}/{total} ready", "⟳".cyan());
    let _ = std::io::stdout().flush();

    if ready == total && total > 0 {
        println!();
    }
}

/// Print a key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("  {} {}", format!("{key}:").bright_black(), value.green());
}

/// Print a list item.
pub fn print_list_item(item: &str) {
    println!("  {} {item}", "•".bright_black());
}

/// Print a numbered step.
pub fn print_numbered_step(num: usize, message: &str) {
    println!("  {}. {}", num.to_string().cyan(), message);
}

/// Spinner for waits with no measurable progress.
///
/// Hidden when stdout is not a terminal.
#[must_use]
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("  {spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Print the ACM validation record the domain owner must create.
pub fn print_certificate_record(domain: &str, record: &ResourceRecord) {
    print_section("Certificate Validation");
    print_info(&format!(
        "ACM needs a DNS record to prove ownership of {}",
        domain.bold()
    ));
    println!();
    print_kv("Type", &record.record_type);
    print_kv("Name", &record.name);
    print_kv("Value", &record.value);
    println!();
}

/// Print the record that points the domain at the load balancer.
pub fn print_dns_instructions(domain: &str, target: &LoadBalancerTarget) {
    print_section("DNS Configuration");
    print_info(&format!(
        "Create this record with your DNS provider so {} reaches the cluster:",
        domain.bold()
    ));
    println!();
    print_kv("Type", target.record_type());
    print_kv("Name", domain);
    print_kv("Value", target.as_str());
    println!();
}

/// Closing instructions for a finished install.
pub fn print_next_steps(steps: &[String]) {
    if steps.is_empty() {
        return;
    }
    println!();
    println!("{}", "Next steps:".bold());
    for (i, step) in steps.iter().enumerate() {
        print_numbered_step(i + 1, step);
    }
    println!();
}
