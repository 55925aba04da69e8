use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::ingress_details::IngressDetails;
use crate::state::{InstallPlan, InstallState, InstallStep};
use crate::ui;

/// Show the progress of the last install
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Directory holding install-state.json
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,
}

impl StatusCommand {
    pub async fn run(&self) -> Result<()> {
        let Some(state) = InstallState::load(&self.output_dir)? else {
            ui::print_info(&format!(
                "No installation state in {}",
                self.output_dir.display()
            ));
            return Ok(());
        };

        let plan = InstallPlan::for_config(&state.config);
        ui::print_section("Installation Status");
        ui::print_kv("Provider", state.config.provider.display_name());
        ui::print_kv("Type", &state.config.install_type.to_string());
        if let Some(domain) = &state.config.domain {
            ui::print_kv("Domain", domain);
        }
        if let Some(context) = &state.kube_context {
            ui::print_kv("Context", context);
        }
        ui::print_kv("Updated", &state.updated_at);
        println!();

        for (idx, step) in plan.steps().iter().enumerate() {
            if *step == InstallStep::Complete {
                continue;
            }
            let marker = if *step < state.step {
                "✓".green()
            } else if *step == state.step {
                "→".yellow()
            } else {
                "·".dimmed()
            };
            println!("  {marker} {:>2}. {}", idx + 1, step.description());
        }
        println!();

        if state.is_complete() {
            ui::print_success("Installation complete");
        } else if let Some(error) = &state.last_error {
            ui::print_error(&format!(
                "Stopped at '{}' after {} attempt(s): {error}",
                state.step, state.attempt_count
            ));
            ui::print_info("Re-run `og-install install` to resume");
        }

        let details_path = state.config.ingress_details_path();
        if details_path.exists() {
            let details = IngressDetails::load(&details_path)?;
            ui::print_section("Ingress");
            ui::print_kv("Load balancer", &details.lb_dns);
            if let Some(arn) = &details.certificate_arn {
                ui::print_kv("Certificate", arn);
            }
        }
        if let Some(pid) = state.port_forward_pid {
            ui::print_kv("Port-forward PID", &pid.to_string());
        }

        Ok(())
    }
}
