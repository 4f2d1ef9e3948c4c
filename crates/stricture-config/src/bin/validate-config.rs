//! Config validation CLI tool
//!
//! Validates a stricture configuration file and reports any errors.

use stricture_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a stricture configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    // Check file exists
    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    // Try to load and validate
    match stricture_config::load_config(&config_path) {
        Ok(config) => {
            let schedule = &config.schedule;
            let days = schedule.day_rules();

            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", stricture_config::CURRENT_CONFIG_VERSION);
            println!("  Endpoint: {}", config.service.endpoint);
            println!(
                "  Poll interval: {}",
                stricture_util::format_duration(config.service.poll_interval)
            );
            println!();
            println!("Schedule:");
            println!("  Timezone: {}", schedule.timezone());
            println!("  Assume: {}", schedule.default_assumption());
            match schedule.daily_window() {
                Some(window) => println!("  Daily window: {}", window),
                None => println!("  Daily window: none"),
            }
            for (label, set) in [
                ("Restricted days", days.restricted_days),
                ("Unrestricted days", days.unrestricted_days),
                ("Prohibited days", days.prohibited_days),
            ] {
                if !set.is_empty() {
                    let names: Vec<String> = set.iter().map(|d| d.to_string()).collect();
                    println!("  {}: {}", label, names.join(", "));
                }
            }

            if !schedule.date_overrides().is_empty() {
                println!();
                println!("Date overrides:");
                for date_override in schedule.date_overrides() {
                    let scope = match date_override.sub_window {
                        Some(window) => format!("outside {}", window),
                        None => "all day".to_string(),
                    };
                    println!(
                        "  - {} to {}: {} ({})",
                        date_override.start_date, date_override.stop_date, date_override.mode, scope
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                stricture_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                stricture_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                stricture_config::ConfigError::JsonError(json_err) => {
                    eprintln!("JSON parse error:");
                    eprintln!("  {}", json_err);
                }
                stricture_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                stricture_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        stricture_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
