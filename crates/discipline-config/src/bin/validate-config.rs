//! Config validation CLI tool
//!
//! Validates a disciplined configuration file and reports any errors.

use discipline_config::{ActivatorPolicy, ProtectorPolicy};
use discipline_util::default_config_path;
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
            eprintln!("Validates a disciplined configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match discipline_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", discipline_config::CURRENT_CONFIG_VERSION);
            println!("  Tick interval: {}", policy.daemon.tick_interval);
            println!("  Storage: {:?}", policy.daemon.storage);
            println!("  Block policy: {:?}", policy.daemon.block_policy);
            match &policy.allowance {
                Some(allowance) => println!(
                    "  Daily allowance: {}{}",
                    allowance.daily,
                    if allowance.reset_daily { "" } else { " (no daily reset)" }
                ),
                None => println!("  Daily allowance: none"),
            }
            println!("  Rules: {} (max {})", policy.rules.len(), policy.daemon.max_rules);

            if !policy.rules.is_empty() {
                println!();
                println!("Rules:");
                for rule in &policy.rules {
                    let activator = match &rule.activator {
                        ActivatorPolicy::Always => "always".to_string(),
                        ActivatorPolicy::Time { weekdays, range } => {
                            format!("{} {}", weekdays, range)
                        }
                    };
                    let protector = match &rule.protector {
                        ProtectorPolicy::Countdown {
                            duration,
                            start_immediately,
                        } => {
                            if *start_immediately {
                                format!("countdown {} (starts immediately)", duration)
                            } else {
                                format!("countdown {}", duration)
                            }
                        }
                        ProtectorPolicy::CountdownAfterPlea { grace } => {
                            format!("plea with {} grace", grace)
                        }
                    };
                    println!(
                        "  - {} [{}; {}]: {}",
                        rule.id.as_str(),
                        activator,
                        protector,
                        rule.label
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                discipline_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                discipline_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                discipline_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                discipline_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        discipline_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
