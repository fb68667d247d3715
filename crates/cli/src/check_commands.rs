use std::path::Path;

use {
    anyhow::Result,
    taskrelay_config::{Severity, ValidationResult, discover_and_load, ensure_startup, validate},
};

use crate::relay;

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Validate the configuration and print diagnostics. Exits 1 on errors.
pub async fn check(config_path: Option<&Path>, verbose: bool, probe: bool) -> Result<()> {
    let (config, path) = match discover_and_load(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("  {BOLD}{RED}error{RESET} {e}");
            std::process::exit(1);
        },
    };

    if let Some(ref path) = path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults and environment.\n");
    }

    let result = validate(&config);
    print_diagnostics(&result, verbose);

    let errors = result.count(Severity::Error);
    if errors > 0 {
        std::process::exit(1);
    }

    if probe {
        let resolved = ensure_startup(&config)?;
        let publisher = relay::build_publisher(&resolved, false);
        match publisher.connect().await {
            Ok(()) => eprintln!(
                "{BOLD}{GREEN}ok{RESET} bus {} accepted the credential",
                publisher.endpoint()
            ),
            Err(e) => {
                eprintln!("  {BOLD}{RED}error{RESET} bus {}: {e}", publisher.endpoint());
                std::process::exit(1);
            },
        }
    }

    Ok(())
}

fn print_diagnostics(result: &ValidationResult, verbose: bool) {
    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }
}
