use std::path::Path;

use fa_domain::config::{Config, ConfigSeverity};

/// Validate the config and print any issues.
///
/// Returns `false` when at least one error-severity issue was found.
pub fn validate(config: &Config, config_path: Option<&Path>) -> bool {
    let source = config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".into());
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({source})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }
    println!("\n{error_count} error(s), {warning_count} warning(s) in {source}");

    error_count == 0
}
