//! Output formatting module for rustible-machine
//!
//! Provides colored human output and a JSON mode for scripting.

use colored::Colorize;
use indexmap::IndexMap;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Per-machine outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineStatus {
    /// Already in the requested state
    Ok,
    /// Actions were applied
    Changed,
    /// Actions would be applied (check mode)
    Planned,
    /// Reconciliation failed
    Failed,
}

impl MachineStatus {
    /// Get the colored string representation
    pub fn colored_string(&self) -> String {
        match self {
            MachineStatus::Ok => "ok".green().to_string(),
            MachineStatus::Changed => "changed".yellow().to_string(),
            MachineStatus::Planned => "would change".cyan().to_string(),
            MachineStatus::Failed => "failed".red().bold().to_string(),
        }
    }

    /// Get the plain string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Ok => "ok",
            MachineStatus::Changed => "changed",
            MachineStatus::Planned => "would change",
            MachineStatus::Failed => "failed",
        }
    }
}

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// JSON output mode
    json_mode: bool,
    /// Verbosity level
    verbosity: u8,
    /// Start time for duration calculations
    start_time: Instant,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, json_mode: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();

        Self {
            use_color,
            json_mode,
            verbosity,
            start_time: Instant::now(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.json_mode
    }

    /// Print a banner/header
    pub fn banner(&self, title: &str) {
        if self.json_mode {
            return;
        }

        let line = "=".repeat(title.len() + 4);
        if self.use_color {
            println!("\n{}", line.bright_blue());
            println!("{}", format!("  {}  ", title).bright_blue().bold());
            println!("{}\n", line.bright_blue());
        } else {
            println!("\n{}", line);
            println!("  {}  ", title);
            println!("{}\n", line);
        }
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        if self.json_mode {
            return;
        }

        if self.use_color {
            println!("\n{}", title.cyan().bold());
            println!("{}", "-".repeat(title.len()).cyan());
        } else {
            println!("\n{}", title);
            println!("{}", "-".repeat(title.len()));
        }
    }

    /// Print the outcome for one machine
    pub fn machine_result(&self, machine: &str, status: MachineStatus, message: Option<&str>) {
        if self.json_mode {
            return;
        }

        let status_str = if self.use_color {
            status.colored_string()
        } else {
            status.as_str().to_string()
        };

        let machine_str = if self.use_color {
            machine.bright_white().bold().to_string()
        } else {
            machine.to_string()
        };

        print!("{}: [{}]", status_str, machine_str);
        if let Some(msg) = message {
            print!(" => {}", msg);
        }
        println!();
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.json_mode {
            let err = serde_json::json!({
                "type": "error",
                "message": message
            });
            eprintln!("{}", err);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.json_mode {
            let warn = serde_json::json!({
                "type": "warning",
                "message": message
            });
            eprintln!("{}", warn);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 || self.json_mode {
            return;
        }

        if self.use_color {
            println!("{} {}", "INFO:".blue(), message);
        } else {
            println!("INFO: {}", message);
        }
    }

    /// Print a debug message (requires higher verbosity)
    pub fn debug(&self, message: &str) {
        if self.verbosity < 2 || self.json_mode {
            return;
        }

        if self.use_color {
            println!("{} {}", "DEBUG:".magenta(), message);
        } else {
            println!("DEBUG: {}", message);
        }
    }

    /// Print a rendered configuration diff, `-`/`+` prefixed lines
    pub fn diff(&self, rendered: &str) {
        if self.json_mode {
            return;
        }

        for line in rendered.lines() {
            if !self.use_color {
                println!("    {}", line);
            } else if line.starts_with('-') {
                println!("    {}", line.red());
            } else if line.starts_with('+') {
                println!("    {}", line.green());
            } else {
                println!("    {}", line.bright_black());
            }
        }
    }

    /// Print a JSON document on stdout
    pub fn json(&self, value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{}", s),
            Err(e) => self.error(&format!("Failed to serialize output: {}", e)),
        }
    }

    /// Print a table
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        if self.json_mode {
            return;
        }

        // Calculate column widths
        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }

        let header_line = headers
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ");

        if self.use_color {
            println!("{}", header_line.bright_white().bold());
        } else {
            println!("{}", header_line);
        }

        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        if self.use_color {
            println!("{}", sep.join("-+-").bright_black());
        } else {
            println!("{}", sep.join("-+-"));
        }

        for row in rows {
            let row_line = row
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:width$}", cell, width = width))
                .collect::<Vec<_>>()
                .join(" | ");
            println!("{}", row_line.trim_end());
        }
    }

    /// Print a recap summary
    pub fn recap(&self, stats: &RecapStats) {
        if self.json_mode {
            return;
        }

        let header = "MACHINE RECAP";
        let stars = "*".repeat(80 - header.len());

        if self.use_color {
            println!("\n{} {}", header.bright_white().bold(), stars.bright_black());
        } else {
            println!("\n{} {}", header, stars);
        }

        for (machine, status) in &stats.machines {
            let (ok, changed, failed) = match status {
                MachineStatus::Ok => (1, 0, 0),
                MachineStatus::Changed | MachineStatus::Planned => (0, 1, 0),
                MachineStatus::Failed => (0, 0, 1),
            };

            if self.use_color {
                let machine_colored = match status {
                    MachineStatus::Failed => machine.red().bold(),
                    MachineStatus::Changed | MachineStatus::Planned => machine.yellow(),
                    MachineStatus::Ok => machine.green(),
                };
                println!(
                    "{:<30} : ok={:<4} changed={:<4} failed={:<4}",
                    machine_colored, ok, changed, failed
                );
            } else {
                println!(
                    "{:<30} : ok={:<4} changed={:<4} failed={:<4}",
                    machine, ok, changed, failed
                );
            }
        }

        let duration_str = format_duration(self.start_time.elapsed());
        if self.use_color {
            println!("\n{} {}", "Run took".bright_black(), duration_str.bright_white());
        } else {
            println!("\nRun took {}", duration_str);
        }
    }

    /// Flush stdout
    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

/// Outcome per machine, in manifest order
#[derive(Debug, Clone, Default)]
pub struct RecapStats {
    pub machines: IndexMap<String, MachineStatus>,
}

impl RecapStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, machine: &str, status: MachineStatus) {
        self.machines.insert(machine.to_string(), status);
    }

    pub fn changed(&self) -> usize {
        self.machines
            .values()
            .filter(|s| matches!(s, MachineStatus::Changed | MachineStatus::Planned))
            .count()
    }
}

/// Format a duration as a human-readable string
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}.{:03}s", secs, millis)
    } else {
        format!("{}ms", millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_status_display() {
        assert_eq!(MachineStatus::Ok.as_str(), "ok");
        assert_eq!(MachineStatus::Planned.as_str(), "would change");
        assert!(MachineStatus::Changed.colored_string().contains("changed"));
    }

    #[test]
    fn test_recap_stats() {
        let mut recap = RecapStats::new();
        recap.record("m1", MachineStatus::Ok);
        recap.record("m2", MachineStatus::Changed);
        assert_eq!(recap.changed(), 1);

        recap.record("m3", MachineStatus::Failed);
        recap.record("m2", MachineStatus::Planned);
        assert_eq!(recap.changed(), 1);
        assert_eq!(recap.machines.len(), 3);
        assert_eq!(recap.machines["m3"], MachineStatus::Failed);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.000s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
    }
}
