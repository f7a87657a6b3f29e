//! Output formatting utilities.
//!
//! Status lines go to stderr so stdout stays machine-readable.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Pretty JSON rendering
pub fn format_json<T: Serialize>(data: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue().bold(), message);
}

/// Print table
pub fn print_table<T: Tabled>(items: Vec<T>) {
    if items.is_empty() {
        print_info("No items found");
        return;
    }

    let table = Table::new(items);
    println!("{}", table);
}
