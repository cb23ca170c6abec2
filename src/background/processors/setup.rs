//! Setup/initialization module - handles application startup tasks
//!
//! Includes:
//! - Logger initialization
//! - Folder structure initialization

use anstyle::{AnsiColor, Style};
use anyhow::Result;
use env_logger::{Builder, WriteStyle};
use log::kv::Key;
use std::io::Write;

use super::folder::Paths;
use crate::config::AppConfig;

const DIM: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::BrightBlack)));
const DURATION: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Cyan)));

// ────────────────────────────────────────────────────────────────
// Folder Initialization
// ────────────────────────────────────────────────────────────────

/// Create the public, static and uploads folders and return their paths.
pub fn initialize_folder(config: &AppConfig) -> Result<Paths> {
    Paths::initialize(config)
}

// ────────────────────────────────────────────────────────────────
// Logger Initialization
// ────────────────────────────────────────────────────────────────

/// Extract the `duration` key-value and format it to 2 decimal places.
fn format_duration(record: &log::Record<'_>) -> String {
    record
        .key_values()
        .get(Key::from("duration"))
        .map(|v| {
            let s = format!("{}", v);
            if let Some(idx) = s.find(|c: char| c.is_alphabetic()) {
                let (num, unit) = (&s[..idx], &s[idx..]);
                if let Ok(val) = num.parse::<f32>() {
                    // Insert space between number and unit
                    return format!("{:.2} {}", val, unit);
                }
            }
            s
        })
        .unwrap_or_default()
}

/// Initialize the global logger. Calling it twice is harmless.
pub fn initialize_logger() {
    let _ = Builder::new()
        .write_style(WriteStyle::Auto)
        .format(|buf, record| {
            let ts = buf.timestamp();
            let level_style = buf.default_level_style(record.level());

            writeln!(
                buf,
                "{}{}{} {}{}{} {}{}{}",
                DIM.render(),
                ts,
                DIM.render_reset(),
                level_style.render(),
                record.level(),
                level_style.render_reset(),
                DIM.render(),
                record.target(),
                DIM.render_reset(),
            )?;

            // Right-align or pad the duration field to width 10
            let dur_raw = format_duration(record);
            let dur = if dur_raw.is_empty() {
                " ".repeat(10)
            } else {
                format!(
                    "{}{:>10}{}",
                    DURATION.render(),
                    dur_raw,
                    DURATION.render_reset()
                )
            };

            let message = format!("{}", record.args());
            let subsequent_indent = " ".repeat(11);
            let mut lines = message.lines();

            if let Some(first_line) = lines.next() {
                writeln!(buf, "{} {}", dur, first_line)?;
            }
            for line in lines {
                writeln!(buf, "{}{}", subsequent_indent, line)?;
            }

            Ok(())
        })
        // Only show INFO+ globally, WARN+ for Rocket
        .filter(None, log::LevelFilter::Info)
        .filter(Some("rocket"), log::LevelFilter::Warn)
        .parse_default_env()
        .try_init();
}
