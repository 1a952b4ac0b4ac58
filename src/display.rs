//! Terminal output helpers.

use colored::*;
use psalter_core::{BuilderState, Setlist};

pub fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

pub fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

pub fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

pub fn ok(text: &str) {
    println!("  {} {}", "✓".bright_green().bold(), text);
}

pub fn failed(text: &str) {
    println!("  {} {}", "✗".bright_red().bold(), text.bright_red());
}

/// Print a store's status fields.
pub fn status(loading: bool, error: Option<String>, success: Option<String>) {
    let loading = if loading { "yes".yellow() } else { "no".dimmed() };
    println!("    loading: {}", loading);
    match error {
        Some(e) => println!("    error:   {}", e.bright_red()),
        None => println!("    error:   {}", "none".dimmed()),
    }
    if let Some(s) = success {
        println!("    success: {}", s.bright_green());
    }
}

pub fn setlists(items: &[Setlist]) {
    if items.is_empty() {
        println!("    {}", "(no setlists)".dimmed());
    }
    for s in items {
        println!(
            "    {:<24} {:<10} {}",
            s.title,
            s.status.as_str().bright_magenta(),
            s.service_date.as_deref().unwrap_or("-").dimmed()
        );
    }
}

pub fn builder(state: &BuilderState, duration: &str) {
    let border = "─".repeat(44);
    let title = state.setlist.as_ref().map_or("(closed)", |s| s.title.as_str());
    println!("  ┌{}┐", border);
    println!("  │ {:^42} │", title.bright_yellow().to_string());
    println!("  ├{}┤", border);
    if state.songs.is_empty() {
        println!("  │ {:^42} │", "(no songs)".dimmed().to_string());
    }
    for slot in &state.songs {
        let mark = if state.selected.contains(&slot.id) { "*" } else { " " };
        let line = format!(
            "{}{:>2}. {:<28} {:>5}",
            mark,
            slot.order_position,
            slot.song_title().unwrap_or(&slot.song),
            psalter_core::format_duration(slot.effective_duration())
        );
        println!("  │ {:<42} │", line);
    }
    println!("  ├{}┤", border);
    let dirty = if state.is_dirty { "unsaved order" } else { "saved" };
    println!("  │ {:<42} │", format!("total {}  ({})", duration, dirty));
    println!("  └{}┘", border);
}
