//! Show upload status from the local database

use crate::config::Settings;
use crate::util;
use anyhow::{Context, Result};
use journal::{FileRecord, StatusStore};
use owo_colors::OwoColorize;
use shutter_core::FileStatus;

pub fn run(settings: &Settings, all: bool) -> Result<()> {
    if !settings.db_dir.exists() {
        println!("No status database at {}", settings.db_dir.display().to_string().cyan());
        println!("  {}", "Tip: upload something first with 'shutter --upload <PATH>'".dimmed());
        return Ok(());
    }

    let store = StatusStore::open(&settings.db_dir).with_context(|| {
        format!("Failed to open status database in {}", settings.db_dir.display())
    })?;
    let counts = store.counts_by_status()?;

    println!("{}", "Upload Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("Database:      {}", settings.db_dir.display().to_string().cyan());
    println!("Known files:   {}", counts.total());
    println!();
    println!("  Uploaded:    {}", counts.success.to_string().green());
    println!("  Pending:     {}", counts.pending.to_string().yellow());
    println!("  Failed:      {}", counts.failed.to_string().red());
    println!("  Ignored:     {}", counts.ignored.to_string().dimmed());

    let mut listed = store.list_with_status(FileStatus::Failed)?;
    if all {
        listed.extend(store.list_with_status(FileStatus::Pending)?);
        listed.extend(store.list_with_status(FileStatus::Ignored)?);
    }
    if listed.is_empty() {
        return Ok(());
    }

    println!();
    let heading = if all { "Not uploaded:" } else { "Failed:" };
    println!("{}", heading.bold());
    listed.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
    for record in &listed {
        print_record(record);
    }

    if counts.failed > 0 {
        println!();
        println!("  {}", "Tip: retry failed uploads with 'shutter --reupload'".dimmed());
    }
    Ok(())
}

fn print_record(record: &FileRecord) {
    let label = format!("{:<8}", record.status.as_str());
    let status = match record.status {
        FileStatus::Failed => label.red().to_string(),
        FileStatus::Pending => label.yellow().to_string(),
        _ => label.dimmed().to_string(),
    };
    println!(
        "  {} {}  {}",
        status,
        util::display_path(&record.path).display(),
        util::format_relative_time(record.updated_at_ms).dimmed()
    );
}
