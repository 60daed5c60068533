use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::structs::{ResultSection, ResultTable};
use crate::result_text::{DEFAULT_DASH_COUNT, print_dashes};

/// Text block for one target in the combined results file.
pub fn combined_file_text(database: &str, server: &str, sections: &[ResultSection]) -> String {
    let mut out = format!(
        "{} ({})\n{}\n",
        database,
        server,
        print_dashes(DEFAULT_DASH_COUNT)
    );
    out.push_str(&sections_file_text(sections));
    out.push('\n');
    out
}

fn sections_file_text(sections: &[ResultSection]) -> String {
    let mut out = String::new();
    for section in sections {
        out.push_str(&section.header);
        out.push('\n');
        out.push_str(&section.rows_text());
        out.push_str("\n\n");
    }
    out
}

/// Append one target's output to the batch's combined file.
pub fn append_to_combined_file(
    path: &Path,
    database: &str,
    server: &str,
    sections: &[ResultSection],
) -> Result<(), String> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Cannot open {}: {}", path.display(), e))?;
    file.write_all(combined_file_text(database, server, sections).as_bytes())
        .map_err(|e| format!("Cannot write {}: {}", path.display(), e))
}

/// Write one target's output as `{database}.txt` in the chosen folder,
/// replacing any previous run's file.
pub fn write_database_file(
    folder: &Path,
    database: &str,
    sections: &[ResultSection],
) -> Result<PathBuf, String> {
    let path = folder.join(format!("{}.txt", database));
    std::fs::write(&path, sections_file_text(sections))
        .map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;
    Ok(path)
}

/// CSV export of one result table.
pub fn export_table_to_csv(path: &Path, table: &ResultTable) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| e.to_string())?;
    writer
        .write_record(table.headers())
        .map_err(|e| e.to_string())?;
    for row in &table.rows {
        writer.write_record(row).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())
}

/// Save destination chosen at most once per batch. A cancelled prompt is
/// remembered so later targets in the same batch do not re-open the dialog;
/// the previous batch's choice seeds the next dialog's starting directory.
#[derive(Debug, Default)]
pub struct SaveLocation {
    current: Option<PathBuf>,
    previous: Option<PathBuf>,
    cancelled: bool,
}

impl SaveLocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start of a new batch: forget this batch's choice and any cancel, keep
    /// the previous location as the dialog seed.
    pub fn reset(&mut self) {
        if let Some(current) = self.current.take() {
            self.previous = Some(current);
        }
        self.cancelled = false;
    }

    /// Whether no location has been chosen for the current batch yet.
    pub fn is_unset(&self) -> bool {
        self.current.is_none() && !self.cancelled
    }

    /// The batch's save location, prompting on first use. `prompt` receives
    /// the previous location and returns `None` on user cancel.
    pub fn ensure<F>(&mut self, prompt: F) -> Option<PathBuf>
    where
        F: FnOnce(Option<&Path>) -> Option<PathBuf>,
    {
        if self.cancelled {
            return None;
        }
        if let Some(path) = &self.current {
            return Some(path.clone());
        }
        match prompt(self.previous.as_deref()) {
            Some(path) => {
                self.current = Some(path.clone());
                self.previous = Some(path.clone());
                Some(path)
            }
            None => {
                self.cancelled = true;
                None
            }
        }
    }
}

#[cfg(feature = "egui_ui")]
pub mod dialogs {
    use std::path::{Path, PathBuf};

    fn seed_directory(previous: Option<&Path>) -> Option<PathBuf> {
        previous.and_then(|p| {
            if p.is_dir() {
                Some(p.to_path_buf())
            } else {
                p.parent().map(|d| d.to_path_buf())
            }
        })
    }

    /// Combined-results file picker. An existing file is removed so the
    /// batch starts appending from scratch.
    pub fn prompt_combined_file(previous: Option<&Path>) -> Option<PathBuf> {
        let mut dialog = rfd::FileDialog::new().add_filter("Text Files", &["txt"]);
        if let Some(dir) = seed_directory(previous) {
            dialog = dialog.set_directory(dir);
        }
        let path = dialog.save_file()?;
        let _ = std::fs::remove_file(&path);
        Some(path)
    }

    pub fn prompt_results_folder(previous: Option<&Path>) -> Option<PathBuf> {
        let mut dialog = rfd::FileDialog::new();
        if let Some(dir) = seed_directory(previous) {
            dialog = dialog.set_directory(dir);
        }
        dialog.pick_folder()
    }

    pub fn prompt_open_sql_file() -> Option<PathBuf> {
        rfd::FileDialog::new()
            .add_filter("SQL files", &["sql"])
            .pick_file()
    }

    pub fn prompt_save_sql_file() -> Option<PathBuf> {
        rfd::FileDialog::new()
            .add_filter("SQL files", &["sql"])
            .save_file()
    }

    pub fn prompt_open_selection_file() -> Option<PathBuf> {
        rfd::FileDialog::new()
            .add_filter("Text Files", &["txt"])
            .pick_file()
    }

    pub fn prompt_save_selection_file() -> Option<PathBuf> {
        rfd::FileDialog::new()
            .add_filter("Text Files", &["txt"])
            .set_file_name("selection.txt")
            .save_file()
    }

    pub fn prompt_save_csv_file(table_name: &str) -> Option<PathBuf> {
        rfd::FileDialog::new()
            .add_filter("CSV files", &["csv"])
            .set_file_name(format!("{}.csv", table_name.replace(' ', "_")))
            .save_file()
    }
}
