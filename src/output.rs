use crate::error::ExportError;
use crate::metrics;
use crate::schema::DatasetKind;
use crate::session::Session;
use crate::types::Table as RawTable;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::info;

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> ExportError + '_ {
    move |source| ExportError::Csv { path: path.to_path_buf(), source }
}

/// Write serde rows. With no rows the header still comes from the
/// `Tabled` column names, which match the serde renames.
pub fn write_csv<T: Serialize + Tabled>(path: &Path, rows: &[T]) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err(path))?;
    if rows.is_empty() {
        let headers: Vec<String> = T::headers().into_iter().map(|h| h.into_owned()).collect();
        wtr.write_record(&headers).map_err(csv_err(path))?;
    }
    for r in rows {
        wtr.serialize(r).map_err(csv_err(path))?;
    }
    wtr.flush().map_err(|source| ExportError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

/// Write an all-text table; the header row is written even with no rows.
pub fn write_table_csv(path: &Path, table: &RawTable) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err(path))?;
    wtr.write_record(&table.headers).map_err(csv_err(path))?;
    for row in &table.rows {
        wtr.write_record(row).map_err(csv_err(path))?;
    }
    wtr.flush().map_err(|source| ExportError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ExportError> {
    let s = serde_json::to_string_pretty(value)
        .map_err(|source| ExportError::Json { path: path.to_path_buf(), source })?;
    std::fs::write(path, s).map_err(|source| ExportError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

/// Write every loaded dataset as `<stem>_processed.csv`, plus the late
/// company summary and late task detail when delivery flags exist.
pub fn export_all(session: &Session, out_dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|source| ExportError::Io { path: out_dir.to_path_buf(), source })?;
    let mut written = Vec::new();

    for kind in DatasetKind::ALL {
        let Some(table) = session.export_table(kind) else { continue };
        let path = out_dir.join(format!("{}_processed.csv", kind.export_stem()));
        write_table_csv(&path, &table)?;
        written.push(path);
    }

    if let Some(d) = session.deliveries() {
        if let Some(flags) = &d.flags {
            let path = out_dir.join("late_companies.csv");
            write_csv(&path, &metrics::late_companies(&d.data, flags))?;
            written.push(path);

            let path = out_dir.join("late_tasks.csv");
            write_csv(&path, &metrics::late_tasks(&d.data, flags))?;
            written.push(path);
        }
    }

    info!(files = written.len(), dir = %out_dir.display(), "exports written");
    Ok(written)
}

pub fn render_table<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(slice).with(Style::markdown()).to_string()
}

pub fn preview_table<T>(title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("\n{}", title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    println!("{}\n", render_table(rows, max_rows));
    if rows.len() > max_rows {
        println!("({} of {} rows shown)\n", max_rows, rows.len());
    }
}
