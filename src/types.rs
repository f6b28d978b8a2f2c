use crate::schema::DatasetKind;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tabled::Tabled;

/// Untyped table as read from a file: one header row plus string cells.
///
/// Rows are padded or truncated to the header width by the loader, so every
/// row has exactly `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Closed/open status after normalization. Anything not recognized is kept
/// verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Done,
    Pending,
    Other(String),
}

impl Status {
    pub const DONE_LABEL: &'static str = "Done";
    pub const PENDING_LABEL: &'static str = "Pending";

    pub fn is_done(&self) -> bool {
        matches!(self, Status::Done)
    }

    pub fn label(&self) -> &str {
        match self {
            Status::Done => Self::DONE_LABEL,
            Status::Pending => Self::PENDING_LABEL,
            Status::Other(s) => s,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A canonical cell. `Missing` covers empty source cells and dates that
/// failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Date(NaiveDate),
    Status(Status),
    Missing,
}

impl Cell {
    pub fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::Status(s) => s.label().to_string(),
            Cell::Missing => String::new(),
        }
    }
}

/// Table whose columns carry canonical field names for one dataset kind.
/// Only the mapped fields are present, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTable {
    pub kind: DatasetKind,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl CanonicalTable {
    pub fn has(&self, field: &str) -> bool {
        self.columns.iter().any(|c| *c == field)
    }

    pub fn column_index(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == field)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = RowView<'_>> {
        self.rows.iter().map(move |cells| RowView { table: self, cells })
    }
}

/// Borrowed view of one canonical row with typed accessors by field name.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    table: &'a CanonicalTable,
    cells: &'a [Cell],
}

impl<'a> RowView<'a> {
    pub fn cell(&self, field: &str) -> Option<&'a Cell> {
        self.table.column_index(field).map(|i| &self.cells[i])
    }

    pub fn text(&self, field: &str) -> Option<String> {
        match self.cell(field)? {
            Cell::Text(s) => Some(s.clone()),
            Cell::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Cell::Status(s) => Some(s.label().to_string()),
            Cell::Missing => None,
        }
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        match self.cell(field)? {
            Cell::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn status(&self, field: &str) -> Option<Status> {
        match self.cell(field)? {
            Cell::Status(s) => Some(s.clone()),
            Cell::Text(s) => Some(Status::Other(s.clone())),
            _ => None,
        }
    }
}

/// Typed records plus the set of canonical columns that were mapped.
///
/// A column missing from `columns` was never mapped for the whole dataset,
/// which is different from a record holding `None` for one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<R> {
    pub records: Vec<R>,
    pub columns: BTreeSet<&'static str>,
}

impl<R> Dataset<R> {
    pub fn has(&self, field: &str) -> bool {
        self.columns.contains(field)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<R: Clone> Dataset<R> {
    /// Keep the records matching `pred`; the column set is unchanged.
    pub fn retain_where(&self, pred: impl Fn(&R) -> bool) -> Dataset<R> {
        Dataset {
            records: self.records.iter().filter(|r| pred(r)).cloned().collect(),
            columns: self.columns.clone(),
        }
    }
}

pub trait FromCanonical: Sized {
    fn from_row(row: RowView<'_>) -> Self;

    fn dataset(table: &CanonicalTable) -> Dataset<Self> {
        Dataset {
            records: table.iter_rows().map(Self::from_row).collect(),
            columns: table.columns.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryRecord {
    pub company: Option<String>,
    pub tax_id: Option<String>,
    pub obligation: Option<String>,
    pub department: Option<String>,
    pub owner_due: Option<String>,
    pub owner_delivered: Option<String>,
    pub competence: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub delivered_date: Option<NaiveDate>,
    pub status: Option<Status>,
    pub protocol: Option<String>,
}

impl DeliveryRecord {
    pub fn is_done(&self) -> bool {
        self.status.as_ref().is_some_and(Status::is_done)
    }
}

impl FromCanonical for DeliveryRecord {
    fn from_row(row: RowView<'_>) -> Self {
        Self {
            company: row.text("company"),
            tax_id: row.text("tax_id"),
            obligation: row.text("obligation"),
            department: row.text("department"),
            owner_due: row.text("owner_due"),
            owner_delivered: row.text("owner_delivered"),
            competence: row.date("competence"),
            due_date: row.date("due_date"),
            delivered_date: row.date("delivered_date"),
            status: row.status("status"),
            protocol: row.text("protocol"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestRecord {
    pub id: Option<String>,
    pub subject: Option<String>,
    pub company: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<String>,
    pub owner: Option<String>,
    pub opened_at: Option<NaiveDate>,
    pub due_at: Option<NaiveDate>,
    pub last_update_at: Option<NaiveDate>,
    pub closed_at: Option<NaiveDate>,
}

impl RequestRecord {
    pub fn is_done(&self) -> bool {
        self.status.as_ref().is_some_and(Status::is_done)
    }
}

impl FromCanonical for RequestRecord {
    fn from_row(row: RowView<'_>) -> Self {
        Self {
            id: row.text("id"),
            subject: row.text("subject"),
            company: row.text("company"),
            status: row.status("status"),
            priority: row.text("priority"),
            owner: row.text("owner"),
            opened_at: row.date("opened_at"),
            due_at: row.date("due_at"),
            last_update_at: row.date("last_update_at"),
            closed_at: row.date("closed_at"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessRecord {
    pub process_id: Option<String>,
    pub process_name: Option<String>,
    pub department: Option<String>,
    pub company: Option<String>,
    pub owner: Option<String>,
    pub started_at: Option<NaiveDate>,
    pub ended_at: Option<NaiveDate>,
    pub status: Option<Status>,
    pub progress: Option<String>,
}

impl ProcessRecord {
    pub fn is_done(&self) -> bool {
        self.status.as_ref().is_some_and(Status::is_done)
    }
}

impl FromCanonical for ProcessRecord {
    fn from_row(row: RowView<'_>) -> Self {
        Self {
            process_id: row.text("process_id"),
            process_name: row.text("process_name"),
            department: row.text("department"),
            company: row.text("company"),
            owner: row.text("owner"),
            started_at: row.date("started_at"),
            ended_at: row.date("ended_at"),
            status: row.status("status"),
            progress: row.text("progress"),
        }
    }
}

// Output rows. Each one doubles as a CSV export row and a tabled preview row.

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct MappingRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Label")]
    pub label: String,
    #[tabled(rename = "Source column")]
    pub source: String,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq, Eq)]
pub struct CompanyBreachRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Company")]
    #[tabled(rename = "Company")]
    pub company: String,
    #[serde(rename = "LateCount")]
    #[tabled(rename = "LateCount")]
    pub late_count: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct LateCompanyRow {
    #[serde(rename = "Company")]
    #[tabled(rename = "Company")]
    pub company: String,
    #[serde(rename = "LateTasks")]
    #[tabled(rename = "LateTasks")]
    pub late_tasks: usize,
    #[serde(rename = "AvgDaysLate")]
    #[tabled(rename = "AvgDaysLate")]
    pub avg_days_late: String,
    #[serde(rename = "LastDueDate")]
    #[tabled(rename = "LastDueDate")]
    pub last_due_date: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct LateTaskRow {
    #[serde(rename = "Company")]
    #[tabled(rename = "Company")]
    pub company: String,
    #[serde(rename = "Obligation")]
    #[tabled(rename = "Obligation")]
    pub obligation: String,
    #[serde(rename = "Department")]
    #[tabled(rename = "Department")]
    pub department: String,
    #[serde(rename = "Owner")]
    #[tabled(rename = "Owner")]
    pub owner: String,
    #[serde(rename = "DueDate")]
    #[tabled(rename = "DueDate")]
    pub due_date: String,
    #[serde(rename = "DeliveredDate")]
    #[tabled(rename = "DeliveredDate")]
    pub delivered_date: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
    #[serde(rename = "DaysLate")]
    #[tabled(rename = "DaysLate")]
    pub days_late: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CriticalRow {
    #[serde(rename = "Flag")]
    #[tabled(rename = "Flag")]
    pub flag: String,
    #[serde(rename = "Item")]
    #[tabled(rename = "Item")]
    pub item: String,
    #[serde(rename = "Company")]
    #[tabled(rename = "Company")]
    pub company: String,
    #[serde(rename = "Owner")]
    #[tabled(rename = "Owner")]
    pub owner: String,
    #[serde(rename = "Date")]
    #[tabled(rename = "Date")]
    pub date: String,
    #[serde(rename = "Days")]
    #[tabled(rename = "Days")]
    pub days: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct KpiRow {
    #[tabled(rename = "Indicator")]
    pub indicator: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct BreakdownRow {
    #[serde(rename = "Department")]
    #[tabled(rename = "Department")]
    pub department: String,
    #[serde(rename = "Obligation")]
    #[tabled(rename = "Obligation")]
    pub obligation: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
}
