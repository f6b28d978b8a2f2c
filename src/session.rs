// Session: the loaded datasets, their mappings and the load-time metric pass.
use crate::config::{Dimension, Thresholds};
use crate::error::MappingError;
use crate::mapping::{apply_mapping, ColumnMapping};
use crate::metrics::{self, DeliveryFlags, RequestAging};
use crate::normalize::{normalize_headers, normalize_status_column, parse_dates};
use crate::schema::DatasetKind;
use crate::types::{
    CanonicalTable, Dataset, DeliveryRecord, FromCanonical, ProcessRecord, RequestRecord, Table,
};
use crate::util::format_opt;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// One loaded dataset: the canonical table and the mapping that produced it.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub table: CanonicalTable,
    pub mapping: ColumnMapping,
}

#[derive(Debug, Clone)]
pub struct Deliveries {
    pub data: Dataset<DeliveryRecord>,
    pub flags: Option<Vec<DeliveryFlags>>,
}

#[derive(Debug, Clone)]
pub struct Requests {
    pub data: Dataset<RequestRecord>,
    pub aging: Vec<RequestAging>,
}

#[derive(Debug, Clone)]
pub struct Processes {
    pub data: Dataset<ProcessRecord>,
    pub durations: Option<Vec<Option<i64>>>,
}

/// Everything loaded in one run. Each slot is replaced wholesale on re-load
/// and never merged. Load-time metrics use default thresholds.
#[derive(Debug, Clone)]
pub struct Session {
    today: NaiveDate,
    loaded: BTreeMap<DatasetKind, Loaded>,
    deliveries: Option<Deliveries>,
    requests: Option<Requests>,
    processes: Option<Processes>,
}

impl Session {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            loaded: BTreeMap::new(),
            deliveries: None,
            requests: None,
            processes: None,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Map, type and evaluate `table` as `kind`, replacing any previous
    /// dataset of that kind.
    pub fn ingest(&mut self, kind: DatasetKind, table: Table, mapping: ColumnMapping) -> Result<(), MappingError> {
        if mapping.kind != kind {
            return Err(MappingError::KindMismatch { expected: kind, found: mapping.kind });
        }
        let table = normalize_headers(table);
        let canonical = apply_mapping(&table, &mapping);
        let canonical = parse_dates(canonical, &kind.date_fields());
        let canonical = normalize_status_column(canonical);
        self.evaluate(&canonical);
        info!(kind = %kind, rows = canonical.len(), "dataset ingested");
        self.loaded.insert(kind, Loaded { table: canonical, mapping });
        Ok(())
    }

    fn evaluate(&mut self, table: &CanonicalTable) {
        let defaults = Thresholds::default();
        match table.kind {
            DatasetKind::Delivery => {
                let data = DeliveryRecord::dataset(table);
                let flags = metrics::delivery_flags(&data, self.today, &defaults);
                self.deliveries = Some(Deliveries { data, flags });
            }
            DatasetKind::Request => {
                let data = RequestRecord::dataset(table);
                let aging = metrics::request_aging(&data, self.today);
                self.requests = Some(Requests { data, aging });
            }
            DatasetKind::Process => {
                let data = ProcessRecord::dataset(table);
                let durations = metrics::process_durations(&data, self.today);
                self.processes = Some(Processes { data, durations });
            }
            DatasetKind::Obligation | DatasetKind::Responsible => {}
        }
    }

    pub fn get(&self, kind: DatasetKind) -> Option<&Loaded> {
        self.loaded.get(&kind)
    }

    pub fn is_loaded(&self, kind: DatasetKind) -> bool {
        self.loaded.contains_key(&kind)
    }

    pub fn loaded_kinds(&self) -> impl Iterator<Item = DatasetKind> + '_ {
        self.loaded.keys().copied()
    }

    pub fn deliveries(&self) -> Option<&Deliveries> {
        self.deliveries.as_ref()
    }

    pub fn requests(&self) -> Option<&Requests> {
        self.requests.as_ref()
    }

    pub fn processes(&self) -> Option<&Processes> {
        self.processes.as_ref()
    }

    /// Distinct values offered for a filter dimension, across every loaded
    /// dataset that maps it.
    pub fn filter_options(&self, dim: Dimension) -> Vec<String> {
        let mut all = BTreeSet::new();
        if let Some(d) = &self.deliveries {
            all.extend(metrics::distinct_values(&d.data, dim));
        }
        if let Some(r) = &self.requests {
            all.extend(metrics::distinct_values(&r.data, dim));
        }
        if let Some(p) = &self.processes {
            all.extend(metrics::distinct_values(&p.data, dim));
        }
        all.into_iter().collect()
    }

    /// Canonical table plus its load-time derived columns, as text.
    pub fn export_table(&self, kind: DatasetKind) -> Option<Table> {
        let loaded = self.loaded.get(&kind)?;
        let mut headers: Vec<String> = loaded.table.columns.iter().map(|c| c.to_string()).collect();
        let mut rows: Vec<Vec<String>> = loaded
            .table
            .rows
            .iter()
            .map(|r| r.iter().map(|c| c.render()).collect())
            .collect();

        let derived: Option<(Vec<&str>, Vec<Vec<String>>)> = match kind {
            DatasetKind::Delivery => self.deliveries.as_ref().and_then(|d| d.flags.as_ref()).map(|flags| {
                let cols = vec!["late_when_done", "late_while_pending", "at_risk", "on_time", "days_late"];
                let cells = flags
                    .iter()
                    .map(|f| {
                        vec![
                            f.late_when_done.to_string(),
                            f.late_while_pending.to_string(),
                            f.at_risk.to_string(),
                            f.on_time.to_string(),
                            format_opt(f.days_late),
                        ]
                    })
                    .collect();
                (cols, cells)
            }),
            DatasetKind::Request => self.requests.as_ref().map(|r| {
                let cells = r
                    .aging
                    .iter()
                    .map(|a| vec![format_opt(a.days_to_close), format_opt(a.days_open)])
                    .collect();
                (vec!["days_to_close", "days_open"], cells)
            }),
            DatasetKind::Process => self.processes.as_ref().and_then(|p| p.durations.as_ref()).map(|d| {
                (vec!["duration_days"], d.iter().map(|v| vec![format_opt(*v)]).collect())
            }),
            DatasetKind::Obligation | DatasetKind::Responsible => None,
        };

        if let Some((cols, cells)) = derived {
            headers.extend(cols.into_iter().map(str::to_string));
            for (row, extra) in rows.iter_mut().zip(cells) {
                row.extend(extra);
            }
        }
        Some(Table::new(headers, rows))
    }
}
