// Metric engine: derived per-row flags and aggregate rollups per dataset.
//
// Every function takes `today` explicitly; nothing here reads the clock.
// A result wrapped in `Option` is `None` only when a column it needs was
// never mapped for the dataset; per-row missing values yield `false`.
use crate::config::{Dimension, Filters, Thresholds};
use crate::types::{
    BreakdownRow, CanonicalTable, CompanyBreachRow, CriticalRow, Dataset, DeliveryRecord,
    LateCompanyRow, LateTaskRow, ProcessRecord, RequestRecord,
};
use crate::util::{average, days_between, format_date, format_number, format_opt, percentage};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Upper bound on rows listed in a critical-items table.
pub const CRITICAL_LIST_CAP: usize = 200;

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Records that can be narrowed by company / department / owner.
pub trait Scoped {
    /// Canonical column backing `dim`, if the kind has one.
    fn scope_column(dim: Dimension) -> Option<&'static str>;
    fn scope_value(&self, dim: Dimension) -> Option<&str>;
}

impl Scoped for DeliveryRecord {
    fn scope_column(dim: Dimension) -> Option<&'static str> {
        Some(match dim {
            Dimension::Company => "company",
            Dimension::Department => "department",
            Dimension::Owner => "owner_delivered",
        })
    }

    fn scope_value(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::Company => self.company.as_deref(),
            Dimension::Department => self.department.as_deref(),
            Dimension::Owner => self.owner_delivered.as_deref(),
        }
    }
}

impl Scoped for RequestRecord {
    fn scope_column(dim: Dimension) -> Option<&'static str> {
        match dim {
            Dimension::Company => Some("company"),
            Dimension::Department => None,
            Dimension::Owner => Some("owner"),
        }
    }

    fn scope_value(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::Company => self.company.as_deref(),
            Dimension::Department => None,
            Dimension::Owner => self.owner.as_deref(),
        }
    }
}

impl Scoped for ProcessRecord {
    fn scope_column(dim: Dimension) -> Option<&'static str> {
        Some(match dim {
            Dimension::Company => "company",
            Dimension::Department => "department",
            Dimension::Owner => "owner",
        })
    }

    fn scope_value(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::Company => self.company.as_deref(),
            Dimension::Department => self.department.as_deref(),
            Dimension::Owner => self.owner.as_deref(),
        }
    }
}

/// Keep the records matching every active dimension. Rows with no value in
/// a filtered column never match.
pub fn apply_filters<R: Scoped + Clone>(ds: &Dataset<R>, filters: &Filters) -> Dataset<R> {
    let active: Vec<(Dimension, &BTreeSet<String>)> =
        [Dimension::Company, Dimension::Department, Dimension::Owner]
            .into_iter()
            .filter_map(|dim| {
                let column = R::scope_column(dim)?;
                if !ds.has(column) {
                    return None;
                }
                filters.selection(dim).map(|sel| (dim, sel))
            })
            .collect();
    if active.is_empty() {
        return ds.clone();
    }
    let out = ds.retain_where(|r| {
        active
            .iter()
            .all(|(dim, sel)| r.scope_value(*dim).is_some_and(|v| sel.contains(v)))
    });
    debug!(before = ds.len(), after = out.len(), "filters applied");
    out
}

/// Distinct sorted values of a text column, for building filter choices.
pub fn distinct_values<R: Scoped>(ds: &Dataset<R>, dim: Dimension) -> Vec<String> {
    let set: BTreeSet<&str> = ds.records.iter().filter_map(|r| r.scope_value(dim)).collect();
    set.into_iter().map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryFlags {
    pub late_when_done: bool,
    pub late_while_pending: bool,
    pub at_risk: bool,
    pub on_time: bool,
    /// Non-negative; `None` when there is nothing to measure against.
    pub days_late: Option<i64>,
}

impl DeliveryFlags {
    pub fn is_late(&self) -> bool {
        self.late_when_done || self.late_while_pending
    }
}

pub fn delivery_row_flags(r: &DeliveryRecord, today: NaiveDate, risk_window_days: i64) -> DeliveryFlags {
    let done = r.is_done();
    let due = r.due_date;
    let delivered = r.delivered_date;

    let late_while_pending = !done && due.is_some_and(|d| today > d);
    let at_risk = !done && due.is_some_and(|d| (0..=risk_window_days).contains(&days_between(today, d)));
    let (late_when_done, on_time) = match (done, delivered, due) {
        (true, Some(dl), Some(du)) => (dl > du, dl <= du),
        _ => (false, false),
    };
    let days_late = match (done, delivered, due) {
        (true, Some(dl), Some(du)) => Some(days_between(du, dl).max(0)),
        (true, Some(_), None) => None,
        (false, _, Some(du)) => Some(days_between(du, today).max(0)),
        _ => None,
    };

    DeliveryFlags { late_when_done, late_while_pending, at_risk, on_time, days_late }
}

/// Per-row flags for the whole dataset, or `None` when `due_date` is not
/// mapped. A missing `status` column makes every row count as not done.
pub fn delivery_flags(ds: &Dataset<DeliveryRecord>, today: NaiveDate, thresholds: &Thresholds) -> Option<Vec<DeliveryFlags>> {
    if !ds.has("due_date") {
        debug!("due_date not mapped, delivery flags skipped");
        return None;
    }
    Some(
        ds.records
            .iter()
            .map(|r| delivery_row_flags(r, today, thresholds.risk_window_days))
            .collect(),
    )
}

/// Late rows whose due date is within the last `lookback_days`, counted per
/// company, highest first (ties by company name). `None` without a company
/// column.
pub fn breach_ranking(
    ds: &Dataset<DeliveryRecord>,
    flags: &[DeliveryFlags],
    today: NaiveDate,
    lookback_days: i64,
    top_n: usize,
) -> Option<Vec<CompanyBreachRow>> {
    if !ds.has("company") {
        return None;
    }
    let cutoff = today - Duration::days(lookback_days);
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (r, f) in ds.records.iter().zip(flags) {
        let recent = r.due_date.is_some_and(|d| d >= cutoff);
        if !recent || !f.is_late() {
            continue;
        }
        if let Some(company) = r.company.as_deref() {
            *counts.entry(company).or_default() += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    // BTreeMap order is by name, and the sort is stable, so ties stay alphabetical.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    Some(
        ranked
            .into_iter()
            .take(top_n)
            .enumerate()
            .map(|(i, (company, late_count))| CompanyBreachRow {
                rank: i + 1,
                company: company.to_string(),
                late_count,
            })
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySummary {
    pub total: usize,
    pub done: usize,
    pub pending: usize,
    pub late: Option<usize>,
    pub at_risk: Option<usize>,
    pub on_time: Option<usize>,
    pub punctuality_pct: Option<f64>,
    pub ranking: Option<Vec<CompanyBreachRow>>,
}

pub fn summarize_deliveries(
    ds: &Dataset<DeliveryRecord>,
    flags: Option<&[DeliveryFlags]>,
    today: NaiveDate,
    thresholds: &Thresholds,
    top_n: usize,
) -> DeliverySummary {
    let total = ds.len();
    let done = ds.records.iter().filter(|r| r.is_done()).count();
    let count = |pred: fn(&DeliveryFlags) -> bool| flags.map(|fs| fs.iter().filter(|f| pred(f)).count());
    let on_time = count(|f| f.on_time);
    DeliverySummary {
        total,
        done,
        pending: total - done,
        late: count(DeliveryFlags::is_late),
        at_risk: count(|f| f.at_risk),
        on_time,
        punctuality_pct: on_time.map(|n| percentage(n, done)),
        ranking: flags.and_then(|fs| breach_ranking(ds, fs, today, thresholds.lookback_days, top_n)),
    }
}

/// Late rows grouped by company: count, mean days late, latest due date.
/// Sorted by count, then mean, both descending.
pub fn late_companies(ds: &Dataset<DeliveryRecord>, flags: &[DeliveryFlags]) -> Vec<LateCompanyRow> {
    #[derive(Default)]
    struct Acc {
        count: usize,
        days: Vec<f64>,
        last_due: Option<NaiveDate>,
    }
    let mut map: HashMap<&str, Acc> = HashMap::new();
    for (r, f) in ds.records.iter().zip(flags) {
        if !f.is_late() {
            continue;
        }
        let Some(company) = r.company.as_deref() else { continue };
        let e = map.entry(company).or_default();
        e.count += 1;
        if let Some(d) = f.days_late {
            e.days.push(d as f64);
        }
        e.last_due = e.last_due.max(r.due_date);
    }
    let mut rows: Vec<(usize, f64, &str, Acc)> = map
        .into_iter()
        .map(|(company, acc)| {
            let avg = average(&acc.days).unwrap_or(0.0);
            (acc.count, avg, company, acc)
        })
        .collect();
    rows.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.2.cmp(b.2))
    });
    rows.into_iter()
        .map(|(count, avg, company, acc)| LateCompanyRow {
            company: company.to_string(),
            late_tasks: count,
            avg_days_late: format_number(avg, 1),
            last_due_date: format_date(acc.last_due),
        })
        .collect()
}

/// Late rows, by company ascending then days late descending.
pub fn late_tasks(ds: &Dataset<DeliveryRecord>, flags: &[DeliveryFlags]) -> Vec<LateTaskRow> {
    let mut late: Vec<(&DeliveryRecord, &DeliveryFlags)> =
        ds.records.iter().zip(flags).filter(|(_, f)| f.is_late()).collect();
    late.sort_by(|a, b| {
        a.0.company
            .cmp(&b.0.company)
            .then_with(|| b.1.days_late.cmp(&a.1.days_late))
    });
    late.into_iter()
        .map(|(r, f)| LateTaskRow {
            company: r.company.clone().unwrap_or_default(),
            obligation: r.obligation.clone().unwrap_or_default(),
            department: r.department.clone().unwrap_or_default(),
            owner: r.owner_delivered.clone().unwrap_or_default(),
            due_date: format_date(r.due_date),
            delivered_date: format_date(r.delivered_date),
            status: format_opt(r.status.as_ref()),
            days_late: format_opt(f.days_late),
        })
        .collect()
}

/// Pending deliveries that are at risk or already overdue.
pub fn critical_deliveries(
    ds: &Dataset<DeliveryRecord>,
    flags: &[DeliveryFlags],
    risk_window_days: i64,
) -> Vec<CriticalRow> {
    let at_risk_flag = format!("AT RISK (<= {risk_window_days} days)");
    let mut rows: Vec<(&str, Option<NaiveDate>, &DeliveryRecord, &DeliveryFlags)> = Vec::new();
    for (r, f) in ds.records.iter().zip(flags) {
        if f.at_risk {
            rows.push((at_risk_flag.as_str(), r.due_date, r, f));
        }
        if f.late_while_pending {
            rows.push(("OVERDUE PENDING", r.due_date, r, f));
        }
    }
    rows.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(&b.1)));
    rows.into_iter()
        .take(CRITICAL_LIST_CAP)
        .map(|(flag, due, r, f)| CriticalRow {
            flag: flag.to_string(),
            item: r.obligation.clone().unwrap_or_default(),
            company: r.company.clone().unwrap_or_default(),
            owner: r.owner_delivered.clone().unwrap_or_default(),
            date: format_date(due),
            days: format_opt(f.days_late),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestAging {
    pub days_to_close: Option<i64>,
    pub days_open: Option<i64>,
}

pub fn request_aging(ds: &Dataset<RequestRecord>, today: NaiveDate) -> Vec<RequestAging> {
    ds.records
        .iter()
        .map(|r| match (r.opened_at, r.closed_at) {
            (Some(o), Some(c)) => RequestAging { days_to_close: Some(days_between(o, c)), days_open: None },
            (Some(o), None) => RequestAging { days_to_close: None, days_open: Some(days_between(o, today)) },
            _ => RequestAging::default(),
        })
        .collect()
}

/// Open requests aged at least `sla_days`. Needs `opened_at` and `closed_at`.
pub fn long_open(ds: &Dataset<RequestRecord>, aging: &[RequestAging], sla_days: i64) -> Option<Vec<bool>> {
    if !(ds.has("opened_at") && ds.has("closed_at")) {
        return None;
    }
    Some(
        ds.records
            .iter()
            .zip(aging)
            .map(|(r, a)| r.closed_at.is_none() && a.days_open.is_some_and(|d| d >= sla_days))
            .collect(),
    )
}

/// Open high-priority requests without an update for `stale_days`. Needs
/// `priority`, `last_update_at` and `closed_at`.
pub fn stale_high_priority(ds: &Dataset<RequestRecord>, today: NaiveDate, stale_days: i64) -> Option<Vec<bool>> {
    if !(ds.has("priority") && ds.has("last_update_at") && ds.has("closed_at")) {
        return None;
    }
    Some(
        ds.records
            .iter()
            .map(|r| {
                r.closed_at.is_none()
                    && r.priority.as_deref().is_some_and(|p| p.to_lowercase().contains("alta"))
                    && r.last_update_at.is_some_and(|u| days_between(u, today) >= stale_days)
            })
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestSummary {
    pub total: usize,
    pub open: Option<usize>,
    pub done: Option<usize>,
    pub avg_days_to_close: Option<f64>,
    pub long_open: Option<usize>,
    pub stale_high_priority: Option<usize>,
}

pub fn summarize_requests(ds: &Dataset<RequestRecord>, today: NaiveDate, thresholds: &Thresholds) -> RequestSummary {
    let aging = request_aging(ds, today);
    let closing: Vec<f64> = aging.iter().filter_map(|a| a.days_to_close).map(|d| d as f64).collect();
    let count = |v: Option<Vec<bool>>| v.map(|v| v.into_iter().filter(|b| *b).count());
    RequestSummary {
        total: ds.len(),
        open: ds
            .has("closed_at")
            .then(|| ds.records.iter().filter(|r| r.closed_at.is_none()).count()),
        done: ds
            .has("status")
            .then(|| ds.records.iter().filter(|r| r.is_done()).count()),
        avg_days_to_close: average(&closing),
        long_open: count(long_open(ds, &aging, thresholds.sla_days)),
        stale_high_priority: count(stale_high_priority(ds, today, thresholds.stale_high_priority_days)),
    }
}

pub fn critical_requests(ds: &Dataset<RequestRecord>, today: NaiveDate, thresholds: &Thresholds) -> Vec<CriticalRow> {
    let aging = request_aging(ds, today);
    let long = long_open(ds, &aging, thresholds.sla_days);
    let stale = stale_high_priority(ds, today, thresholds.stale_high_priority_days);
    let long_flag = format!("OPEN >= {} days", thresholds.sla_days);
    let stale_flag = format!("HIGH PRIORITY, no update >= {} days", thresholds.stale_high_priority_days);

    let mut rows: Vec<(&str, &RequestRecord, &RequestAging)> = Vec::new();
    for (i, (r, a)) in ds.records.iter().zip(&aging).enumerate() {
        if long.as_ref().is_some_and(|v| v[i]) {
            rows.push((long_flag.as_str(), r, a));
        }
        if stale.as_ref().is_some_and(|v| v[i]) {
            rows.push((stale_flag.as_str(), r, a));
        }
    }
    rows.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.opened_at.cmp(&b.1.opened_at)));
    rows.into_iter()
        .take(CRITICAL_LIST_CAP)
        .map(|(flag, r, a)| CriticalRow {
            flag: flag.to_string(),
            item: match (&r.id, &r.subject) {
                (Some(id), Some(s)) => format!("{id} - {s}"),
                (id, s) => id.clone().or_else(|| s.clone()).unwrap_or_default(),
            },
            company: r.company.clone().unwrap_or_default(),
            owner: r.owner.clone().unwrap_or_default(),
            date: format_date(r.opened_at),
            days: format_opt(a.days_open),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

/// Duration per row: end − start, or today − start while unfinished.
/// `None` for the dataset when `started_at` is not mapped.
pub fn process_durations(ds: &Dataset<ProcessRecord>, today: NaiveDate) -> Option<Vec<Option<i64>>> {
    if !ds.has("started_at") {
        return None;
    }
    Some(
        ds.records
            .iter()
            .map(|r| r.started_at.map(|s| days_between(s, r.ended_at.unwrap_or(today))))
            .collect(),
    )
}

pub fn critical_processes(ds: &Dataset<ProcessRecord>, durations: &[Option<i64>], long_running_days: i64) -> Vec<bool> {
    ds.records
        .iter()
        .zip(durations)
        .map(|(r, d)| !r.is_done() && d.is_some_and(|d| d >= long_running_days))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSummary {
    pub total: usize,
    pub done: Option<usize>,
    pub in_progress: Option<usize>,
    pub avg_duration: Option<f64>,
    pub critical: Option<usize>,
}

pub fn summarize_processes(ds: &Dataset<ProcessRecord>, today: NaiveDate, thresholds: &Thresholds) -> ProcessSummary {
    let total = ds.len();
    let done = ds
        .has("status")
        .then(|| ds.records.iter().filter(|r| r.is_done()).count());
    let finished: Vec<f64> = ds
        .records
        .iter()
        .filter_map(|r| Some(days_between(r.started_at?, r.ended_at?) as f64))
        .collect();
    let durations = process_durations(ds, today);
    ProcessSummary {
        total,
        done,
        in_progress: done.map(|d| total - d),
        avg_duration: average(&finished),
        critical: durations.map(|d| {
            critical_processes(ds, &d, thresholds.long_running_days)
                .into_iter()
                .filter(|c| *c)
                .count()
        }),
    }
}

/// Critical processes, longest first.
pub fn critical_process_rows(ds: &Dataset<ProcessRecord>, today: NaiveDate, thresholds: &Thresholds) -> Vec<CriticalRow> {
    let Some(durations) = process_durations(ds, today) else {
        return Vec::new();
    };
    let critical = critical_processes(ds, &durations, thresholds.long_running_days);
    let flag = format!("RUNNING >= {} days", thresholds.long_running_days);
    let mut rows: Vec<(&ProcessRecord, i64)> = ds
        .records
        .iter()
        .zip(&durations)
        .zip(&critical)
        .filter(|(_, c)| **c)
        .filter_map(|((r, d), _)| d.map(|d| (r, d)))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));
    rows.into_iter()
        .take(CRITICAL_LIST_CAP)
        .map(|(r, d)| CriticalRow {
            flag: flag.clone(),
            item: r.process_name.clone().or_else(|| r.process_id.clone()).unwrap_or_default(),
            company: r.company.clone().unwrap_or_default(),
            owner: r.owner.clone().unwrap_or_default(),
            date: format_date(r.started_at),
            days: d.to_string(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Obligations
// ---------------------------------------------------------------------------

/// Department → obligation row counts. Needs both columns mapped; rows
/// missing either value are left out.
pub fn obligation_breakdown(table: &CanonicalTable) -> Option<Vec<BreakdownRow>> {
    if !(table.has("department") && table.has("obligation")) {
        return None;
    }
    let mut counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    for row in table.iter_rows() {
        if let (Some(dep), Some(obl)) = (row.text("department"), row.text("obligation")) {
            *counts.entry((dep, obl)).or_default() += 1;
        }
    }
    Some(
        counts
            .into_iter()
            .map(|((department, obligation), count)| BreakdownRow { department, obligation, count })
            .collect(),
    )
}
