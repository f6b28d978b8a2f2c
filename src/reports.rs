// Report composition and the always-on dashboard.
use crate::config::{Filters, Thresholds, DASHBOARD_TOP_N, REPORT_TOP_N};
use crate::error::ReportError;
use crate::metrics::{self, apply_filters, DeliverySummary, ProcessSummary, RequestSummary};
use crate::schema::DatasetKind;
use crate::session::Session;
use crate::types::{BreakdownRow, CompanyBreachRow, CriticalRow, KpiRow};
use crate::util::{format_int, format_number};
use chrono::NaiveDate;
use std::fmt::Write;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    Delivery(DeliverySummary),
    Request(RequestSummary),
    Process(ProcessSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub today: NaiveDate,
    pub thresholds: Thresholds,
    /// Always in Delivery, Request, Process order.
    pub sections: Vec<Section>,
}

/// Recompute every loaded delivery/request/process dataset under the given
/// thresholds and filters. The session itself is not modified.
pub fn compose(
    session: &Session,
    thresholds: &Thresholds,
    filters: &Filters,
    today: NaiveDate,
) -> Result<Report, ReportError> {
    let mut sections = Vec::new();

    if let Some(d) = session.deliveries() {
        let data = apply_filters(&d.data, filters);
        let flags = metrics::delivery_flags(&data, today, thresholds);
        sections.push(Section::Delivery(metrics::summarize_deliveries(
            &data,
            flags.as_deref(),
            today,
            thresholds,
            REPORT_TOP_N,
        )));
    }
    if let Some(r) = session.requests() {
        let data = apply_filters(&r.data, filters);
        sections.push(Section::Request(metrics::summarize_requests(&data, today, thresholds)));
    }
    if let Some(p) = session.processes() {
        let data = apply_filters(&p.data, filters);
        sections.push(Section::Process(metrics::summarize_processes(&data, today, thresholds)));
    }

    if sections.is_empty() {
        return Err(ReportError::NothingToReport);
    }
    info!(sections = sections.len(), filtered = !filters.is_empty(), "report composed");
    Ok(Report { today, thresholds: *thresholds, sections })
}

impl Report {
    pub fn to_markdown(&self) -> String {
        let t = &self.thresholds;
        let mut out = String::new();
        let _ = writeln!(out, "# Analytical Summary");
        let _ = writeln!(out);
        let _ = writeln!(out, "Reference date: {}", self.today.format("%Y-%m-%d"));

        for section in &self.sections {
            let _ = writeln!(out);
            match section {
                Section::Delivery(s) => {
                    let _ = writeln!(out, "## {}", DatasetKind::Delivery.title());
                    let _ = writeln!(
                        out,
                        "- Total: {} | Done: {} | Pending: {}",
                        format_int(s.total),
                        format_int(s.done),
                        format_int(s.pending)
                    );
                    if let Some(n) = s.late {
                        let _ = writeln!(out, "- Late: {}", format_int(n));
                    }
                    if let Some(n) = s.at_risk {
                        let _ = writeln!(out, "- At risk (<= {} days): {}", t.risk_window_days, format_int(n));
                    }
                    if let Some(p) = s.punctuality_pct {
                        let _ = writeln!(out, "- Punctuality: {}%", format_number(p, 1));
                    }
                    if let Some(ranking) = &s.ranking {
                        let _ = writeln!(out, "- TOP late companies (last {} days):", t.lookback_days);
                        if ranking.is_empty() {
                            let _ = writeln!(out, "  - none");
                        }
                        for row in ranking {
                            let _ = writeln!(out, "  {}. {}: {}", row.rank, row.company, format_int(row.late_count));
                        }
                    }
                }
                Section::Request(s) => {
                    let _ = writeln!(out, "## {}", DatasetKind::Request.title());
                    let mut line = format!("- Total: {}", format_int(s.total));
                    if let Some(n) = s.open {
                        let _ = write!(line, " | Open: {}", format_int(n));
                    }
                    if let Some(n) = s.done {
                        let _ = write!(line, " | Done: {}", format_int(n));
                    }
                    let _ = writeln!(out, "{line}");
                    if let Some(n) = s.long_open {
                        let _ = writeln!(out, "- Open >= {} days: {}", t.sla_days, format_int(n));
                    }
                    if let Some(n) = s.stale_high_priority {
                        let _ = writeln!(
                            out,
                            "- High priority without update >= {} days: {}",
                            t.stale_high_priority_days,
                            format_int(n)
                        );
                    }
                    if let Some(avg) = s.avg_days_to_close {
                        let _ = writeln!(out, "- Mean days to close: {}", format_number(avg, 1));
                    }
                }
                Section::Process(s) => {
                    let _ = writeln!(out, "## {}", DatasetKind::Process.title());
                    let mut line = format!("- Total: {}", format_int(s.total));
                    if let (Some(done), Some(running)) = (s.done, s.in_progress) {
                        let _ = write!(line, " | Done: {} | In progress: {}", format_int(done), format_int(running));
                    }
                    let _ = writeln!(out, "{line}");
                    if let Some(n) = s.critical {
                        let _ = writeln!(out, "- Running >= {} days: {}", t.long_running_days, format_int(n));
                    }
                    if let Some(avg) = s.avg_duration {
                        let _ = writeln!(out, "- Mean duration (finished): {} days", format_number(avg, 1));
                    }
                }
            }
        }
        out
    }
}

/// Summary view over the full load-time data with default thresholds.
#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    pub kpis: Vec<KpiRow>,
    pub critical_deliveries: Vec<CriticalRow>,
    pub top_late_companies: Vec<CompanyBreachRow>,
    pub critical_requests: Vec<CriticalRow>,
    pub long_running: Vec<CriticalRow>,
    pub breakdown: Vec<BreakdownRow>,
}

fn kpi(indicator: &str, value: String) -> KpiRow {
    KpiRow { indicator: indicator.to_string(), value }
}

pub fn dashboard(session: &Session) -> Dashboard {
    let today = session.today();
    let t = Thresholds::default();
    let mut dash = Dashboard::default();

    if let Some(d) = session.deliveries() {
        let s = metrics::summarize_deliveries(&d.data, d.flags.as_deref(), today, &t, DASHBOARD_TOP_N);
        dash.kpis.push(kpi("Deliveries", format_int(s.total)));
        dash.kpis.push(kpi("Deliveries done", format_int(s.done)));
        if let Some(n) = s.late {
            dash.kpis.push(kpi("Late deliveries", format_int(n)));
        }
        if let Some(n) = s.at_risk {
            dash.kpis.push(kpi("Deliveries at risk", format_int(n)));
        }
        if let Some(p) = s.punctuality_pct {
            dash.kpis.push(kpi("Punctuality %", format_number(p, 1)));
        }
        if let Some(flags) = &d.flags {
            dash.critical_deliveries = metrics::critical_deliveries(&d.data, flags, t.risk_window_days);
        }
        dash.top_late_companies = s.ranking.unwrap_or_default();
    }

    if let Some(r) = session.requests() {
        let s = metrics::summarize_requests(&r.data, today, &t);
        dash.kpis.push(kpi("Requests", format_int(s.total)));
        if let Some(n) = s.open {
            dash.kpis.push(kpi("Open requests", format_int(n)));
        }
        if let Some(avg) = s.avg_days_to_close {
            dash.kpis.push(kpi("Mean days to close", format_number(avg, 1)));
        }
        dash.critical_requests = metrics::critical_requests(&r.data, today, &t);
    }

    if let Some(p) = session.processes() {
        let s = metrics::summarize_processes(&p.data, today, &t);
        dash.kpis.push(kpi("Processes", format_int(s.total)));
        if let Some(n) = s.in_progress {
            dash.kpis.push(kpi("Processes in progress", format_int(n)));
        }
        if let Some(avg) = s.avg_duration {
            dash.kpis.push(kpi("Mean process duration (days)", format_number(avg, 1)));
        }
        dash.long_running = metrics::critical_process_rows(&p.data, today, &t);
    }

    if let Some(o) = session.get(DatasetKind::Obligation) {
        dash.kpis.push(kpi("Obligations", format_int(o.table.len())));
        dash.breakdown = metrics::obligation_breakdown(&o.table).unwrap_or_default();
    }
    if let Some(r) = session.get(DatasetKind::Responsible) {
        dash.kpis.push(kpi("Responsibles", format_int(r.table.len())));
    }
    dash
}
