//! Back-office diagnostics: load spreadsheet exports of deliveries, requests,
//! obligations, processes and responsibles, map them onto canonical schemas,
//! and compute deadline/SLA metrics, dashboards and Markdown reports.
pub mod config;
pub mod error;
pub mod loader;
pub mod mapping;
pub mod metrics;
pub mod normalize;
pub mod output;
pub mod reports;
pub mod schema;
pub mod session;
pub mod types;
pub mod util;
