// Header, date and status normalization.
use crate::types::{CanonicalTable, Cell, Status, Table};
use crate::util::parse_date_dayfirst;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use tracing::debug;

static DONE_SYNONYMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["concluido", "concluída", "concluida", "concluído", "finalizado", "feito"]
        .into_iter()
        .collect()
});

static PENDING_SYNONYMS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["pendente", "em aberto", "aberto", "em andamento"].into_iter().collect());

/// Trim and lowercase every header.
pub fn normalize_headers(mut table: Table) -> Table {
    for h in &mut table.headers {
        *h = h.trim().to_lowercase();
    }
    table
}

/// Map a free-text status onto the closed vocabulary.
///
/// Unknown values come back verbatim, including their original casing, so
/// they stay visible instead of being bucketed.
pub fn normalize_status(raw: &str) -> Status {
    let s = raw.trim().to_lowercase();
    if DONE_SYNONYMS.contains(s.as_str()) {
        Status::Done
    } else if PENDING_SYNONYMS.contains(s.as_str()) {
        Status::Pending
    } else {
        Status::Other(raw.to_string())
    }
}

/// Coerce the named columns to dates. Columns that are not present are
/// skipped; cells that do not parse become `Cell::Missing`.
pub fn parse_dates(mut table: CanonicalTable, columns: &[&str]) -> CanonicalTable {
    for name in columns {
        let Some(idx) = table.column_index(name) else { continue };
        let mut unparsed = 0usize;
        for row in &mut table.rows {
            let cell = std::mem::replace(&mut row[idx], Cell::Missing);
            row[idx] = match cell {
                Cell::Text(s) => match parse_date_dayfirst(Some(&s)) {
                    Some(d) => Cell::Date(d),
                    None => {
                        unparsed += 1;
                        Cell::Missing
                    }
                },
                other => other,
            };
        }
        if unparsed > 0 {
            debug!(column = %name, unparsed, "date cells left missing");
        }
    }
    table
}

/// Replace the text cells of the `status` column with normalized statuses.
pub fn normalize_status_column(mut table: CanonicalTable) -> CanonicalTable {
    let Some(idx) = table.column_index("status") else {
        return table;
    };
    for row in &mut table.rows {
        let normalized = match &row[idx] {
            Cell::Text(s) => Some(normalize_status(s)),
            _ => None,
        };
        if let Some(status) = normalized {
            row[idx] = Cell::Status(status);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DatasetKind;
    use chrono::NaiveDate;

    #[test]
    fn headers_are_trimmed_and_lowercased() {
        let t = Table::new(vec!["  Empresa ".into(), "VENCIMENTO".into()], vec![]);
        assert_eq!(normalize_headers(t).headers, vec!["empresa", "vencimento"]);
    }

    #[test]
    fn status_synonyms() {
        assert_eq!(normalize_status("concluido"), Status::Done);
        assert_eq!(normalize_status("  Concluída "), Status::Done);
        assert_eq!(normalize_status("FEITO"), Status::Done);
        assert_eq!(normalize_status("Em Andamento"), Status::Pending);
        assert_eq!(normalize_status("aberto"), Status::Pending);
    }

    #[test]
    fn unknown_status_is_verbatim() {
        assert_eq!(normalize_status(" Cancelada "), Status::Other(" Cancelada ".to_string()));
    }

    #[test]
    fn bad_dates_become_missing() {
        let table = CanonicalTable {
            kind: DatasetKind::Delivery,
            columns: vec!["company", "due_date"],
            rows: vec![
                vec![Cell::Text("ACME".into()), Cell::Text("10/01/2024".into())],
                vec![Cell::Text("ACME".into()), Cell::Text("soon".into())],
                vec![Cell::Text("ACME".into()), Cell::Missing],
            ],
        };
        let out = parse_dates(table, &["due_date", "delivered_date"]);
        assert_eq!(out.rows[0][1], Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()));
        assert_eq!(out.rows[1][1], Cell::Missing);
        assert_eq!(out.rows[2][1], Cell::Missing);
        assert_eq!(out.rows[0][0], Cell::Text("ACME".into()));
    }
}
