//! Property-based tests for the metric engine.

use backoffice_diag::config::Thresholds;
use backoffice_diag::metrics::{delivery_flags, delivery_row_flags, long_open, request_aging};
use backoffice_diag::normalize::normalize_status;
use backoffice_diag::types::{Dataset, DeliveryRecord, RequestRecord, Status};
use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn day(offset: i64) -> NaiveDate {
    base() + Duration::days(offset)
}

fn status_strategy() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Done),
        Just(Status::Pending),
        "[A-Za-z ]{0,12}".prop_map(Status::Other),
    ]
}

prop_compose! {
    fn delivery_strategy()(
        status in proptest::option::of(status_strategy()),
        due in proptest::option::of(0i64..400),
        delivered in proptest::option::of(0i64..400),
    ) -> DeliveryRecord {
        DeliveryRecord {
            company: Some("ACME".to_string()),
            status,
            due_date: due.map(day),
            delivered_date: delivered.map(day),
            ..Default::default()
        }
    }
}

fn delivery_dataset(records: Vec<DeliveryRecord>) -> Dataset<DeliveryRecord> {
    Dataset {
        records,
        columns: ["company", "due_date", "delivered_date", "status"].into_iter().collect(),
    }
}

proptest! {
    // ========================
    // Delivery flags
    // ========================

    #[test]
    fn on_time_and_late_when_done_are_exclusive(r in delivery_strategy(), today in 0i64..400) {
        let f = delivery_row_flags(&r, day(today), 2);
        prop_assert!(!(f.on_time && f.late_when_done));
        if r.is_done() && r.delivered_date.is_some() && r.due_date.is_some() {
            prop_assert!(f.on_time ^ f.late_when_done);
        }
    }

    #[test]
    fn pending_flags_never_set_on_done_rows(r in delivery_strategy(), today in 0i64..400) {
        let f = delivery_row_flags(&r, day(today), 5);
        if r.is_done() {
            prop_assert!(!f.late_while_pending && !f.at_risk);
        } else {
            prop_assert!(!f.late_when_done && !f.on_time);
        }
    }

    #[test]
    fn days_late_is_never_negative(r in delivery_strategy(), today in 0i64..400) {
        let f = delivery_row_flags(&r, day(today), 2);
        if let Some(d) = f.days_late {
            prop_assert!(d >= 0);
        }
        if r.due_date.is_none() {
            prop_assert_eq!(f.days_late, None);
        }
    }

    #[test]
    fn engine_is_idempotent(records in proptest::collection::vec(delivery_strategy(), 0..40), today in 0i64..400) {
        let ds = delivery_dataset(records);
        let t = Thresholds::default();
        prop_assert_eq!(delivery_flags(&ds, day(today), &t), delivery_flags(&ds, day(today), &t));
    }

    #[test]
    fn wider_risk_window_never_shrinks_at_risk(
        records in proptest::collection::vec(delivery_strategy(), 0..40),
        today in 0i64..400,
        small in 0i64..=10,
        extra in 0i64..=10,
    ) {
        let ds = delivery_dataset(records);
        let narrow = Thresholds { risk_window_days: small, ..Thresholds::default() };
        let wide = Thresholds { risk_window_days: (small + extra).min(10), ..Thresholds::default() };
        let a = delivery_flags(&ds, day(today), &narrow).unwrap();
        let b = delivery_flags(&ds, day(today), &wide).unwrap();
        for (x, y) in a.iter().zip(&b) {
            prop_assert!(!x.at_risk || y.at_risk);
        }
    }

    // ========================
    // Requests
    // ========================

    #[test]
    fn larger_sla_never_grows_long_open(
        opened in proptest::collection::vec((proptest::option::of(0i64..200), proptest::option::of(0i64..200)), 0..40),
        today in 200i64..400,
        sla in 1i64..=60,
        extra in 0i64..=60,
    ) {
        let records = opened
            .into_iter()
            .map(|(o, c)| RequestRecord {
                opened_at: o.map(day),
                closed_at: c.map(day),
                ..Default::default()
            })
            .collect();
        let ds = Dataset { records, columns: ["opened_at", "closed_at"].into_iter().collect() };
        let aging = request_aging(&ds, day(today));
        let strict = long_open(&ds, &aging, sla).unwrap();
        let loose = long_open(&ds, &aging, sla + extra).unwrap();
        for (s, l) in strict.iter().zip(&loose) {
            prop_assert!(*s || !*l);
        }
    }

    // ========================
    // Status normalization
    // ========================

    #[test]
    fn unknown_status_round_trips_verbatim(s in "[A-Za-z ]{0,16}") {
        match normalize_status(&s) {
            Status::Other(v) => prop_assert_eq!(v, s),
            Status::Done | Status::Pending => {}
        }
    }
}
