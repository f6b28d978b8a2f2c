//! End-to-end tests: CSV files on disk through the session to reports and
//! exports.

use backoffice_diag::config::{Filters, Thresholds};
use backoffice_diag::loader::load_table;
use backoffice_diag::mapping::{propose_mapping, Preset};
use backoffice_diag::normalize::normalize_headers;
use backoffice_diag::output::{export_all, write_json};
use backoffice_diag::reports::{compose, Section};
use backoffice_diag::schema::DatasetKind;
use backoffice_diag::session::Session;
use chrono::NaiveDate;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 15).unwrap()
}

fn ingest(session: &mut Session, kind: DatasetKind, path: &Path, preset: Option<&Preset>) {
    let table = normalize_headers(load_table(path).unwrap());
    let mut proposal = propose_mapping(&table.headers, kind);
    if let Some(entries) = preset.and_then(|p| p.mapping_for(kind)) {
        proposal.apply_preset(entries).unwrap();
    }
    session.ingest(kind, table, proposal.confirm()).unwrap();
}

fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

const DELIVERIES: &str = "\
Empresa;Obrigação / Tarefa;Departamento;Responsável Entrega;Vencimento;Data Entrega;Status
ACME;DCTF;Fiscal;Ana;10/01/2024;12/01/2024;concluido
ACME;EFD;Fiscal;Ana;05/02/2024;;Pendente
Beta;eSocial;Pessoal;Rui;16/02/2024;;em andamento
Beta;FGTS;Pessoal;Rui;01/02/2024;01/02/2024;Feito
";

const REQUESTS: &str = "\
id da solicitação,assunto,empresa,status,prioridade,abertura,última atualização,conclusão
1,Certidão,ACME,Pendente,Alta,2024-01-01,2024-01-10,
2,Contrato,Beta,Concluído,Baixa,2024-01-05,2024-01-09,2024-01-09
";

const PROCESSES: &str = "\
id,processo,empresa,inicio,status
P1,Abertura de empresa,ACME,01/01/2024,Pendente
P2,Alteração contratual,Beta,10/02/2024,Pendente
";

#[test]
fn csv_files_produce_full_report() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::new(today());
    ingest(&mut session, DatasetKind::Delivery, &write(&dir, "d.csv", DELIVERIES), None);
    ingest(&mut session, DatasetKind::Request, &write(&dir, "r.csv", REQUESTS), None);
    ingest(&mut session, DatasetKind::Process, &write(&dir, "p.csv", PROCESSES), None);

    let report = compose(&session, &Thresholds::default(), &Filters::default(), today()).unwrap();
    assert_eq!(report.sections.len(), 3);

    let Section::Delivery(d) = &report.sections[0] else { panic!("expected deliveries first") };
    assert_eq!((d.total, d.done, d.pending), (4, 2, 2));
    // ACME/DCTF done late, ACME/EFD pending past due
    assert_eq!(d.late, Some(2));
    assert_eq!(d.at_risk, Some(1));
    assert_eq!(d.ranking.as_ref().unwrap()[0].company, "ACME");

    let Section::Request(r) = &report.sections[1] else { panic!("expected requests second") };
    assert_eq!(r.open, Some(1));
    assert_eq!(r.long_open, Some(1));
    assert_eq!(r.stale_high_priority, Some(1));
    assert_eq!(r.avg_days_to_close, Some(4.0));

    let Section::Process(p) = &report.sections[2] else { panic!("expected processes last") };
    assert_eq!(p.critical, Some(1));

    let md = report.to_markdown();
    assert!(md.contains("## Deliveries"));
    assert!(md.contains("## Requests"));
    assert!(md.contains("- High priority without update >= 3 days: 1"));
}

#[test]
fn exports_write_processed_and_late_files() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::new(today());
    ingest(&mut session, DatasetKind::Delivery, &write(&dir, "d.csv", DELIVERIES), None);
    ingest(&mut session, DatasetKind::Process, &write(&dir, "p.csv", PROCESSES), None);

    let out = dir.path().join("out");
    let written = export_all(&session, &out).unwrap();
    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec!["deliveries_processed.csv", "processes_processed.csv", "late_companies.csv", "late_tasks.csv"]
    );

    let processed = fs::read_to_string(out.join("deliveries_processed.csv")).unwrap();
    let header = processed.lines().next().unwrap();
    assert!(header.starts_with("company,obligation,department,owner_delivered,due_date"));
    assert!(header.ends_with("late_when_done,late_while_pending,at_risk,on_time,days_late"));
    assert!(processed.contains("ACME,DCTF,Fiscal,Ana,2024-01-10,2024-01-12,Done,true,false,false,false,2"));

    let late = fs::read_to_string(out.join("late_companies.csv")).unwrap();
    let mut lines = late.lines();
    assert_eq!(lines.next(), Some("Company,LateTasks,AvgDaysLate,LastDueDate"));
    assert_eq!(lines.next(), Some("ACME,2,\"6,0\",2024-02-05"));

    let processes = fs::read_to_string(out.join("processes_processed.csv")).unwrap();
    assert!(processes.lines().next().unwrap().ends_with(",duration_days"));
    assert!(processes.contains("P1,Abertura de empresa,ACME,2024-01-01,Pending,45"));
}

#[test]
fn preset_renames_custom_headers() {
    let dir = TempDir::new().unwrap();
    let csv = write(
        &dir,
        "d.csv",
        "Cliente,Vence em,Situação\nACME,01/02/2024,aberto\n",
    );
    let preset_path = dir.path().join("preset.json");
    fs::write(
        &preset_path,
        r#"{"mappings": {"delivery": {"company": "Cliente", "due_date": "vence em", "status": "situação"}},
            "thresholds": {"risk_window_days": 5}}"#,
    )
    .unwrap();
    let preset = Preset::load(&preset_path).unwrap();
    assert_eq!(preset.thresholds.unwrap().risk_window_days, 5);

    let mut session = Session::new(today());
    ingest(&mut session, DatasetKind::Delivery, &csv, Some(&preset));
    let loaded = session.get(DatasetKind::Delivery).unwrap();
    assert_eq!(loaded.table.columns, vec!["company", "due_date", "status"]);
    let flags = session.deliveries().unwrap().flags.as_ref().unwrap();
    assert!(flags[0].late_while_pending);
    assert_eq!(flags[0].days_late, Some(14));

    // saved mappings survive a round trip through disk
    let mut saved = Preset::default();
    saved.store(&loaded.mapping);
    let saved_path = dir.path().join("saved.json");
    write_json(&saved_path, &saved).unwrap();
    let back = Preset::load(&saved_path).unwrap();
    assert_eq!(
        back.mapping_for(DatasetKind::Delivery).unwrap()["company"],
        Some("cliente".to_string())
    );
}

#[test]
fn preset_with_out_of_range_threshold_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "bad.json", r#"{"thresholds": {"sla_days": 90}}"#);
    assert!(Preset::load(&path).is_err());
}

#[test]
fn unsupported_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "notes.pdf", "not a table");
    assert!(load_table(&path).is_err());
}
