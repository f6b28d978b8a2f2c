// Canonical schemas for the five dataset kinds.
//
// Every kind is an ordered list of fields. The `guess` is the header the
// back office usually exports for that field, already trimmed and lowercased
// so it can be compared directly with normalized headers.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Delivery,
    Request,
    Obligation,
    Process,
    Responsible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Date,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub guess: &'static str,
    pub ty: FieldType,
}

const fn text(name: &'static str, label: &'static str, guess: &'static str) -> FieldSpec {
    FieldSpec { name, label, guess, ty: FieldType::Text }
}

const fn date(name: &'static str, label: &'static str, guess: &'static str) -> FieldSpec {
    FieldSpec { name, label, guess, ty: FieldType::Date }
}

const fn status(guess: &'static str) -> FieldSpec {
    FieldSpec { name: "status", label: "Status", guess, ty: FieldType::Status }
}

const DELIVERY: &[FieldSpec] = &[
    text("company", "Company", "empresa"),
    text("tax_id", "Tax ID", "cnpj"),
    text("obligation", "Obligation / task", "obrigação / tarefa"),
    text("department", "Department", "departamento"),
    text("owner_due", "Owner (deadline)", "responsável prazo"),
    text("owner_delivered", "Owner (delivery)", "responsável entrega"),
    date("competence", "Competence", "competência"),
    date("due_date", "Due date", "vencimento"),
    date("delivered_date", "Delivered date", "data entrega"),
    status("status"),
    text("protocol", "Protocol", "protocolo"),
];

const REQUEST: &[FieldSpec] = &[
    text("id", "Request ID", "id da solicitação"),
    text("subject", "Subject", "assunto"),
    text("company", "Company", "empresa"),
    status("status"),
    text("priority", "Priority", "prioridade"),
    text("owner", "Owner", "responsável"),
    date("opened_at", "Opened at", "abertura"),
    date("due_at", "Due at", "prazo"),
    date("last_update_at", "Last update", "última atualização"),
    date("closed_at", "Closed at", "conclusão"),
];

const OBLIGATION: &[FieldSpec] = &[
    text("obligation", "Obligation", "obrigação"),
    text("mini", "Short name", "mini"),
    text("department", "Department", "departamento"),
    text("owner", "Owner", "responsável"),
    text("periodicity", "Periodicity", "periodicidade"),
    text("monthly_deadline", "Monthly deadline", "prazo"),
    text("alert_days", "Alert days", "alerta"),
];

const PROCESS: &[FieldSpec] = &[
    text("process_id", "Process ID", "id"),
    text("process_name", "Process", "processo"),
    text("department", "Department", "departamento"),
    text("company", "Company", "empresa"),
    text("owner", "Owner", "responsável"),
    date("started_at", "Started at", "inicio"),
    date("ended_at", "Ended at", "conclusão"),
    status("status"),
    text("progress", "Progress", "progresso"),
];

const RESPONSIBLE: &[FieldSpec] = &[
    text("owner", "Owner", "responsavel"),
    text("department", "Department", "departamento"),
    text("email", "E-mail", "email"),
    text("role", "Role", "cargo"),
];

impl DatasetKind {
    pub const ALL: [DatasetKind; 5] = [
        DatasetKind::Delivery,
        DatasetKind::Request,
        DatasetKind::Obligation,
        DatasetKind::Process,
        DatasetKind::Responsible,
    ];

    /// Ordered canonical schema for this kind.
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            DatasetKind::Delivery => DELIVERY,
            DatasetKind::Request => REQUEST,
            DatasetKind::Obligation => OBLIGATION,
            DatasetKind::Process => PROCESS,
            DatasetKind::Responsible => RESPONSIBLE,
        }
    }

    /// Names of the date-typed fields, in schema order.
    pub fn date_fields(self) -> Vec<&'static str> {
        self.fields()
            .iter()
            .filter(|f| f.ty == FieldType::Date)
            .map(|f| f.name)
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Delivery => "delivery",
            DatasetKind::Request => "request",
            DatasetKind::Obligation => "obligation",
            DatasetKind::Process => "process",
            DatasetKind::Responsible => "responsible",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            DatasetKind::Delivery => "Deliveries",
            DatasetKind::Request => "Requests",
            DatasetKind::Obligation => "Obligations",
            DatasetKind::Process => "Processes",
            DatasetKind::Responsible => "Responsibles & Departments",
        }
    }

    /// File stem used when exporting the processed table.
    pub fn export_stem(self) -> &'static str {
        match self {
            DatasetKind::Delivery => "deliveries",
            DatasetKind::Request => "requests",
            DatasetKind::Obligation => "obligations",
            DatasetKind::Process => "processes",
            DatasetKind::Responsible => "responsibles",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delivery" | "deliveries" => Ok(DatasetKind::Delivery),
            "request" | "requests" => Ok(DatasetKind::Request),
            "obligation" | "obligations" => Ok(DatasetKind::Obligation),
            "process" | "processes" => Ok(DatasetKind::Process),
            "responsible" | "responsibles" => Ok(DatasetKind::Responsible),
            other => Err(format!("unknown dataset kind: {other}")),
        }
    }
}
