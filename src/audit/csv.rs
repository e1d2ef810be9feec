//! CSV rendering of audit log exports.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::backend::AuditLogRow;

/// Column titles of the export.
pub const CSV_HEADER: [&str; 9] = [
    "Fecha",
    "Evento",
    "Paciente",
    "DNI",
    "Estudio",
    "Fecha Estudio",
    "IP Address",
    "User Agent",
    "Detalles",
];

/// Quote a field that contains a comma, quote or line break.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Render rows as CSV with dates shown in `offset`.
///
/// Lines are separated by `\n` with no trailing newline, so an empty export
/// is the header row alone.
pub fn render_csv(rows: &[AuditLogRow], offset: FixedOffset) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(CSV_HEADER.join(","));

    for row in rows {
        let fields = row_fields(row, offset);
        let line = fields
            .iter()
            .map(|f| escape_field(f))
            .collect::<Vec<_>>()
            .join(",");
        lines.push(line);
    }

    lines.join("\n")
}

fn row_fields(row: &AuditLogRow, offset: FixedOffset) -> [String; 9] {
    let (paciente, dni) = match &row.pacientes {
        Some(p) => (format!("{} {}", p.nombre, p.apellido), p.dni.clone()),
        None => (String::new(), String::new()),
    };
    let (estudio, fecha_estudio) = match &row.estudios {
        Some(e) => (
            e.titulo.clone(),
            e.fecha_estudio.as_deref().map(format_date).unwrap_or_default(),
        ),
        None => (String::new(), String::new()),
    };
    let detalles = match &row.detalles {
        Some(v) if !v.is_null() => v.to_string(),
        _ => String::new(),
    };

    [
        format_timestamp(row.created_at, offset),
        row.evento.clone(),
        paciente,
        dni,
        estudio,
        fecha_estudio,
        row.ip_address.clone().unwrap_or_default(),
        row.user_agent.clone().unwrap_or_default(),
        detalles,
    ]
}

/// `d/m/yyyy, HH:MM:SS` in the given offset.
pub fn format_timestamp(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset)
        .format("%-d/%-m/%Y, %H:%M:%S")
        .to_string()
}

/// `d/m/yyyy` for a date or timestamp string. Unparseable input is returned as is.
fn format_date(value: &str) -> String {
    let date = value
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    match date {
        Some(d) => d.format("%-d/%-m/%Y").to_string(),
        None => value.to_string(),
    }
}
