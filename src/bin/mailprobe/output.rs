use std::fmt::Write as _;

use anyhow::{Context, Result, bail};

use crate::args::Cli;
use mailprobe::{DomainError, MxRecord, SmtpVerdict, ValidationResult};
#[cfg(feature = "with-serde")]
use mailprobe::wire::ValidationResponse;

pub fn any_invalid(rows: &[ValidationResult]) -> bool {
    rows.iter().any(|row| !row.overall_valid)
}

pub fn write_reports(rows: &[ValidationResult], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => write_human(rows, cli),
        "json" => write_json(rows, cli),
        "ndjson" => write_ndjson(rows, cli),
        "csv" => write_csv(rows, cli),
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

type MxOutcome = Result<Vec<MxRecord>, DomainError>;

pub fn write_mx(domain: &str, outcome: &MxOutcome, cli: &Cli) -> Result<()> {
    let text = match cli.format.as_str() {
        "human" => {
            let mut text = String::new();
            match outcome {
                Ok(records) => {
                    writeln!(text, "[MX]    {domain}")?;
                    for record in records {
                        writeln!(text, "        {:>5} {}", record.preference, record.host)?;
                    }
                }
                Err(err) => writeln!(text, "[NO MX] {domain} :: {err}")?,
            }
            text
        }
        "json" | "ndjson" => mx_json(domain, outcome)?,
        other => bail!("unknown --format '{other}' for mx, use: human|json|ndjson"),
    };
    emit(cli, &text)
}

#[cfg(feature = "with-serde")]
fn mx_json(domain: &str, outcome: &MxOutcome) -> Result<String> {
    let value = match outcome {
        Ok(records) => serde_json::json!({ "domain": domain, "records": records }),
        Err(err) => serde_json::json!({ "domain": domain, "error": err }),
    };
    Ok(format!("{}\n", serde_json::to_string(&value)?))
}

#[cfg(not(feature = "with-serde"))]
fn mx_json(_: &str, _: &MxOutcome) -> Result<String> {
    bail!("format=json requires the 'with-serde' feature")
}

fn write_human(rows: &[ValidationResult], cli: &Cli) -> Result<()> {
    let mut text = String::new();
    for row in rows {
        let tag = if row.overall_valid { "[OK]     " } else { "[INVALID]" };
        writeln!(text, "{tag} {} :: {}", row.email, human_summary(row))?;
        if cli.debug {
            if let Some(err) = &row.domain_error {
                writeln!(text, "          dns: {err:?}")?;
            }
            for event in &row.transcript {
                writeln!(text, "          {event}")?;
            }
        }
    }
    emit(cli, &text)
}

/// Sends finished text to `--out` when given, stdout otherwise.
fn emit(cli: &Cli, text: &str) -> Result<()> {
    match &cli.out {
        Some(path) => write_all_atomically(path, text.as_bytes()),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

fn human_summary(row: &ValidationResult) -> String {
    if !row.syntax_valid {
        return "syntax invalid".to_string();
    }
    if !row.domain_valid {
        return match &row.domain_error {
            Some(err) => format!("domain invalid: {err}"),
            None => "domain invalid".to_string(),
        };
    }
    let mx = row.mx_host.as_deref().unwrap_or("?");
    match &row.mailbox_verdict {
        None => format!("mx={mx} (mailbox not probed)"),
        Some(verdict @ SmtpVerdict::Accepted) | Some(verdict @ SmtpVerdict::Rejected) => {
            format!("mx={mx} smtp={verdict}")
        }
        Some(verdict) => format!("mx={mx} smtp={verdict} (not confirmed)"),
    }
}

/// `--debug` keeps the full result (transcript, DNS error kind); otherwise
/// the wire response shape is emitted.
#[cfg(feature = "with-serde")]
fn json_value(row: &ValidationResult, cli: &Cli) -> Result<serde_json::Value> {
    let value = if cli.debug {
        serde_json::to_value(row)?
    } else {
        serde_json::to_value(ValidationResponse::from(row))?
    };
    Ok(value)
}

#[cfg(feature = "with-serde")]
fn write_json(rows: &[ValidationResult], cli: &Cli) -> Result<()> {
    let values = rows
        .iter()
        .map(|row| json_value(row, cli))
        .collect::<Result<Vec<_>>>()?;
    let s = serde_json::to_string_pretty(&values)?;
    if let Some(path) = &cli.out {
        write_all_atomically(path, s.as_bytes())?;
    } else {
        println!("{s}");
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_json(_: &[ValidationResult], _: &Cli) -> Result<()> {
    bail!("format=json requires the 'with-serde' feature")
}

#[cfg(feature = "with-serde")]
fn write_ndjson(rows: &[ValidationResult], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut buf = Vec::new();
        for row in rows {
            let line = serde_json::to_string(&json_value(row, cli)?)?;
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        write_all_atomically(path, &buf)?;
    } else {
        for row in rows {
            println!("{}", serde_json::to_string(&json_value(row, cli)?)?);
        }
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_ndjson(_: &[ValidationResult], _: &Cli) -> Result<()> {
    bail!("format=ndjson requires the 'with-serde' feature")
}

#[cfg(feature = "with-csv")]
const CSV_HEADER: [&str; 8] = [
    "email",
    "syntax_valid",
    "domain_valid",
    "domain_error",
    "mx_host",
    "mailbox_verdict",
    "mailbox_detail",
    "overall_valid",
];

#[cfg(feature = "with-csv")]
fn write_csv(rows: &[ValidationResult], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(CSV_HEADER)?;
        for row in rows {
            wtr.write_record(csv_record(row))?;
        }
        let data = wtr.into_inner()?;
        write_all_atomically(path, &data)?;
    } else {
        let mut wtr = csv::Writer::from_writer(std::io::stdout());
        wtr.write_record(CSV_HEADER)?;
        for row in rows {
            wtr.write_record(csv_record(row))?;
        }
        wtr.flush()?;
    }
    Ok(())
}

#[cfg(not(feature = "with-csv"))]
fn write_csv(_: &[ValidationResult], _: &Cli) -> Result<()> {
    bail!("format=csv requires the 'with-csv' feature")
}

#[cfg(feature = "with-csv")]
fn csv_record(row: &ValidationResult) -> Vec<String> {
    let response = ValidationResponse::from(row);
    let verdict = response
        .mailbox_verdict
        .map(|label| label.as_str().to_string())
        .unwrap_or_default();
    vec![
        row.email.clone(),
        row.syntax_valid.to_string(),
        row.domain_valid.to_string(),
        row.domain_error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        row.mx_host.clone().unwrap_or_default(),
        verdict,
        response.mailbox_detail.unwrap_or_default(),
        row.overall_valid.to_string(),
    ]
}

fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp).with_context(|| format!("create {tmp}"))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {tmp} -> {path}"))?;
    Ok(())
}
