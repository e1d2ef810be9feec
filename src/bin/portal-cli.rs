//! Staff command line client for the portal's administrative API.
//!
//! # Responsibilities
//! - List and export the audit log
//! - Search studies, rotate access codes and list share links
//! - Revoke share links
//!
//! # Design Decisions
//! - Talks to a running portal over HTTP; never to the data platform directly
//! - The staff key comes from `--key` or `STAFF_API_KEY`

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "portal-cli")]
#[command(about = "Staff CLI for the medical patient portal", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    /// Staff API key (defaults to STAFF_API_KEY when unset).
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audit log entries
    AuditLogs {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 50)]
        limit: u64,
        #[arg(long)]
        evento: Option<String>,
        #[arg(long)]
        desde: Option<String>,
        #[arg(long)]
        hasta: Option<String>,
    },
    /// Export the audit log as CSV to stdout
    Export {
        #[arg(long)]
        evento: Option<String>,
        #[arg(long)]
        desde: Option<String>,
        #[arg(long)]
        hasta: Option<String>,
        #[arg(long)]
        estudio: Option<String>,
    },
    /// Search studies
    Studies {
        #[arg(long)]
        dni: Option<String>,
        #[arg(long)]
        tipo: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u64,
    },
    /// Issue a new access code for a study
    RegenerateCode { study_id: String },
    /// List the share links of a study
    Shares { study_id: String },
    /// Revoke a share link
    Revoke {
        token: String,
        #[arg(long)]
        motivo: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    let key = cli
        .key
        .or_else(|| std::env::var("STAFF_API_KEY").ok())
        .unwrap_or_default();
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

    match cli.command {
        Commands::AuditLogs {
            page,
            limit,
            evento,
            desde,
            hasta,
        } => {
            let mut query = vec![("page", page.to_string()), ("limit", limit.to_string())];
            push_opt(&mut query, "evento", evento);
            push_opt(&mut query, "fecha_desde", desde);
            push_opt(&mut query, "fecha_hasta", hasta);
            let res = client
                .get(format!("{}/api/audit-logs", base))
                .headers(headers)
                .query(&query)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Export {
            evento,
            desde,
            hasta,
            estudio,
        } => {
            let mut query = Vec::new();
            push_opt(&mut query, "evento", evento);
            push_opt(&mut query, "fecha_desde", desde);
            push_opt(&mut query, "fecha_hasta", hasta);
            push_opt(&mut query, "estudio_id", estudio);
            let res = client
                .get(format!("{}/api/audit-logs/export", base))
                .headers(headers)
                .query(&query)
                .send()
                .await?;
            if res.status().is_success() {
                print!("{}", res.text().await?);
            } else {
                print_response(res).await?;
            }
        }
        Commands::Studies { dni, tipo, page } => {
            let mut query = vec![("page", page.to_string())];
            push_opt(&mut query, "dni", dni);
            push_opt(&mut query, "tipo_estudio", tipo);
            let res = client
                .get(format!("{}/api/studies/search", base))
                .headers(headers)
                .query(&query)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::RegenerateCode { study_id } => {
            let res = client
                .post(format!("{}/api/studies/{}/regenerate-code", base, study_id))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Shares { study_id } => {
            let res = client
                .get(format!("{}/api/studies/{}/medical-shares", base, study_id))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Revoke { token, motivo } => {
            let res = client
                .post(format!("{}/api/medical-share/revoke", base))
                .json(&json!({ "token": token, "motivo": motivo }))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn push_opt(query: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<String>) {
    if let Some(v) = value {
        query.push((name, v));
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: portal returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
