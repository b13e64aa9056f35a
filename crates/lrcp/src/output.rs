use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use lrcp_frame::SessionId;
use lrcp_session::SessionStats;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ListeningOutput {
    event: &'static str,
    local_addr: SocketAddr,
    retransmit_ms: u128,
    idle_ms: u128,
    timestamp: String,
}

/// Announce a bound server. Printed once, before any traffic is served.
pub fn print_listening(
    local_addr: SocketAddr,
    retransmit: Duration,
    idle: Duration,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                event: "listening",
                local_addr,
                retransmit_ms: retransmit.as_millis(),
                idle_ms: idle.as_millis(),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["LISTENING", "RETRANSMIT", "IDLE"])
                .add_row(vec![
                    local_addr.to_string(),
                    format!("{retransmit:?}"),
                    format!("{idle:?}"),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("listening on {local_addr} (retransmit={retransmit:?} idle={idle:?})");
        }
        OutputFormat::Raw => println!("{local_addr}"),
    }
    let _ = std::io::stdout().flush();
}

/// One request/response round trip through a server.
#[derive(Debug, Serialize)]
pub struct Exchange {
    pub server: SocketAddr,
    pub session: SessionId,
    pub sent: String,
    pub replies: Vec<String>,
    pub stats: Option<SessionStats>,
}

#[derive(Serialize)]
struct ExchangeOutput<'a> {
    #[serde(flatten)]
    exchange: &'a Exchange,
    timestamp: String,
}

pub fn print_exchange(exchange: &Exchange, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ExchangeOutput {
                exchange,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SESSION", "SERVER", "SENT", "REPLY", "ACKED"]);
            let acked = acknowledged(exchange);
            for (i, reply) in exchange.replies.iter().enumerate() {
                let (session, server, sent, acked) = if i == 0 {
                    (
                        exchange.session.to_string(),
                        exchange.server.to_string(),
                        exchange.sent.trim_end().to_string(),
                        acked.clone(),
                    )
                } else {
                    Default::default()
                };
                table.add_row(vec![session, server, sent, reply.clone(), acked]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "session={} server={} sent={} acked={}",
                exchange.session,
                exchange.server,
                exchange.sent.len(),
                acknowledged(exchange)
            );
            for reply in &exchange.replies {
                println!("  < {reply}");
            }
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            for reply in &exchange.replies {
                let _ = out.write_all(reply.as_bytes());
                let _ = out.write_all(b"\n");
            }
            let _ = out.flush();
        }
    }
}

fn acknowledged(exchange: &Exchange) -> String {
    exchange
        .stats
        .as_ref()
        .map(|stats| stats.acknowledged.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
