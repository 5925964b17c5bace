//! Implicit messaging command: open, poll, close

use std::time::Duration;

use anyhow::{Context, Result};
use colored::*;
use serde_json::json;
use tokio::time::Instant;
use tracing::info;
use voltage_eip::{CloseOutcome, ConnectionManager, ScannerConfig, Session};

use crate::explicit::hex;

pub async fn run(
    session: &Session,
    config: &ScannerConfig,
    name: &str,
    cycles: u32,
    interval: Duration,
    large: bool,
    as_json: bool,
) -> Result<()> {
    let params = config.connection(name)?.clone();
    let mut manager = ConnectionManager::bind(config.implicit.local_port)
        .await
        .with_context(|| format!("Failed to bind UDP port {}", config.implicit.local_port))?;

    let handle = if large {
        manager.large_forward_open(session, &params).await
    } else {
        manager.forward_open(session, &params).await
    }
    .with_context(|| format!("Failed to open connection '{name}'"))?;

    {
        let connection = manager.connection_mut(handle)?;
        if !params.o2t_network_params.is_null() {
            connection.set_data_to_send(vec![0; usize::from(params.o2t_network_params.size)])?;
        }
        connection.set_receive_data_listener(move |header, sequence, data| {
            if as_json {
                let line = json!({ "sequence": sequence, "header": header, "data": hex(data) });
                println!("{line}");
            } else {
                println!(
                    "{} seq={:5} header=0x{:08X} {}",
                    "RX".green(),
                    sequence,
                    header,
                    hex(data)
                );
            }
        });
        let connection_name = name.to_string();
        connection.set_close_listener(move || info!("Connection '{}' closed", connection_name));

        if !as_json {
            println!(
                "{} '{}' {} o2t=0x{:08X} t2o=0x{:08X} api={}us/{}us",
                "Opened".green().bold(),
                name,
                handle,
                connection.o2t_connection_id(),
                connection.t2o_connection_id(),
                connection.o2t_api(),
                connection.t2o_api()
            );
        }
    }

    let mut ticker = tokio::time::interval(interval);
    let mut last = Instant::now();
    for _ in 0..cycles {
        if !manager.has_open_connections() {
            break;
        }
        ticker.tick().await;
        let now = Instant::now();
        manager.handle_connections(now - last);
        last = now;
    }

    if let Ok(connection) = manager.connection(handle) {
        let stats = connection.stats();
        if as_json {
            println!(
                "{}",
                json!({
                    "sent": stats.sent,
                    "delivered": stats.delivered,
                    "stale": stats.stale,
                    "rejected": stats.rejected,
                })
            );
        } else {
            println!(
                "{} sent={} delivered={} stale={} rejected={}",
                "Stats:".bright_cyan(),
                stats.sent,
                stats.delivered,
                stats.stale,
                stats.rejected
            );
        }
    }

    let outcome = manager.forward_close(session, handle).await;
    if as_json {
        println!("{}", close_report(name, &outcome));
        return Ok(());
    }
    match outcome {
        CloseOutcome::Acknowledged => {
            println!("{} '{}'", "Closed".green().bold(), name);
        },
        CloseOutcome::AlreadyClosed => {
            println!("{} '{}' closed before the end of the run", "Note:".yellow(), name);
        },
        other => {
            println!("{} '{}': {:?}", "Close not acknowledged".yellow(), name, other);
        },
    }
    Ok(())
}

/// One JSON line describing how the connection ended
fn close_report(name: &str, outcome: &CloseOutcome) -> serde_json::Value {
    match outcome {
        CloseOutcome::Acknowledged => json!({ "closed": name, "outcome": "acknowledged" }),
        CloseOutcome::AlreadyClosed => json!({ "closed": name, "outcome": "already_closed" }),
        CloseOutcome::Rejected { general, extended } => json!({
            "closed": name,
            "outcome": "rejected",
            "general_status": general.0,
            "extended_status": extended,
        }),
        CloseOutcome::Unacknowledged(e) => json!({
            "closed": name,
            "outcome": "unacknowledged",
            "error": e.to_string(),
        }),
    }
}
