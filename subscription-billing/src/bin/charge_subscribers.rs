//! Run one billing cycle from the command line and exit.
//!
//! ## Usage
//! ```bash
//! # Charge everything due today (UTC)
//! cargo run --bin charge-subscribers
//!
//! # Charge as of a given day
//! cargo run --bin charge-subscribers -- --date 2024-03-01
//!
//! # Settle charges left pending by an earlier run
//! cargo run --bin charge-subscribers -- --reconcile
//! ```
//!
//! The run summary is printed to stdout as JSON. The process exits non-zero
//! when the subscription file cannot be read.

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use service_core::observability::init_tracing;
use std::env;
use subscription_billing::config::BillingConfig;
use subscription_billing::services::init_metrics;
use subscription_billing::startup::{build_clients, AppState};

#[derive(Debug, Default)]
struct Args {
    reconcile: bool,
    date: Option<NaiveDate>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--reconcile" => parsed.reconcile = true,
            "--date" => {
                let raw = args.next().context("--date needs a YYYY-MM-DD value")?;
                let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("invalid --date '{}'", raw))?;
                parsed.date = Some(date);
            }
            other => bail!("unknown argument '{}'", other),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args(env::args().skip(1))?;

    let config = BillingConfig::from_env().context("failed to load configuration")?;
    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics();

    let (gateway, orders) = build_clients(&config)?;
    let state = AppState::new(config, gateway, orders);

    let output = if args.reconcile {
        let summary = state.driver.reconcile().await?;
        serde_json::to_string_pretty(&summary)?
    } else {
        let today = args.date.unwrap_or_else(|| Utc::now().date_naive());
        let summary = state.driver.run(today).await?;
        serde_json::to_string_pretty(&summary)?
    };

    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> anyhow::Result<Args> {
        parse_args(raw.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults_to_a_cycle_for_today() {
        let parsed = args(&[]).unwrap();
        assert!(!parsed.reconcile);
        assert!(parsed.date.is_none());
    }

    #[test]
    fn reads_date_and_reconcile_flags() {
        let parsed = args(&["--reconcile", "--date", "2024-03-01"]).unwrap();
        assert!(parsed.reconcile);
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn rejects_unknown_arguments() {
        assert!(args(&["--apply"]).is_err());
        assert!(args(&["--date"]).is_err());
        assert!(args(&["--date", "03/01/2024"]).is_err());
    }
}
