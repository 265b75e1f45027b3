use std::io;

use chrono::Utc;
use clap::Parser;
use tokio::runtime::Runtime;
use tracing::error;
use tracing_subscriber::EnvFilter;

use k6_notify::cli::Cli;
use k6_notify::config::Config;
use k6_notify::report::{ConsoleRow, Report};
use k6_notify::sink::{notify, sink_for};
use k6_notify::summary::load_summary;

use tabled::{Table, Tabled};
use tabled::settings::{object::Columns, Alignment, Modify, Style};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let rt = Runtime::new()?;
    rt.block_on(async move {
        let config = Config::load(cli.config.clone())?;

        let summary_path = cli.summary.clone().unwrap_or(config.summary_path);
        let Some(summary) = load_summary(&summary_path) else {
            return Ok(());
        };

        let now_ms = Utc::now().timestamp_millis();
        let report = match Report::from_summary(&summary, &config.dashboard, now_ms) {
            Ok(report) => report,
            Err(e) => {
                error!("not sending a notification: {e}");
                return Ok(());
            }
        };

        if !cli.dry_run {
            println!("{}", console_table(report.console_rows()));
        }

        let payload = report.to_payload(&cli.run);

        let mut slack = config.slack;
        if let Some(url) = cli.api_url {
            slack.api_url = url;
        }
        match sink_for(cli.dry_run, &cli.run, &slack) {
            Ok(sink) => notify(sink.as_ref(), &payload).await,
            Err(e) => error!("not sending a notification: {e:#}"),
        }

        Ok(())
    })
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn console_table(rows: Vec<ConsoleRow>) -> Table {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "kind")]
        kind: &'static str,
        #[tabled(rename = "ok")]
        ok: String,
        #[tabled(rename = "name")]
        name: String,
        #[tabled(rename = "result")]
        detail: String,
    }

    let rows: Vec<Row> = rows
        .into_iter()
        .map(|r| Row {
            kind: r.kind,
            ok: if r.ok {
                "✅".to_string()
            } else {
                "❌".to_string()
            },
            name: r.name,
            detail: r.detail,
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::modern())
        // pass/fail marker
        .with(Modify::new(Columns::single(1)).with(Alignment::center()));
    table
}
