use clap::{Args, Parser};
use std::path::PathBuf;

/// k6-notify – post a k6 load-test summary to Slack
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Activate verbose output (-v, -vv, etc.)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// k6 summary file to read
    #[arg(short, long, value_name = "FILE", env = "K6_NOTIFY_SUMMARY")]
    pub summary: Option<PathBuf>,

    /// Slack chat.postMessage endpoint
    #[arg(long, value_name = "URL", env = "K6_NOTIFY_SLACK_API_URL")]
    pub api_url: Option<String>,

    /// Print the Slack payload instead of sending it
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub run: RunContext,
}

/// Identifiers of the test run, supplied positionally by the CI job.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Project name
    pub project: String,
    /// Environment the test ran against
    pub environment: String,
    /// Test run identifier (also the dashboard `test_id` variable)
    pub test_id: String,
    /// Who triggered the run
    pub author: String,
    /// Destination Slack channel
    pub slack_channel: String,
    /// Slack bot token
    pub slack_token: String,
    /// Grafana dashboard base URL
    pub dashboard_url: String,
}
