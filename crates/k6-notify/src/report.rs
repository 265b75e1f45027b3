//! Turns a k6 [`Summary`] into the Slack message posted for a run.

use std::fmt;

use thiserror::Error;

use crate::cli::RunContext;
use crate::config::DashboardSettings;
use crate::payload::{Block, Markdown, NotificationPayload};
use crate::summary::{Metric, Summary};
use crate::threshold::{parse_aggregation, Aggregation};

const GREEN: &str = ":large_green_square:";
const ORANGE: &str = ":large_orange_square:";
const RED: &str = ":large_red_square:";

const LATENCY_METRIC: &str = "http_req_duration";
const VUS_METRIC: &str = "vus_max";

#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("threshold `{expression}` on metric `{metric}` has no comparison operator")]
    MalformedThreshold { metric: String, expression: String },
    #[error("summary has no `{0}` metric")]
    MissingMetric(&'static str),
    #[error("metric `{metric}` has no `{stat}` value")]
    MissingValue { metric: &'static str, stat: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Passed,
    FailedByThreshold,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Passed => f.write_str(":white_check_mark: Passed"),
            Status::FailedByThreshold => f.write_str(":x: Failed by threshold"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdLine {
    pub metric: String,
    pub expression: String,
    pub aggregation: String,
    /// Rounded value of the aggregation, `None` when k6 did not report it
    pub value: Option<i64>,
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckLine {
    pub name: String,
    /// Success rate in percent, two decimals at most
    pub rate: f64,
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latency {
    pub avg: i64,
    pub p90: i64,
    pub p95: i64,
    pub p99: i64,
}

/// Epoch-millisecond bounds of the dashboard link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub stop_ms: i64,
}

/// Display values derived from a summary, ready to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub status: Status,
    pub thresholds: Vec<ThresholdLine>,
    pub checks: Vec<CheckLine>,
    pub latency: Latency,
    pub duration_minutes: i64,
    pub vus_max: f64,
    pub window: TimeWindow,
}

/// One line of the console table printed before posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleRow {
    pub kind: &'static str,
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

/// Build the Slack payload for a run finished at `now_ms`.
pub fn build_notification(
    ctx: &RunContext,
    summary: &Summary,
    dashboard: &DashboardSettings,
    now_ms: i64,
) -> Result<NotificationPayload, ReportError> {
    Ok(Report::from_summary(summary, dashboard, now_ms)?.to_payload(ctx))
}

impl Report {
    pub fn from_summary(
        summary: &Summary,
        dashboard: &DashboardSettings,
        now_ms: i64,
    ) -> Result<Self, ReportError> {
        let (status, thresholds) = evaluate_thresholds(summary)?;

        let checks = summary
            .root_group
            .checks
            .iter()
            .map(|check| CheckLine {
                name: check.name.clone(),
                rate: round_to_two(
                    check.passes as f64 / (check.passes + check.fails) as f64 * 100.0,
                ),
                ok: check.fails == 0,
            })
            .collect();

        let durations = required_metric(summary, LATENCY_METRIC)?;
        let latency = Latency {
            avg: rounded_stat(durations, LATENCY_METRIC, "avg")?,
            p90: rounded_stat(durations, LATENCY_METRIC, "p(90)")?,
            p95: rounded_stat(durations, LATENCY_METRIC, "p(95)")?,
            p99: rounded_stat(durations, LATENCY_METRIC, "p(99)")?,
        };

        let vus_max = required_metric(summary, VUS_METRIC)?
            .value("max")
            .ok_or(ReportError::MissingValue {
                metric: VUS_METRIC,
                stat: "max",
            })?;

        let run_ms = summary.state.test_run_duration_ms;

        Ok(Self {
            status,
            thresholds,
            checks,
            latency,
            duration_minutes: (run_ms / 1000.0 / 60.0).round() as i64,
            vus_max,
            window: TimeWindow::around_run(now_ms, run_ms, dashboard),
        })
    }

    pub fn to_payload(&self, ctx: &RunContext) -> NotificationPayload {
        let header = format!(
            "*Project:* {}\n*Environment:* {}\n*TestId:* {}\n*Duration:* {}m (max VUS: {})\n*Author:* {}",
            ctx.project,
            ctx.environment,
            ctx.test_id,
            self.duration_minutes,
            self.vus_max,
            ctx.author,
        );

        let thresholds: String = self
            .thresholds
            .iter()
            .map(|t| {
                let value = t.value.map_or_else(|| "n/a".to_string(), |v| v.to_string());
                format!(
                    "{} *{}:{}*, got *{}={}*\n",
                    status_color(t.ok),
                    t.metric,
                    t.expression,
                    t.aggregation,
                    value
                )
            })
            .collect();

        let checks: String = self
            .checks
            .iter()
            .map(|c| format!("{} *{}:* {}%\n", status_color(c.ok), c.name, c.rate))
            .collect();

        let latency = self.latency;
        let fields = [
            ("avg", latency.avg),
            ("p99", latency.p99),
            ("p95", latency.p95),
            ("p90", latency.p90),
        ]
        .into_iter()
        .map(|(label, ms)| {
            Markdown::new(format!(
                "{} *{label}:* {ms}ms",
                response_time_color(ms)
            ))
        })
        .collect();

        let link = dashboard_link(&ctx.dashboard_url, &ctx.test_id, self.window);

        NotificationPayload::new(
            ctx.slack_channel.clone(),
            vec![
                Block::section(header),
                Block::Divider,
                Block::section(self.status.to_string()),
                Block::Divider,
                Block::section(format!("*Thresholds:*\n{thresholds}")),
                Block::Divider,
                Block::section(format!("*Checks:*\n{checks}")),
                Block::Divider,
                Block::section_with_fields("*Response Time:*", fields),
                Block::Divider,
                Block::section(format!("View the Performance Test:\n{link}")),
            ],
        )
    }

    pub fn console_rows(&self) -> Vec<ConsoleRow> {
        let thresholds = self.thresholds.iter().map(|t| ConsoleRow {
            kind: "threshold",
            name: format!("{}:{}", t.metric, t.expression),
            ok: t.ok,
            detail: match t.value {
                Some(v) => format!("{}={v}", t.aggregation),
                None => format!("{}=n/a", t.aggregation),
            },
        });
        let checks = self.checks.iter().map(|c| ConsoleRow {
            kind: "check",
            name: c.name.clone(),
            ok: c.ok,
            detail: format!("{}%", c.rate),
        });
        thresholds.chain(checks).collect()
    }
}

impl TimeWindow {
    /// Window covering the run that just ended, shifted forward so the most
    /// recent samples have reached the dashboard's datasource.
    pub fn around_run(now_ms: i64, run_ms: f64, settings: &DashboardSettings) -> Self {
        let offset = settings.delay_ms + settings.padding_ms;
        let stop_ms = now_ms + offset;
        Self {
            start_ms: stop_ms - run_ms.round() as i64 - offset,
            stop_ms,
        }
    }
}

fn evaluate_thresholds(summary: &Summary) -> Result<(Status, Vec<ThresholdLine>), ReportError> {
    let mut status = Status::Passed;
    let mut lines = Vec::new();

    for (name, metric) in &summary.metrics {
        let Some(thresholds) = &metric.thresholds else {
            continue;
        };
        for (expression, result) in thresholds {
            if !result.ok {
                status = Status::FailedByThreshold;
            }
            let aggregation = match parse_aggregation(expression) {
                Aggregation::Found(aggregation) => aggregation,
                Aggregation::NotFound => {
                    return Err(ReportError::MalformedThreshold {
                        metric: name.clone(),
                        expression: expression.clone(),
                    })
                }
            };
            lines.push(ThresholdLine {
                metric: name.clone(),
                expression: expression.clone(),
                aggregation: aggregation.to_string(),
                value: metric.value(aggregation).map(|v| v.round() as i64),
                ok: result.ok,
            });
        }
    }

    Ok((status, lines))
}

fn required_metric<'a>(summary: &'a Summary, name: &'static str) -> Result<&'a Metric, ReportError> {
    summary.metric(name).ok_or(ReportError::MissingMetric(name))
}

fn rounded_stat(metric: &Metric, name: &'static str, stat: &'static str) -> Result<i64, ReportError> {
    metric
        .value(stat)
        .map(|v| v.round() as i64)
        .ok_or(ReportError::MissingValue { metric: name, stat })
}

pub fn status_color(ok: bool) -> &'static str {
    if ok {
        GREEN
    } else {
        RED
    }
}

/// Colour for a response time in milliseconds; bounds are exclusive.
pub fn response_time_color(ms: i64) -> &'static str {
    if ms < 250 {
        GREEN
    } else if ms < 500 {
        ORANGE
    } else {
        RED
    }
}

/// Round to two decimals by shifting in decimal text, so 1.005 becomes 1.01
/// rather than falling victim to its binary representation.
pub fn round_to_two(value: f64) -> f64 {
    let shifted = format!("{value}e2")
        .parse::<f64>()
        .unwrap_or(value * 100.0);
    shifted.round() / 100.0
}

/// Append the time window and test id to the dashboard base URL.
pub fn dashboard_link(base: &str, test_id: &str, window: TimeWindow) -> String {
    let sep = if base.ends_with('?') || base.ends_with('&') {
        ""
    } else if base.contains('?') {
        "&"
    } else {
        "?"
    };
    format!(
        "{base}{sep}from={}&to={}&var-test_id={test_id}&var-type=All",
        window.start_ms, window.stop_ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::fixtures::SUMMARY;
    use assert_matches::assert_matches;
    use serde_json::{json, Value};

    const NOW_MS: i64 = 1_700_000_000_000;

    fn ctx() -> RunContext {
        RunContext {
            project: "shop".into(),
            environment: "staging".into(),
            test_id: "run-42".into(),
            author: "alice".into(),
            slack_channel: "#perf".into(),
            slack_token: "xoxb-secret".into(),
            dashboard_url: "https://grafana.example/d/k6?orgId=1".into(),
        }
    }

    fn summary(value: Value) -> Summary {
        serde_json::from_value(value).unwrap()
    }

    fn fixture() -> Summary {
        serde_json::from_str(SUMMARY).unwrap()
    }

    /// Summary with the two required metrics plus whatever `extra` adds.
    fn minimal(extra_metrics: Value, checks: Value) -> Summary {
        let mut metrics = json!({
            "http_req_duration": { "values": { "avg": 100, "p(90)": 120, "p(95)": 130, "p(99)": 140 } },
            "vus_max": { "values": { "max": 10 } }
        });
        if let (Some(m), Some(extra)) = (metrics.as_object_mut(), extra_metrics.as_object()) {
            m.extend(extra.clone());
        }
        summary(json!({
            "state": { "testRunDurationMs": 60000 },
            "metrics": metrics,
            "root_group": { "checks": checks }
        }))
    }

    fn report(summary: &Summary) -> Report {
        Report::from_summary(summary, &DashboardSettings::default(), NOW_MS).unwrap()
    }

    #[test]
    fn all_green_run_passes() {
        let s = minimal(
            json!({ "http_req_failed": { "values": { "rate": 0.0 }, "thresholds": { "rate<0.01": { "ok": true } } } }),
            json!([{ "name": "status is 200", "passes": 10, "fails": 0 }]),
        );
        let r = report(&s);
        assert_eq!(r.status, Status::Passed);
        assert_eq!(r.status.to_string(), ":white_check_mark: Passed");
    }

    #[test]
    fn one_failing_threshold_fails_the_run() {
        let s = minimal(
            json!({
                "a": { "values": { "rate": 0.0 }, "thresholds": { "rate<0.01": { "ok": false } } },
                "b": { "values": { "count": 5 }, "thresholds": { "count>1": { "ok": true }, "count<10": { "ok": true } } }
            }),
            json!([]),
        );
        let r = report(&s);
        assert_eq!(r.status, Status::FailedByThreshold);
        assert_eq!(r.status.to_string(), ":x: Failed by threshold");
    }

    #[test]
    fn failing_check_alone_keeps_status_passed() {
        let s = minimal(json!({}), json!([{ "name": "flaky", "passes": 1, "fails": 1 }]));
        let r = report(&s);
        assert_eq!(r.status, Status::Passed);
        assert!(!r.checks[0].ok);
    }

    #[test]
    fn threshold_lines_follow_document_order() {
        let r = report(&fixture());
        let names: Vec<String> = r
            .thresholds
            .iter()
            .map(|t| format!("{}:{}", t.metric, t.expression))
            .collect();
        assert_eq!(
            names,
            [
                "http_req_failed:rate<0.01",
                "http_req_duration:p(95)<400",
                "http_req_duration:avg<=200"
            ]
        );
    }

    #[test]
    fn threshold_line_reports_rounded_aggregation() {
        let r = report(&fixture());
        let line = &r.thresholds[1];
        assert_eq!(line.aggregation, "p(95)");
        assert_eq!(line.value, Some(424));

        let payload = r.to_payload(&ctx());
        let text = payload.blocks().nth(4).and_then(Block::text).unwrap();
        assert!(text.contains(":large_red_square: *http_req_duration:p(95)<400*, got *p(95)=424*\n"));
        assert!(text.starts_with("*Thresholds:*\n"));
    }

    #[test]
    fn missing_aggregation_value_renders_na() {
        let s = minimal(
            json!({ "iterations": { "values": { "count": 3 }, "thresholds": { "rate>0.5": { "ok": true } } } }),
            json!([]),
        );
        let r = report(&s);
        assert_eq!(r.thresholds[0].value, None);
        let text = r.to_payload(&ctx()).blocks().nth(4).and_then(Block::text).unwrap().to_string();
        assert!(text.contains("got *rate=n/a*"));
    }

    #[test]
    fn threshold_without_aggregation_still_renders() {
        let s = minimal(
            json!({ "iterations": { "values": { "count": 3 }, "thresholds": { "<500": { "ok": true } } } }),
            json!([]),
        );
        let r = report(&s);
        assert_eq!(r.thresholds[0].aggregation, "");
        assert_eq!(r.thresholds[0].value, None);
        let text = r.to_payload(&ctx()).blocks().nth(4).and_then(Block::text).unwrap().to_string();
        assert!(text.contains(":large_green_square: *iterations:<500*, got *=n/a*\n"));
    }

    #[test]
    fn malformed_threshold_is_rejected() {
        let s = minimal(
            json!({ "checks": { "values": { "rate": 1.0 }, "thresholds": { "rate==1": { "ok": true } } } }),
            json!([]),
        );
        let result = Report::from_summary(&s, &DashboardSettings::default(), NOW_MS);
        assert_matches!(
            result,
            Err(ReportError::MalformedThreshold { ref metric, ref expression })
                if metric == "checks" && expression == "rate==1"
        );
    }

    #[test]
    fn missing_required_metric_is_rejected() {
        let s = summary(json!({
            "state": { "testRunDurationMs": 1000 },
            "metrics": { "vus_max": { "values": { "max": 1 } } },
            "root_group": { "checks": [] }
        }));
        let result = Report::from_summary(&s, &DashboardSettings::default(), NOW_MS);
        assert_matches!(result, Err(ReportError::MissingMetric("http_req_duration")));
    }

    #[test]
    fn check_rate_drops_trailing_zeros() {
        let s = minimal(
            json!({}),
            json!([
                { "name": "three of four", "passes": 3, "fails": 1 },
                { "name": "two of three", "passes": 2, "fails": 1 },
                { "name": "all", "passes": 7, "fails": 0 }
            ]),
        );
        let payload = report(&s).to_payload(&ctx());
        let text = payload.blocks().nth(6).and_then(Block::text).unwrap();
        assert_eq!(
            text,
            "*Checks:*\n\
             :large_red_square: *three of four:* 75%\n\
             :large_red_square: *two of three:* 66.67%\n\
             :large_green_square: *all:* 100%\n"
        );
    }

    #[test]
    fn round_to_two_uses_decimal_half_up() {
        assert_eq!(round_to_two(1.005), 1.01);
        assert_eq!(round_to_two(75.0), 75.0);
        assert_eq!(round_to_two(200.0 / 3.0), 66.67);
        assert_eq!(round_to_two(99.994), 99.99);
    }

    #[test]
    fn latency_color_boundaries() {
        assert_eq!(response_time_color(249), GREEN);
        assert_eq!(response_time_color(250), ORANGE);
        assert_eq!(response_time_color(499), ORANGE);
        assert_eq!(response_time_color(500), RED);
    }

    #[test]
    fn latency_fields_are_rounded_and_ordered() {
        let r = report(&fixture());
        assert_eq!(
            r.latency,
            Latency {
                avg: 182,
                p90: 249,
                p95: 424,
                p99: 613
            }
        );

        let payload = r.to_payload(&ctx());
        let Some(Block::Section { text, fields }) = payload.blocks().nth(8) else {
            panic!("expected latency section");
        };
        assert_eq!(text.text, "*Response Time:*");
        let fields: Vec<&str> = fields.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(
            fields,
            [
                ":large_green_square: *avg:* 182ms",
                ":large_red_square: *p99:* 613ms",
                ":large_orange_square: *p95:* 424ms",
                ":large_green_square: *p90:* 249ms",
            ]
        );
    }

    #[test]
    fn duration_rounds_to_minutes() {
        let r = report(&fixture());
        assert_eq!(r.duration_minutes, 2);
        assert_eq!(r.vus_max, 50.0);
    }

    #[test]
    fn header_lists_run_identifiers() {
        let payload = report(&fixture()).to_payload(&ctx());
        assert_eq!(payload.channel, "#perf");
        assert_eq!(
            payload.blocks().next().and_then(Block::text).unwrap(),
            "*Project:* shop\n*Environment:* staging\n*TestId:* run-42\n*Duration:* 2m (max VUS: 50)\n*Author:* alice"
        );
    }

    #[test]
    fn blocks_alternate_with_dividers() {
        let payload = report(&fixture()).to_payload(&ctx());
        let blocks: Vec<&Block> = payload.blocks().collect();
        assert_eq!(blocks.len(), 11);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(matches!(block, Block::Divider), i % 2 == 1, "block {i}");
        }
        assert_eq!(blocks[2].text(), Some(":x: Failed by threshold"));
    }

    #[test]
    fn time_window_spans_run_plus_offsets() {
        let window = TimeWindow::around_run(NOW_MS, 125_000.4, &DashboardSettings::default());
        assert_eq!(window.stop_ms, NOW_MS + 45_000);
        assert_eq!(window.start_ms, NOW_MS - 125_000);
    }

    #[test]
    fn dashboard_link_carries_window_and_test_id() {
        let payload = report(&fixture()).to_payload(&ctx());
        let text = payload.blocks().last().and_then(Block::text).unwrap();
        assert_eq!(
            text,
            format!(
                "View the Performance Test:\nhttps://grafana.example/d/k6?orgId=1&from={}&to={}&var-test_id=run-42&var-type=All",
                NOW_MS - 125_000,
                NOW_MS + 45_000
            )
        );
    }

    #[test]
    fn dashboard_link_starts_query_when_missing() {
        let window = TimeWindow { start_ms: 1, stop_ms: 2 };
        assert_eq!(
            dashboard_link("https://g.example/d/k6", "t", window),
            "https://g.example/d/k6?from=1&to=2&var-test_id=t&var-type=All"
        );
        assert_eq!(
            dashboard_link("https://g.example/d/k6?", "t", window),
            "https://g.example/d/k6?from=1&to=2&var-test_id=t&var-type=All"
        );
    }

    #[test]
    fn console_rows_list_thresholds_then_checks() {
        let rows = report(&fixture()).console_rows();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[1].kind, "threshold");
        assert_eq!(rows[1].detail, "p(95)=424");
        assert!(!rows[1].ok);
        assert_eq!(rows[4].kind, "check");
        assert_eq!(rows[4].detail, "75%");
    }
}
