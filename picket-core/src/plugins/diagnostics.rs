//! Plugins that exercise the supervisor: every outcome a real plugin can
//! reach, with delays that configuration can shorten.

use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use picket_contracts::prelude::*;
use picket_contracts::{EXIT_CODE_ABORTED, EXIT_CODE_FAILED};

fn millis(ctx: &PluginContext, key: &str, default: u64) -> Duration {
    Duration::from_millis(ctx.u64(key).unwrap_or(default))
}

/// Asks to exit with the ABORTED code.
#[derive(Debug, Default)]
pub struct AbortedPlugin;

impl BlockingPlugin for AbortedPlugin {
    fn run(&mut self, _ctx: &PluginContext, reporter: &Reporter) -> Result<(), PluginError> {
        reporter.report_abort(EXIT_CODE_ABORTED);
        Ok(())
    }
}

/// Asks to exit with the FAILED code.
#[derive(Debug, Default)]
pub struct FailedPlugin;

impl BlockingPlugin for FailedPlugin {
    fn run(&mut self, _ctx: &PluginContext, reporter: &Reporter) -> Result<(), PluginError> {
        reporter.report_abort(EXIT_CODE_FAILED);
        Ok(())
    }
}

/// Ends with an unexpected error.
#[derive(Debug, Default)]
pub struct ExceptionPlugin;

impl BlockingPlugin for ExceptionPlugin {
    fn run(&mut self, _ctx: &PluginContext, _reporter: &Reporter) -> Result<(), PluginError> {
        Err(PluginError::Failed("deliberate failure from ExceptionPlugin".into()))
    }
}

/// Sleeps (default 15s, `duration_ms`) and finishes.
#[derive(Debug, Default)]
pub struct LongRunningPlugin;

impl BlockingPlugin for LongRunningPlugin {
    fn run(&mut self, ctx: &PluginContext, reporter: &Reporter) -> Result<(), PluginError> {
        reporter.report_progress(0.0, "Sleeping");
        thread::sleep(millis(ctx, "duration_ms", 15_000));
        Ok(())
    }
}

/// Sleeps long enough (default 300s, `duration_ms`) to hit the watchdog.
#[derive(Debug, Default)]
pub struct TimingOutPlugin;

impl BlockingPlugin for TimingOutPlugin {
    fn run(&mut self, ctx: &PluginContext, _reporter: &Reporter) -> Result<(), PluginError> {
        thread::sleep(millis(ctx, "duration_ms", 300_000));
        Ok(())
    }
}

const BLOCKING_STEPS: [&str; 4] = [
    "Doing some work",
    "Doing some more work",
    "Almost done",
    "Finishing up!",
];

/// Four steps of work (default 3s each, `step_ms`), one progress update and
/// one issue per step.
#[derive(Debug, Default)]
pub struct IncrementalBlockingPlugin;

impl BlockingPlugin for IncrementalBlockingPlugin {
    fn run(&mut self, ctx: &PluginContext, reporter: &Reporter) -> Result<(), PluginError> {
        let step = millis(ctx, "step_ms", 3_000);
        for (index, description) in BLOCKING_STEPS.iter().enumerate() {
            let n = index + 1;
            reporter.report_progress(25.0 * n as f32, *description);
            thread::sleep(step);
            reporter.report_issue(IssueReport::new(format!("Issue #{n}"), Severity::Low));
        }
        Ok(())
    }
}

/// Reports one Low issue per tick (default 1s, `interval_ms`) and finishes
/// after `count` (default 3) issues.
#[derive(Debug, Default)]
pub struct IncrementalAsyncPlugin {
    reported: u64,
}

#[async_trait]
impl IncrementalPlugin for IncrementalAsyncPlugin {
    fn interval(&self, ctx: &PluginContext) -> Duration {
        millis(ctx, "interval_ms", 1_000)
    }

    async fn tick(
        &mut self,
        ctx: &PluginContext,
        reporter: &Reporter,
    ) -> Result<TickOutcome, PluginError> {
        let count = ctx.u64("count").unwrap_or(3);
        if self.reported >= count {
            return Ok(TickOutcome::Finished);
        }
        self.reported += 1;
        reporter.report_issue(IssueReport::new(
            format!("Issue #{}", self.reported),
            Severity::Low,
        ));
        Ok(if self.reported >= count {
            TickOutcome::Finished
        } else {
            TickOutcome::Continue
        })
    }
}

const LEVELS: [Severity; 4] = [Severity::High, Severity::Medium, Severity::Low, Severity::Info];

/// `count` rounds (default 3) of one issue per severity, `delay_ms` apart
/// (default 1500).
#[derive(Debug, Default)]
pub struct IssueGeneratingPlugin;

impl BlockingPlugin for IssueGeneratingPlugin {
    fn run(&mut self, ctx: &PluginContext, reporter: &Reporter) -> Result<(), PluginError> {
        let rounds = ctx.u64("count").unwrap_or(3);
        let delay = millis(ctx, "delay_ms", 1_500);
        let total = rounds * LEVELS.len() as u64;
        let mut produced = 0u64;
        for round in 1..=rounds {
            for severity in LEVELS {
                let mut issue = IssueReport::new(
                    format!("{severity} level issue #{round}"),
                    severity,
                )
                .with_description(format!("Generated {severity} issue, round {round}."))
                .with_solution("Nothing to fix; this issue is generated.")
                .with_url("https://example.com/picket/generated");
                issue.confidence = Some("Firm".into());
                issue.further_info = Some("Produced by IssueGeneratingPlugin.".into());
                reporter.report_issue(issue);
                produced += 1;
                reporter.report_progress(
                    100.0 * produced as f32 / total as f32,
                    format!("Reported {produced} of {total} issues"),
                );
                thread::sleep(delay);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picket_contracts::Report;
    use picket_model::{Configuration, SessionId};

    fn ctx(pairs: &[(&str, u64)]) -> PluginContext {
        let mut configuration = Configuration::new();
        for (key, value) in pairs {
            configuration.insert((*key).into(), (*value).into());
        }
        PluginContext {
            session_id: SessionId::new(),
            configuration,
            work_dir: std::env::temp_dir(),
        }
    }

    fn drain(mut rx: tokio::sync::mpsc::UnboundedReceiver<Report>) -> Vec<Report> {
        let mut reports = Vec::new();
        while let Ok(report) = rx.try_recv() {
            reports.push(report);
        }
        reports
    }

    #[test]
    fn incremental_blocking_reports_four_steps() {
        let (reporter, rx) = Reporter::channel();
        IncrementalBlockingPlugin
            .run(&ctx(&[("step_ms", 0)]), &reporter)
            .unwrap();
        drop(reporter);
        let reports = drain(rx);
        assert_eq!(reports.len(), 8);
        assert!(matches!(&reports[6], Report::Progress(p) if p.percentage == 100.0));
    }

    #[test]
    fn issue_generator_covers_every_level() {
        let (reporter, rx) = Reporter::channel();
        IssueGeneratingPlugin
            .run(&ctx(&[("count", 1), ("delay_ms", 0)]), &reporter)
            .unwrap();
        drop(reporter);
        let severities: Vec<_> = drain(rx)
            .into_iter()
            .filter_map(|report| match report {
                Report::Results(mut issues) => issues.pop().map(|issue| issue.severity),
                _ => None,
            })
            .collect();
        assert_eq!(severities, LEVELS.to_vec());
    }

    #[tokio::test]
    async fn incremental_async_finishes_after_count() {
        let (reporter, rx) = Reporter::channel();
        let ctx = ctx(&[("count", 2)]);
        let mut plugin = IncrementalAsyncPlugin::default();
        assert_eq!(plugin.tick(&ctx, &reporter).await.unwrap(), TickOutcome::Continue);
        assert_eq!(plugin.tick(&ctx, &reporter).await.unwrap(), TickOutcome::Finished);
        drop(reporter);
        assert_eq!(drain(rx).len(), 2);
    }

    #[test]
    fn abort_plugins_request_their_codes() {
        let (reporter, rx) = Reporter::channel();
        AbortedPlugin.run(&ctx(&[]), &reporter).unwrap();
        FailedPlugin.run(&ctx(&[]), &reporter).unwrap();
        drop(reporter);
        assert_eq!(
            drain(rx),
            vec![Report::Abort(EXIT_CODE_ABORTED), Report::Abort(EXIT_CODE_FAILED)]
        );
    }
}
