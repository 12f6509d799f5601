//! Header checks against a single target URL.

use std::time::Duration;

use picket_contracts::prelude::*;
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use tracing::debug;
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Reports whether the target sets a usable `X-Frame-Options` header.
#[derive(Debug, Default)]
pub struct XFrameOptionsPlugin;

/// Reports whether an https target sets `Strict-Transport-Security`.
#[derive(Debug, Default)]
pub struct HstsPlugin;

impl BlockingPlugin for XFrameOptionsPlugin {
    fn run(&mut self, ctx: &PluginContext, reporter: &Reporter) -> Result<(), PluginError> {
        let target = target_url(ctx)?;
        let headers = fetch_headers(&target)?;
        reporter.report_issue(xframe_issue(
            headers
                .get("x-frame-options")
                .and_then(|value| value.to_str().ok()),
        ));
        Ok(())
    }
}

impl BlockingPlugin for HstsPlugin {
    fn run(&mut self, ctx: &PluginContext, reporter: &Reporter) -> Result<(), PluginError> {
        let target = target_url(ctx)?;
        let headers = fetch_headers(&target)?;
        reporter.report_issue(hsts_issue(
            &target,
            headers.contains_key("strict-transport-security"),
        ));
        Ok(())
    }
}

pub(crate) fn target_url(ctx: &PluginContext) -> Result<Url, PluginError> {
    let raw = ctx.require_string("target")?;
    Url::parse(raw).map_err(|err| PluginError::Configuration(format!("bad target `{raw}`: {err}")))
}

fn fetch_headers(target: &Url) -> Result<HeaderMap, PluginError> {
    let client = Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|err| PluginError::Failed(err.to_string()))?;
    debug!(%target, "fetching target");
    let response = client
        .get(target.clone())
        .send()
        .map_err(|err| PluginError::Failed(format!("request to {target} failed: {err}")))?;
    if response.status() != reqwest::StatusCode::OK {
        return Err(PluginError::Failed(format!(
            "{target} answered with status {}",
            response.status()
        )));
    }
    Ok(response.headers().clone())
}

pub(crate) fn xframe_issue(header: Option<&str>) -> IssueReport {
    match header {
        None => IssueReport::new("Site has no X-Frame-Options header set", Severity::High)
            .with_description(
                "The response does not set X-Frame-Options, so the page can be framed by \
                 other origins.",
            )
            .with_solution("Send X-Frame-Options: DENY or SAMEORIGIN.")
            .with_url("https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/X-Frame-Options"),
        Some(value) => {
            let normalized = value.trim().to_ascii_uppercase();
            if normalized == "DENY" || normalized == "SAMEORIGIN" {
                IssueReport::new("Site has a correct X-Frame-Options header", Severity::Info)
            } else {
                IssueReport::new("Site has X-Frame-Options header but it has an unknown or invalid value", Severity::High)
                    .with_description(format!("X-Frame-Options is set to `{value}`."))
                    .with_solution("Use DENY or SAMEORIGIN.")
            }
        }
    }
}

pub(crate) fn hsts_issue(target: &Url, header_present: bool) -> IssueReport {
    if target.scheme() != "https" {
        return IssueReport::new("Target is not https; HSTS does not apply", Severity::Info);
    }
    if header_present {
        IssueReport::new("Site sets HSTS header", Severity::Info)
    } else {
        IssueReport::new("Site does not set HSTS header", Severity::High)
            .with_description(
                "The response does not set Strict-Transport-Security, so browsers may be \
                 downgraded to plain http.",
            )
            .with_url("https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Strict-Transport-Security")
    }
}
