//! Port scan by wrapping the `nmap` binary.

use std::sync::LazyLock;

use picket_contracts::prelude::*;
use regex::Regex;

use super::web::target_url;

static OPEN_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)/(tcp|udp)\s+open\s+(\S+)").expect("static regex")
});

static PORT_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((U|T):)?\d+(-\d+)?(,((U|T):)?\d+(-\d+)?)*$").expect("static regex")
});

/// Ports that are expected to be reachable on a web target.
const EXPECTED_PORTS: [u16; 2] = [80, 443];

/// An open port line from nmap's normal output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPort {
    pub port: u16,
    pub protocol: String,
    pub service: String,
}

pub(crate) fn parse_open_port(line: &str) -> Option<OpenPort> {
    let captures = OPEN_PORT.captures(line.trim_end())?;
    Some(OpenPort {
        port: captures[1].parse().ok()?,
        protocol: captures[2].to_string(),
        service: captures[3].to_string(),
    })
}

pub(crate) fn valid_port_spec(spec: &str) -> bool {
    PORT_SPEC.is_match(spec)
}

fn port_issue(open: &OpenPort) -> IssueReport {
    let severity = if EXPECTED_PORTS.contains(&open.port) {
        Severity::Info
    } else {
        Severity::High
    };
    IssueReport::new(format!("Port {} is open", open.port), severity).with_description(format!(
        "{}/{} is open and serving `{}`.",
        open.port, open.protocol, open.service
    ))
}

/// Runs `nmap --open [-p ports] host` and reports one issue per open port.
#[derive(Debug, Default)]
pub struct NmapPlugin {
    program: Option<String>,
    open_ports: Vec<OpenPort>,
}

impl NmapPlugin {
    /// Use `program` instead of `nmap` from `PATH`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: Some(program.into()),
            open_ports: Vec::new(),
        }
    }
}

impl ExternalProcessPlugin for NmapPlugin {
    fn command(&mut self, ctx: &PluginContext) -> Result<ExternalCommand, PluginError> {
        let target = target_url(ctx)?;
        let host = target
            .host_str()
            .ok_or_else(|| PluginError::Configuration(format!("target `{target}` has no host")))?
            .to_string();

        let mut args = vec!["--open".to_string()];
        if let Some(ports) = ctx.string("ports") {
            if !valid_port_spec(ports) {
                return Err(PluginError::Configuration(format!("invalid ports `{ports}`")));
            }
            args.push("-p".into());
            args.push(ports.to_string());
        }
        args.push(host);

        let program = self
            .program
            .clone()
            .or_else(|| ctx.string("nmap_program").map(str::to_string))
            .unwrap_or_else(|| "nmap".to_string());
        Ok(ExternalCommand { program, args })
    }

    fn on_stdout(&mut self, line: &str, _reporter: &Reporter) {
        if let Some(open) = parse_open_port(line) {
            self.open_ports.push(open);
        }
    }

    fn on_stderr(&mut self, line: &str, _reporter: &Reporter) {
        tracing::debug!(target: "picket::nmap", "{line}");
    }

    fn on_exit(&mut self, status: Option<i32>, reporter: &Reporter) -> Result<(), PluginError> {
        match status {
            Some(0) => {
                reporter.report_results(self.open_ports.iter().map(port_issue).collect());
                Ok(())
            }
            Some(code) => Err(PluginError::Failed(format!("nmap exited with status {code}"))),
            None => Err(PluginError::Failed("nmap was killed".into())),
        }
    }
}
