//! Operator console.
//!
//! Line commands read from stdin that adjust the engine's knobs or list what
//! the rule tree currently contains.

use crate::engine::{ForcedError, MockEngine};
use crate::store::RuleProvider;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

const HELP: &str = "\
commands:
  error <code|keyword> [path]  fail the next request (optionally only one whose path contains [path])
  delay <ms>                   delay every response
  rate <0..1>                  randomly fail this fraction of requests
  reset                        clear forced error, delay and rate
  routes                       list discovered routes
  scenarios                    list error scenarios
  status                       show current settings and counters
  help                         show this help";

/// Console parse failures.
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("rate must be within 0..1, got {0}")]
    RateOutOfRange(f64),
}

/// A parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    ForceError(ForcedError),
    Delay(u64),
    Rate(f64),
    Reset,
    Routes,
    Scenarios,
    Status,
    Help,
}

impl OperatorCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let parsed = match (command.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("error", [code]) => OperatorCommand::ForceError(ForcedError::parse(code)),
            ("error", [code, path]) => {
                OperatorCommand::ForceError(ForcedError::parse(code).scoped_to(*path))
            }
            ("error", _) => return Err(CommandError::Usage("error <code|keyword> [path]")),
            ("delay", [ms]) => OperatorCommand::Delay(
                ms.parse()
                    .map_err(|_| CommandError::InvalidNumber(ms.to_string()))?,
            ),
            ("delay", _) => return Err(CommandError::Usage("delay <ms>")),
            ("rate", [rate]) => {
                let rate: f64 = rate
                    .parse()
                    .map_err(|_| CommandError::InvalidNumber(rate.to_string()))?;
                if !(0.0..=1.0).contains(&rate) {
                    return Err(CommandError::RateOutOfRange(rate));
                }
                OperatorCommand::Rate(rate)
            }
            ("rate", _) => return Err(CommandError::Usage("rate <0..1>")),
            ("reset", []) => OperatorCommand::Reset,
            ("routes", []) => OperatorCommand::Routes,
            ("scenarios", []) => OperatorCommand::Scenarios,
            ("status", []) => OperatorCommand::Status,
            ("help" | "?", _) => OperatorCommand::Help,
            (other, _) => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(Some(parsed))
    }
}

/// Apply a command and return the text to show the operator.
pub async fn apply<P: RuleProvider>(engine: &MockEngine<P>, command: OperatorCommand) -> String {
    let knobs = engine.knobs();
    match command {
        OperatorCommand::ForceError(forced) => {
            let scope = forced
                .path_filter
                .as_deref()
                .map(|p| format!(" for paths containing {:?}", p))
                .unwrap_or_default();
            let status = forced.status;
            knobs.arm(forced).await;
            format!("next request{} will fail with {}", scope, status)
        }
        OperatorCommand::Delay(ms) => {
            knobs.set_delay_ms(ms);
            format!("delay set to {}ms", ms)
        }
        OperatorCommand::Rate(rate) => {
            knobs.set_error_rate(rate);
            format!("error rate set to {}", rate)
        }
        OperatorCommand::Reset => {
            knobs.disarm().await;
            knobs.set_delay_ms(0);
            knobs.set_error_rate(0.0);
            "forced error cleared, delay 0ms, error rate 0".to_string()
        }
        OperatorCommand::Routes => match engine.routes() {
            Ok(routes) if routes.is_empty() => "no routes found".to_string(),
            Ok(routes) => routes.iter().fold(String::new(), |mut out, r| {
                let _ = writeln!(out, "{:<8}{}", r.method, r.path);
                out
            }),
            Err(e) => format!("failed to list routes: {}", e),
        },
        OperatorCommand::Scenarios => match engine.scenarios() {
            Ok(scenarios) if scenarios.is_empty() => "no error scenarios found".to_string(),
            Ok(scenarios) => scenarios.iter().fold(String::new(), |mut out, s| {
                let _ = writeln!(out, "{:<8}{:<30}{}", s.method, s.path, s.name);
                out
            }),
            Err(e) => format!("failed to list scenarios: {}", e),
        },
        OperatorCommand::Status => {
            let stats = engine.stats();
            let forced = match knobs.armed().await {
                Some(f) => f.status.to_string(),
                None => "none".to_string(),
            };
            format!(
                "delay {}ms, error rate {}, forced error {}\nrequests {} (matched {}, unmatched {}, errors {})",
                knobs.delay_ms(),
                knobs.error_rate(),
                forced,
                stats.total,
                stats.matched,
                stats.unmatched,
                stats.errors
            )
        }
        OperatorCommand::Help => HELP.to_string(),
    }
}

/// Read commands from stdin until it closes.
pub async fn run<P: RuleProvider>(engine: Arc<MockEngine<P>>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("operator console ready, type `help` for commands");

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match OperatorCommand::parse(&line) {
                Ok(Some(command)) => {
                    debug!(?command, "Operator command");
                    println!("{}", apply(&engine, command).await.trim_end());
                }
                Ok(None) => {}
                Err(e) => println!("{}", e),
            },
            Ok(None) => {
                debug!("Console input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read console input");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalSettings;
    use crate::testing::{store_for, write_rule};

    #[test]
    fn test_parse_error_commands() {
        assert_eq!(
            OperatorCommand::parse("error 503").unwrap(),
            Some(OperatorCommand::ForceError(ForcedError::new(503)))
        );
        assert_eq!(
            OperatorCommand::parse("ERROR unauthorized /users").unwrap(),
            Some(OperatorCommand::ForceError(ForcedError::new(401).scoped_to("/users")))
        );
        assert!(matches!(
            OperatorCommand::parse("error"),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn test_parse_knob_commands() {
        assert_eq!(OperatorCommand::parse("delay 250").unwrap(), Some(OperatorCommand::Delay(250)));
        assert_eq!(OperatorCommand::parse("rate 0.5").unwrap(), Some(OperatorCommand::Rate(0.5)));
        assert_eq!(
            OperatorCommand::parse("delay soon"),
            Err(CommandError::InvalidNumber("soon".to_string()))
        );
        assert_eq!(OperatorCommand::parse("rate 2"), Err(CommandError::RateOutOfRange(2.0)));
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(OperatorCommand::parse("   ").unwrap(), None);
        assert_eq!(OperatorCommand::parse("routes").unwrap(), Some(OperatorCommand::Routes));
        assert_eq!(OperatorCommand::parse("?").unwrap(), Some(OperatorCommand::Help));
        assert_eq!(
            OperatorCommand::parse("explode"),
            Err(CommandError::Unknown("explode".to_string()))
        );
        assert!(OperatorCommand::parse("reset now").is_err());
    }

    #[tokio::test]
    async fn test_apply_updates_knobs() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MockEngine::new(store_for(dir.path()), GlobalSettings::default());

        apply(&engine, OperatorCommand::Delay(40)).await;
        apply(&engine, OperatorCommand::Rate(0.25)).await;
        let out = apply(&engine, OperatorCommand::ForceError(ForcedError::new(404))).await;
        assert!(out.contains("404"));
        assert_eq!(engine.knobs().delay_ms(), 40);
        assert_eq!(engine.knobs().error_rate(), 0.25);
        assert!(engine.knobs().armed().await.is_some());

        apply(&engine, OperatorCommand::Reset).await;
        assert_eq!(engine.knobs().delay_ms(), 0);
        assert_eq!(engine.knobs().error_rate(), 0.0);
        assert!(engine.knobs().armed().await.is_none());
    }

    #[tokio::test]
    async fn test_apply_listings() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MockEngine::new(store_for(dir.path()), GlobalSettings::default());
        assert_eq!(apply(&engine, OperatorCommand::Routes).await, "no routes found");

        write_rule(dir.path(), "users/{id}/GET.json", "{}");
        write_rule(dir.path(), "users/{id}/errors/GET_forbidden.json", "{}");

        let routes = apply(&engine, OperatorCommand::Routes).await;
        assert!(routes.contains("GET") && routes.contains("/users/{id}"));

        let scenarios = apply(&engine, OperatorCommand::Scenarios).await;
        assert!(scenarios.contains("forbidden"));

        let status = apply(&engine, OperatorCommand::Status).await;
        assert!(status.contains("forced error none"));
    }
}
