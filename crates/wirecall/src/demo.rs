//! The method set served by `wirecall serve` and spoken by `wirecall call`.

use std::fmt;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use wirecall_rpc::{BoxError, Method, Performer};

use crate::exit::{CliError, CliResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoMethod {
    Echo { text: String },
    Sleep { millis: u64 },
    Fail { message: String },
    Add { a: i64, b: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoOutcome {
    Text(String),
    Number(i64),
    Slept { millis: u64 },
}

impl Method for DemoMethod {
    type Response = DemoOutcome;
}

impl fmt::Display for DemoOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemoOutcome::Text(text) => f.write_str(text),
            DemoOutcome::Number(n) => write!(f, "{n}"),
            DemoOutcome::Slept { millis } => write!(f, "slept {millis} ms"),
        }
    }
}

/// Method names accepted on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum MethodName {
    Echo,
    Sleep,
    Fail,
    Add,
}

impl MethodName {
    pub fn as_str(self) -> &'static str {
        match self {
            MethodName::Echo => "echo",
            MethodName::Sleep => "sleep",
            MethodName::Fail => "fail",
            MethodName::Add => "add",
        }
    }

    /// Build the method from its positional arguments.
    pub fn with_args(self, args: &[String]) -> CliResult<DemoMethod> {
        match (self, args) {
            (MethodName::Echo, _) => Ok(DemoMethod::Echo {
                text: args.join(" "),
            }),
            (MethodName::Fail, _) => Ok(DemoMethod::Fail {
                message: if args.is_empty() {
                    "requested failure".to_string()
                } else {
                    args.join(" ")
                },
            }),
            (MethodName::Sleep, [millis]) => Ok(DemoMethod::Sleep {
                millis: parse_arg("sleep", "millis", millis)?,
            }),
            (MethodName::Add, [a, b]) => Ok(DemoMethod::Add {
                a: parse_arg("add", "a", a)?,
                b: parse_arg("add", "b", b)?,
            }),
            (MethodName::Sleep, _) => Err(CliError::usage(
                "sleep takes exactly one argument: <millis>",
            )),
            (MethodName::Add, _) => Err(CliError::usage(
                "add takes exactly two arguments: <a> <b>",
            )),
        }
    }
}

fn parse_arg<T: std::str::FromStr>(method: &str, name: &str, value: &str) -> CliResult<T> {
    value
        .parse()
        .map_err(|_| CliError::usage(format!("{method}: invalid {name}: {value}")))
}

/// Performs [`DemoMethod`]s for `wirecall serve`.
pub struct DemoPerformer;

impl Performer<DemoMethod> for DemoPerformer {
    async fn perform(&self, method: DemoMethod) -> Result<DemoOutcome, BoxError> {
        match method {
            DemoMethod::Echo { text } => Ok(DemoOutcome::Text(text)),
            DemoMethod::Sleep { millis } => {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(DemoOutcome::Slept { millis })
            }
            DemoMethod::Fail { message } => Err(message.into()),
            DemoMethod::Add { a, b } => a
                .checked_add(b)
                .map(DemoOutcome::Number)
                .ok_or_else(|| format!("{a} + {b} overflows").into()),
        }
    }
}
