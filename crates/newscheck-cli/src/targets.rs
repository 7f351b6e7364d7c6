//! Trailing `[PORT] SOURCE_DIR` arguments of the command line.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use newscheck_core::{Error, Result};
use newscheck_harness::Action;

/// Where a run points the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Targets {
    pub(crate) port: Option<u16>,
    pub(crate) source_dir: PathBuf,
}

/// Split the trailing arguments for `action`.
///
/// `server` and `all` take `PORT SOURCE_DIR`; the batch checks take only
/// `SOURCE_DIR`. Directories need not be valid UTF-8.
pub(crate) fn resolve(action: Action, args: &[OsString]) -> Result<Targets> {
    match (action.needs_port(), args) {
        (true, [port, source_dir]) => Ok(Targets {
            port: Some(parse_port(port)?),
            source_dir: PathBuf::from(source_dir),
        }),
        (true, [port]) => {
            parse_port(port)?;
            Err(Error::Environment("source_dir not found".to_string()))
        }
        (false, [source_dir]) => Ok(Targets {
            port: None,
            source_dir: PathBuf::from(source_dir),
        }),
        _ => {
            let shown: Vec<_> = args.iter().map(|arg| arg.to_string_lossy()).collect();
            Err(Error::Environment(format!(
                "unexpected arguments: {}",
                shown.join(" ")
            )))
        }
    }
}

fn parse_port(raw: &OsStr) -> Result<u16> {
    match raw.to_str().map(str::parse::<u16>) {
        Some(Ok(port)) if port > 0 => Ok(port),
        _ => Err(Error::Environment(format!(
            "Invalid port: {}",
            raw.to_string_lossy()
        ))),
    }
}
