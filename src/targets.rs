use std::io::{self, BufRead, IsTerminal};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error(
        "no targets to query; pass hosts as arguments, pipe one per line on stdin, or save a default with `panwctl configure`"
    )]
    NoTargets,
}

/// The resolved batch plus where it came from, so callers can adjust
/// behavior for piped invocations (host-prefixed output, no prompting).
#[derive(Debug, PartialEq, Eq)]
pub struct Resolved {
    pub targets: Vec<String>,
    pub from_stdin: bool,
}

/// Precedence: explicit arguments, then piped stdin lines, then the saved
/// default. Reads stdin only when it is not a terminal.
pub fn resolve(args: &[String], default: Option<&str>) -> Result<Resolved, ResolutionError> {
    let stdin = io::stdin();
    let piped_lines = if args.is_empty() && !stdin.is_terminal() {
        Some(stdin.lock().lines().map_while(Result::ok).collect())
    } else {
        None
    };
    from_sources(args, piped_lines, default)
}

fn from_sources(
    args: &[String],
    piped_lines: Option<Vec<String>>,
    default: Option<&str>,
) -> Result<Resolved, ResolutionError> {
    if !args.is_empty() {
        return finish(normalize(args.iter().map(String::as_str)), false);
    }
    if let Some(lines) = piped_lines {
        return finish(normalize(lines.iter().map(String::as_str)), true);
    }
    match default {
        Some(host) => finish(normalize([host]), false),
        None => Err(ResolutionError::NoTargets),
    }
}

fn finish(targets: Vec<String>, from_stdin: bool) -> Result<Resolved, ResolutionError> {
    if targets.is_empty() {
        return Err(ResolutionError::NoTargets);
    }
    Ok(Resolved {
        targets,
        from_stdin,
    })
}

// Trim, drop empties (PowerShell pipelines emit blank lines), and
// de-duplicate while keeping first-seen order.
fn normalize<'a, I>(hosts: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = std::collections::HashSet::new();
    hosts
        .into_iter()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .filter(|h| seen.insert(h.to_string()))
        .map(str::to_string)
        .collect()
}
