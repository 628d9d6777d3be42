// Copyright 2026 The Anvil Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Spawns external commands and reports their outcome.
//!
//! Callers are expected to invoke [`run_command`] through a `JobPool` (`anvil-jobpool`) so
//! that process concurrency stays bounded; this crate has no opinion on scheduling, only on
//! one spawn.

use std::fmt;
use std::process::Stdio;

use console::style;

/// An expected, task-scoped build failure.
///
/// Cloneable because a memoized task's outcome is observed by every concurrent awaiter of
/// that task (`anvil-engine`'s scheduler), not only the one that triggered the run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildError(pub String);

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BuildError {}

impl BuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Characters that force single-quoting of a shell-pretty-printed token, per POSIX `sh`
/// word-splitting and glob/expansion metacharacters.
const SPECIAL: &[char] = &[
    ' ', '\t', '\n', '!', '"', '\'', '$', '&', '(', ')', '*', ',', ';', '<', '>', '?', '[', '\\',
    ']', '^', '`', '{', '|', '}', '~',
];

/// Quotes a single argv token for human-readable display: wraps it in single quotes
/// (doubling any embedded single quote) iff the token contains a shell metacharacter or
/// starts with `=` or `#`. This is presentation only — the process is never actually
/// spawned through a shell.
pub fn quote_token(token: &str) -> String {
    let needs_quoting = token.is_empty()
        || token.contains(SPECIAL)
        || token.starts_with('=')
        || token.starts_with('#');
    if !needs_quoting {
        return token.to_string();
    }
    let mut quoted = String::with_capacity(token.len() + 2);
    quoted.push('\'');
    for ch in token.chars() {
        if ch == '\'' {
            quoted.push_str("''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Pretty-prints an argv as a shell-safe-looking (but never shell-interpreted) command line.
pub fn pretty_argv(argv: &[String]) -> String {
    argv.iter().map(|t| quote_token(t)).collect::<Vec<_>>().join(" ")
}

/// Spawns `argv[0]` with `argv[1..]`, no shell, inheriting stdout/stderr with stdin closed.
///
/// Prints `message` dimmed, followed by the pretty-printed command, before spawning.
/// Resolves `Ok(())` on exit code 0; any other outcome (nonzero exit, signal, spawn error)
/// becomes a [`BuildError`] naming the exit status and the command.
pub async fn run_command(argv: &[String], message: &str) -> Result<(), BuildError> {
    assert!(!argv.is_empty(), "argv must name a program to execute");

    let pretty = pretty_argv(argv);
    log::debug!("spawning: {pretty}");
    println!("{}", style(message).dim());
    println!("{}", style(&pretty).dim());

    let status = tokio::process::Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| BuildError::new(format!("failed to spawn `{pretty}`: {e}")))?;

    if status.success() {
        return Ok(());
    }

    let detail = match status.code() {
        Some(code) => format!("exited with code {code}"),
        None => "terminated by signal".to_string(),
    };
    Err(BuildError::new(format!(
        "{}",
        style(format!("command {detail}: {pretty}")).red()
    )))
}
