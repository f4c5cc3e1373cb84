// panwctl - CLI utilities for Palo Alto Networks firewalls and Panorama
// Copyright (C) 2025 panwctl authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! PAN-OS command execution over SSH.
//!
//! Set-format configuration only exists on the CLI, not the XML API, and it
//! requires an interactive session: the output format is per-session state,
//! so the commands are scripted through a PTY shell and the transcript is
//! trimmed afterwards. Arbitrary operational commands use one exec channel
//! per command instead.

use crate::panos::QueryError;
use ssh2::Session;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone)]
pub struct SshAuth {
    pub username: String,
    pub password: Option<String>,
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    pub output: String,
}

/// Retrieve the device configuration in set format.
pub fn fetch_set_config(host: &str, auth: &SshAuth) -> Result<String, QueryError> {
    let session = connect(host, auth)?;

    let mut channel = session
        .channel_session()
        .map_err(|e| QueryError::Network(format!("SSH channel open failed: {e}")))?;
    channel
        .request_pty("vt100", None, None)
        .map_err(|e| QueryError::Network(format!("PTY request failed: {e}")))?;
    channel
        .shell()
        .map_err(|e| QueryError::Network(format!("SSH shell failed: {e}")))?;

    let script = "set cli pager off\n\
                  set cli config-output-format set\n\
                  configure\n\
                  show\n\
                  exit\n\
                  exit\n";
    channel
        .write_all(script.as_bytes())
        .and_then(|_| channel.flush())
        .map_err(|e| QueryError::Network(format!("SSH write failed: {e}")))?;

    let mut transcript = String::new();
    channel
        .read_to_string(&mut transcript)
        .map_err(|e| QueryError::Network(format!("SSH read failed: {e}")))?;
    let _ = channel.wait_close();

    Ok(extract_set_output(&transcript))
}

/// Run operational commands in order, one exec channel per command.
pub fn run_commands(
    host: &str,
    auth: &SshAuth,
    commands: &[String],
) -> Result<Vec<CommandOutput>, QueryError> {
    let session = connect(host, auth)?;

    let mut outputs = Vec::with_capacity(commands.len());
    for command in commands {
        let mut channel = session
            .channel_session()
            .map_err(|e| QueryError::Network(format!("SSH channel open failed: {e}")))?;
        channel
            .exec(command)
            .map_err(|e| QueryError::Network(format!("SSH exec failed: {e}")))?;

        let mut output = String::new();
        channel
            .read_to_string(&mut output)
            .map_err(|e| QueryError::Network(format!("SSH read failed: {e}")))?;
        let mut stderr = String::new();
        let _ = channel.stderr().read_to_string(&mut stderr);
        let _ = channel.wait_close();

        if output.trim().is_empty() && !stderr.trim().is_empty() {
            output = stderr;
        }
        outputs.push(CommandOutput {
            command: command.clone(),
            output: output.trim_end().to_string(),
        });
    }
    Ok(outputs)
}

fn connect(host: &str, auth: &SshAuth) -> Result<Session, QueryError> {
    let (host, port) = split_host_port(host);
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| QueryError::Network(format!("resolving {host}: {e}")))?
        .next()
        .ok_or_else(|| QueryError::Network(format!("no address found for {host}")))?;

    let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
        .map_err(|e| QueryError::Network(format!("SSH connect to {host}:{port} failed: {e}")))?;
    tcp.set_read_timeout(Some(READ_TIMEOUT)).ok();
    tcp.set_write_timeout(Some(READ_TIMEOUT)).ok();

    let mut session =
        Session::new().map_err(|e| QueryError::Network(format!("SSH session init failed: {e}")))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| QueryError::Network(format!("SSH handshake failed: {e}")))?;

    if let Some(key_file) = &auth.key_file {
        session
            .userauth_pubkey_file(&auth.username, None, key_file, None)
            .map_err(|e| QueryError::Auth(format!("SSH key authentication failed: {e}")))?;
    } else {
        let password = auth.password.as_deref().unwrap_or_default();
        session
            .userauth_password(&auth.username, password)
            .map_err(|e| QueryError::Auth(format!("SSH authentication failed: {e}")))?;
    }
    if !session.authenticated() {
        return Err(QueryError::Auth("SSH authentication failed".to_string()));
    }

    Ok(session)
}

fn split_host_port(host: &str) -> (&str, u16) {
    if let Some((name, port)) = host.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            return (name, port);
        }
    }
    (host, DEFAULT_SSH_PORT)
}

// The PTY transcript carries prompts and command echoes around the
// configuration itself: keep what sits between the echoed `show` and the
// `exit` that left configure mode.
fn extract_set_output(transcript: &str) -> String {
    let lines: Vec<&str> = transcript.lines().collect();
    let start = lines
        .iter()
        .position(|l| l.trim_end().ends_with("# show"))
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = lines
        .iter()
        .rposition(|l| l.trim_end().ends_with("# exit"))
        .unwrap_or(lines.len());
    if start >= end {
        return transcript.trim_end().to_string();
    }
    lines[start..end]
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}
