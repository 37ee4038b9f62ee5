// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Cmd line of the relay control tool

use clap::Parser;
use mgmt::Frame;

pub(crate) const DEFAULT_CONTROL_PATH: &str = "/var/run/ringbus/control.sock";

/// Parse a frame given as `INDEX<sep>CODE`.
fn parse_pair(input: &str, sep: impl Fn(char) -> bool) -> Result<Frame, String> {
    let mut fields = input.trim().split(sep).filter(|f| !f.is_empty());
    let (Some(index), Some(code), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(format!("Bad syntax '{input}': expected INDEX and MODE"));
    };
    let index = index
        .parse::<i32>()
        .map_err(|e| format!("Bad interface index '{index}': {e}"))?;
    let code = code
        .parse::<i32>()
        .map_err(|e| format!("Bad mode '{code}': {e}"))?;
    Ok(Frame::new(index, code))
}

/// Parse a `--send` argument, `INDEX,MODE`.
pub(crate) fn parse_send(input: &str) -> Result<Frame, String> {
    parse_pair(input, |c| c == ',')
}

/// What an interactive line asks for.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Line {
    Send(Frame),
    Skip,
    Quit,
}

/// Parse an interactive line, `INDEX MODE`.
pub(crate) fn parse_line(input: &str) -> Result<Line, String> {
    let line = input.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Line::Skip);
    }
    if line == "quit" || line == "exit" {
        return Ok(Line::Quit);
    }
    parse_pair(line, char::is_whitespace).map(Line::Send)
}

#[derive(Parser)]
#[command(name = "ringbus-cli")]
#[command(about = "Send control commands to a ringbus relay", long_about = None)]
#[command(
    after_help = "MODE is 1 (receive only), 2 (transmit only) or 3 (bidirectional) to start an interface or change its direction, 10 to detach it and 11 to attach it.
Without --send, commands are read from stdin, one 'INDEX MODE' per line."
)]
pub struct Cmdline {
    #[arg(
        long,
        value_name = "Control socket path",
        default_value = DEFAULT_CONTROL_PATH,
        help = "Path where the relay listens for control commands"
    )]
    pub path: String,

    #[arg(
        long,
        value_name = "INDEX,MODE",
        value_parser = parse_send,
        help = "Command to send; may be repeated, commands are sent in order"
    )]
    pub send: Vec<Frame>,
}
