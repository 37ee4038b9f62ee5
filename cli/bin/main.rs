// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Relay control tool

mod cmdline;

use std::io::{self, BufRead, Write};
use std::os::unix::net::UnixStream;
use std::process::ExitCode;

use clap::Parser;
use mgmt::{Command, Frame, FrameWriter};

use crate::cmdline::{Cmdline, Line, parse_line};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Failed to connect to relay at {0}: {1}")]
    Connect(String, #[source] io::Error),
    #[error("Failed to send {0}: {1}")]
    Send(Frame, #[source] io::Error),
    #[error("Failed to read input: {0}")]
    Input(#[source] io::Error),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Connect(..) => ExitCode::from(1),
            CliError::Send(..) => ExitCode::from(2),
            CliError::Input(..) => ExitCode::from(3),
        }
    }
}

fn send(writer: &mut FrameWriter<&UnixStream>, frame: Frame) -> Result<(), CliError> {
    let octets = writer
        .write_frame(frame)
        .map_err(|e| CliError::Send(frame, e))?;
    println!("sent {frame} ({}): {octets} octets", Command::from(frame));
    Ok(())
}

fn interactive(writer: &mut FrameWriter<&UnixStream>) -> Result<(), CliError> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();
    loop {
        print!("ringbus> ");
        let _ = io::stdout().flush();
        line.clear();
        if input.read_line(&mut line).map_err(CliError::Input)? == 0 {
            println!();
            return Ok(());
        }
        match parse_line(&line) {
            Ok(Line::Send(frame)) => send(writer, frame)?,
            Ok(Line::Skip) => {}
            Ok(Line::Quit) => return Ok(()),
            Err(e) => eprintln!("{e}"),
        }
    }
}

fn run(cmdline: &Cmdline) -> Result<(), CliError> {
    let stream = UnixStream::connect(&cmdline.path)
        .map_err(|e| CliError::Connect(cmdline.path.clone(), e))?;
    let mut writer = FrameWriter::new(&stream);
    if cmdline.send.is_empty() {
        interactive(&mut writer)
    } else {
        cmdline
            .send
            .iter()
            .try_for_each(|frame| send(&mut writer, *frame))
    }
}

fn main() -> ExitCode {
    let cmdline = Cmdline::parse();
    match run(&cmdline) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    }
}
