// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]
#![allow(rustdoc::missing_crate_level_docs)]

use std::sync::Arc;

use args::{CmdArgs, Parser};
use driver::kernel::AfPacketOpener;
use interface_manager::{InterfaceManager, RelayState};
use mgmt::ControlListener;

use tracectl::get_trace_ctl;

use tracing::{error, info, level_filters::LevelFilter};

fn init_logging() {
    let tctl = get_trace_ctl();
    info!(" ━━━━━━ ringbus relay started ━━━━━━");

    tctl.set_default_level(LevelFilter::INFO)
        .expect("Setting default loglevel failed");
}

fn process_tracing_cmds(args: &CmdArgs) {
    if let Some(tracing) = args.tracing()
        && let Err(e) = get_trace_ctl().setup_from_string(tracing)
    {
        error!("Invalid tracing configuration: {e}");
        eprintln!("Invalid tracing configuration: {e}");
        std::process::exit(1);
    }
    if args.show_tracing_tags() {
        let out = get_trace_ctl()
            .as_string_by_tag()
            .unwrap_or_else(|e| e.to_string());
        println!("{out}");
        std::process::exit(0);
    }
    if args.show_tracing_targets() {
        let out = get_trace_ctl()
            .as_string()
            .unwrap_or_else(|e| e.to_string());
        println!("{out}");
        std::process::exit(0);
    }
}

fn main() {
    let args = CmdArgs::parse();
    init_logging();
    process_tracing_cmds(&args);

    let config = match args.relay_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Bad relay configuration: {e}");
            std::process::exit(1);
        }
    };
    info!("{config}");

    /* shared state: the bus, the configuration and the shutdown token */
    let state = RelayState::new(config);
    let manager = Arc::new(InterfaceManager::new(state.clone(), AfPacketOpener::new()));

    let listener = match ControlListener::bind(args.control_path()) {
        Ok(listener) => listener,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let shutdown = state.shutdown.clone();
    ctrlc::set_handler(move || shutdown.request()).expect("failed to set SIGINT handler");

    let control = match listener.spawn(manager.clone(), state.shutdown.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    /* the reap loop runs on the main thread until shutdown */
    manager.run();

    if control.join().is_err() {
        error!("Control thread panicked");
    }
    drop(manager);

    let undelivered = state.bus.clear();
    info!("Shutting down relay, {undelivered} undelivered buffers discarded");
    std::process::exit(0);
}

#[cfg(test)]
mod test {
    use tracectl::targets::registered;

    #[test]
    fn target_directives_stay_within_their_modules() {
        let modules: Vec<&str> = registered().iter().map(|t| t.module).collect();
        assert!(modules.contains(&"ringbus_interface_manager::worker"));
        for outer in &modules {
            for inner in &modules {
                if outer != inner && let Some(rest) = inner.strip_prefix(outer) {
                    assert!(
                        rest.starts_with("::"),
                        "directive for {outer} would also govern {inner}"
                    );
                }
            }
        }
    }
}
