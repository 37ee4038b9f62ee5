// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime control of the tracing subscriber.
//!
//! A single [`TracingControl`] owns the levels of every registered [`TraceTarget`] and regenerates
//! the subscriber's [`EnvFilter`] whenever one of them changes.

use std::fmt::Write;
use std::sync::OnceLock;

use ordermap::OrderMap;
use parking_lot::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use crate::targets::{self, TraceTarget};

/// The level applied to events that no registered target governs.
pub const DEFAULT_DEFAULT_LOGLEVEL: LevelFilter = LevelFilter::INFO;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TraceCtlError {
    #[error("Invalid syntax in '{0}': expected selector=level")]
    InvalidSyntax(String),
    #[error("Invalid log level '{0}': allowed values are off,error,warn,info,debug,trace")]
    InvalidLevel(String),
    #[error("Unknown target or tag '{0}'")]
    UnknownSelector(String),
    #[error("Failed to reload tracing filter: {0}")]
    ReloadFailed(String),
    #[error("Failed to format tracing configuration")]
    Format,
}

impl From<std::fmt::Error> for TraceCtlError {
    fn from(_: std::fmt::Error) -> Self {
        TraceCtlError::Format
    }
}

/// What a single `selector=level` directive applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Events outside of any registered target.
    Default,
    /// Every registered target.
    All,
    /// A target name or a tag.
    Named(String),
}

fn level_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::OFF => "off",
        LevelFilter::ERROR => "error",
        LevelFilter::WARN => "warn",
        LevelFilter::INFO => "info",
        LevelFilter::DEBUG => "debug",
        _ => "trace",
    }
}

/// Parse a level name.
pub fn parse_level(input: &str) -> Result<LevelFilter, TraceCtlError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "off" => Ok(LevelFilter::OFF),
        "error" => Ok(LevelFilter::ERROR),
        "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(TraceCtlError::InvalidLevel(input.to_owned())),
    }
}

/// Parse a tracing configuration string such as `default=error,all=info,relay-bus=debug`.
pub fn parse_config(config: &str) -> Result<Vec<(Selector, LevelFilter)>, TraceCtlError> {
    config
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (selector, level) = item
                .split_once('=')
                .ok_or_else(|| TraceCtlError::InvalidSyntax(item.to_owned()))?;
            let level = parse_level(level)?;
            let selector = match selector.trim() {
                "" => return Err(TraceCtlError::InvalidSyntax(item.to_owned())),
                "default" => Selector::Default,
                "all" => Selector::All,
                name => Selector::Named(name.to_owned()),
            };
            Ok((selector, level))
        })
        .collect()
}

struct State {
    default: LevelFilter,
    levels: Vec<LevelFilter>,
}

/// Owner of the logging configuration of the process.
pub struct TracingControl {
    targets: &'static [TraceTarget],
    state: Mutex<State>,
    reload: Option<reload::Handle<EnvFilter, Registry>>,
}

static TRACE_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get the process-wide [`TracingControl`], installing the subscriber on first use.
///
/// If some other subscriber was installed first (e.g. by a test harness) the control still keeps
/// track of levels but has no effect on what gets logged.
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACE_CTL.get_or_init(|| TracingControl::install(targets::registered()))
}

impl TracingControl {
    fn install(targets: &'static [TraceTarget]) -> Self {
        let mut ctl = Self::detached(targets);
        let (layer, handle) = reload::Layer::new(ctl.build_filter());
        let installed = tracing_subscriber::registry()
            .with(layer)
            .with(fmt::layer().with_thread_names(true))
            .try_init()
            .is_ok();
        if installed {
            ctl.reload = Some(handle);
        }
        ctl
    }

    /// A control that is not attached to any subscriber.
    fn detached(targets: &'static [TraceTarget]) -> Self {
        Self {
            targets,
            state: Mutex::new(State {
                default: DEFAULT_DEFAULT_LOGLEVEL,
                levels: targets.iter().map(|t| t.level).collect(),
            }),
            reload: None,
        }
    }

    /// The directives currently in effect, in [`EnvFilter`] syntax.
    #[must_use]
    pub fn filter_string(&self) -> String {
        let state = self.state.lock();
        let mut out = level_str(state.default).to_string();
        for (target, level) in self.targets.iter().zip(state.levels.iter()) {
            let _ = write!(out, ",{}={}", target.module, level_str(*level));
        }
        out
    }

    fn build_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(DEFAULT_DEFAULT_LOGLEVEL.into())
            .parse_lossy(self.filter_string())
    }

    fn refresh(&self) -> Result<(), TraceCtlError> {
        if let Some(handle) = &self.reload {
            handle
                .reload(self.build_filter())
                .map_err(|e| TraceCtlError::ReloadFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn apply(&self, selector: &Selector, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut state = self.state.lock();
        match selector {
            Selector::Default => state.default = level,
            Selector::All => state.levels.iter_mut().for_each(|l| *l = level),
            Selector::Named(name) => {
                let mut matched = false;
                for (target, current) in self.targets.iter().zip(state.levels.iter_mut()) {
                    if target.name == name.as_str() || target.has_tag(name) {
                        *current = level;
                        matched = true;
                    }
                }
                if !matched {
                    return Err(TraceCtlError::UnknownSelector(name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Set the level for events that no registered target governs.
    pub fn set_default_level(&self, level: LevelFilter) -> Result<(), TraceCtlError> {
        self.apply(&Selector::Default, level)?;
        self.refresh()
    }

    /// Apply a configuration string. Directives are applied in order, so later ones win.
    /// Nothing is applied if any directive is invalid.
    pub fn setup_from_string(&self, config: &str) -> Result<(), TraceCtlError> {
        let directives = parse_config(config)?;
        for (selector, _) in &directives {
            if let Selector::Named(name) = selector
                && !self
                    .targets
                    .iter()
                    .any(|t| t.name == name.as_str() || t.has_tag(name))
            {
                return Err(TraceCtlError::UnknownSelector(name.clone()));
            }
        }
        for (selector, level) in &directives {
            self.apply(selector, *level)?;
        }
        self.refresh()
    }

    /// Current level of the target with the given name, if registered.
    #[must_use]
    pub fn level_of(&self, name: &str) -> Option<LevelFilter> {
        let state = self.state.lock();
        self.targets
            .iter()
            .zip(state.levels.iter())
            .find(|(t, _)| t.name == name)
            .map(|(_, l)| *l)
    }

    /// Render the registered targets and their levels.
    pub fn as_string(&self) -> Result<String, TraceCtlError> {
        let state = self.state.lock();
        let mut out = String::new();
        writeln!(out, "━━━━━━━━━━━━━━━━━━━━━━━━ trace targets ━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(out, " {:<24} {:<8} {:<40} tags", "target", "level", "module")?;
        writeln!(out, " {:<24} {:<8}", "default", level_str(state.default))?;
        for (target, level) in self.targets.iter().zip(state.levels.iter()) {
            writeln!(
                out,
                " {:<24} {:<8} {:<40} {}",
                target.name,
                level_str(*level),
                target.module,
                target.tags.join(",")
            )?;
        }
        Ok(out)
    }

    /// Render the known tags together with the targets they select.
    pub fn as_string_by_tag(&self) -> Result<String, TraceCtlError> {
        let mut by_tag: OrderMap<&str, Vec<&str>> = OrderMap::new();
        for target in self.targets {
            for tag in target.tags {
                by_tag.entry(*tag).or_default().push(target.name);
            }
        }
        let mut out = String::new();
        writeln!(out, "━━━━━━━━━━━━━━━━━━━━━━━━━ trace tags ━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for (tag, names) in &by_tag {
            writeln!(out, " {tag:<16} {}", names.join(" "))?;
        }
        Ok(out)
    }
}
