// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Registry of trace targets.
//!
//! Crates declare the targets they log to with [`trace_target!`]. Each declaration is collected at
//! link time so that the [`crate::TracingControl`] can list them and change their levels at runtime
//! without the crates having to register anything explicitly.

use tracing_subscriber::filter::LevelFilter;

/// A named logging target, bound to the module that declared it.
#[derive(Debug)]
pub struct TraceTarget {
    /// Name operators use to refer to the target.
    pub name: &'static str,
    /// Module path whose events this target governs (including its submodules).
    pub module: &'static str,
    /// Level applied when nothing else is configured.
    pub level: LevelFilter,
    /// Tags allow configuring several targets at once.
    pub tags: &'static [&'static str],
}

impl TraceTarget {
    #[must_use]
    pub const fn new(
        name: &'static str,
        module: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            module,
            level,
            tags,
        }
    }

    /// Tell if the target carries the given tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag)
    }
}

#[linkme::distributed_slice]
pub static TRACE_TARGETS: [TraceTarget];

/// All the targets linked into this binary.
#[must_use]
pub fn registered() -> &'static [TraceTarget] {
    &TRACE_TARGETS
}

/// Declare a trace target for the calling module.
///
/// ```ignore
/// trace_target!("relay-bus", LevelFilter::INFO, &["relay"]);
/// ```
#[macro_export]
macro_rules! trace_target {
    ($name:expr, $level:expr, $tags:expr) => {
        const _: () = {
            #[$crate::linkme::distributed_slice($crate::targets::TRACE_TARGETS)]
            #[linkme(crate = $crate::linkme)]
            static TARGET: $crate::targets::TraceTarget = {
                #[allow(unused_imports)]
                use $crate::LevelFilter;
                $crate::targets::TraceTarget::new($name, module_path!(), $level, $tags)
            };
        };
    };
}
