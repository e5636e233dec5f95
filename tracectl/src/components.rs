// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link-time registry of log components across all linked crates

use crate::LevelFilter;
use linkme::distributed_slice;

/// A statically declared log component.
pub struct SComponent {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
}
impl SComponent {
    #[must_use]
    pub const fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            target,
            name,
            level,
            tags,
        }
    }
}

#[distributed_slice]
pub static LOG_COMPONENTS: [SComponent];

#[doc(hidden)]
#[macro_export]
macro_rules! log_component_deps {
    () => {
        use linkme::distributed_slice;
        use $crate::components::{LOG_COMPONENTS, SComponent};
    };
}

/// Declares the calling module as a log component, with a display name, a default level and
/// tags. The tracing target is the module path of the caller.
#[macro_export]
macro_rules! log_component {
    // the const scope keeps the static name private to each invocation
    ($name:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::log_component_deps;
            log_component_deps!();

            #[distributed_slice(LOG_COMPONENTS)]
            static LOG_COMPONENT: SComponent = SComponent::new(module_path!(), $name, $level, $tags);
        };
    };
}

/// Declares a log component with an explicit tracing target (e.g. a third-party crate).
#[macro_export]
macro_rules! custom_component {
    ($target:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::log_component_deps;
            log_component_deps!();

            #[distributed_slice(LOG_COMPONENTS)]
            static LOG_COMPONENT: SComponent = SComponent::new($target, $target, $level, $tags);
        };
    };
}
