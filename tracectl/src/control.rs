// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime control of log levels.

use ordermap::OrderMap;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
#[allow(unused)]
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, Registry, filter::LevelFilter, prelude::*, reload};

use crate::components::LOG_COMPONENTS;
use crate::display::ComponentDbByTag;
use crate::log_component;

log_component!("tracectl", LevelFilter::INFO, &[]);

/// Errors when parsing a log configuration string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceCtlError {
    #[error("invalid syntax '{0}': it should be tag=level")]
    Syntax(String),
    #[error("invalid level '{0}'")]
    Level(String),
}

#[derive(Debug, Clone)]
pub struct ComponentCfg {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: Vec<&'static str>,
}
impl ComponentCfg {
    fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        // a component can always be addressed by its name
        let mut tags = tags.to_vec();
        if !tags.contains(&name) {
            tags.push(name);
        }
        Self {
            target,
            name,
            level,
            tags,
        }
    }
    #[must_use]
    pub fn target(&self) -> &'static str {
        self.target
    }
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

#[derive(Debug, Clone)]
pub struct Tag {
    pub(crate) tag: &'static str,
    pub(crate) targets: HashSet<&'static str>,
}

#[derive(Debug)]
pub(crate) struct ComponentDb {
    pub(crate) level: LevelFilter,
    pub(crate) components: OrderMap<&'static str, ComponentCfg>,
    pub(crate) tags: OrderMap<&'static str, Tag>,
}

impl ComponentDb {
    fn new(level: LevelFilter) -> Self {
        let mut db = Self {
            level,
            components: OrderMap::new(),
            tags: OrderMap::new(),
        };
        for comp in LOG_COMPONENTS {
            db.register(comp.target, comp.name, comp.level, comp.tags);
        }
        db
    }
    fn register(
        &mut self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) {
        let cfg = ComponentCfg::new(target, name, level, tags);
        let tags = cfg.tags.clone();
        if let Some(prior) = self.components.insert(target, cfg) {
            warn!("Log component {} declared more than once", prior.target);
        }
        for tag in tags {
            self.tags
                .entry(tag)
                .or_insert_with(|| Tag {
                    tag,
                    targets: HashSet::new(),
                })
                .targets
                .insert(target);
        }
    }
    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::new(self.level.to_string());
        for comp in self.components.values() {
            match format!("{}={}", comp.target, comp.level).parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => error!("Bad directive for {}: {e}", comp.target),
            }
        }
        filter
    }
    fn tagged_mut(&mut self, tag: &str) -> Vec<&mut ComponentCfg> {
        let Some(tag) = self.tags.get(tag) else {
            return vec![];
        };
        self.components
            .values_mut()
            .filter(|comp| tag.targets.contains(comp.target))
            .collect()
    }
    fn tagged(&self, tag: &str) -> Vec<ComponentCfg> {
        let Some(tag) = self.tags.get(tag) else {
            return vec![];
        };
        self.components
            .values()
            .filter(|comp| tag.targets.contains(comp.target))
            .cloned()
            .collect()
    }
    /// A config string that reproduces the current levels.
    fn as_config_string(&self) -> String {
        let mut out = format!("default={}", self.level);
        for comp in self.components.values() {
            out += &format!(",{}={}", comp.name, comp.level);
        }
        out
    }
}

/// Owner of the process-wide subscriber and of the per-component levels.
#[derive(Debug)]
pub struct LogControl {
    db: Mutex<ComponentDb>,
    reload_filter: reload::Handle<EnvFilter, Registry>,
}

static LOG_CTL: OnceLock<LogControl> = OnceLock::new();

/// Get the process-wide [`LogControl`], installing the subscriber on first use.
pub fn get_log_ctl() -> &'static LogControl {
    LOG_CTL.get_or_init(LogControl::new)
}

impl LogControl {
    fn new() -> Self {
        let db = ComponentDb::new(LevelFilter::INFO);
        let (filter, reload_filter) = reload::Layer::new(db.env_filter());
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_thread_names(false);

        // another subscriber (e.g. a test harness one) may already be installed
        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            eprintln!("Log control not installed as global subscriber: {e}");
        }
        Self {
            db: Mutex::new(db),
            reload_filter,
        }
    }
    fn db(&self) -> MutexGuard<'_, ComponentDb> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
    fn reload(&self, db: &ComponentDb) {
        if let Err(e) = self.reload_filter.reload(db.env_filter()) {
            error!("Failed to reload log filter: {e}");
        }
    }

    pub fn init() {
        get_log_ctl();
    }

    /// Set the level of every component carrying `tag`. Returns the number of components changed.
    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) -> usize {
        let mut db = self.db();
        let mut changed = 0;
        for comp in db.tagged_mut(tag) {
            if comp.level != level {
                comp.level = level;
                changed += 1;
            }
        }
        if changed > 0 {
            self.reload(&db);
        }
        debug!("Log level for tag '{tag}' set to {level} ({changed} components changed)");
        changed
    }
    pub fn set_level_all(&self, level: LevelFilter) {
        let mut db = self.db();
        for comp in db.components.values_mut() {
            comp.level = level;
        }
        self.reload(&db);
    }
    pub fn set_default_level(&self, level: LevelFilter) {
        let mut db = self.db();
        if db.level != level {
            db.level = level;
            self.reload(&db);
        }
    }
    #[must_use]
    pub fn get_default_level(&self) -> LevelFilter {
        self.db().level
    }

    /// Parse a comma-separated list of `tag=level`.
    fn parse_config(input: &str) -> Result<OrderMap<String, LevelFilter>, TraceCtlError> {
        let mut result = OrderMap::new();
        for item in input.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let Some((tag, level)) = item.split_once('=') else {
                return Err(TraceCtlError::Syntax(item.to_string()));
            };
            let level = LevelFilter::from_str(level.trim())
                .map_err(|_| TraceCtlError::Level(level.trim().to_string()))?;
            result.insert(tag.trim().to_string(), level);
        }
        Ok(result)
    }

    /// Apply a configuration like `default=warn,all=info,nat=debug`.
    ///
    /// `default` sets the level of unregistered targets, `all` sets every component, and any other
    /// key is a tag. Tags are applied last so they override `all`.
    ///
    /// # Errors
    ///
    /// Fails without changing anything if the string is malformed.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceCtlError> {
        let config = Self::parse_config(input)?;
        if let Some(level) = config.get("default") {
            self.set_default_level(*level);
        }
        if let Some(level) = config.get("all") {
            self.set_level_all(*level);
        }
        for (tag, level) in config
            .iter()
            .filter(|(tag, _)| *tag != "default" && *tag != "all")
        {
            if self.set_tag_level(tag, *level) == 0 && self.get_tag(tag).is_none() {
                warn!("Unknown log tag '{tag}'");
            }
        }
        Ok(())
    }

    pub fn get_tags(&self) -> impl Iterator<Item = Tag> {
        self.db().tags.clone().into_values()
    }
    #[must_use]
    pub fn get_tag(&self, tag: &str) -> Option<Tag> {
        self.db().tags.get(tag).cloned()
    }
    #[must_use]
    pub fn get_component(&self, target: &str) -> Option<ComponentCfg> {
        self.db().components.get(target).cloned()
    }
    pub fn get_components_by_tag(&self, tag: &str) -> impl Iterator<Item = ComponentCfg> {
        self.db().tagged(tag).into_iter()
    }
    #[must_use]
    pub fn as_config_string(&self) -> String {
        self.db().as_config_string()
    }
    /// Render the components grouped by tag.
    #[must_use]
    pub fn describe_by_tag(&self) -> String {
        ComponentDbByTag(&self.db()).to_string()
    }
    /// Render the components with their levels.
    #[must_use]
    pub fn describe(&self) -> String {
        self.db().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{LogControl, TraceCtlError, get_log_ctl};
    use crate::components::LOG_COMPONENTS;
    use crate::{LevelFilter, custom_component};
    use serial_test::serial;

    #[test]
    #[serial]
    fn components_are_collected_at_link_time() {
        custom_component!("tctl-test-a", LevelFilter::ERROR, &["tctl-group"]);
        let names: Vec<&str> = LOG_COMPONENTS.iter().map(|c| c.target).collect();
        assert!(names.contains(&"natsim_tracectl::control"));
        assert!(names.contains(&"tctl-test-a"));
        // declared after the check, still there
        assert!(names.contains(&"tctl-test-b"));
        custom_component!("tctl-test-b", LevelFilter::WARN, &["tctl-group"]);

        LogControl::init();
        let ctl = get_log_ctl();
        assert!(ctl.get_component("tctl-test-a").is_some());
        assert!(ctl.get_tag("tctl-group").is_some());
    }

    #[test]
    #[serial]
    fn change_tag_level() {
        custom_component!("tctl-t1", LevelFilter::DEBUG, &["tctl-common"]);
        custom_component!("tctl-t2", LevelFilter::ERROR, &["tctl-common"]);
        let ctl = get_log_ctl();

        let changed = ctl.set_tag_level("tctl-common", LevelFilter::OFF);
        assert_eq!(changed, 2);
        ctl.get_components_by_tag("tctl-common")
            .for_each(|c| assert_eq!(c.level(), LevelFilter::OFF));

        // idempotent
        assert_eq!(ctl.set_tag_level("tctl-common", LevelFilter::OFF), 0);
    }

    #[test]
    #[serial]
    fn setup_from_string() {
        custom_component!("tctl-s1", LevelFilter::INFO, &["tctl-string"]);
        let ctl = get_log_ctl();

        ctl.setup_from_string("tctl-string=warn, tctl-s1=error")
            .expect("valid config");
        assert_eq!(
            ctl.get_component("tctl-s1").map(|c| c.level()),
            Some(LevelFilter::ERROR)
        );
        assert!(ctl.as_config_string().contains("tctl-s1=error"));

        assert_eq!(
            ctl.setup_from_string("tctl-string=loud"),
            Err(TraceCtlError::Level("loud".to_string()))
        );
        assert_eq!(
            ctl.setup_from_string("tctl-string=error, foo"),
            Err(TraceCtlError::Syntax("foo".to_string()))
        );
    }

    #[test]
    #[serial]
    fn describe_lists_components() {
        custom_component!("tctl-described", LevelFilter::TRACE, &["tctl-shown"]);
        let ctl = get_log_ctl();
        assert!(ctl.describe().contains("tctl-described"));
        assert!(ctl.describe_by_tag().contains("tctl-shown"));
    }
}
