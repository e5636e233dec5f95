// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Display implementations

use crate::control::{ComponentCfg, ComponentDb};
use std::fmt::Display;

macro_rules! COMPONENT_FMT {
    () => {
        "{:>40} │ {:>16} │ {:>6} │ {}"
    };
}

impl Display for ComponentCfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            COMPONENT_FMT!(),
            self.target,
            self.name,
            self.level,
            self.tags.join(",")
        )
    }
}

impl Display for ComponentDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{:>40}", "──── Log components ────")?;
        writeln!(f, COMPONENT_FMT!(), "TARGET", "NAME", "LEVEL", "TAGS")?;
        for comp in self.components.values() {
            writeln!(f, "{comp}")?;
        }
        write!(f, COMPONENT_FMT!(), "(default)", "--", self.level, "--")
    }
}

pub(crate) struct ComponentDbByTag<'a>(pub(crate) &'a ComponentDb);
impl Display for ComponentDbByTag<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let db = self.0;
        writeln!(f)?;
        writeln!(f, "{:>40}", "──── Log components by tag ────")?;
        for tag in db.tags.values() {
            writeln!(f, " {}:", tag.tag)?;
            for comp in db
                .components
                .values()
                .filter(|comp| tag.targets.contains(comp.target))
            {
                writeln!(f, "      {:<40} : {}", comp.target, comp.level)?;
            }
        }
        Ok(())
    }
}
