//! Host and zone include filters
//!
//! An empty include list matches everything; a non-empty list matches when
//! any entry matches.

use crate::config::FilterSpec;
use regex::Regex;

#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    hosts: Vec<Regex>,
    zones: Vec<Regex>,
}

fn compile_list(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

fn matches(include: &[Regex], target: &str) -> bool {
    include.is_empty() || include.iter().any(|re| re.is_match(target))
}

impl HostFilter {
    pub fn compile(spec: &FilterSpec) -> Result<Self, regex::Error> {
        Ok(Self {
            hosts: compile_list(&spec.hosts.include)?,
            zones: compile_list(&spec.zones.include)?,
        })
    }

    pub fn matches_host(&self, hostname: &str) -> bool {
        matches(&self.hosts, hostname)
    }

    pub fn matches_zone(&self, zone: &str) -> bool {
        matches(&self.zones, zone)
    }
}
