//! Cluster software version model.
//!
//! Versions are compared over `(major, minor, patch, revision)`; the commit
//! hash is carried for display only.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ExporterError, Result};

static VERSION_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-(\d+))?(?:-(\S+))?$").expect("valid version regex")
});

static PARENTHESISED_SHA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(([0-9a-fA-F]+)\)$").expect("valid sha regex"));

#[derive(Debug, Clone, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub revision: u32,
    pub commit: String,
}

impl Version {
    pub const NAUTILUS: Version = Version::release(14);
    pub const OCTOPUS: Version = Version::release(15);
    pub const PACIFIC: Version = Version::release(16);
    pub const QUINCY: Version = Version::release(17);
    pub const REEF: Version = Version::release(18);
    pub const SQUID: Version = Version::release(19);

    const fn release(major: u32) -> Version {
        Version {
            major,
            minor: 0,
            patch: 0,
            revision: 0,
            commit: String::new(),
        }
    }

    /// Parse a raw version banner such as
    /// `ceph version 16.2.11 (3cf40e2dca667f68c6ce3ff5cd94f01e711af894) pacific (stable)`
    /// or a deployment-tool variant with a fused `-R-hash` suffix.
    pub fn parse(raw: &str) -> Result<Version> {
        let tokens: Vec<&str> = raw.split_whitespace().collect();

        let after_keyword = tokens
            .iter()
            .position(|t| *t == "version")
            .map(|i| i + 1)
            .filter(|&i| i < tokens.len() && VERSION_TOKEN.is_match(tokens[i]));

        let index = after_keyword
            .or_else(|| tokens.iter().position(|t| VERSION_TOKEN.is_match(t)))
            .ok_or_else(|| ExporterError::InvalidVersion(raw.to_string()))?;

        let caps = VERSION_TOKEN
            .captures(tokens[index])
            .ok_or_else(|| ExporterError::InvalidVersion(raw.to_string()))?;

        let number = |i: usize| -> Result<u32> {
            caps.get(i)
                .map_or(Ok(0), |m| m.as_str().parse())
                .map_err(|_| ExporterError::InvalidVersion(raw.to_string()))
        };

        let mut commit = caps
            .get(5)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        if commit.is_empty() {
            if let Some(sha) = tokens
                .get(index + 1)
                .and_then(|t| PARENTHESISED_SHA.captures(t))
            {
                commit = sha[1].to_string();
            }
        }

        Ok(Version {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            revision: number(4)?,
            commit,
        })
    }

    pub fn is_at_least(&self, constraint: &Version) -> bool {
        self >= constraint
    }

    /// Release codename for the major version
    pub fn release_name(&self) -> &'static str {
        match self.major {
            10 => "jewel",
            11 => "kraken",
            12 => "luminous",
            13 => "mimic",
            14 => "nautilus",
            15 => "octopus",
            16 => "pacific",
            17 => "quincy",
            18 => "reef",
            19 => "squid",
            20 => "tentacle",
            _ => "unknown",
        }
    }

    fn key(&self) -> (u32, u32, u32, u32) {
        (self.major, self.minor, self.patch, self.revision)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl FromStr for Version {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision > 0 {
            write!(f, "-{}", self.revision)?;
        }
        Ok(())
    }
}

/// `true` when the version is known and at least `constraint`.
///
/// An unknown version always selects the oldest behaviour.
pub fn at_least(version: Option<&Version>, constraint: &Version) -> bool {
    version.is_some_and(|v| v.is_at_least(constraint))
}
