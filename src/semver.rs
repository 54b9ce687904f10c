//! Ordering of semantic version strings by their `major.minor.patch` triple.

use std::cmp::Ordering;

use lazy_regex::regex_captures;

/// Parsed version. Parts that were not given default to zero / `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
    pub build: Option<String>,
}

impl Version {
    /// Read the first `x.y.z[-pre][+build]` found in `text`. Anything unreadable
    /// gives `0.0.0`.
    pub fn parse(text: &str) -> Self {
        let Some((_, major, minor, patch, pre, build)) = regex_captures!(
            r"([0-9]+)\.([0-9]+)\.([0-9]+)-?(\w+)?\+?(\w+)?",
            text
        ) else {
            return Self::default();
        };

        let (Ok(major), Ok(minor), Ok(patch)) = (major.parse(), minor.parse(), patch.parse())
        else {
            return Self::default();
        };
        let part = |s: &str| (!s.is_empty()).then(|| s.to_owned());

        Self {
            major,
            minor,
            patch,
            pre: part(pre),
            build: part(build),
        }
    }

    /// Compare on major, minor and patch only.
    pub fn cmp_core(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl std::str::FromStr for Version {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Version::parse(s))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

/// Compare two version strings, ignoring pre-release and build parts.
pub fn compare(a: &str, b: &str, order: Order) -> Ordering {
    let ord = Version::parse(a).cmp_core(&Version::parse(b));
    match order {
        Order::Ascending => ord,
        Order::Descending => ord.reverse(),
    }
}

/// Stable in-place sort of `items` by the version string `key` extracts.
pub fn sort_versions<T, F>(items: &mut [T], key: F, order: Order)
where
    F: Fn(&T) -> &str,
{
    items.sort_by(|a, b| compare(key(a), key(b), order));
}
