//! Read-side security filter.
//!
//! The reader consults the filter for every class it resolves, every array it
//! allocates, and every back-reference it follows. A [`FilterStatus::Rejected`]
//! verdict aborts the read with `InvalidClass("filter status: REJECTED")`.

use std::fmt;

use crate::error::{Result, StreamError};

/// Facts about the stream position at a filter check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterInfo {
    /// Class being resolved or allocated, if any. Arrays use their array type name.
    pub serial_class: Option<String>,
    /// Length of the array being allocated, or -1.
    pub array_length: i64,
    /// Current nesting depth of the read.
    pub depth: usize,
    /// Number of handles assigned so far.
    pub references: usize,
    /// Bytes consumed from the source so far.
    pub stream_bytes: u64,
}

/// Verdict of a filter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStatus {
    /// Accept.
    Allowed,
    /// Reject; the read fails.
    Rejected,
    /// No opinion; treated as accepted.
    Undecided,
}

impl fmt::Display for FilterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterStatus::Allowed => "ALLOWED",
            FilterStatus::Rejected => "REJECTED",
            FilterStatus::Undecided => "UNDECIDED",
        })
    }
}

/// A read-side filter.
pub trait ObjectInputFilter: Send + Sync {
    /// Decides whether the read may proceed.
    fn check_input(&self, info: &FilterInfo) -> FilterStatus;
}

impl<F> ObjectInputFilter for F
where
    F: Fn(&FilterInfo) -> FilterStatus + Send + Sync,
{
    fn check_input(&self, info: &FilterInfo) -> FilterStatus {
        self(info)
    }
}

/// Runs `filter` and converts a rejection into an error.
pub(crate) fn apply(filter: &dyn ObjectInputFilter, info: FilterInfo) -> Result<()> {
    let status = filter.check_input(&info);
    if status == FilterStatus::Rejected {
        tracing::warn!(
            class = info.serial_class.as_deref().unwrap_or("-"),
            array_length = info.array_length,
            depth = info.depth,
            references = info.references,
            stream_bytes = info.stream_bytes,
            "serial filter rejected input"
        );
        return Err(StreamError::invalid_class_anon(format!(
            "filter status: {}",
            status
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassPattern {
    Exact(String),
    /// `pkg.*`; holds `pkg.`
    Package(String),
    /// `pkg.**`; holds `pkg.`
    PackageTree(String),
    Prefix(String),
}

impl ClassPattern {
    fn matches(&self, class_name: &str) -> bool {
        match self {
            ClassPattern::Exact(name) => class_name == name,
            ClassPattern::Package(pkg) => class_name
                .strip_prefix(pkg.as_str())
                .map_or(false, |rest| !rest.contains('.')),
            ClassPattern::PackageTree(pkg) => class_name.starts_with(pkg.as_str()),
            ClassPattern::Prefix(prefix) => class_name.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    pattern: ClassPattern,
    reject: bool,
}

/// Filter built from a `;`-separated pattern string.
///
/// Each element is a limit (`maxdepth=N`, `maxrefs=N`, `maxbytes=N`, `maxarray=N`) or a
/// class pattern: `a.B` (exact), `a.*` (package), `a.**` (package and subpackages),
/// `a*` (prefix) or `*`. A leading `!` rejects matching classes; otherwise they are
/// allowed. The first matching pattern decides. Array types are checked by their
/// innermost component; primitive components are undecided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternFilter {
    source: String,
    rules: Vec<Rule>,
    max_depth: Option<u64>,
    max_refs: Option<u64>,
    max_bytes: Option<u64>,
    max_array: Option<u64>,
}

impl PatternFilter {
    /// Parses a pattern string.
    pub fn parse(source: &str) -> Result<Self> {
        let mut filter = Self {
            source: source.to_string(),
            rules: Vec::new(),
            max_depth: None,
            max_refs: None,
            max_bytes: None,
            max_array: None,
        };
        for element in source.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            if let Some((key, value)) = element.split_once('=') {
                let limit = value.trim().parse::<u64>().map_err(|_| {
                    StreamError::IllegalState(format!("invalid filter limit: {}", element))
                })?;
                match key.trim() {
                    "maxdepth" => filter.max_depth = Some(limit),
                    "maxrefs" => filter.max_refs = Some(limit),
                    "maxbytes" => filter.max_bytes = Some(limit),
                    "maxarray" => filter.max_array = Some(limit),
                    _ => {
                        return Err(StreamError::IllegalState(format!(
                            "unknown filter limit: {}",
                            element
                        )))
                    }
                }
                continue;
            }
            let (reject, name) = match element.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, element),
            };
            if name.is_empty() {
                return Err(StreamError::IllegalState(format!(
                    "empty class pattern in filter: {}",
                    source
                )));
            }
            let pattern = if let Some(pkg) = name.strip_suffix(".**") {
                ClassPattern::PackageTree(format!("{}.", pkg))
            } else if let Some(pkg) = name.strip_suffix(".*") {
                ClassPattern::Package(format!("{}.", pkg))
            } else if let Some(prefix) = name.strip_suffix('*') {
                ClassPattern::Prefix(prefix.to_string())
            } else {
                ClassPattern::Exact(name.to_string())
            };
            filter.rules.push(Rule { pattern, reject });
        }
        Ok(filter)
    }

    /// The pattern string this filter was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    fn exceeds(limit: Option<u64>, value: u64) -> bool {
        limit.map_or(false, |max| value > max)
    }

    fn check_class(&self, class_name: &str) -> FilterStatus {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(class_name))
            .map_or(FilterStatus::Undecided, |rule| {
                if rule.reject {
                    FilterStatus::Rejected
                } else {
                    FilterStatus::Allowed
                }
            })
    }
}

impl ObjectInputFilter for PatternFilter {
    fn check_input(&self, info: &FilterInfo) -> FilterStatus {
        if Self::exceeds(self.max_refs, info.references as u64)
            || Self::exceeds(self.max_depth, info.depth as u64)
            || Self::exceeds(self.max_bytes, info.stream_bytes)
        {
            return FilterStatus::Rejected;
        }
        let Some(class_name) = info.serial_class.as_deref() else {
            return FilterStatus::Undecided;
        };
        let mut name = class_name;
        if name.starts_with('[') {
            if info.array_length >= 0 && Self::exceeds(self.max_array, info.array_length as u64)
            {
                return FilterStatus::Rejected;
            }
            name = name.trim_start_matches('[');
            match name.strip_prefix('L').and_then(|n| n.strip_suffix(';')) {
                Some(component) => name = component,
                None => return FilterStatus::Undecided,
            }
        }
        self.check_class(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str) -> FilterInfo {
        FilterInfo {
            serial_class: Some(name.to_string()),
            array_length: -1,
            depth: 1,
            references: 0,
            stream_bytes: 0,
        }
    }

    #[test]
    fn test_first_match_wins() {
        let filter = PatternFilter::parse("com.example.Safe;!com.example.*;*").unwrap();
        assert_eq!(filter.check_input(&class("com.example.Safe")), FilterStatus::Allowed);
        assert_eq!(filter.check_input(&class("com.example.Evil")), FilterStatus::Rejected);
        assert_eq!(filter.check_input(&class("org.other.Thing")), FilterStatus::Allowed);
    }

    #[test]
    fn test_package_patterns() {
        let filter = PatternFilter::parse("!a.b.*").unwrap();
        assert_eq!(filter.check_input(&class("a.b.C")), FilterStatus::Rejected);
        assert_eq!(filter.check_input(&class("a.b.c.D")), FilterStatus::Undecided);

        let tree = PatternFilter::parse("!a.b.**").unwrap();
        assert_eq!(tree.check_input(&class("a.b.c.D")), FilterStatus::Rejected);
        assert_eq!(tree.check_input(&class("a.bc.D")), FilterStatus::Undecided);
    }

    #[test]
    fn test_prefix_pattern() {
        let filter = PatternFilter::parse("!com.ex*").unwrap();
        assert_eq!(filter.check_input(&class("com.example.X")), FilterStatus::Rejected);
        assert_eq!(filter.check_input(&class("com.other.X")), FilterStatus::Undecided);
    }

    #[test]
    fn test_limits() {
        let filter = PatternFilter::parse("maxdepth=2;maxrefs=10;maxbytes=100;maxarray=4").unwrap();
        let mut info = class("a.B");
        info.depth = 3;
        assert_eq!(filter.check_input(&info), FilterStatus::Rejected);

        let mut info = class("[I");
        info.array_length = 5;
        assert_eq!(filter.check_input(&info), FilterStatus::Rejected);
        info.array_length = 4;
        assert_eq!(filter.check_input(&info), FilterStatus::Undecided);

        let mut info = class("a.B");
        info.stream_bytes = 101;
        assert_eq!(filter.check_input(&info), FilterStatus::Rejected);
    }

    #[test]
    fn test_array_component_checked() {
        let filter = PatternFilter::parse("!com.example.Evil").unwrap();
        assert_eq!(
            filter.check_input(&class("[[Lcom.example.Evil;")),
            FilterStatus::Rejected
        );
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PatternFilter::parse("maxdepth=abc").is_err());
        assert!(PatternFilter::parse("maxwidth=3").is_err());
        assert!(PatternFilter::parse("!").is_err());
    }

    #[test]
    fn test_apply_rejection_is_invalid_class() {
        let filter = |_: &FilterInfo| FilterStatus::Rejected;
        let err = apply(&filter, class("a.B")).unwrap_err();
        assert_eq!(err.to_string(), "invalid class: filter status: REJECTED");
        let allow = |_: &FilterInfo| FilterStatus::Undecided;
        assert!(apply(&allow, class("a.B")).is_ok());
    }
}
