//! Version constraint evaluation for driver stacks and firmware.
//!
//! Two shapes are supported:
//!
//! - **Stack versions** such as `MLNX_OFED_LINUX-23.10-1.1.9.0`: a free-form
//!   distribution prefix, a major group of exactly two components and a minor
//!   group of exactly four components. Anything else is a format error.
//! - **Firmware versions** such as `28.39.1002`: any number of dot-separated
//!   components, shorter operands padded with zeros.
//!
//! Constraints carry an optional leading operator (`>=`, `>`, `==`; `==` when
//! omitted). A `*` component matches any value in the same position.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const MAJOR_COMPONENTS: usize = 2;
const MINOR_COMPONENTS: usize = 4;
const WILDCARD: &str = "*";

/// A version string that does not have the expected shape.
///
/// Kept distinct from a `false` result so a malformed spec is never
/// reported as a hardware mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Empty version string")]
    Empty,

    #[error("Version '{input}' is not <prefix>-<major>-<minor>")]
    MissingGroups { input: String },

    #[error("Version '{input}' has {found} {group} components, expected {expected}")]
    ComponentCount {
        input: String,
        group: &'static str,
        found: usize,
        expected: usize,
    },

    #[error("Version '{input}' has non-numeric component '{component}'")]
    InvalidComponent { input: String, component: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    Eq,
    Ge,
    Gt,
}

impl Operator {
    /// Split a leading operator off a constraint string.
    fn split(input: &str) -> (Self, &str) {
        let input = input.trim();
        if let Some(rest) = input.strip_prefix(">=") {
            (Self::Ge, rest.trim_start())
        } else if let Some(rest) = input.strip_prefix('>') {
            (Self::Gt, rest.trim_start())
        } else if let Some(rest) = input.strip_prefix("==") {
            (Self::Eq, rest.trim_start())
        } else {
            (Self::Eq, input)
        }
    }

    const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::Ge => !matches!(ordering, Ordering::Less),
            Self::Gt => matches!(ordering, Ordering::Greater),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "==",
            Self::Ge => ">=",
            Self::Gt => ">",
        })
    }
}

/// One position of a version group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Number(u64),
    Any,
}

impl Component {
    fn parse(raw: &str, input: &str) -> Result<Self, VersionError> {
        let raw = raw.trim();
        if raw == WILDCARD {
            return Ok(Self::Any);
        }
        raw.parse::<u64>()
            .map(Self::Number)
            .map_err(|_| VersionError::InvalidComponent {
                input: input.to_string(),
                component: raw.to_string(),
            })
    }
}

/// Compare two groups left to right. Wildcard positions compare equal and
/// the first differing concrete pair decides.
fn compare_groups(actual: &[Component], expected: &[Component]) -> Ordering {
    for (a, e) in actual.iter().zip(expected) {
        match (a, e) {
            (Component::Number(a), Component::Number(e)) if a != e => return a.cmp(e),
            _ => {}
        }
    }
    Ordering::Equal
}

fn parse_group(
    raw: &str,
    group: &'static str,
    expected: usize,
    input: &str,
) -> Result<Vec<Component>, VersionError> {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() != expected {
        return Err(VersionError::ComponentCount {
            input: input.to_string(),
            group,
            found: parts.len(),
            expected,
        });
    }
    parts.iter().map(|p| Component::parse(p, input)).collect()
}

/// A parsed stack version with its two positional groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackVersion {
    pub major: Vec<Component>,
    pub minor: Vec<Component>,
}

impl FromStr for StackVersion {
    type Err = VersionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }
        let mut groups = trimmed.rsplitn(3, '-');
        let (Some(minor), Some(major), Some(prefix)) = (groups.next(), groups.next(), groups.next())
        else {
            return Err(VersionError::MissingGroups {
                input: input.to_string(),
            });
        };
        if prefix.is_empty() || major.is_empty() || minor.is_empty() {
            return Err(VersionError::MissingGroups {
                input: input.to_string(),
            });
        }
        Ok(Self {
            major: parse_group(major, "major", MAJOR_COMPONENTS, input)?,
            minor: parse_group(minor, "minor", MINOR_COMPONENTS, input)?,
        })
    }
}

/// An operator plus a stack version pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub operator: Operator,
    pub version: StackVersion,
}

impl FromStr for VersionConstraint {
    type Err = VersionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (operator, rest) = Operator::split(input);
        Ok(Self {
            operator,
            version: rest.parse()?,
        })
    }
}

impl VersionConstraint {
    /// Major and minor groups are checked independently; both must pass.
    pub fn is_satisfied_by(&self, actual: &StackVersion) -> bool {
        self.operator
            .accepts(compare_groups(&actual.major, &self.version.major))
            && self
                .operator
                .accepts(compare_groups(&actual.minor, &self.version.minor))
    }
}

/// Evaluate a stack version constraint against an installed version.
///
/// Returns `Err` when either string is malformed, `Ok(false)` on a genuine
/// mismatch.
///
/// ```
/// use hcacheck_core::utils::version::satisfies;
///
/// assert_eq!(satisfies("MLNX_OFED_LINUX-23.10-1.*.*.*", "MLNX_OFED_LINUX-23.10-1.1.9.0"), Ok(true));
/// assert!(satisfies(">=MLNX_OFED_LINUX-5.9-0.5.6.0", "MLNX_OFED_LINUX-23.10.1-1.1.9.0").is_err());
/// ```
pub fn satisfies(constraint: &str, actual: &str) -> Result<bool, VersionError> {
    let constraint: VersionConstraint = constraint.parse()?;
    let actual: StackVersion = actual.parse()?;
    Ok(constraint.is_satisfied_by(&actual))
}

fn parse_dotted(raw: &str, input: &str) -> Result<Vec<Component>, VersionError> {
    if raw.is_empty() {
        return Err(VersionError::Empty);
    }
    raw.split('.').map(|p| Component::parse(p, input)).collect()
}

/// Evaluate a firmware constraint such as `>=28.39.1002` or `28.39.*`.
///
/// A wildcard in the constraint matches every remaining position.
pub fn firmware_satisfies(constraint: &str, actual: &str) -> Result<bool, VersionError> {
    let (operator, expected_raw) = Operator::split(constraint);
    let actual_raw = actual.trim();
    let mut expected = parse_dotted(expected_raw, constraint)?;
    let mut actual = parse_dotted(actual_raw, actual_raw)?;

    if let Some(pos) = expected.iter().position(|c| *c == Component::Any) {
        expected.truncate(pos);
        actual.truncate(pos);
    }
    let width = expected.len().max(actual.len());
    expected.resize(width, Component::Number(0));
    actual.resize(width, Component::Number(0));

    Ok(operator.accepts(compare_groups(&actual, &expected)))
}
