//! Command addresses and event-name patterns.
//!
//! Commands are delivered point-to-point to a [`CommandAddress`]
//! (`<service>.<version>.<command>`); events fan out to every subscription
//! whose [`EventPattern`] matches the event name.
//!
//! Pattern grammar: one or more `.`-separated segments, each either `*`
//! (exactly one segment), `#` (zero or more segments) or a non-empty run of
//! `[A-Za-z0-9_-]`.

use std::fmt;
use std::str::FromStr;

/// Where a bridge listener is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Point-to-point command delivery. At most one listener per address.
    Command(CommandAddress),
    /// Fan-out event delivery. Any number of subscriptions per pattern.
    Events(EventPattern),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Command(address) => write!(f, "command {address}"),
            Route::Events(pattern) => write!(f, "events {pattern}"),
        }
    }
}

/// The bridge address of one command of one service version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandAddress {
    pub service: String,
    pub version: String,
    pub command: String,
}

impl CommandAddress {
    pub fn new(
        service: impl Into<String>,
        version: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            command: command.into(),
        }
    }
}

impl fmt::Display for CommandAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.service, self.version, self.command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,
    #[error("pattern `{0}` contains an empty segment")]
    EmptySegment(String),
    #[error("pattern `{pattern}` has invalid segment `{segment}`")]
    InvalidSegment { pattern: String, segment: String },
    #[error("event name `{0}` must not contain wildcards")]
    Wildcard(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    One,
    Many,
}

/// A parsed event-name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl EventPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }

        let mut segments = pattern
            .split('.')
            .map(|segment| match segment {
                "" => Err(PatternError::EmptySegment(pattern.to_string())),
                "*" => Ok(Segment::One),
                "#" => Ok(Segment::Many),
                literal
                    if literal
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') =>
                {
                    Ok(Segment::Literal(literal.to_string()))
                }
                other => Err(PatternError::InvalidSegment {
                    pattern: pattern.to_string(),
                    segment: other.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        // `#.#` matches exactly what `#` matches.
        segments.dedup_by(|a, b| *a == Segment::Many && *b == Segment::Many);

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Parse a concrete event name: a pattern without wildcards.
    pub fn event_name(name: &str) -> Result<Self, PatternError> {
        let pattern = Self::parse(name)?;
        if pattern.is_exact() {
            Ok(pattern)
        } else {
            Err(PatternError::Wildcard(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if the pattern has no wildcards.
    pub fn is_exact(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    pub fn matches(&self, event_name: &str) -> bool {
        let parts: Vec<&str> = event_name.split('.').collect();
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(pattern: &[Segment], parts: &[&str]) -> bool {
    match pattern.split_first() {
        None => parts.is_empty(),
        Some((Segment::Many, rest)) => {
            (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..]))
        }
        Some((segment, rest)) => match parts.split_first() {
            None => false,
            Some((part, remaining)) => {
                let head = match segment {
                    Segment::Literal(literal) => literal == part,
                    _ => !part.is_empty(),
                };
                head && match_segments(rest, remaining)
            }
        },
    }
}

impl FromStr for EventPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
