use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// RCS-style dotted revision number.
///
/// A revision number always has an even number of components. The trunk
/// line is `1.N`; a branch forked from revision `X` with branch index `b`
/// numbers its revisions `X.b.1`, `X.b.2`, ... Branches nest arbitrarily.
///
/// The *line* of a revision is every component except the last: `1` for the
/// trunk, `1.3.1` for the first branch off `1.3`. Revisions on the same line
/// differ only in their final sequence component.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevisionNumber(Vec<u32>);

impl RevisionNumber {
    /// The root revision of every archive.
    pub fn root() -> Self {
        Self(vec![1, 1])
    }

    /// Trunk revision `1.<sequence>`.
    pub fn trunk(sequence: u32) -> Self {
        Self(vec![1, sequence])
    }

    /// Parse a dotted revision string such as `1.2.1.3`.
    pub fn parse(input: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidRevision {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("empty"));
        }
        let mut components = Vec::new();
        for part in input.split('.') {
            let value: u32 = part.parse().map_err(|_| invalid("non-numeric component"))?;
            if value == 0 {
                return Err(invalid("components start at 1"));
            }
            components.push(value);
        }
        if components.len() % 2 != 0 {
            return Err(invalid("odd number of components"));
        }
        Ok(Self(components))
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Branch depth; 0 for the trunk.
    pub fn depth(&self) -> usize {
        self.0.len() / 2 - 1
    }

    pub fn is_trunk(&self) -> bool {
        self.0.len() == 2
    }

    /// Final component: position of this revision on its line.
    pub fn sequence(&self) -> u32 {
        self.0[self.0.len() - 1]
    }

    /// Components identifying the line this revision belongs to.
    pub fn line(&self) -> &[u32] {
        &self.0[..self.0.len() - 1]
    }

    /// Dotted form of [`line`](Self::line), e.g. `"1"` or `"1.2.1"`.
    pub fn line_string(&self) -> String {
        join(self.line())
    }

    pub fn is_on_line(&self, line: &[u32]) -> bool {
        self.line() == line
    }

    /// Branch index of the line this revision sits on, `None` on the trunk.
    pub fn branch_index(&self) -> Option<u32> {
        if self.is_trunk() {
            None
        } else {
            Some(self.0[self.0.len() - 2])
        }
    }

    /// The next revision on the same line.
    pub fn successor(&self) -> Self {
        let mut next = self.0.clone();
        if let Some(last) = next.last_mut() {
            *last += 1;
        }
        Self(next)
    }

    /// The previous revision on the same line, `None` for the first one.
    pub fn predecessor(&self) -> Option<Self> {
        if self.sequence() <= 1 {
            return None;
        }
        let mut prev = self.0.clone();
        if let Some(last) = prev.last_mut() {
            *last -= 1;
        }
        Some(Self(prev))
    }

    /// First revision of branch `branch_index` forked from this revision.
    pub fn branch_start(&self, branch_index: u32) -> Self {
        let mut start = self.0.clone();
        start.push(branch_index);
        start.push(1);
        Self(start)
    }

    /// The revision this one was derived from: its predecessor on the same
    /// line, or the fork point for the first revision of a branch.
    pub fn parent(&self) -> Option<Self> {
        if let Some(prev) = self.predecessor() {
            return Some(prev);
        }
        if self.is_trunk() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 2].to_vec()))
    }
}

fn join(components: &[u32]) -> String {
    components
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

impl fmt::Display for RevisionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join(&self.0))
    }
}

impl fmt::Debug for RevisionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevisionNumber({self})")
    }
}

impl FromStr for RevisionNumber {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RevisionNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RevisionNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
