//! A deliberately lenient version-constraint parser and matcher.
//!
//! This is not semver: a constraint is parsed on a best-effort basis from
//! whatever string a manifest or registry entry supplies, following exactly
//! the rules a Nushell package author would expect from informal version
//! strings like `^1.2`, `~1.0.3`, `>2`, or the named constraint `latest`.

/// A parsed, possibly-partial version constraint.
///
/// `op` holds either one of the range operators (`<`, `>`, `^`, `~`) or a
/// named operator such as `latest` when the whole input was alphabetic.
/// Any level left unspecified by the input is `None` and acts as a
/// wildcard during matching.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Constraint {
    op: Option<String>,
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
}

const RANGE_OPS: [&str; 4] = ["<", ">", "^", "~"];

impl Constraint {
    /// Parses a constraint string.
    ///
    /// An empty or absent string parses to the wildcard constraint (matches
    /// anything, orders below every concrete version).
    pub fn parse(text: &str) -> Self {
        let first = text.chars().next();
        let mut op = first
            .filter(|c| matches!(c, '<' | '>' | '^' | '~'))
            .map(|c| c.to_string());

        let mut numbers = Vec::with_capacity(3);
        for section in text.split('.') {
            let digits: String = section.chars().filter(char::is_ascii_digit).collect();
            if digits.is_empty() {
                break;
            }
            match digits.parse::<u64>() {
                Ok(n) => numbers.push(n),
                Err(_) => break,
            }
        }

        if !text.is_empty() && text.chars().all(|c| c.is_ascii_alphabetic()) {
            op = Some(text.to_string());
        }

        Constraint {
            op,
            major: numbers.first().copied(),
            minor: numbers.get(1).copied(),
            patch: numbers.get(2).copied(),
        }
    }

    fn is_range_op(&self) -> bool {
        self.op.as_deref().is_some_and(|op| RANGE_OPS.contains(&op))
    }

    fn is_latest(&self) -> bool {
        self.op.as_deref() == Some("latest")
    }

    /// Symmetric match: true if `self` (the wanted constraint) and
    /// `other` (a candidate version) are compatible.
    ///
    /// This is intentionally symmetric in its algorithm even though callers
    /// typically pass one "wanted" constraint and one concrete version —
    /// passing two range constraints is well-defined but rarely meaningful.
    pub fn matches(&self, other: &Constraint) -> bool {
        if self.is_latest() || other.is_latest() {
            return true;
        }
        if !self.is_range_op() || !other.is_range_op() {
            return self.op == other.op;
        }
        match (self.major, other.major) {
            (None, _) | (_, None) => return true,
            (Some(a), Some(b)) => {
                if (self.lower_open_at_major() && a < b) || (other.lower_open_at_major() && b < a)
                {
                    return true;
                }
                if a != b {
                    return false;
                }
            },
        }
        match (self.minor, other.minor) {
            (None, _) | (_, None) => return true,
            (Some(a), Some(b)) => {
                if (self.lower_open_at_minor() && a < b) || (other.lower_open_at_minor() && b < a)
                {
                    return true;
                }
                if a != b {
                    return false;
                }
            },
        }
        match (self.patch, other.patch) {
            (None, _) | (_, None) => true,
            (Some(a), Some(b)) => {
                a == b
                    || (self.lower_open_at_patch() && a < b)
                    || (other.lower_open_at_patch() && b < a)
            },
        }
    }

    fn lower_open_at_major(&self) -> bool {
        self.op.as_deref() == Some(">") || self.op.as_deref() == Some("<")
    }

    fn lower_open_at_minor(&self) -> bool {
        matches!(self.op.as_deref(), Some(">") | Some("^")) || self.op.as_deref() == Some("<")
    }

    fn lower_open_at_patch(&self) -> bool {
        matches!(self.op.as_deref(), Some(">") | Some("^") | Some("~"))
            || self.op.as_deref() == Some("<")
    }

    /// Strict ordering used to pick the greatest of several matching
    /// candidates. `latest` dominates everything; an unset major is treated
    /// as less than any concrete version.
    pub fn is_greater_than(&self, other: &Constraint) -> bool {
        if other.major.is_none() {
            return true;
        }
        if self.is_latest() {
            return true;
        }
        if other.is_latest() {
            return false;
        }
        let (Some(self_major), Some(other_major)) = (self.major, other.major) else {
            return false;
        };
        if self_major < other_major {
            return false;
        }
        if self_major > other_major || other.minor.is_none() {
            return true;
        }
        let (Some(self_minor), Some(other_minor)) = (self.minor, other.minor) else {
            return false;
        };
        if self_minor < other_minor {
            return false;
        }
        if self_minor > other_minor || other.patch.is_none() {
            return true;
        }
        !(self.patch.is_none() || self.patch < other.patch)
    }

    /// Given a set of `(version_string, value)` pairs, returns the value of
    /// the greatest version matching this constraint (`self` is the wanted
    /// side). Ties keep the last-seen greatest value.
    pub fn pick_greatest<'a, T>(
        &self,
        options: impl Iterator<Item = (&'a str, T)>,
    ) -> Option<(Constraint, T)> {
        let mut best: Option<(Constraint, T)> = None;
        for (key, value) in options {
            let candidate = Constraint::parse(key);
            if self.is_latest() || self.matches(&candidate) {
                let replace = match &best {
                    None => true,
                    Some((best_constraint, _)) => candidate.is_greater_than(best_constraint),
                };
                if replace {
                    best = Some((candidate, value));
                }
            }
        }
        best
    }
}
