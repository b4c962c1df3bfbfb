use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single non-vector cell.
///
/// Values are totally ordered so they can key a BTREE index or a merge
/// lookup table. Floats order with `total_cmp` and hash by bit pattern,
/// after folding `-0.0` into `0.0`.
#[derive(Debug, Clone)]
pub enum ScalarValue {
    Boolean(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Utf8(String),
}

impl ScalarValue {
    fn rank(&self) -> u8 {
        match self {
            Self::Boolean(_) => 0,
            Self::Int(_) => 1,
            Self::UInt(_) => 2,
            Self::Float(_) => 3,
            Self::Utf8(_) => 4,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(value) => Some(value),
            _ => None,
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScalarValue {}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScalarValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Boolean(left), Self::Boolean(right)) => left.cmp(right),
            (Self::Int(left), Self::Int(right)) => left.cmp(right),
            (Self::UInt(left), Self::UInt(right)) => left.cmp(right),
            (Self::Float(left), Self::Float(right)) => {
                canonical_zero(*left).total_cmp(&canonical_zero(*right))
            }
            (Self::Utf8(left), Self::Utf8(right)) => left.cmp(right),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Boolean(value) => value.hash(state),
            Self::Int(value) => value.hash(state),
            Self::UInt(value) => value.hash(state),
            Self::Float(value) => canonical_zero(*value).to_bits().hash(state),
            Self::Utf8(value) => value.hash(state),
        }
    }
}

fn canonical_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::UInt(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Utf8(value) => write!(f, "'{value}'"),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn floats_order_totally() {
        let mut values = vec![
            ScalarValue::Float(2.5),
            ScalarValue::Float(-1.0),
            ScalarValue::Float(0.0),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                ScalarValue::Float(-1.0),
                ScalarValue::Float(0.0),
                ScalarValue::Float(2.5)
            ]
        );
    }

    #[test]
    fn signed_zeros_are_one_key() {
        assert_eq!(ScalarValue::Float(-0.0), ScalarValue::Float(0.0));
        let set: HashSet<ScalarValue> = [ScalarValue::Float(-0.0), ScalarValue::Float(0.0)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn equal_values_hash_equal() {
        let set: HashSet<ScalarValue> = [
            ScalarValue::from("a"),
            ScalarValue::from("a"),
            ScalarValue::Int(1),
            ScalarValue::UInt(1),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 3);
    }
}
