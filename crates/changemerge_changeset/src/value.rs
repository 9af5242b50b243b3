//! Column values.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single column value, one of the SQLite storage classes.
///
/// Values are totally ordered so that primary-key tuples can key ordered maps:
/// `Null` sorts first, then numerics, then text, then blobs. Integers and reals
/// are compared exactly by magnitude; an integer sorts before a real of equal
/// magnitude, so two values are equal only if they share a storage class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer, if this is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the text, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    fn class_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) | Value::Real(_) => 1,
            Value::Text(_) => 2,
            Value::Blob(_) => 3,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => match a.partial_cmp(b) {
                Some(Ordering::Equal) | None => a.total_cmp(b),
                Some(ord) => ord,
            },
            (Value::Integer(a), Value::Real(b)) => {
                compare_integer_real(*a, *b).then(Ordering::Less)
            }
            (Value::Real(a), Value::Integer(b)) => {
                compare_integer_real(*b, *a).reverse().then(Ordering::Greater)
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            _ => self.class_rank().cmp(&other.class_rank()),
        }
    }
}

/// Compares an integer with a real without rounding either.
fn compare_integer_real(i: i64, r: f64) -> Ordering {
    // 2^63, exactly representable.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if r.is_nan() {
        return if r.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if r >= LIMIT {
        return Ordering::Less;
    }
    if r < -LIMIT {
        return Ordering::Greater;
    }
    let whole = r.trunc();
    // In range, so the cast is exact.
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&r).unwrap_or(Ordering::Equal),
        ord => ord,
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Blob(b) => {
                f.write_str("x'")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("'")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn storage_class_ordering() {
        let mut values = vec![
            Value::Blob(vec![1]),
            Value::Text("a".into()),
            Value::Integer(3),
            Value::Null,
            Value::Real(2.5),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Real(2.5),
                Value::Integer(3),
                Value::Text("a".into()),
                Value::Blob(vec![1]),
            ]
        );
    }

    #[test]
    fn integer_and_real_compare_by_magnitude() {
        assert!(Value::Integer(2) < Value::Real(2.5));
        assert!(Value::Integer(3) > Value::Real(2.5));
        assert!(Value::Integer(-3) < Value::Real(-2.5));
        assert!(Value::Integer(i64::MAX) < Value::Real(1.0e19));
        assert!(Value::Integer(i64::MIN) > Value::Real(-1.0e19));
    }

    #[test]
    fn storage_class_change_is_not_equal() {
        assert_ne!(Value::Integer(1), Value::Real(1.0));
        assert!(Value::Integer(1) < Value::Real(1.0));
        assert!(Value::Real(1.0) < Value::Integer(2));
    }

    #[test]
    fn large_integers_compare_exactly_against_reals() {
        let exact = Value::Integer(1 << 53);
        let above = Value::Integer((1 << 53) + 1);
        let real = Value::Real(9_007_199_254_740_992.0);

        assert!(exact < real);
        assert!(real < above);
        assert!(exact < above);
        assert_ne!(above, real);

        let mut rows = BTreeMap::new();
        rows.insert(vec![exact.clone()], "exact");
        rows.insert(vec![above.clone()], "above");
        assert_eq!(rows.get(&vec![real]), None);
        assert_eq!(rows.get(&vec![above]), Some(&"above"));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn signed_zero_and_nan_stay_ordered() {
        let mut values = vec![
            Value::Real(f64::NAN),
            Value::Real(0.0),
            Value::Integer(0),
            Value::Real(-0.0),
            Value::Real(-f64::NAN),
        ];
        values.sort();
        assert!(matches!(values[0], Value::Real(r) if r.is_nan()));
        assert_eq!(values[1], Value::Integer(0));
        assert!(matches!(values[2], Value::Real(r) if r == 0.0 && r.is_sign_negative()));
        assert!(matches!(values[3], Value::Real(r) if r == 0.0 && r.is_sign_positive()));
        assert!(matches!(values[4], Value::Real(r) if r.is_nan()));
    }

    #[test]
    fn display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Text("x".into()).to_string(), "'x'");
        assert_eq!(Value::Blob(vec![0xca, 0xfe]).to_string(), "x'cafe'");
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(7i64)), Value::Integer(7));
    }
}
