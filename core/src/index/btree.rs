use std::collections::BTreeMap;
use std::ops::Bound;

use crate::batch::Column;
use crate::value::ScalarValue;

/// Ordered map from cell value to the rows holding it.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct BTreeIndex {
    entries: BTreeMap<ScalarValue, Vec<u64>>,
}

impl BTreeIndex {
    pub(crate) fn build(column: &Column) -> Self {
        let mut index = Self::default();
        for row in 0..column.len() {
            if let Some(value) = column.scalar_at(row) {
                index.insert(value, row as u64);
            }
        }
        index
    }

    pub(crate) fn insert(&mut self, value: ScalarValue, row: u64) {
        let rows = self.entries.entry(value).or_default();
        match rows.binary_search(&row) {
            Ok(_) => {}
            Err(position) => rows.insert(position, row),
        }
    }

    pub(crate) fn remove(&mut self, value: &ScalarValue, row: u64) {
        let Some(rows) = self.entries.get_mut(value) else {
            return;
        };
        if let Ok(position) = rows.binary_search(&row) {
            rows.remove(position);
        }
        if rows.is_empty() {
            self.entries.remove(value);
        }
    }

    pub(crate) fn equal(&self, value: &ScalarValue) -> &[u64] {
        self.entries.get(value).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn range(&self, lower: Bound<&ScalarValue>, upper: Bound<&ScalarValue>) -> Vec<u64> {
        if let (
            Bound::Included(low) | Bound::Excluded(low),
            Bound::Included(high) | Bound::Excluded(high),
        ) = (lower, upper)
        {
            // BTreeMap::range panics on inverted bounds
            if low > high {
                return Vec::new();
            }
            let both_inclusive =
                matches!(lower, Bound::Included(_)) && matches!(upper, Bound::Included(_));
            if low == high && !both_inclusive {
                return Vec::new();
            }
        }
        self.entries
            .range((lower, upper))
            .flat_map(|(_, rows)| rows.iter().copied())
            .collect()
    }

    pub(crate) fn distinct_values(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_rows_per_value() {
        let column = Column::Utf8(vec!["b".into(), "a".into(), "b".into()]);
        let mut index = BTreeIndex::build(&column);
        assert_eq!(index.equal(&ScalarValue::from("b")), &[0, 2]);
        assert_eq!(index.distinct_values(), 2);

        index.remove(&ScalarValue::from("b"), 0);
        index.insert(ScalarValue::from("c"), 0);
        assert_eq!(index.equal(&ScalarValue::from("b")), &[2]);
        assert_eq!(index.equal(&ScalarValue::from("c")), &[0]);
    }

    #[test]
    fn range_handles_inverted_and_empty_bounds() {
        let index = BTreeIndex::build(&Column::Int64(vec![5, 1, 3, 9]));
        let three = ScalarValue::Int(3);
        let nine = ScalarValue::Int(9);
        let mut rows = index.range(Bound::Included(&three), Bound::Excluded(&nine));
        rows.sort_unstable();
        assert_eq!(rows, vec![0, 2]);
        assert!(index
            .range(Bound::Included(&nine), Bound::Included(&three))
            .is_empty());
        assert!(index
            .range(Bound::Excluded(&three), Bound::Excluded(&three))
            .is_empty());
    }
}
