//! Keys of the sorted indexes a `MemorySource` keeps.

use rill_core::{compare_values, Direction, OrderPart, Row, Value};
use std::cmp::Ordering;

/// One component of an index key.
///
/// `Min` and `Max` never occur in stored keys. They let a scan start before
/// or after every row sharing a constrained prefix, whatever direction the
/// remaining columns sort in.
#[derive(Clone, Debug)]
pub(crate) enum KeyPart {
    Min,
    Value(Value),
    Max,
}

impl KeyPart {
    fn compare(&self, other: &KeyPart) -> Ordering {
        match (self, other) {
            (KeyPart::Min, KeyPart::Min) | (KeyPart::Max, KeyPart::Max) => Ordering::Equal,
            (KeyPart::Min, _) | (_, KeyPart::Max) => Ordering::Less,
            (_, KeyPart::Min) | (KeyPart::Max, _) => Ordering::Greater,
            (KeyPart::Value(a), KeyPart::Value(b)) => compare_values(a, b),
        }
    }
}

/// A row's position in an index, one part per index column.
#[derive(Clone, Debug)]
pub(crate) struct IndexKey {
    parts: Vec<(KeyPart, Direction)>,
}

impl IndexKey {
    /// The key of `row` in an index sorted by `sort`.
    pub(crate) fn from_row(row: &Row, sort: &[OrderPart]) -> Self {
        Self {
            parts: sort
                .iter()
                .map(|p| (KeyPart::Value(row.get(&p.column).clone()), p.direction))
                .collect(),
        }
    }

    /// The first (or, for reverse scans, last) possible key among rows whose
    /// constrained columns equal the given values.
    pub(crate) fn scan_start<'a>(
        sort: &[OrderPart],
        fixed: impl Fn(&str) -> Option<&'a Value>,
        reverse: bool,
    ) -> Self {
        Self {
            parts: sort
                .iter()
                .map(|p| {
                    let part = match fixed(&p.column) {
                        Some(v) => KeyPart::Value(v.clone()),
                        None => match (p.direction, reverse) {
                            (Direction::Asc, false) | (Direction::Desc, true) => KeyPart::Min,
                            (Direction::Desc, false) | (Direction::Asc, true) => KeyPart::Max,
                        },
                    };
                    (part, p.direction)
                })
                .collect(),
        }
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for ((a, dir), (b, _)) in self.parts.iter().zip(other.parts.iter()) {
            let ord = dir.apply(a.compare(b));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.parts.len().cmp(&other.parts.len())
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}
