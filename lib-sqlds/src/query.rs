//! Query descriptors, filters and orders
//!
//! A [`Query`] describes what to fetch: an optional key prefix, an optional
//! window (limit/offset), and lists of filters and orders. Prefix, limit and
//! offset can be pushed down to the backend; filters and orders are always
//! evaluated in memory over the fetched rows.

use std::cmp::Ordering;

use crate::key::Key;

/// A key/value pair produced by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Row key
    pub key: Key,
    /// Row data; empty for keys-only queries
    pub value: Vec<u8>,
    /// Byte length of the stored value, when the query asked for sizes
    pub size: Option<usize>,
}

impl Entry {
    /// Create an entry without size information.
    pub fn new(key: impl Into<Key>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
            size: None,
        }
    }
}

/// Comparison operator used by filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Op {
    /// Whether `ordering` (entry compared to the filter operand) satisfies
    /// this operator.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Op::Equal => ordering == Ordering::Equal,
            Op::NotEqual => ordering != Ordering::Equal,
            Op::GreaterThan => ordering == Ordering::Greater,
            Op::GreaterThanOrEqual => ordering != Ordering::Less,
            Op::LessThan => ordering == Ordering::Less,
            Op::LessThanOrEqual => ordering != Ordering::Greater,
        }
    }
}

/// Predicate evaluated against each fetched entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Compare the entry key against `key`
    KeyCompare { op: Op, key: Key },
    /// Compare the entry value against `value`
    ValueCompare { op: Op, value: Vec<u8> },
    /// Keep entries whose key starts with the prefix
    KeyPrefix(String),
}

impl Filter {
    /// Whether the entry passes this filter.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::KeyCompare { op, key } => op.accepts(entry.key.cmp(key)),
            Filter::ValueCompare { op, value } => op.accepts(entry.value.as_slice().cmp(value)),
            Filter::KeyPrefix(prefix) => entry.key.has_prefix(prefix),
        }
    }
}

/// Sort order applied to query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    ByKey,
    ByKeyDescending,
    ByValue,
    ByValueDescending,
}

impl Order {
    /// Compare two entries under this order.
    pub fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        match self {
            Order::ByKey => a.key.cmp(&b.key),
            Order::ByKeyDescending => b.key.cmp(&a.key),
            Order::ByValue => a.value.cmp(&b.value),
            Order::ByValueDescending => b.value.cmp(&a.value),
        }
    }
}

/// Compare two entries by each order in turn; the first non-equal result wins.
pub fn compare_entries(orders: &[Order], a: &Entry, b: &Entry) -> Ordering {
    orders
        .iter()
        .map(|order| order.compare(a, b))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Query descriptor.
///
/// `limit` and `offset` of `Some(0)` are treated the same as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Only return keys starting with this prefix
    pub prefix: Option<String>,
    /// Maximum number of entries to return
    pub limit: Option<usize>,
    /// Number of entries to skip
    pub offset: Option<usize>,
    /// Filters applied in order
    pub filters: Vec<Filter>,
    /// Orders applied after filtering
    pub orders: Vec<Order>,
    /// Return keys with empty values
    pub keys_only: bool,
    /// Populate [`Entry::size`]
    pub returns_sizes: bool,
}

impl Query {
    /// Query for every key under `prefix`.
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn returning_sizes(mut self) -> Self {
        self.returns_sizes = true;
        self
    }

    /// Non-empty prefix, if any.
    pub fn effective_prefix(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|prefix| !prefix.is_empty())
    }

    /// Non-zero limit, if any.
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|limit| *limit > 0)
    }

    /// Non-zero offset, if any.
    pub fn effective_offset(&self) -> Option<usize> {
        self.offset.filter(|offset| *offset > 0)
    }

    /// Whether prefix, limit and offset are evaluated by the backend.
    ///
    /// Pushdown only happens when a prefix is present.
    pub fn is_pushed_down(&self) -> bool {
        self.effective_prefix().is_some()
    }
}
