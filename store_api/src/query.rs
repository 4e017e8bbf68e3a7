use std::cmp::Ordering;

use crate::{Document, FieldValue};

/// Sort direction for [`OrderBy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A single filter clause. Documents lacking the field never match.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equal(String, FieldValue),
    /// Strictly greater than; values of another kind never match.
    GreaterThan(String, FieldValue),
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Equal(field, value) => doc.get(field) == Some(value),
            Filter::GreaterThan(field, value) => doc
                .get(field)
                .and_then(|v| v.compare(value))
                .is_some_and(|ord| ord == Ordering::Greater),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Query over one collection, built in the usual chained style:
///
/// ```
/// use store_api::{Direction, Query};
/// let q = Query::collection("messages")
///     .where_eq("roomId", "r1")
///     .order_by("createdAt", Direction::Descending)
///     .limit(1);
/// assert_eq!(q.collection_name(), "messages");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    filters: Vec<Filter>,
    order_by: Option<OrderBy>,
    limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter::Equal(field.into(), value.into()));
        self
    }

    pub fn where_gt(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter::GreaterThan(field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn result_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Whether `doc` passes every filter and carries the ordering field.
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(order) = &self.order_by {
            if doc.get(&order.field).is_none() {
                return false;
            }
        }
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Evaluate the query against the documents of its collection: filter,
    /// sort (ties broken by document id, following the sort direction) and
    /// truncate to the limit.
    pub fn apply<I>(&self, docs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut out: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        match &self.order_by {
            Some(order) => out.sort_by(|a, b| {
                let ord = match (a.get(&order.field), b.get(&order.field)) {
                    (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                }
                .then_with(|| a.id.cmp(&b.id));
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            }),
            None => out.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}
