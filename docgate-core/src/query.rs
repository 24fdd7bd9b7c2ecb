//! Filter and order descriptions.
//!
//! A [`Filter`] is an ordered list of `(key, Condition)` clauses, a tagged rendition of
//! the SQL-where-like maps callers pass to a gateway. It can be built fluently or parsed
//! from a key-convention map with [`Filter::from_document`]:
//!
//! | Key | Value | Condition |
//! |---|---|---|
//! | starts with `$`, or purely numeric | document | [`Condition::Nested`] |
//! | starts with `$`, or purely numeric | array | [`Condition::List`] |
//! | starts with `$`, or purely numeric | anything else | [`Condition::Raw`] |
//! | starts with `-` | array | [`Condition::NotIn`] on the stripped key |
//! | starts with `-` | anything else | [`Condition::NotEquals`] on the stripped key |
//! | ordinary | document whose first key starts with `$` | [`Condition::Nested`] |
//! | ordinary | non-empty array | [`Condition::In`] |
//! | ordinary | anything else, including `[]` | [`Condition::Equals`] |
//!
//! An empty array under an ordinary key is an equality match against an empty array,
//! not "in nothing".
//!
//! An [`Order`] maps field names to a [`SortDirection`].
//!
//! ```ignore
//! use docgate::query::{Filter, Order};
//!
//! let filter = Filter::new()
//!     .eq("artist", "Nina")
//!     .not_in("status", ["draft", "deleted"]);
//! let order = Order::new().desc("year").asc("title");
//! ```

use bson::{Bson, Document};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Prefix that marks a store operator key (`$in`, `$or`, ...).
pub const OPERATOR_MARKER: char = '$';

/// Prefix that negates an ordinary key (`-status`).
pub const NEGATION_MARKER: char = '-';

/// A single match condition attached to a filter key.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The field equals the value.
    Equals(Bson),
    /// The field equals any of the values.
    In(Vec<Bson>),
    /// The field does not equal the value.
    NotEquals(Bson),
    /// The field equals none of the values.
    NotIn(Vec<Bson>),
    /// An operand passed to the store as-is.
    Raw(Bson),
    /// A sub-filter, used for operator documents such as `{ "$gt": 5 }`.
    Nested(Filter),
    /// A positional sequence under an operator key, such as the clauses of `$or`.
    List(Vec<Condition>),
}

/// An ordered set of filter clauses. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
}

impl Filter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a key-convention map into a filter (see the module docs).
    pub fn from_document(document: Document) -> Self {
        Filter {
            clauses: document
                .into_iter()
                .map(|(key, value)| parse_clause(key, value))
                .collect(),
        }
    }

    /// Appends a clause.
    pub fn clause(mut self, key: impl Into<String>, condition: Condition) -> Self {
        self.clauses.push((key.into(), condition));
        self
    }

    /// Adds an equality clause.
    pub fn eq(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.clause(key, Condition::Equals(value.into()))
    }

    /// Adds a not-equal clause.
    pub fn ne(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.clause(key, Condition::NotEquals(value.into()))
    }

    /// Adds an "in sequence" clause.
    pub fn is_in<V: Into<Bson>>(
        self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.clause(key, Condition::In(values.into_iter().map(Into::into).collect()))
    }

    /// Adds a "not in sequence" clause.
    pub fn not_in<V: Into<Bson>>(
        self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.clause(key, Condition::NotIn(values.into_iter().map(Into::into).collect()))
    }

    /// Adds a clause whose value is handed to the store untouched, e.g. `("$where", ...)`.
    pub fn raw(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.clause(key, Condition::Raw(value.into()))
    }

    /// Adds a nested sub-filter, e.g. `("age", Filter::new().raw("$gt", 18))`.
    pub fn nested(self, key: impl Into<String>, filter: Filter) -> Self {
        self.clause(key, Condition::Nested(filter))
    }

    /// Returns the clauses in insertion order.
    pub fn clauses(&self) -> &[(String, Condition)] {
        &self.clauses
    }

    /// Whether the filter has no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Number of clauses.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }
}

impl From<Document> for Filter {
    fn from(document: Document) -> Self {
        Filter::from_document(document)
    }
}

fn is_operator_key(key: &str) -> bool {
    key.starts_with(OPERATOR_MARKER)
        || (!key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_clause(key: String, value: Bson) -> (String, Condition) {
    if is_operator_key(&key) {
        return (key, parse_operand(value));
    }

    if let Some(field) = key.strip_prefix(NEGATION_MARKER) {
        let condition = match value {
            Bson::Array(values) => Condition::NotIn(values),
            other => Condition::NotEquals(other),
        };
        return (field.to_string(), condition);
    }

    let condition = match value {
        Bson::Document(sub)
            if sub
                .keys()
                .next()
                .is_some_and(|k| k.starts_with(OPERATOR_MARKER)) =>
        {
            Condition::Nested(Filter::from_document(sub))
        }
        Bson::Array(values) if !values.is_empty() => Condition::In(values),
        other => Condition::Equals(other),
    };

    (key, condition)
}

fn parse_operand(value: Bson) -> Condition {
    match value {
        Bson::Document(sub) => Condition::Nested(Filter::from_document(sub)),
        Bson::Array(items) => Condition::List(
            items
                .into_iter()
                .map(|item| match item {
                    Bson::Document(sub) => Condition::Nested(Filter::from_document(sub)),
                    other => Condition::Raw(other),
                })
                .collect(),
        ),
        other => Condition::Raw(other),
    }
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// Reads a direction token.
    ///
    /// `"desc"` in any case, a negative number, or a string holding a negative number
    /// mean descending. Anything else is ascending.
    pub fn from_token(token: &Bson) -> Self {
        let descending = match token {
            Bson::String(s) => {
                s.eq_ignore_ascii_case("desc")
                    || s.trim().parse::<f64>().is_ok_and(|n| n < 0.0)
            }
            Bson::Int32(n) => *n < 0,
            Bson::Int64(n) => *n < 0,
            Bson::Double(n) => *n < 0.0,
            _ => false,
        };

        if descending {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    /// The store's numeric form: `1` or `-1`.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// An ordered sort specification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    keys: Vec<(String, SortDirection)>,
}

impl Order {
    /// Creates an empty order (no sort applied).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `{ field: direction-token }` map. See [`SortDirection::from_token`].
    pub fn from_document(document: Document) -> Self {
        Order {
            keys: document
                .iter()
                .map(|(k, v)| (k.clone(), SortDirection::from_token(v)))
                .collect(),
        }
    }

    /// Adds a field with an explicit direction.
    pub fn by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push((field.into(), direction));
        self
    }

    /// Adds an ascending field.
    pub fn asc(self, field: impl Into<String>) -> Self {
        self.by(field, SortDirection::Asc)
    }

    /// Adds a descending field.
    pub fn desc(self, field: impl Into<String>) -> Self {
        self.by(field, SortDirection::Desc)
    }

    /// Returns the sort keys in insertion order.
    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }

    /// Whether no sort keys are set.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl From<Document> for Order {
    fn from(document: Document) -> Self {
        Order::from_document(document)
    }
}

/// Conversion into a [`Filter`], validating that the input is mapping-shaped.
pub trait IntoFilter {
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidInput`] when the input is not a mapping.
    fn into_filter(self) -> DocumentStoreResult<Filter>;
}

impl IntoFilter for Filter {
    fn into_filter(self) -> DocumentStoreResult<Filter> {
        Ok(self)
    }
}

impl IntoFilter for Document {
    fn into_filter(self) -> DocumentStoreResult<Filter> {
        Ok(Filter::from_document(self))
    }
}

impl IntoFilter for Bson {
    fn into_filter(self) -> DocumentStoreResult<Filter> {
        match self {
            Bson::Document(document) => Ok(Filter::from_document(document)),
            Bson::Null => Ok(Filter::new()),
            other => Err(DocumentStoreError::InvalidInput(format!(
                "filter must be a mapping, got {:?}",
                other.element_type()
            ))),
        }
    }
}

impl<T: IntoFilter> IntoFilter for Option<T> {
    fn into_filter(self) -> DocumentStoreResult<Filter> {
        self.map_or_else(|| Ok(Filter::new()), IntoFilter::into_filter)
    }
}

/// Conversion into an [`Order`], validating that the input is mapping-shaped.
pub trait IntoOrder {
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidInput`] when the input is not a mapping.
    fn into_order(self) -> DocumentStoreResult<Order>;
}

impl IntoOrder for Order {
    fn into_order(self) -> DocumentStoreResult<Order> {
        Ok(self)
    }
}

impl IntoOrder for Document {
    fn into_order(self) -> DocumentStoreResult<Order> {
        Ok(Order::from_document(self))
    }
}

impl IntoOrder for Bson {
    fn into_order(self) -> DocumentStoreResult<Order> {
        match self {
            Bson::Document(document) => Ok(Order::from_document(document)),
            Bson::Null => Ok(Order::new()),
            other => Err(DocumentStoreError::InvalidInput(format!(
                "order must be a mapping, got {:?}",
                other.element_type()
            ))),
        }
    }
}

impl<T: IntoOrder> IntoOrder for Option<T> {
    fn into_order(self) -> DocumentStoreResult<Order> {
        self.map_or_else(|| Ok(Order::new()), IntoOrder::into_order)
    }
}

/// Visitor over [`Condition`] variants.
///
/// Implementors turn a filter into some other representation; see
/// [`QueryTranslator`](crate::translate::QueryTranslator) for the native query form.
pub trait FilterVisitor {
    type Output;

    fn visit_equals(&mut self, value: &Bson) -> Self::Output;
    fn visit_in(&mut self, values: &[Bson]) -> Self::Output;
    fn visit_not_equals(&mut self, value: &Bson) -> Self::Output;
    fn visit_not_in(&mut self, values: &[Bson]) -> Self::Output;
    fn visit_raw(&mut self, value: &Bson) -> Self::Output;
    fn visit_nested(&mut self, filter: &Filter) -> Self::Output;
    fn visit_list(&mut self, items: &[Condition]) -> Self::Output;

    fn visit_condition(&mut self, condition: &Condition) -> Self::Output {
        match condition {
            Condition::Equals(value) => self.visit_equals(value),
            Condition::In(values) => self.visit_in(values),
            Condition::NotEquals(value) => self.visit_not_equals(value),
            Condition::NotIn(values) => self.visit_not_in(values),
            Condition::Raw(value) => self.visit_raw(value),
            Condition::Nested(filter) => self.visit_nested(filter),
            Condition::List(items) => self.visit_list(items),
        }
    }
}
