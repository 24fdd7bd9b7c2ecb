//! Native query evaluation for in-memory documents.
//!
//! Evaluates the query, sort and update documents a gateway produces against plain BSON
//! documents, following the store's matching rules closely enough for development and
//! tests:
//!
//! - top-level clauses are ANDed; `$and`, `$or` and `$nor` take arrays of sub-queries
//! - field keys may be dotted paths (`address.city`, `tags.0`)
//! - a plain value matches by equality, and an array field matches when any element does
//! - a missing field equals `null`
//! - operator documents support `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`,
//!   `$exists`, `$not` and `$size`
//!
//! Anything else is reported as a query error rather than silently ignored.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docgate_core::error::{DocumentStoreError, DocumentStoreResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64` so `Int32(1)`, `Int64(1)` and `Double(1.0)`
/// compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl Comparable<'_> {
    /// Cross-type sort rank, mirroring the store's BSON comparison order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting; values of different types order by rank.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        match self.rank().cmp(&other.rank()) {
            Ordering::Equal => self.partial_cmp(other).unwrap_or(Ordering::Equal),
            unequal => unequal,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a dotted path. Numeric segments index into arrays.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Evaluates native queries against one document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Whether the document satisfies `query`.
    ///
    /// # Errors
    ///
    /// Returns a query error for unsupported operators or malformed operands.
    pub fn matches(&self, query: &Document) -> DocumentStoreResult<bool> {
        for (key, spec) in query {
            let matched = match key.as_str() {
                "$and" => self.all(sub_queries(key, spec)?)?,
                "$or" => self.any(sub_queries(key, spec)?)?,
                "$nor" => !self.any(sub_queries(key, spec)?)?,
                "$comment" => true,
                other if other.starts_with('$') => {
                    return Err(unsupported(other));
                }
                path => self.field_matches(lookup(self.document, path), spec)?,
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn all(&self, queries: Vec<&Document>) -> DocumentStoreResult<bool> {
        for query in queries {
            if !self.matches(query)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn any(&self, queries: Vec<&Document>) -> DocumentStoreResult<bool> {
        for query in queries {
            if self.matches(query)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn field_matches(&self, value: Option<&Bson>, spec: &Bson) -> DocumentStoreResult<bool> {
        match spec {
            Bson::Document(operators) if is_operator_document(operators) => {
                for (operator, operand) in operators {
                    if !apply_operator(value, operator, operand)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(equals(value, spec)),
        }
    }

    /// Filters `documents`, keeping the ones that match `query`.
    pub fn filter_documents<'d>(
        documents: impl IntoIterator<Item = &'d Document>,
        query: &Document,
    ) -> DocumentStoreResult<Vec<&'d Document>> {
        let mut matched = Vec::new();
        for document in documents {
            if DocumentEvaluator::new(document).matches(query)? {
                matched.push(document);
            }
        }
        Ok(matched)
    }
}

fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn sub_queries<'q>(operator: &str, spec: &'q Bson) -> DocumentStoreResult<Vec<&'q Document>> {
    let Bson::Array(items) = spec else {
        return Err(DocumentStoreError::query(format!("{operator} must be an array")));
    };
    items
        .iter()
        .map(|item| {
            item.as_document().ok_or_else(|| {
                DocumentStoreError::query(format!("{operator} entries must be documents"))
            })
        })
        .collect()
}

fn unsupported(operator: &str) -> DocumentStoreError {
    DocumentStoreError::query(format!("unknown operator: {operator}"))
}

/// Equality with array fan-out; a missing field equals `null`.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    let expected = Comparable::from(expected);
    match value {
        None => expected == Comparable::Null,
        Some(value) => {
            let actual = Comparable::from(value);
            if actual == expected {
                return true;
            }
            match actual {
                Comparable::Array(items) => items.iter().any(|item| *item == expected),
                _ => false,
            }
        }
    }
}

/// Ordered comparison with array fan-out. Values of different types never match.
fn compares(value: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    let operand = Comparable::from(operand);
    let check = |item: &Comparable<'_>| item.partial_cmp(&operand).is_some_and(accept);

    match Comparable::from(value) {
        Comparable::Array(items) => items.iter().any(check),
        single => check(&single),
    }
}

fn operand_values<'o>(operator: &str, operand: &'o Bson) -> DocumentStoreResult<&'o [Bson]> {
    match operand {
        Bson::Array(values) => Ok(values),
        _ => Err(DocumentStoreError::query(format!("{operator} needs an array"))),
    }
}

fn apply_operator(value: Option<&Bson>, operator: &str, operand: &Bson) -> DocumentStoreResult<bool> {
    Ok(match operator {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => compares(value, operand, Ordering::is_gt),
        "$gte" => compares(value, operand, Ordering::is_ge),
        "$lt" => compares(value, operand, Ordering::is_lt),
        "$lte" => compares(value, operand, Ordering::is_le),
        "$in" => operand_values(operator, operand)?
            .iter()
            .any(|candidate| equals(value, candidate)),
        "$nin" => !operand_values(operator, operand)?
            .iter()
            .any(|candidate| equals(value, candidate)),
        "$exists" => {
            let should_exist = match operand {
                Bson::Boolean(flag) => *flag,
                Bson::Int32(n) => *n != 0,
                Bson::Int64(n) => *n != 0,
                _ => true,
            };
            value.is_some() == should_exist
        }
        "$not" => match operand {
            Bson::Document(operators) => {
                for (inner, inner_operand) in operators {
                    if !apply_operator(value, inner, inner_operand)? {
                        return Ok(true);
                    }
                }
                false
            }
            _ => return Err(DocumentStoreError::query("$not needs an operator document")),
        },
        "$size" => match (value, operand.as_i64().or_else(|| operand.as_i32().map(i64::from))) {
            (Some(Bson::Array(items)), Some(size)) => items.len() as i64 == size,
            _ => false,
        },
        other => return Err(unsupported(other)),
    })
}

/// Compares two documents by a native sort specification (`{ field: 1 | -1 }`).
pub(crate) fn compare_by(sort: &Document, left: &Document, right: &Document) -> Ordering {
    for (path, direction) in sort {
        let descending = match direction {
            Bson::Int32(n) => *n < 0,
            Bson::Int64(n) => *n < 0,
            Bson::Double(n) => *n < 0.0,
            _ => false,
        };
        let a = lookup(left, path).map(Comparable::from).unwrap_or(Comparable::Null);
        let b = lookup(right, path).map(Comparable::from).unwrap_or(Comparable::Null);

        let ordering = if descending { b.sort_cmp(&a) } else { a.sort_cmp(&b) };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Applies a native update document in place.
///
/// Supports `$set` and `$unset` on top-level and dotted paths. A document without
/// operators replaces every field except `_id`.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> DocumentStoreResult<()> {
    if !is_operator_document(update) {
        let mut replacement = Document::new();
        if let Some(id) = document.get("_id") {
            replacement.insert("_id", id.clone());
        }
        for (key, value) in update {
            if key != "_id" {
                replacement.insert(key.clone(), value.clone());
            }
        }
        *document = replacement;
        return Ok(());
    }

    for (operator, operand) in update {
        let Bson::Document(fields) = operand else {
            return Err(DocumentStoreError::query(format!("{operator} needs a document")));
        };
        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone());
                }
            }
            "$unset" => {
                for (path, _) in fields {
                    unset_path(document, path);
                }
            }
            other => return Err(unsupported(other)),
        }
    }
    Ok(())
}

fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                set_path(child, rest, value);
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                unset_path(child, rest);
            }
        }
    }
}
