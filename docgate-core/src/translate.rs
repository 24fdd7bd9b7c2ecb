//! Translation of [`Filter`] and [`Order`] into the store's native query documents.
//!
//! Translation is pure and infallible. Identifier coercion happens here, on every leaf
//! value, so a filter built from display strings still matches native identifiers.
//!
//! | Condition | Native form |
//! |---|---|
//! | `Equals(v)` | `v` |
//! | `In(vs)` | `{ "$in": vs }` |
//! | `NotEquals(v)` | `{ "$ne": v }` |
//! | `NotIn(vs)` | `{ "$nin": vs }` |
//! | `Raw(v)` | `v` |
//! | `Nested(f)` | the translated sub-filter |
//! | `List(cs)` | an array of translated items |

use bson::{Bson, Document, doc};

use crate::coerce::coerce;
use crate::query::{Condition, Filter, FilterVisitor, Order};

/// Converts filters and orders into native query documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryTranslator;

impl QueryTranslator {
    pub fn new() -> Self {
        QueryTranslator
    }

    /// Translates a filter. The empty filter becomes the empty document.
    pub fn translate_filter(&mut self, filter: &Filter) -> Document {
        let mut document = Document::new();
        for (key, condition) in filter.clauses() {
            document.insert(key.clone(), self.visit_condition(condition));
        }
        document
    }

    /// Translates an order into `{ field: 1 | -1 }`.
    pub fn translate_order(&self, order: &Order) -> Document {
        order
            .keys()
            .iter()
            .map(|(field, direction)| (field.clone(), Bson::Int32(direction.as_i32())))
            .collect()
    }
}

impl FilterVisitor for QueryTranslator {
    type Output = Bson;

    fn visit_equals(&mut self, value: &Bson) -> Bson {
        coerce(value.clone())
    }

    fn visit_in(&mut self, values: &[Bson]) -> Bson {
        Bson::Document(doc! { "$in": coerce(Bson::Array(values.to_vec())) })
    }

    fn visit_not_equals(&mut self, value: &Bson) -> Bson {
        Bson::Document(doc! { "$ne": coerce(value.clone()) })
    }

    fn visit_not_in(&mut self, values: &[Bson]) -> Bson {
        Bson::Document(doc! { "$nin": coerce(Bson::Array(values.to_vec())) })
    }

    fn visit_raw(&mut self, value: &Bson) -> Bson {
        coerce(value.clone())
    }

    fn visit_nested(&mut self, filter: &Filter) -> Bson {
        Bson::Document(self.translate_filter(filter))
    }

    fn visit_list(&mut self, items: &[Condition]) -> Bson {
        Bson::Array(items.iter().map(|item| self.visit_condition(item)).collect())
    }
}

/// Shorthand for `QueryTranslator::new().translate_filter(filter)`.
pub fn translate_filter(filter: &Filter) -> Document {
    QueryTranslator::new().translate_filter(filter)
}

/// Shorthand for `QueryTranslator::new().translate_order(order)`.
pub fn translate_order(order: &Order) -> Document {
    QueryTranslator::new().translate_order(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    const HEX: &str = "507f1f77bcf86cd799439011";

    #[test]
    fn test_empty_filter() {
        assert_eq!(translate_filter(&Filter::new()), Document::new());
    }

    #[test]
    fn test_sequence_value_becomes_in() {
        let filter = Filter::from_document(doc! { "tags": ["x", "y"] });
        assert_eq!(translate_filter(&filter), doc! { "tags": { "$in": ["x", "y"] } });
    }

    #[test]
    fn test_negated_keys() {
        let filter = Filter::from_document(doc! { "-status": ["a", "b"], "-kind": "x" });
        assert_eq!(
            translate_filter(&filter),
            doc! { "status": { "$nin": ["a", "b"] }, "kind": { "$ne": "x" } }
        );
    }

    #[test]
    fn test_empty_sequence_is_equality() {
        let filter = Filter::from_document(doc! { "tags": [] });
        assert_eq!(translate_filter(&filter), doc! { "tags": [] });
    }

    #[test]
    fn test_operator_documents_pass_through() {
        let native = doc! {
            "age": { "$gt": 18, "$lte": 65 },
            "$or": [{ "a": 1 }, { "b": { "$exists": true } }],
        };
        assert_eq!(translate_filter(&Filter::from_document(native.clone())), native);
    }

    #[test]
    fn test_identifiers_are_coerced() {
        let oid = ObjectId::parse_str(HEX).unwrap();
        let filter = Filter::new().eq("_id", HEX).is_in("ref", [HEX, "plain"]);

        assert_eq!(
            translate_filter(&filter),
            doc! { "_id": oid, "ref": { "$in": [oid, "plain"] } }
        );
    }

    #[test]
    fn test_order_translation() {
        let order = Order::from_document(doc! { "year": "DESC", "title": "asc", "rank": -1 });
        assert_eq!(translate_order(&order), doc! { "year": -1, "title": 1, "rank": -1 });
    }
}
