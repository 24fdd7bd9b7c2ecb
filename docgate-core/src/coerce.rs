//! Identifier coercion.
//!
//! Callers usually carry identifiers around as display-friendly hex strings, while the
//! store only matches its native [`ObjectId`] type. The functions here walk a BSON value
//! and swap every string that looks like a canonical identifier for the native type.

use bson::{Bson, Document, oid::ObjectId};

/// Length of the canonical hex form of an [`ObjectId`].
const OBJECT_ID_HEX_LEN: usize = 24;

/// Returns `true` when `value` is exactly 24 hexadecimal characters (either case).
pub fn is_object_id_hex(value: &str) -> bool {
    value.len() == OBJECT_ID_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Recursively converts identifier-like strings into native identifiers.
///
/// - Strings matching [`is_object_id_hex`] become [`Bson::ObjectId`]
/// - Arrays are coerced element-wise
/// - Documents have their values coerced; keys are left untouched
/// - Everything else passes through unchanged
pub fn coerce(value: Bson) -> Bson {
    match value {
        Bson::String(s) if is_object_id_hex(&s) => match ObjectId::parse_str(&s) {
            Ok(oid) => Bson::ObjectId(oid),
            Err(_) => Bson::String(s),
        },
        Bson::Array(arr) => Bson::Array(arr.into_iter().map(coerce).collect()),
        Bson::Document(doc) => Bson::Document(coerce_document(doc)),
        other => other,
    }
}

/// Applies [`coerce`] to every value of a document.
pub fn coerce_document(document: Document) -> Document {
    document
        .into_iter()
        .map(|(k, v)| (k, coerce(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    const HEX: &str = "507f1f77bcf86cd799439011";

    #[test]
    fn test_hex_string_becomes_object_id() {
        let expected = ObjectId::parse_str(HEX).unwrap();
        assert_eq!(coerce(Bson::String(HEX.into())), Bson::ObjectId(expected));
    }

    #[test]
    fn test_uppercase_hex_is_accepted() {
        assert!(is_object_id_hex("507F1F77BCF86CD799439011"));
        assert!(matches!(
            coerce(Bson::String("507F1F77BCF86CD799439011".into())),
            Bson::ObjectId(_)
        ));
    }

    #[test]
    fn test_other_strings_pass_through() {
        assert_eq!(coerce(Bson::String("not-an-id".into())), Bson::String("not-an-id".into()));
        // one character short
        assert_eq!(
            coerce(Bson::String("507f1f77bcf86cd79943901".into())),
            Bson::String("507f1f77bcf86cd79943901".into())
        );
        assert_eq!(coerce(Bson::Int32(7)), Bson::Int32(7));
    }

    #[test]
    fn test_nested_values_are_coerced_keys_untouched() {
        let coerced = coerce_document(doc! { "a": [HEX, "x"], HEX: { "b": HEX } });
        let oid = ObjectId::parse_str(HEX).unwrap();

        assert_eq!(coerced, doc! { "a": [oid, "x"], HEX: { "b": oid } });
    }
}
