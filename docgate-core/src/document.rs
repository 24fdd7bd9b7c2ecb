//! Records and row prototypes.
//!
//! A [`Record`] is the store's document split into its identifier and its remaining
//! fields. Keeping the identifier apart makes it impossible to accidentally send it in
//! an update payload: it only ever travels in the where-clause.
//!
//! A [`Model`] is the row prototype a gateway clones for every returned row. `Record`
//! itself is the default model; typed models implement [`Model::exchange_record`],
//! usually via [`Record::deserialize`].
//!
//! # Example
//!
//! ```ignore
//! use docgate::document::{Model, Record};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! pub struct Album {
//!     pub artist: Option<String>,
//!     pub title: Option<String>,
//! }
//!
//! impl Model for Album {
//!     fn exchange_record(&mut self, record: Record) -> DocumentStoreResult<()> {
//!         *self = record.deserialize()?;
//!         Ok(())
//!     }
//! }
//! ```

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the identifier field in stored documents.
pub const ID_FIELD: &str = "_id";

/// A stored document with a dedicated, optional identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    id: Option<Bson>,
    fields: Document,
}

impl Record {
    /// Creates an empty record with no identifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record from its fields, without an identifier.
    ///
    /// An `_id` key inside `fields` is lifted into the identifier slot.
    pub fn from_fields(fields: Document) -> Self {
        Self::from(fields)
    }

    /// Sets the identifier, builder-style.
    pub fn with_id(mut self, id: impl Into<Bson>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets a field, builder-style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the identifier, if one is set.
    pub fn id(&self) -> Option<&Bson> {
        self.id.as_ref()
    }

    /// Replaces the identifier.
    pub fn set_id(&mut self, id: Option<Bson>) {
        self.id = id;
    }

    /// Whether the record carries a usable identifier.
    ///
    /// Absent, `Null` and empty-string identifiers all count as "no identifier".
    pub fn has_id(&self) -> bool {
        match &self.id {
            None | Some(Bson::Null) => false,
            Some(Bson::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Returns a field value.
    ///
    /// Asking for [`ID_FIELD`] returns the identifier.
    pub fn get(&self, key: &str) -> Option<&Bson> {
        if key == ID_FIELD {
            return self.id.as_ref();
        }
        self.fields.get(key)
    }

    /// Sets a field value. Setting [`ID_FIELD`] sets the identifier.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        let key = key.into();
        if key == ID_FIELD {
            self.id = Some(value.into());
        } else {
            self.fields.insert(key, value);
        }
    }

    /// Returns the non-identifier fields.
    pub fn fields(&self) -> &Document {
        &self.fields
    }

    /// Consumes the record, returning its identifier and fields separately.
    pub fn into_parts(self) -> (Option<Bson>, Document) {
        (self.id, self.fields)
    }

    /// Converts the record into a store document, with `_id` first when present.
    pub fn into_document(self) -> Document {
        let mut document = Document::new();
        if let Some(id) = self.id {
            document.insert(ID_FIELD, id);
        }
        for (key, value) in self.fields {
            document.insert(key, value);
        }
        document
    }

    /// Builds a record from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not serialize to a BSON document.
    pub fn from_serialize<T: Serialize>(value: &T) -> DocumentStoreResult<Self> {
        match serialize_to_bson(value)? {
            Bson::Document(document) => Ok(Self::from(document)),
            other => Err(DocumentStoreError::Serialization(format!(
                "expected a document, got {:?}",
                other.element_type()
            ))),
        }
    }

    /// Deserializes the record (identifier included) into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not match the shape of `T`.
    pub fn deserialize<T: for<'de> Deserialize<'de>>(self) -> DocumentStoreResult<T> {
        Ok(deserialize_from_bson(Bson::Document(self.into_document()))?)
    }
}

impl From<Document> for Record {
    fn from(mut document: Document) -> Self {
        let id = document.remove(ID_FIELD);
        Self { id, fields: document }
    }
}

impl From<Record> for Document {
    fn from(record: Record) -> Self {
        record.into_document()
    }
}

/// A row prototype.
///
/// The gateway keeps one instance as a template, clones it for each returned row and
/// hands it the row's [`Record`].
pub trait Model: Clone + Send + Sync + 'static {
    /// Replaces this instance's state with the contents of `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be represented by this model.
    fn exchange_record(&mut self, record: Record) -> DocumentStoreResult<()>;
}

impl Model for Record {
    fn exchange_record(&mut self, record: Record) -> DocumentStoreResult<()> {
        *self = record;
        Ok(())
    }
}
