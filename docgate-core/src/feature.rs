//! Interceptors run around gateway verbs.
//!
//! A [`FeatureSet`] is an ordered list of [`Feature`]s. Before a verb touches the store
//! every feature's [`pre`](Feature::pre) hook runs in order; afterwards every
//! [`post`](Feature::post) hook runs in the same order with the verb's outcome. A `pre`
//! hook returning an error aborts the verb.
//!
//! ```ignore
//! #[derive(Debug)]
//! struct ReadOnly;
//!
//! impl Feature for ReadOnly {
//!     fn pre(&self, verb: Verb, table: &str) -> DocumentStoreResult<()> {
//!         if verb.is_write() {
//!             return Err(DocumentStoreError::InvalidInput(format!("{table} is read-only")));
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::{fmt, sync::Arc};

use crate::error::DocumentStoreResult;

/// The gateway verb being intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Select,
    Find,
    Get,
    FindOne,
    Insert,
    Update,
    Delete,
    Drop,
    Save,
    GetPages,
    CreateIndex,
    EnsureIndex,
    CreateIndexes,
    DropIndex,
    DropIndexes,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Select => "select",
            Verb::Find => "find",
            Verb::Get => "get",
            Verb::FindOne => "find_one",
            Verb::Insert => "insert",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::Drop => "drop",
            Verb::Save => "save",
            Verb::GetPages => "get_pages",
            Verb::CreateIndex => "create_index",
            Verb::EnsureIndex => "ensure_index",
            Verb::CreateIndexes => "create_indexes",
            Verb::DropIndex => "drop_index",
            Verb::DropIndexes => "drop_indexes",
        }
    }

    /// Whether the verb modifies documents, collections or indexes.
    pub fn is_write(self) -> bool {
        !matches!(
            self,
            Verb::Select | Verb::Find | Verb::Get | Verb::FindOne | Verb::GetPages
        )
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hook pair invoked around gateway verbs. Both hooks default to doing nothing.
pub trait Feature: Send + Sync + fmt::Debug {
    fn pre(&self, _verb: Verb, _table: &str) -> DocumentStoreResult<()> {
        Ok(())
    }

    fn post(&self, _verb: Verb, _table: &str, _succeeded: bool) {}
}

/// Ordered collection of [`Feature`]s.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    features: Vec<Arc<dyn Feature>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a feature, builder-style.
    pub fn with(mut self, feature: impl Feature + 'static) -> Self {
        self.add(Arc::new(feature));
        self
    }

    pub fn add(&mut self, feature: Arc<dyn Feature>) {
        self.features.push(feature);
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Runs every `pre` hook in order, stopping at the first error.
    pub fn pre(&self, verb: Verb, table: &str) -> DocumentStoreResult<()> {
        self.features
            .iter()
            .try_for_each(|feature| feature.pre(verb, table))
    }

    /// Runs every `post` hook in order.
    pub fn post(&self, verb: Verb, table: &str, succeeded: bool) {
        for feature in &self.features {
            feature.post(verb, table, succeeded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocumentStoreError;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Journal {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        refuse_writes: bool,
    }

    impl Feature for Journal {
        fn pre(&self, verb: Verb, table: &str) -> DocumentStoreResult<()> {
            self.calls.lock().unwrap().push(format!("{}:pre:{verb}:{table}", self.name));
            if self.refuse_writes && verb.is_write() {
                return Err(DocumentStoreError::InvalidInput("read-only".into()));
            }
            Ok(())
        }

        fn post(&self, verb: Verb, _table: &str, succeeded: bool) {
            self.calls.lock().unwrap().push(format!("{}:post:{verb}:{succeeded}", self.name));
        }
    }

    #[test]
    fn test_hooks_run_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let features = FeatureSet::new()
            .with(Journal { name: "a", calls: calls.clone(), ..Default::default() })
            .with(Journal { name: "b", calls: calls.clone(), ..Default::default() });

        features.pre(Verb::Select, "albums").unwrap();
        features.post(Verb::Select, "albums", true);

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "a:pre:select:albums",
                "b:pre:select:albums",
                "a:post:select:true",
                "b:post:select:true",
            ]
        );
    }

    #[test]
    fn test_pre_error_stops_the_chain() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let features = FeatureSet::new()
            .with(Journal { name: "a", calls: calls.clone(), refuse_writes: true })
            .with(Journal { name: "b", calls: calls.clone(), ..Default::default() });

        assert!(features.pre(Verb::Insert, "albums").is_err());
        assert_eq!(calls.lock().unwrap().len(), 1);
    }
}
