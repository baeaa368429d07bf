//! Documents - the storage-level form of a model
//!
//! A document is a class name, an identity, a version and a bag of JSON
//! fields. Models convert to and from documents; storage engines and the
//! query executor only ever see documents.

use serde_json::{Map, Value};

use crate::identity::RecordId;

/// Record attribute holding the identity
pub const ATTR_RID: &str = "@rid";
/// Record attribute holding the class name
pub const ATTR_CLASS: &str = "@class";
/// Record attribute holding the version
pub const ATTR_VERSION: &str = "@version";

/// A stored (or about to be stored) record
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    class_name: String,
    rid: Option<RecordId>,
    version: i32,
    fields: Map<String, Value>,
}

impl Document {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            rid: None,
            version: 0,
            fields: Map::new(),
        }
    }

    pub fn with_fields(class_name: impl Into<String>, fields: Map<String, Value>) -> Self {
        let mut doc = Self::new(class_name);
        doc.fields = fields;
        doc.strip_attributes();
        doc
    }

    pub fn with_identity(mut self, rid: Option<RecordId>, version: i32) -> Self {
        self.rid = rid;
        self.version = version;
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn set_rid(&mut self, rid: RecordId) {
        self.rid = Some(rid);
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Resolve a field path for query evaluation.
    ///
    /// `@rid`, `@class` and `@version` read the record attributes; dotted
    /// paths walk into embedded objects. Missing segments resolve to `Null`.
    pub fn resolve(&self, path: &str) -> Value {
        match path {
            ATTR_RID => {
                return self
                    .rid
                    .map(|rid| Value::String(rid.to_string()))
                    .unwrap_or(Value::Null)
            }
            ATTR_CLASS => return Value::String(self.class_name.clone()),
            ATTR_VERSION => return Value::from(self.version),
            _ => {}
        }

        let mut segments = path.split('.');
        let first = match segments.next() {
            Some(first) => first,
            None => return Value::Null,
        };

        let mut current = match self.fields.get(first) {
            Some(value) => value,
            None => return Value::Null,
        };
        for segment in segments {
            current = match current.get(segment) {
                Some(value) => value,
                None => return Value::Null,
            };
        }
        current.clone()
    }

    fn strip_attributes(&mut self) {
        for attr in [ATTR_RID, ATTR_CLASS, ATTR_VERSION] {
            self.fields.remove(attr);
        }
    }
}
