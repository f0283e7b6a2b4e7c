use crate::value::{ObjectId, StubId, Value};
use std::collections::BTreeMap;

/// Accessor half of a property: reads and first writes route through stubs.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessorBinding {
    pub getter: StubId,
    pub setter: Option<StubId>,
    /// Claim-on-write accessors turn into data properties on first write.
    pub claim_on_write: bool,
    pub enumerable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Data {
        value: Value,
        writable: bool,
        enumerable: bool,
    },
    Accessor(AccessorBinding),
}

impl Property {
    pub fn data(value: Value) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsObject {
    properties: BTreeMap<String, Property>,
}

impl JsObject {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Arena of every object the replay creates. Ids are never reused.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    objects: Vec<JsObject>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self) -> ObjectId {
        self.objects.push(JsObject::default());
        ObjectId(self.objects.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: ObjectId) -> Option<&JsObject> {
        self.objects.get(id.0)
    }

    pub fn property(&self, id: ObjectId, name: &str) -> Option<&Property> {
        self.get(id).and_then(|object| object.property(name))
    }

    pub fn has_property(&self, id: ObjectId, name: &str) -> bool {
        self.property(id, name).is_some()
    }

    /// Plain data read; accessors are reported as `None` because reading them
    /// consumes stub state and has to go through the session.
    pub fn data_value(&self, id: ObjectId, name: &str) -> Option<&Value> {
        match self.property(id, name)? {
            Property::Data { value, .. } => Some(value),
            Property::Accessor(_) => None,
        }
    }

    pub fn define(&mut self, id: ObjectId, name: &str, property: Property) {
        if let Some(object) = self.objects.get_mut(id.0) {
            object.properties.insert(name.to_string(), property);
        }
    }

    pub fn set_data(&mut self, id: ObjectId, name: &str, value: Value) {
        self.define(id, name, Property::data(value));
    }

    pub fn remove(&mut self, id: ObjectId, name: &str) -> Option<Property> {
        self.objects
            .get_mut(id.0)
            .and_then(|object| object.properties.remove(name))
    }
}
