use std::collections::BTreeMap;

use super::{branch_node, NodeKind, Object};

#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    pub name: String,
    pub parent: String,
    pub objects: BTreeMap<String, Object>,
}

impl Namespace {
    pub fn new(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            objects: BTreeMap::new(),
        }
    }

    /// Find or create an object leaf. New leaves carry no definition yet.
    pub fn add_children(&mut self, name: &str) -> &mut Object {
        let parent = self.name.clone();
        self.objects
            .entry(name.to_string())
            .or_insert_with(|| Object::new(name, parent))
    }
}

branch_node!(Namespace, objects, NodeKind::Namespace);
