//! Nodes and lazy relationship streams.
//!
//! A `Node` is a row plus named relationships. A relationship is not data but
//! a factory: each call produces a fresh `Stream` of child nodes, fetched on
//! demand from the child side of a join.

use rill_core::Row;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A lazily produced, ordered sequence of nodes.
pub type Stream = Box<dyn Iterator<Item = Node>>;

/// Returns a stream that yields nothing.
pub fn empty_stream() -> Stream {
    Box::new(core::iter::empty())
}

/// Re-invocable producer of a child node stream.
#[derive(Clone)]
pub struct Relationship(Rc<dyn Fn() -> Stream>);

impl Relationship {
    /// Wraps a stream factory.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Stream + 'static,
    {
        Self(Rc::new(factory))
    }

    /// Produces a fresh stream of the related nodes.
    pub fn stream(&self) -> Stream {
        (self.0)()
    }
}

impl fmt::Debug for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Relationship(..)")
    }
}

/// A row together with its named relationships.
#[derive(Clone, Debug)]
pub struct Node {
    pub row: Row,
    pub relationships: BTreeMap<String, Relationship>,
}

impl Node {
    /// A node without relationships.
    pub fn new(row: Row) -> Self {
        Self {
            row,
            relationships: BTreeMap::new(),
        }
    }

    /// Returns this node with one more relationship.
    pub fn with_relationship(mut self, name: impl Into<String>, relationship: Relationship) -> Self {
        self.relationships.insert(name.into(), relationship);
        self
    }

    /// Streams the named relationship, if the node has it.
    pub fn relationship(&self, name: &str) -> Option<Stream> {
        self.relationships.get(name).map(Relationship::stream)
    }
}

impl From<Row> for Node {
    fn from(row: Row) -> Self {
        Node::new(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::row;

    #[test]
    fn test_relationship_is_reinvocable() {
        let children = vec![row! { "id" => 1 }, row! { "id" => 2 }];
        let rel = Relationship::new(move || {
            Box::new(children.clone().into_iter().map(Node::new)) as Stream
        });
        let node = Node::new(row! { "id" => 10 }).with_relationship("kids", rel);

        assert_eq!(node.relationship("kids").map(|s| s.count()), Some(2));
        assert_eq!(node.relationship("kids").map(|s| s.count()), Some(2));
        assert!(node.relationship("other").is_none());
    }
}
