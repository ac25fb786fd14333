//! Present/absent traversal over nested records

use serde_json::Value;

/// Result of walking a key path through a nested record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node<'a> {
    /// The path resolved to this value (which may itself be `null`)
    Present(&'a Value),
    /// The path stopped at segment `depth`: missing key or non-object parent
    Absent { depth: usize },
}

impl<'a> Node<'a> {
    pub fn root(value: &'a Value) -> Self {
        Node::Present(value)
    }

    /// Walk every segment of `path`, stopping at the first missing step
    pub fn walk<S: AsRef<str>>(value: &'a Value, path: &[S]) -> Self {
        path.iter()
            .enumerate()
            .fold(Node::root(value), |node, (depth, key)| node.child(key.as_ref(), depth))
    }

    fn child(self, key: &str, depth: usize) -> Self {
        match self {
            Node::Present(Value::Object(map)) => match map.get(key) {
                Some(value) => Node::Present(value),
                None => Node::Absent { depth },
            },
            Node::Present(_) => Node::Absent { depth },
            absent => absent,
        }
    }

    /// The resolved value; `None` when absent or `null`
    pub fn value(self) -> Option<&'a Value> {
        match self {
            Node::Present(Value::Null) | Node::Absent { .. } => None,
            Node::Present(value) => Some(value),
        }
    }

    pub fn is_present(self) -> bool {
        matches!(self, Node::Present(_))
    }
}

/// Split a dotted path such as `planCharacteristics.planName`
pub fn split_dotted(path: &str) -> Vec<&str> {
    path.split('.').collect()
}
