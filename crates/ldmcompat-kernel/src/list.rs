//! Doubly linked list with a circular sentinel
//!
//! Nodes live in an arena owned by the list and are linked by index, so
//! splicing is the same four-pointer update as the kernel's `list_head`
//! without raw pointers. Node 0 is the sentinel; an empty list is the
//! sentinel linked to itself.

/// Position of a node in a [`ListHead`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// The sentinel
pub const HEAD: NodeId = NodeId(0);

#[derive(Debug)]
struct Node<T> {
    prev: usize,
    next: usize,
    value: Option<T>,
}

/// Circular list anchored at a sentinel node
#[derive(Debug)]
pub struct ListHead<T> {
    nodes: Vec<Node<T>>,
}

impl<T> Default for ListHead<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListHead<T> {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                prev: 0,
                next: 0,
                value: None,
            }],
        }
    }

    /// Link `new` between two adjacent nodes
    fn splice(&mut self, new: usize, prev: usize, next: usize) {
        self.nodes[next].prev = new;
        self.nodes[new].next = next;
        self.nodes[new].prev = prev;
        self.nodes[prev].next = new;
    }

    fn alloc(&mut self, value: T) -> usize {
        self.nodes.push(Node {
            prev: 0,
            next: 0,
            value: Some(value),
        });
        self.nodes.len() - 1
    }

    /// Insert `value` right after `at`. With [`HEAD`] this is a push to the
    /// front.
    ///
    /// # Panics
    ///
    /// Panics if `at` does not belong to this list.
    pub fn list_add(&mut self, value: T, at: NodeId) -> NodeId {
        let next = self.nodes[at.0].next;
        let new = self.alloc(value);
        self.splice(new, at.0, next);
        NodeId(new)
    }

    /// Insert `value` right before `at`. With [`HEAD`] this is a push to
    /// the back.
    ///
    /// # Panics
    ///
    /// Panics if `at` does not belong to this list.
    pub fn list_add_tail(&mut self, value: T, at: NodeId) -> NodeId {
        let prev = self.nodes[at.0].prev;
        let new = self.alloc(value);
        self.splice(new, prev, at.0);
        NodeId(new)
    }

    pub fn push_front(&mut self, value: T) -> NodeId {
        self.list_add(value, HEAD)
    }

    pub fn push_back(&mut self, value: T) -> NodeId {
        self.list_add_tail(value, HEAD)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].next == 0
    }

    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Value stored at `id`; `None` for the sentinel
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(id.0).and_then(|n| n.value.as_ref())
    }

    pub fn next(&self, id: NodeId) -> NodeId {
        NodeId(self.nodes[id.0].next)
    }

    pub fn prev(&self, id: NodeId) -> NodeId {
        NodeId(self.nodes[id.0].prev)
    }

    /// Walk from the first node to the last
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            front: self.nodes[0].next,
            back: self.nodes[0].prev,
            remaining: self.len(),
        }
    }
}

/// Iterator over a [`ListHead`]
pub struct Iter<'a, T> {
    list: &'a ListHead<T>,
    front: usize,
    back: usize,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let node = &self.list.nodes[self.front];
        self.front = node.next;
        node.value.as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> DoubleEndedIterator for Iter<'a, T> {
    fn next_back(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let node = &self.list.nodes[self.back];
        self.back = node.prev;
        node.value.as_ref()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a ListHead<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
