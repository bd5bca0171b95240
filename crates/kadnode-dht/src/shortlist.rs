//! Candidate shortlist used while answering closest-contact queries

use crate::distance::xor_distance;
use crate::routing::Contact;
use kadnode_core::NodeId;

/// Ordered set of contacts relative to a query target
///
/// No two entries share an ID. The list has no capacity bound of its own,
/// callers stop appending once they have enough candidates.
#[derive(Debug, Clone)]
pub struct ShortList {
    target: NodeId,
    contacts: Vec<Contact>,
}

impl ShortList {
    pub fn new(target: NodeId) -> Self {
        Self {
            target,
            contacts: Vec::new(),
        }
    }

    /// The ID distances are measured against
    pub fn target(&self) -> &NodeId {
        &self.target
    }

    /// Add a contact unless one with the same ID is already present
    /// Returns true if the contact was added
    pub fn push_unique(&mut self, contact: Contact) -> bool {
        if self.contains(&contact.node.id) {
            return false;
        }
        self.contacts.push(contact);
        true
    }

    /// Add every contact whose ID is not yet present, in order
    /// Returns the number of contacts added
    pub fn append_unique<I>(&mut self, contacts: I) -> usize
    where
        I: IntoIterator<Item = Contact>,
    {
        contacts
            .into_iter()
            .map(|c| self.push_unique(c))
            .filter(|added| *added)
            .count()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.contacts.iter().any(|c| c.node.id == *id)
    }

    /// Sort by ascending XOR distance to the target (stable)
    pub fn sort(&mut self) {
        let target = self.target;
        self.contacts.sort_by_key(|c| xor_distance(&c.node.id, &target));
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn into_vec(self) -> Vec<Contact> {
        self.contacts
    }
}

impl IntoIterator for ShortList {
    type Item = Contact;
    type IntoIter = std::vec::IntoIter<Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.into_iter()
    }
}
