//! Channel data.

use crate::client::ConnId;
use std::collections::BTreeSet;

/// What happened to a channel when a member was removed from it.
#[derive(Debug, PartialEq)]
pub enum Departure {
    /// The channel has no members left and must be destroyed.
    Empty,
    /// Members remain; if the operator set had been emptied, `promoted`
    /// holds the member that inherited operator rights.
    Remaining { promoted: Option<ConnId> },
}

/// Channel data.
///
/// Member and operator sets hold connection ids; nicknames are resolved
/// through the server state.  `BTreeSet` keeps members ordered by id, which
/// makes operator succession deterministic: the member with the lowest id
/// inherits the channel.
#[derive(Default)]
pub struct Channel {
    members: BTreeSet<ConnId>,
    operators: BTreeSet<ConnId>,
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member.  The first member of a channel becomes its operator.
    pub fn add_member(&mut self, id: ConnId) {
        if self.members.is_empty() {
            self.operators.insert(id);
        }
        self.members.insert(id);
    }

    /// Removes a member and reports what the channel became.
    ///
    /// Removing the last member yields `Departure::Empty` and the caller is
    /// expected to destroy the channel.  Removing the last operator of a
    /// still-populated channel promotes the lowest remaining id.
    pub fn remove_member(&mut self, id: ConnId) -> Departure {
        self.members.remove(&id);
        self.operators.remove(&id);

        if self.members.is_empty() {
            return Departure::Empty;
        }
        let mut promoted = None;
        if self.operators.is_empty() {
            let next_oper = *self.members.iter().next().unwrap();
            self.operators.insert(next_oper);
            promoted = Some(next_oper);
        }
        Departure::Remaining { promoted }
    }

    pub fn has_member(&self, id: ConnId) -> bool {
        self.members.contains(&id)
    }

    pub fn is_operator(&self, id: ConnId) -> bool {
        self.operators.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The members of the channel, in ascending id order.
    pub fn members(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.members.iter().copied()
    }
}
