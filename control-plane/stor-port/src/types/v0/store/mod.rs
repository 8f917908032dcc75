pub mod capacity;
pub mod definitions;
pub mod host;
pub mod node;
pub mod offering;
pub mod pool;
pub mod snapshot;
pub mod vm;
pub mod vm_work;
pub mod volume;
pub mod work_item;

use serde::{Deserialize, Serialize};

/// Implements a store key type for an object identified by a single id.
#[macro_export]
macro_rules! impl_object_key {
    ($Key:ident, $Id:ty, $Kind:ident) => {
        /// Key used by the store to uniquely identify the object.
        #[derive(Debug, Clone, Eq, PartialEq)]
        pub struct $Key($Id);

        impl From<&$Id> for $Key {
            fn from(id: &$Id) -> Self {
                Self(id.clone())
            }
        }

        impl $crate::types::v0::store::definitions::ObjectKey for $Key {
            type Kind = $crate::types::v0::store::definitions::StorableObjectType;

            fn version(&self) -> $crate::pstor::ApiVersion {
                $crate::pstor::ApiVersion::V0
            }
            fn key_type(&self) -> $crate::types::v0::store::definitions::StorableObjectType {
                $crate::types::v0::store::definitions::StorableObjectType::$Kind
            }
            fn key_uuid(&self) -> String {
                self.0.to_string()
            }
        }
    };
}

/// Sequence operations for a resource without locking it.
/// An exclusive operation blocks other operations on the same resource for its whole
/// duration, even across awaits, without holding the resource mutex.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct OperationSequence {
    uuid: String,
    state: OperationSequenceState,
}
impl OperationSequence {
    /// Create new `Self` with a uuid for observability.
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            state: Default::default(),
        }
    }
    /// Check if the transition is valid.
    pub fn valid(&self, next: OperationSequenceState) -> bool {
        match self.state {
            OperationSequenceState::Idle => matches!(next, OperationSequenceState::Exclusive),
            OperationSequenceState::Exclusive => matches!(next, OperationSequenceState::Idle),
        }
    }
    /// Try to transition from current to next state.
    pub fn transition(
        &mut self,
        next: OperationSequenceState,
    ) -> Result<OperationSequenceState, bool> {
        if self.valid(next) {
            let previous = self.state;
            self.state = next;
            Ok(previous)
        } else {
            // log only when the resource is not already taken by an exclusive operation
            Err(self.state != OperationSequenceState::Exclusive)
        }
    }
    /// Start an exclusive operation.
    /// It returns the state which must be used to revert this operation.
    pub fn sequence(&mut self) -> Result<OperationSequenceState, bool> {
        self.transition(OperationSequenceState::Exclusive)
    }
    /// Complete the operation, reverting to the given state.
    pub fn complete(&mut self, revert: OperationSequenceState) {
        if self.transition(revert).is_err() {
            debug_assert!(false, "Invalid revert from '{:?}' to '{:?}'", self, revert);
            self.state = OperationSequenceState::Idle;
        }
    }
    /// The current state.
    pub fn state(&self) -> OperationSequenceState {
        self.state
    }
}

/// Sequence operations.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum OperationSequenceState {
    /// None in progress.
    #[default]
    Idle,
    /// A single exclusive operation.
    Exclusive,
}

/// Operations are locked.
pub trait AsOperationSequencer {
    fn as_ref(&self) -> &OperationSequence;
    fn as_mut(&mut self) -> &mut OperationSequence;
}

/// Sequencing interface of a shared resource.
pub trait OperationSequencer: std::fmt::Debug + Clone {
    /// Start an exclusive operation.
    /// It returns the state which must be used to revert this operation.
    fn sequence(&self) -> Result<OperationSequenceState, bool>;
    /// Complete the operation sequenced with `sequence`.
    fn complete(&self, revert: OperationSequenceState);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_sequence() {
        let mut sequence = OperationSequence::new("pool-1");
        let revert = sequence.sequence().expect("idle can be sequenced");
        assert_eq!(sequence.state(), OperationSequenceState::Exclusive);
        assert_eq!(sequence.sequence(), Err(false));
        sequence.complete(revert);
        assert_eq!(sequence.state(), OperationSequenceState::Idle);
    }
}
