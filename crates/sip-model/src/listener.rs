//! Change notifications for crosswalk editors.

use crate::path::Path;

/// A change to a [`RecMapping`](crate::RecMapping).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingEvent {
    /// A node mapping was attached to an output path that had none.
    Added { output: Path },
    /// The node mapping at an output path was removed.
    Removed { output: Path },
    /// The node mapping at an output path was replaced or edited.
    Changed { output: Path },
    /// A schema node gained its first mapped descendant or lost its last one.
    PopulationChanged { node: Path, populated: bool },
}

/// Receives [`MappingEvent`]s synchronously, in mutation order.
pub trait MappingListener: Send + Sync {
    fn mapping_changed(&self, event: &MappingEvent);
}

impl<F> MappingListener for F
where
    F: Fn(&MappingEvent) + Send + Sync,
{
    fn mapping_changed(&self, event: &MappingEvent) {
        self(event);
    }
}
