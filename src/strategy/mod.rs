//! Pluggable decisions of the group update: how operations are grouped by
//! child, and which groups descend.

mod grouping;
mod push_down;

pub use grouping::{
    DeletionsAsInsertionsGroupMaker, InsertionsOnlyGroupMaker, OperationGroupMaker,
    TrivialGroupMaker,
};
pub use push_down::{
    DivideByConstantBelowRootStrategy, DivideByFanoutBelowRootStrategy,
    LargestGroupSplitDeletesStrategy, LargestGroupStrategy, PushDownAllStrategy,
    PushDownAndBufferGroups, PushDownContext, PushDownGroupsStrategy, RootLevelThresholdStrategy,
    ThresholdBelowRootStrategy, ThresholdStrategy,
};
