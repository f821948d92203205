//! Parent/child membership predicate.

use crate::domain::record::TreeRecord;

/// True iff `candidate` names `parent_id` as its superior.
///
/// Root-level candidates (no superior) never match; they only ever seed a build.
pub fn is_child_of<T: TreeRecord + ?Sized>(parent_id: &T::Id, candidate: &T) -> bool {
    candidate
        .superior_id()
        .is_some_and(|superior| &superior == parent_id)
}
