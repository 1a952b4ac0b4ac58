//! Permission coverage across a church's role roster.

use crate::model::{Permission, Role, UserRole};
use std::collections::{BTreeSet, HashSet};

/// Required permissions that no staffed role grants.
///
/// A role counts as staffed when at least one user is assigned to it. The
/// result follows the order of [`Permission::REQUIRED`].
pub fn missing_coverage(roles: &[Role], assignments: &[UserRole]) -> Vec<Permission> {
    let staffed: HashSet<&str> = assignments.iter().map(|a| a.role.as_str()).collect();

    let covered: HashSet<Permission> = roles
        .iter()
        .filter(|role| staffed.contains(role.id.as_str()))
        .flat_map(|role| role.permissions.iter().copied())
        .collect();

    Permission::REQUIRED
        .iter()
        .copied()
        .filter(|p| !covered.contains(p))
        .collect()
}

/// Union of permissions granted to `user_id` through its role assignments.
pub fn permissions_for_user(
    user_id: &str,
    roles: &[Role],
    assignments: &[UserRole],
) -> BTreeSet<Permission> {
    let held: HashSet<&str> = assignments
        .iter()
        .filter(|a| a.user == user_id)
        .map(|a| a.role.as_str())
        .collect();

    roles
        .iter()
        .filter(|role| held.contains(role.id.as_str()))
        .flat_map(|role| role.permissions.iter().copied())
        .filter(|p| *p != Permission::Unknown)
        .collect()
}
