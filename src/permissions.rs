//! Role gate for restricted routes.
//!
//! Capabilities map to a fixed list of roles. The table is static data; the
//! evaluator is a pure function of the caller's role and that list.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionGroup {
    ViewStudents,
    ManageStudents,
    ManageStaff,
    ViewFees,
    ManageFees,
    ManageAttendance,
    ManageTransport,
    ManageVisitors,
    ManageCalendar,
    SendMessages,
    ViewNotifications,
    SendNotifications,
    ManageSettings,
}

impl PermissionGroup {
    pub const ALL: [PermissionGroup; 13] = [
        PermissionGroup::ViewStudents,
        PermissionGroup::ManageStudents,
        PermissionGroup::ManageStaff,
        PermissionGroup::ViewFees,
        PermissionGroup::ManageFees,
        PermissionGroup::ManageAttendance,
        PermissionGroup::ManageTransport,
        PermissionGroup::ManageVisitors,
        PermissionGroup::ManageCalendar,
        PermissionGroup::SendMessages,
        PermissionGroup::ViewNotifications,
        PermissionGroup::SendNotifications,
        PermissionGroup::ManageSettings,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PermissionGroup::ViewStudents => "VIEW_STUDENTS",
            PermissionGroup::ManageStudents => "MANAGE_STUDENTS",
            PermissionGroup::ManageStaff => "MANAGE_STAFF",
            PermissionGroup::ViewFees => "VIEW_FEES",
            PermissionGroup::ManageFees => "MANAGE_FEES",
            PermissionGroup::ManageAttendance => "MANAGE_ATTENDANCE",
            PermissionGroup::ManageTransport => "MANAGE_TRANSPORT",
            PermissionGroup::ManageVisitors => "MANAGE_VISITORS",
            PermissionGroup::ManageCalendar => "MANAGE_CALENDAR",
            PermissionGroup::SendMessages => "SEND_MESSAGES",
            PermissionGroup::ViewNotifications => "VIEW_NOTIFICATIONS",
            PermissionGroup::SendNotifications => "SEND_NOTIFICATIONS",
            PermissionGroup::ManageSettings => "MANAGE_SETTINGS",
        }
    }
}

impl fmt::Display for PermissionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PermissionGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionGroup::ALL
            .iter()
            .copied()
            .find(|group| group.name() == s)
            .ok_or_else(|| format!("unknown permission group '{}'", s))
    }
}

use Role::*;

const EVERY_ROLE: &[Role] = &[SuperAdmin, Admin, Teacher, Accountant, Receptionist];
const ADMINS: &[Role] = &[SuperAdmin, Admin];
const STUDENT_VIEWERS: &[Role] = &[SuperAdmin, Admin, Teacher, Receptionist];
const FINANCE: &[Role] = &[SuperAdmin, Admin, Accountant];
const TEACHING: &[Role] = &[SuperAdmin, Admin, Teacher];
const FRONT_DESK: &[Role] = &[SuperAdmin, Admin, Receptionist];
const OWNERS: &[Role] = &[SuperAdmin];

static PERMISSION_TABLE: Lazy<HashMap<PermissionGroup, &'static [Role]>> = Lazy::new(|| {
    HashMap::from([
        (PermissionGroup::ViewStudents, STUDENT_VIEWERS),
        (PermissionGroup::ManageStudents, ADMINS),
        (PermissionGroup::ManageStaff, ADMINS),
        (PermissionGroup::ViewFees, FINANCE),
        (PermissionGroup::ManageFees, FINANCE),
        (PermissionGroup::ManageAttendance, TEACHING),
        (PermissionGroup::ManageTransport, ADMINS),
        (PermissionGroup::ManageVisitors, FRONT_DESK),
        (PermissionGroup::ManageCalendar, TEACHING),
        (PermissionGroup::SendMessages, EVERY_ROLE),
        (PermissionGroup::ViewNotifications, EVERY_ROLE),
        (PermissionGroup::SendNotifications, EVERY_ROLE),
        (PermissionGroup::ManageSettings, OWNERS),
    ])
});

/// Roles allowed to exercise `group`, in declaration order.
pub fn allowed_roles(group: PermissionGroup) -> &'static [Role] {
    PERMISSION_TABLE.get(&group).copied().unwrap_or(&[])
}

/// Every capability `role` holds.
pub fn capabilities_of(role: Role) -> Vec<PermissionGroup> {
    PermissionGroup::ALL
        .iter()
        .copied()
        .filter(|group| allowed_roles(*group).contains(&role))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    AuthenticationRequired,
    InsufficientRole { allowed: Vec<Role> },
    CheckFailed,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::AuthenticationRequired => f.write_str("Authentication required"),
            DenyReason::InsufficientRole { allowed } => {
                let names: Vec<&str> = allowed.iter().map(Role::as_str).collect();
                write!(f, "Insufficient role. Required one of: {}", names.join(", "))
            }
            DenyReason::CheckFailed => f.write_str("Permission check failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decide whether a caller holding `role` may act, given the roles `allowed` for the action.
pub fn evaluate(role: Option<&str>, allowed: &[Role]) -> Decision {
    let role = match role.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => return Decision::Deny(DenyReason::AuthenticationRequired),
    };

    // An empty allow-list means the gate itself is misconfigured.
    if allowed.is_empty() {
        tracing::warn!("Permission check against an empty role set for role {}", role);
        return Decision::Deny(DenyReason::CheckFailed);
    }

    match role.parse::<Role>() {
        Ok(parsed) if allowed.contains(&parsed) => Decision::Allow,
        _ => Decision::Deny(DenyReason::InsufficientRole { allowed: allowed.to_vec() }),
    }
}

pub fn evaluate_capability(role: Option<&str>, group: PermissionGroup) -> Decision {
    evaluate(role, allowed_roles(group))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teacher_is_refused_an_admin_only_action() {
        let decision = evaluate(Some("Teacher"), &[Admin]);
        assert_eq!(decision, Decision::Deny(DenyReason::InsufficientRole { allowed: vec![Admin] }));
    }

    #[test]
    fn missing_role_requires_authentication() {
        assert_eq!(evaluate(None, &[Admin]), Decision::Deny(DenyReason::AuthenticationRequired));
        assert_eq!(evaluate(Some("   "), &[Admin]), Decision::Deny(DenyReason::AuthenticationRequired));
    }

    #[test]
    fn member_role_is_allowed() {
        assert_eq!(evaluate(Some("Admin"), &[Admin, Teacher]), Decision::Allow);
    }

    #[test]
    fn unknown_role_is_insufficient() {
        assert!(matches!(
            evaluate(Some("Janitor"), &[Admin]),
            Decision::Deny(DenyReason::InsufficientRole { .. })
        ));
    }

    #[test]
    fn empty_allow_list_fails_closed() {
        assert_eq!(evaluate(Some("SuperAdmin"), &[]), Decision::Deny(DenyReason::CheckFailed));
    }

    #[test]
    fn denial_message_lists_the_roles_that_would_succeed() {
        let reason = DenyReason::InsufficientRole { allowed: vec![Admin, Teacher] };
        assert_eq!(reason.to_string(), "Insufficient role. Required one of: Admin, Teacher");
    }

    #[test]
    fn every_capability_has_roles() {
        for group in PermissionGroup::ALL {
            assert!(!allowed_roles(group).is_empty(), "{} has no roles", group);
            assert_eq!(group.name().parse::<PermissionGroup>(), Ok(group));
        }
    }

    #[test]
    fn fee_management_is_limited_to_finance_and_admins() {
        assert!(evaluate_capability(Some("Accountant"), PermissionGroup::ManageFees).is_allowed());
        assert!(!evaluate_capability(Some("Teacher"), PermissionGroup::ManageFees).is_allowed());
        assert!(!evaluate_capability(Some("Receptionist"), PermissionGroup::ManageSettings).is_allowed());
    }

    #[test]
    fn super_admin_holds_every_capability() {
        assert_eq!(capabilities_of(SuperAdmin).len(), PermissionGroup::ALL.len());
        assert!(!capabilities_of(Receptionist).contains(&PermissionGroup::ManageFees));
    }
}
