use std::collections::BTreeMap;

use schoolgate_core_types::Role;

use crate::loader::{RegistryFile, RoleSpec};

const TEACHER: &[&str] = &[
    "view_profile",
    "update_profile",
    "view_teachers",
    "view_students",
    "view_classes",
    "upload_files",
];

const ADMIN: &[&str] = &[
    "view_admins",
    "update_admin",
    "create_teacher",
    "update_teacher",
    "delete_teacher",
    "manage_teacher_status",
    "create_student",
    "update_student",
    "delete_student",
    "manage_classes",
    "send_notifications",
    "bulk_operations",
];

const ROOT: &[&str] = &[
    "create_admin",
    "delete_admin",
    "manage_admin_status",
    "view_audit_logs",
    "manage_system",
];

fn spec(inherits: Option<Role>, names: &[&str]) -> RoleSpec {
    RoleSpec {
        inherits,
        permissions: names.iter().map(|name| name.to_string()).collect(),
    }
}

/// Built-in table: each role carries everything the role below it has.
pub fn default_registry_file() -> RegistryFile {
    let mut roles = BTreeMap::new();
    roles.insert(Role::Teacher, spec(None, TEACHER));
    roles.insert(Role::Admin, spec(Some(Role::Teacher), ADMIN));
    roles.insert(Role::Root, spec(Some(Role::Admin), ROOT));
    RegistryFile { version: 1, roles }
}
