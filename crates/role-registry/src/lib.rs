//! Role & permission registry.
//!
//! The registry is built once from a [`RegistryFile`] and never mutates
//! afterwards, so it can be shared behind an `Arc` and read without locks.

pub mod defaults;
pub mod errors;
pub mod loader;

pub use defaults::default_registry_file;
pub use errors::RegistryError;
pub use loader::{
    load_registry_from_path, load_registry_from_reader, parse_registry_str, RegistryFile,
    RoleSpec,
};

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use schoolgate_core_types::{Permission, Role, ValidationError};
use tracing::{debug, error};

/// Read-only view of the role table consulted by the permission checker.
pub trait RoleRegistry: Send + Sync {
    fn has_permission(&self, role: Role, permission: &Permission) -> bool;

    /// Strict comparison: equal ranks are not higher.
    fn is_higher_role(&self, role: Role, other: Role) -> bool {
        role.rank() > other.rank()
    }

    fn is_known_permission(&self, permission: &Permission) -> bool;
}

#[derive(Clone, Debug)]
pub struct Registry {
    grants: HashMap<Role, BTreeSet<Permission>>,
    known: BTreeSet<Permission>,
}

impl Registry {
    /// Registry populated with the built-in table.
    pub fn builtin() -> Self {
        match Self::from_file(&default_registry_file()) {
            Ok(registry) => registry,
            Err(err) => {
                error!(%err, "built-in registry table rejected; every permission check will deny");
                Self::empty()
            }
        }
    }

    fn empty() -> Self {
        Self {
            grants: HashMap::new(),
            known: BTreeSet::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let file = load_registry_from_path(path)?;
        Self::from_file(&file)
    }

    pub fn from_file(file: &RegistryFile) -> Result<Self, RegistryError> {
        if file.version != 1 {
            return Err(RegistryError::UnsupportedVersion(file.version));
        }

        let mut grants = HashMap::new();
        for role in Role::ALL {
            let resolved = resolve_role(file, role)?;
            debug!(role = %role, permissions = resolved.len(), "resolved registry role");
            grants.insert(role, resolved);
        }

        let known = grants.values().flatten().cloned().collect();
        Ok(Self { grants, known })
    }

    pub fn permissions_for(&self, role: Role) -> impl Iterator<Item = &Permission> {
        self.grants.get(&role).into_iter().flatten()
    }

    pub fn known_permissions(&self) -> impl Iterator<Item = &Permission> {
        self.known.iter()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RoleRegistry for Registry {
    fn has_permission(&self, role: Role, permission: &Permission) -> bool {
        self.grants
            .get(&role)
            .map(|set| set.contains(permission))
            .unwrap_or(false)
    }

    fn is_known_permission(&self, permission: &Permission) -> bool {
        self.known.contains(permission)
    }
}

fn resolve_role(file: &RegistryFile, role: Role) -> Result<BTreeSet<Permission>, RegistryError> {
    let mut resolved = BTreeSet::new();
    let mut visited = Vec::new();
    let mut current = Some(role);

    while let Some(next) = current {
        if visited.contains(&next) {
            return Err(RegistryError::InheritanceCycle(next));
        }
        visited.push(next);

        let spec = file
            .roles
            .get(&next)
            .ok_or(RegistryError::MissingRole(next))?;
        for name in &spec.permissions {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::EmptyPermission.into());
            }
            resolved.insert(Permission::new(trimmed));
        }
        current = spec.inherits;
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[(&str, [bool; 3])] = &[
        // permission, [root, admin, teacher]
        ("view_profile", [true, true, true]),
        ("update_profile", [true, true, true]),
        ("view_teachers", [true, true, true]),
        ("view_students", [true, true, true]),
        ("view_classes", [true, true, true]),
        ("upload_files", [true, true, true]),
        ("view_admins", [true, true, false]),
        ("update_admin", [true, true, false]),
        ("create_teacher", [true, true, false]),
        ("update_teacher", [true, true, false]),
        ("delete_teacher", [true, true, false]),
        ("manage_teacher_status", [true, true, false]),
        ("create_student", [true, true, false]),
        ("update_student", [true, true, false]),
        ("delete_student", [true, true, false]),
        ("manage_classes", [true, true, false]),
        ("send_notifications", [true, true, false]),
        ("bulk_operations", [true, true, false]),
        ("create_admin", [true, false, false]),
        ("delete_admin", [true, false, false]),
        ("manage_admin_status", [true, false, false]),
        ("view_audit_logs", [true, false, false]),
        ("manage_system", [true, false, false]),
    ];

    #[test]
    fn builtin_table_matches_expected_grants() {
        let registry = Registry::builtin();
        for (name, expected) in TABLE {
            let permission = Permission::from(*name);
            for (role, allowed) in [Role::Root, Role::Admin, Role::Teacher].iter().zip(expected) {
                assert_eq!(
                    registry.has_permission(*role, &permission),
                    *allowed,
                    "{role} / {name}"
                );
            }
            assert!(registry.is_known_permission(&permission));
        }
        assert_eq!(registry.known_permissions().count(), TABLE.len());
    }

    #[test]
    fn unknown_permission_is_never_granted() {
        let registry = Registry::builtin();
        let bogus = Permission::from("launch_rockets");
        assert!(!registry.is_known_permission(&bogus));
        for role in Role::ALL {
            assert!(!registry.has_permission(role, &bogus));
        }
    }

    #[test]
    fn higher_role_is_strict() {
        let registry = Registry::builtin();
        assert!(registry.is_higher_role(Role::Root, Role::Admin));
        assert!(registry.is_higher_role(Role::Admin, Role::Teacher));
        assert!(!registry.is_higher_role(Role::Admin, Role::Root));
        for role in Role::ALL {
            assert!(!registry.is_higher_role(role, role));
        }
    }

    #[test]
    fn inheritance_cycle_is_rejected() {
        let mut file = default_registry_file();
        if let Some(teacher) = file.roles.get_mut(&Role::Teacher) {
            teacher.inherits = Some(Role::Root);
        }
        assert!(matches!(
            Registry::from_file(&file),
            Err(RegistryError::InheritanceCycle(_))
        ));
    }

    #[test]
    fn missing_role_is_rejected() {
        let mut file = default_registry_file();
        file.roles.remove(&Role::Admin);
        assert!(matches!(
            Registry::from_file(&file),
            Err(RegistryError::MissingRole(Role::Admin))
        ));
    }
}
