//! Operation → rule tables.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use schoolgate_core_types::{Permission, Role};
use schoolgate_registry::RoleRegistry;
use serde::{Deserialize, Serialize};

use super::rule::Rule;
use crate::errors::GateError;

/// On-disk shape of a gate map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateMapFile {
    pub version: u32,
    #[serde(default)]
    pub operations: BTreeMap<String, Rule>,
}

/// Validated, immutable operation table. Operations without an entry are
/// denied by the gatekeeper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateMap {
    rules: BTreeMap<String, Rule>,
}

impl GateMap {
    pub fn from_file(file: GateMapFile) -> Result<Self, GateError> {
        if file.version != 1 {
            return Err(GateError::UnsupportedVersion(file.version));
        }
        let mut rules = BTreeMap::new();
        for (operation, rule) in file.operations {
            let operation = operation.trim().to_string();
            if operation.is_empty() {
                return Err(GateError::InvalidRule {
                    operation,
                    reason: "operation name is empty".into(),
                });
            }
            rule.validate().map_err(|reason| GateError::InvalidRule {
                operation: operation.clone(),
                reason,
            })?;
            rules.insert(operation, rule);
        }
        Ok(Self { rules })
    }

    pub fn from_rules<I, S>(rules: I) -> Result<Self, GateError>
    where
        I: IntoIterator<Item = (S, Rule)>,
        S: Into<String>,
    {
        Self::from_file(GateMapFile {
            version: 1,
            operations: rules
                .into_iter()
                .map(|(operation, rule)| (operation.into(), rule))
                .collect(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GateError> {
        Self::from_file(load_gate_map_from_path(path)?)
    }

    /// Gate map for the school administration API.
    pub fn builtin() -> Self {
        Self {
            rules: default_gate_rules(),
        }
    }

    pub fn get(&self, operation: &str) -> Option<&Rule> {
        self.rules.get(operation)
    }

    pub fn operations(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.rules.iter().map(|(op, rule)| (op.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn to_file(&self) -> GateMapFile {
        GateMapFile {
            version: 1,
            operations: self.rules.clone(),
        }
    }

    /// `(operation, permission)` pairs naming permissions the registry does
    /// not know. Such rules always deny.
    pub fn unknown_permissions(&self, registry: &dyn RoleRegistry) -> Vec<(String, Permission)> {
        let mut missing = Vec::new();
        for (operation, rule) in &self.rules {
            collect_permissions(rule, &mut |permission| {
                if !registry.is_known_permission(permission) {
                    missing.push((operation.clone(), permission.clone()));
                }
            });
        }
        missing
    }
}

impl Default for GateMap {
    fn default() -> Self {
        Self::builtin()
    }
}

fn collect_permissions(rule: &Rule, visit: &mut dyn FnMut(&Permission)) {
    match rule {
        Rule::Permission { name } => visit(name),
        Rule::Composite { rules, .. } => {
            for child in rules {
                collect_permissions(child, visit);
            }
        }
        _ => {}
    }
}

pub fn load_gate_map_from_reader<R: Read>(mut reader: R) -> Result<GateMapFile, GateError> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    parse_gate_map_str(&buf)
}

pub fn load_gate_map_from_path(path: impl AsRef<Path>) -> Result<GateMapFile, GateError> {
    let file = File::open(path.as_ref())?;
    load_gate_map_from_reader(file)
}

/// Accepts JSON first and falls back to YAML.
pub fn parse_gate_map_str(raw: &str) -> Result<GateMapFile, GateError> {
    match serde_json::from_str(raw) {
        Ok(file) => Ok(file),
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            GateError::Deserialize(format!("json error: {json_err}; yaml error: {yaml_err}"))
        }),
    }
}

fn default_gate_rules() -> BTreeMap<String, Rule> {
    let guarded = |permission: &str, owner: Role| {
        Rule::all(vec![Rule::permission(permission), Rule::owned_by("id", owner)])
    };

    let entries = [
        ("Query.me", Rule::Authenticated),
        ("Query.getAdmins", Rule::permission("view_admins")),
        ("Query.getAdmin", Rule::permission("view_admins")),
        ("Query.getTeachers", Rule::permission("view_teachers")),
        ("Query.getTeacher", Rule::permission("view_teachers")),
        ("Query.getStudents", Rule::permission("view_students")),
        ("Query.getClasses", Rule::permission("view_classes")),
        ("Query.getAuditLogs", Rule::permission("view_audit_logs")),
        ("Mutation.login", Rule::AllowAlways),
        ("Mutation.addAdmin", Rule::permission("create_admin")),
        ("Mutation.updateAdmin", guarded("update_admin", Role::Admin)),
        ("Mutation.deleteAdmin", guarded("delete_admin", Role::Admin)),
        (
            "Mutation.setAdminStatus",
            guarded("manage_admin_status", Role::Admin),
        ),
        ("Mutation.addTeacher", Rule::permission("create_teacher")),
        (
            "Mutation.updateTeacher",
            Rule::any(vec![
                guarded("update_teacher", Role::Teacher),
                guarded("update_profile", Role::Teacher),
            ]),
        ),
        ("Mutation.deleteTeacher", guarded("delete_teacher", Role::Teacher)),
        (
            "Mutation.setTeacherStatus",
            guarded("manage_teacher_status", Role::Teacher),
        ),
        (
            "Mutation.updateProfile",
            Rule::all(vec![
                Rule::permission("update_profile"),
                Rule::owned_by_role_arg("id", "role"),
            ]),
        ),
        ("Mutation.addStudent", Rule::permission("create_student")),
        ("Mutation.updateStudent", Rule::permission("update_student")),
        ("Mutation.deleteStudent", Rule::permission("delete_student")),
        ("Mutation.manageClasses", Rule::permission("manage_classes")),
        ("Mutation.uploadFile", Rule::permission("upload_files")),
        ("Mutation.sendSms", Rule::permission("send_notifications")),
        ("Mutation.bulkImport", Rule::permission("bulk_operations")),
        ("Mutation.updateSettings", Rule::permission("manage_system")),
        ("Mutation.deleteRoot", Rule::DenyAlways),
    ];

    entries
        .into_iter()
        .map(|(operation, rule)| (operation.to_string(), rule))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use schoolgate_registry::Registry;

    #[test]
    fn builtin_map_is_valid_and_known() {
        let map = GateMap::builtin();
        for (operation, rule) in map.operations() {
            assert!(rule.validate().is_ok(), "{operation} has an invalid rule");
        }
        assert!(map.unknown_permissions(&Registry::builtin()).is_empty());
        assert_eq!(map.get("Mutation.login"), Some(&Rule::AllowAlways));
        assert!(map.get("Mutation.dropDatabase").is_none());
    }

    #[test]
    fn builtin_map_round_trips_through_file_form() {
        let file = GateMap::builtin().to_file();
        let yaml = serde_yaml::to_string(&file).unwrap();
        let parsed = GateMap::from_file(parse_gate_map_str(&yaml).unwrap()).unwrap();
        assert_eq!(parsed, GateMap::builtin());
    }

    #[test]
    fn rejects_invalid_definitions() {
        let err = GateMap::from_rules([("Query.x", Rule::all(vec![]))]).unwrap_err();
        assert!(matches!(err, GateError::InvalidRule { .. }));

        let err = GateMap::from_rules([("  ", Rule::AllowAlways)]).unwrap_err();
        assert!(matches!(err, GateError::InvalidRule { .. }));

        let err = GateMap::from_file(GateMapFile {
            version: 3,
            operations: BTreeMap::new(),
        })
        .unwrap_err();
        assert!(matches!(err, GateError::UnsupportedVersion(3)));
    }

    #[test]
    fn reports_permissions_missing_from_registry() {
        let map = GateMap::from_rules([(
            "Query.secret",
            Rule::any(vec![Rule::Authenticated, Rule::permission("view_secrets")]),
        )])
        .unwrap();
        let missing = map.unknown_permissions(&Registry::builtin());
        assert_eq!(
            missing,
            vec![("Query.secret".to_string(), Permission::from("view_secrets"))]
        );
    }

    #[test]
    fn garbage_fails_both_parsers() {
        assert!(matches!(
            parse_gate_map_str("operations: ["),
            Err(GateError::Deserialize(_))
        ));
    }
}
