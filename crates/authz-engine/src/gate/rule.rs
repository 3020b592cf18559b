use schoolgate_core_types::{Permission, Role};
use serde::{Deserialize, Serialize};

/// How a composite combines its children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    /// Every child must allow; stops at the first denial.
    #[default]
    All,
    /// One child must allow; stops at the first allow.
    Any,
}

/// Declarative access rule bound to one gated operation.
///
/// Serialized with an internal `rule` tag:
///
/// ```yaml
/// rule: composite
/// rules:
///   - rule: permission
///     name: update_teacher
///   - rule: resource_ownership
///     id_arg: id
///     owner_role: teacher
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    AllowAlways,
    DenyAlways,
    /// Any verified principal.
    Authenticated,
    Permission {
        name: Permission,
    },
    /// Ownership check against the id found in argument `id_arg`. The owner
    /// role is either fixed or read from another argument.
    ResourceOwnership {
        id_arg: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner_role: Option<Role>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner_role_arg: Option<String>,
    },
    Composite {
        #[serde(default)]
        mode: CompositeMode,
        rules: Vec<Rule>,
    },
}

impl Rule {
    pub fn permission(name: impl Into<Permission>) -> Self {
        Rule::Permission { name: name.into() }
    }

    pub fn owned_by(id_arg: impl Into<String>, owner_role: Role) -> Self {
        Rule::ResourceOwnership {
            id_arg: id_arg.into(),
            owner_role: Some(owner_role),
            owner_role_arg: None,
        }
    }

    pub fn owned_by_role_arg(id_arg: impl Into<String>, owner_role_arg: impl Into<String>) -> Self {
        Rule::ResourceOwnership {
            id_arg: id_arg.into(),
            owner_role: None,
            owner_role_arg: Some(owner_role_arg.into()),
        }
    }

    pub fn all(rules: Vec<Rule>) -> Self {
        Rule::Composite {
            mode: CompositeMode::All,
            rules,
        }
    }

    pub fn any(rules: Vec<Rule>) -> Self {
        Rule::Composite {
            mode: CompositeMode::Any,
            rules,
        }
    }

    /// Structural checks applied when a gate map is built.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Rule::AllowAlways | Rule::DenyAlways | Rule::Authenticated => Ok(()),
            Rule::Permission { name } => {
                if name.as_str().trim().is_empty() {
                    Err("permission name is empty".into())
                } else {
                    Ok(())
                }
            }
            Rule::ResourceOwnership {
                id_arg,
                owner_role,
                owner_role_arg,
            } => {
                if id_arg.trim().is_empty() {
                    return Err("id_arg is empty".into());
                }
                match (owner_role, owner_role_arg) {
                    (Some(_), None) => Ok(()),
                    (None, Some(arg)) if !arg.trim().is_empty() => Ok(()),
                    (None, Some(_)) => Err("owner_role_arg is empty".into()),
                    (None, None) => Err("one of owner_role or owner_role_arg is required".into()),
                    (Some(_), Some(_)) => {
                        Err("owner_role and owner_role_arg are mutually exclusive".into())
                    }
                }
            }
            Rule::Composite { rules, .. } => {
                if rules.is_empty() {
                    return Err("composite rule has no children".into());
                }
                rules.iter().try_for_each(Rule::validate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_form_uses_rule_tag() {
        let raw = r#"
rule: composite
rules:
  - rule: permission
    name: update_teacher
  - rule: resource_ownership
    id_arg: id
    owner_role: teacher
"#;
        let rule: Rule = serde_yaml::from_str(raw).unwrap();
        assert_eq!(
            rule,
            Rule::all(vec![
                Rule::permission("update_teacher"),
                Rule::owned_by("id", Role::Teacher),
            ])
        );
    }

    #[test]
    fn composite_mode_parses_any() {
        let rule: Rule = serde_json::from_str(
            r#"{"rule":"composite","mode":"any","rules":[{"rule":"authenticated"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            rule,
            Rule::Composite {
                mode: CompositeMode::Any,
                ..
            }
        ));
    }

    #[test]
    fn validation_catches_malformed_rules() {
        assert!(Rule::all(vec![]).validate().is_err());
        assert!(Rule::any(vec![Rule::all(vec![])]).validate().is_err());
        assert!(Rule::permission(" ").validate().is_err());
        assert!(Rule::ResourceOwnership {
            id_arg: "id".into(),
            owner_role: None,
            owner_role_arg: None,
        }
        .validate()
        .is_err());
        assert!(Rule::ResourceOwnership {
            id_arg: "id".into(),
            owner_role: Some(Role::Admin),
            owner_role_arg: Some("role".into()),
        }
        .validate()
        .is_err());
        assert!(Rule::owned_by_role_arg("id", "role").validate().is_ok());
    }
}
