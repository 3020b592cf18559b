use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use authz_engine::{
    AuthzError, AuthzService, GateMap, InMemoryAccountStore, JwtSettings, PrincipalId, Role,
};
use schoolgate_audit::{AuditCategory, AuditFilter, AuditLevel, JsonLinesSink};
use serde_json::json;

fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn settings() -> JwtSettings {
    JwtSettings::with_secret("integration-secret")
}

fn bearer(service: &AuthzService, id: i64, role: Role, name: &str) -> String {
    let token = service.codec().issue(PrincipalId(id), role, name).unwrap();
    format!("Bearer {token}")
}

#[tokio::test]
async fn deactivated_account_loses_access_after_invalidation() {
    let accounts = Arc::new(InMemoryAccountStore::new());
    accounts.insert(Role::Teacher, PrincipalId(11), true);
    let service = AuthzService::builder(settings())
        .with_accounts(accounts.clone())
        .build()
        .unwrap();

    let header = bearer(&service, 11, Role::Teacher, "tess");
    let ctx = service.resolve_context(Some(&header));
    assert!(service
        .guard("Query.getTeachers", &json!({}), ctx.principal())
        .await
        .is_ok());

    accounts.set_active(Role::Teacher, PrincipalId(11), false);
    service.invalidate_user(PrincipalId(11));

    let decision = service
        .evaluate("Query.getTeachers", &json!({}), ctx.principal())
        .await;
    assert_eq!(decision.reason, "User not found or inactive");
}

#[tokio::test]
async fn forged_token_is_anonymous_and_denied() {
    let service = AuthzService::builder(settings()).build().unwrap();
    let other = AuthzService::builder(JwtSettings::with_secret("someone-else"))
        .build()
        .unwrap();
    let forged = bearer(&other, 1, Role::Root, "mallory");

    let ctx = service.resolve_context(Some(&forged));
    assert!(!ctx.is_authenticated());

    let err = service
        .guard("Mutation.addAdmin", &json!({}), ctx.principal())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::AccessDenied));

    let rejected = service.audit().query(&AuditFilter {
        category: Some(AuditCategory::Authentication),
        level: Some(AuditLevel::Warning),
        ..AuditFilter::default()
    });
    assert_eq!(rejected.len(), 1);
}

#[tokio::test]
async fn gate_map_loaded_from_yaml_is_fail_closed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
version: 1
operations:
  Query.getTeachers:
    rule: permission
    name: view_teachers
  Mutation.updateTeacher:
    rule: composite
    rules:
      - rule: permission
        name: update_teacher
      - rule: resource_ownership
        id_arg: id
        owner_role: teacher
"#
    )
    .unwrap();

    let service = AuthzService::builder(settings())
        .with_gate_map(GateMap::load(file.path()).unwrap())
        .build()
        .unwrap();
    let root = service.resolve_context(Some(&bearer(&service, 1, Role::Root, "root")));

    assert!(service
        .evaluate("Query.getTeachers", &json!({}), root.principal())
        .await
        .allowed);
    assert!(service
        .evaluate("Mutation.updateTeacher", &json!({ "id": 4 }), root.principal())
        .await
        .allowed);
    // present in the built-in map but not in this one
    assert!(!service
        .evaluate("Query.me", &json!({}), root.principal())
        .await
        .allowed);
}

#[tokio::test]
async fn audit_sink_receives_every_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit").join("authz.jsonl");
    let sink = Arc::new(JsonLinesSink::open(&path).unwrap());
    let service = AuthzService::builder(settings())
        .with_audit_sink(sink)
        .build()
        .unwrap();

    let ctx = service.resolve_context(Some(&bearer(&service, 3, Role::Admin, "ada")));
    service
        .evaluate("Query.getAdmins", &json!({}), ctx.principal())
        .await;
    service.audit().flush().unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), service.audit().len());
    assert_eq!(lines[0]["action"], "token_verified");
    assert_eq!(lines[1]["action"], "view_admins");
    assert_eq!(lines[1]["success"], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_cache() {
    let service = Arc::new(AuthzService::builder(settings()).build().unwrap());
    let mut handles = Vec::new();

    for worker in 0..16i64 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let id = worker % 4;
            let header = bearer(&service, id, Role::Admin, "admin");
            let ctx = service.resolve_context(Some(&header));
            for _ in 0..10 {
                let decision = service
                    .evaluate("Query.getTeachers", &json!({}), ctx.principal())
                    .await;
                assert!(decision.allowed);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // four principals, each with a permission entry and an account entry
    assert_eq!(service.cache_stats().size, 8);
}
