//! Integration tests for the vault host's library surface: credential,
//! storage, resolution and tokens working together on a real database file.

use geosync::auth::{AccessTokenRegistry, CredentialGate};
use geosync::crypto::{hash_password, Pbkdf2Params};
use geosync::errors::VaultError;
use geosync::resolver::{ResolvedValue, VariableResolver};
use geosync::store::Database;
use tempfile::TempDir;

const PASSWORD: &str = "correct horse battery";
const FAST: Pbkdf2Params = Pbkdf2Params { iterations: 1_000 };

/// A configured vault on disk with project `Acme`, environments `dev`
/// and `prod`, `API_URL` overridden in prod and `DEBUG` default-only.
fn acme_vault() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("geosync.db");
    let db = Database::open(&path).unwrap();

    let gate = CredentialGate::new(db.clone());
    gate.set_master_password_with_params(&hash_password(PASSWORD), &FAST)
        .unwrap();
    let key = gate.unlock(&hash_password(PASSWORD)).unwrap();

    let org = db.ensure_organization("Acme Corp").unwrap();
    let project = db.create_project("Acme", Some(&org.id)).unwrap();
    db.create_environment(&project.id, "Development", Some("dev"))
        .unwrap();
    let prod = db
        .create_environment(&project.id, "Production", Some("prod"))
        .unwrap();

    let resolver = VariableResolver::new(db.clone());
    let api = resolver
        .store_default(&project.id, "API_URL", None, Some("https://api.dev"), false, &key)
        .unwrap();
    resolver
        .store_override(&prod.id, &api.id, "https://api.prod", &key)
        .unwrap();
    resolver
        .store_default(&project.id, "DEBUG", Some("verbose logs"), Some("false"), false, &key)
        .unwrap();

    (dir, path)
}

#[test]
fn values_survive_reopening_the_database() {
    let (_dir, path) = acme_vault();

    let db = Database::open(&path).unwrap();
    let key = CredentialGate::new(db.clone())
        .unlock(&hash_password(PASSWORD))
        .unwrap();
    let project = db.find_project_by_name("acme").unwrap().unwrap();
    let prod = db.find_environment_by_slug(&project.id, "PROD").unwrap().unwrap();
    let dev = db.find_environment_by_slug(&project.id, "dev").unwrap().unwrap();

    let resolver = VariableResolver::new(db);
    let prod_values = resolver.decrypted_map(&project.id, &prod.id, &key).unwrap();
    assert_eq!(prod_values["API_URL"], "https://api.prod");
    assert_eq!(prod_values["DEBUG"], "false");

    let dev_values = resolver.decrypted_map(&project.id, &dev.id, &key).unwrap();
    assert_eq!(dev_values["API_URL"], "https://api.dev");
}

#[test]
fn wrong_password_cannot_unlock() {
    let (_dir, path) = acme_vault();
    let gate = CredentialGate::new(Database::open(&path).unwrap());

    assert!(matches!(
        gate.unlock(&hash_password("not the password")),
        Err(VaultError::InvalidCredential)
    ));
    assert!(!gate.verify_master_password(&hash_password("nope")).unwrap().valid);
}

#[test]
fn password_change_re_encrypts_everything() {
    let (_dir, path) = acme_vault();
    let db = Database::open(&path).unwrap();
    let gate = CredentialGate::new(db.clone());

    let report = gate
        .change_master_password(&hash_password(PASSWORD), &hash_password("new password!"))
        .unwrap();
    assert_eq!(report.defaults, 2);
    assert_eq!(report.overrides, 1);

    assert!(gate.unlock(&hash_password(PASSWORD)).is_err());
    let key = gate.unlock(&hash_password("new password!")).unwrap();

    let project = db.find_project_by_name("Acme").unwrap().unwrap();
    let prod = db.find_environment_by_slug(&project.id, "prod").unwrap().unwrap();
    let resolved = VariableResolver::new(db)
        .resolve_all(&project.id, &prod.id, None, &key)
        .unwrap();
    assert_eq!(
        resolved["API_URL"].value,
        ResolvedValue::Plain("https://api.prod".into())
    );
    assert!(resolved["API_URL"].is_overridden);
    assert!(!resolved["DEBUG"].is_overridden);
}

#[test]
fn metadata_never_needs_the_key() {
    let (_dir, path) = acme_vault();
    let db = Database::open(&path).unwrap();
    let project = db.find_project_by_name("Acme").unwrap().unwrap();
    let dev = db.find_environment_by_slug(&project.id, "dev").unwrap().unwrap();

    let described = VariableResolver::new(db)
        .describe(&project.id, &dev.id)
        .unwrap();
    let keys: Vec<_> = described.iter().map(|v| v.key.as_str()).collect();
    assert_eq!(keys, ["API_URL", "DEBUG"]);
    assert!(described.iter().all(|v| v.has_value && !v.is_secret));
}

#[test]
fn token_lifecycle() {
    let (_dir, path) = acme_vault();
    let registry = AccessTokenRegistry::new(Database::open(&path).unwrap());

    let issued = registry.issue("laptop", Some(30)).unwrap();
    let id = registry.verify(&issued.raw_token).unwrap();
    assert_eq!(id, issued.record.id);
    assert!(registry.check(&id).unwrap().last_used_at.is_some());

    registry.revoke(&id).unwrap();
    assert!(matches!(
        registry.verify(&issued.raw_token),
        Err(VaultError::InvalidToken)
    ));
    assert!(matches!(
        registry.revoke(&id),
        Err(VaultError::TokenNotFound(_))
    ));
}

#[test]
fn deleting_a_project_removes_its_variables() {
    let (_dir, path) = acme_vault();
    let db = Database::open(&path).unwrap();
    let project = db.find_project_by_name("Acme").unwrap().unwrap();

    db.delete_project(&project.id).unwrap();
    assert!(db.find_project_by_name("Acme").unwrap().is_none());
    assert!(db.list_definitions(&project.id).unwrap().is_empty());
    assert!(db.project_summaries().unwrap().is_empty());
}
