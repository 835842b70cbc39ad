//! Config loading, error-message, and validation integration tests.
//! Layout: ~/.odoo-mirror/config.yaml

use assert_fs::prelude::*;
use mirror_core::{
    config, ConfigError, Domain, FieldType, LocalType, Operator, RemoteModel, Transform,
    TransformRule,
};
use predicates::prelude::predicate;
use predicates::Predicate;
use rstest::rstest;
use serde_json::json;

const FULL_CONFIG: &str = r#"
connections:
  - url: https://erp.example.com
    database: prod
    username: site-bot
    password: hunter2
    models:
      - remote: blog.post
        local: OdooBlogPost
        fields:
          name: {}
          subtitle: { default: "", transform: trim }
          tag_ids: {}
          author_id: {}
        domain:
          and:
            - [website_published, "=", true]
            - [is_draft, "!=", true]
      - remote: blog.tag
        local: OdooBlogTag
        fields:
          name: { transform: lowercase }
      - remote: res.partner
        local: OdooPartner
        fields:
          display_name: { type: char }
    garbage_model:
      remote: x.garbage
      local: OdooGarbage
      fields:
        model_id: {}
        model_name: {}
"#;

fn write_config(home: &assert_fs::TempDir, yaml: &str) {
    home.child(".odoo-mirror")
        .child("config.yaml")
        .write_str(yaml)
        .expect("write config");
}

// ---------------------------------------------------------------------------
// 1. Successful load
// ---------------------------------------------------------------------------

#[test]
fn full_config_loads_with_every_section() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, FULL_CONFIG);

    let cfg = config::load_at(home.path()).expect("load");
    assert_eq!(cfg.connections.len(), 1);

    let conn = &cfg.connections[0];
    assert_eq!(conn.password().expect("password"), "hunter2");
    assert_eq!(conn.models.len(), 3);

    let post = conn.find_model("blog.post").expect("blog.post");
    assert_eq!(post.local, LocalType::from("OdooBlogPost"));
    assert_eq!(post.fields.len(), 4);
    assert_eq!(post.fields["subtitle"].default, Some(json!("")));
    assert_eq!(
        post.fields["subtitle"].transform,
        Some(Transform::Rule(TransformRule::Trim))
    );
    assert_eq!(
        post.domain,
        Domain::leaf("website_published", Operator::Eq, true)
            .and(Domain::leaf("is_draft", Operator::Ne, true))
    );

    let partner = conn.find_model("res.partner").expect("res.partner");
    assert_eq!(partner.fields["display_name"].field_type, Some(FieldType::Char));

    let garbage = conn.garbage_model.as_ref().expect("garbage model");
    assert_eq!(garbage.remote, RemoteModel::from("x.garbage"));
}

#[test]
fn missing_domain_defaults_to_everything() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, FULL_CONFIG);
    let cfg = config::load_at(home.path()).expect("load");
    let tag = cfg.connections[0].find_model("blog.tag").expect("tag");
    assert_eq!(tag.domain, Domain::all());
    assert_eq!(tag.domain.to_prefix(), json!([]));
}

#[test]
fn password_env_is_read_at_resolution_time() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let yaml = FULL_CONFIG.replace(
        "password: hunter2",
        "password_env: ODOO_MIRROR_CONFIG_TEST_PASSWORD",
    );
    write_config(&home, &yaml);

    let cfg = config::load_at(home.path()).expect("load");
    std::env::set_var("ODOO_MIRROR_CONFIG_TEST_PASSWORD", "from-env");
    assert_eq!(cfg.connections[0].password().expect("password"), "from-env");
}

// ---------------------------------------------------------------------------
// 2. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_names_the_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    assert!(predicate::str::contains("config.yaml").eval(&err.to_string()));
}

#[test]
fn corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, ": : corrupt : yaml : !!!\n  - broken: [unclosed");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn unknown_field_type_override_is_a_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(
        &home,
        &FULL_CONFIG.replace("display_name: { type: char }", "display_name: { type: binary }"),
    );
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 3. Validation on load
// ---------------------------------------------------------------------------

#[rstest]
#[case::duplicate_remote(
    "remote: blog.tag\n        local: OdooBlogTag",
    "remote: blog.post\n        local: OdooBlogTag",
    "duplicate remote model name"
)]
#[case::duplicate_local(
    "remote: blog.tag\n        local: OdooBlogTag",
    "remote: blog.tag\n        local: OdooBlogPost",
    "duplicate local model name"
)]
#[case::reserved_field("author_id: {}", "lang: {}", "reserved name")]
#[case::garbage_without_model_name("model_name: {}", "other: {}", "model_name")]
#[case::in_without_list(
    "[is_draft, \"!=\", true]",
    "[id, \"in\", 4]",
    "requires a list value"
)]
fn invalid_configs_are_rejected(#[case] from: &str, #[case] to: &str, #[case] message: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let yaml = FULL_CONFIG.replacen(from, to, 1);
    assert_ne!(yaml, FULL_CONFIG, "case must change the fixture");
    write_config(&home, &yaml);

    let err = config::load_at(home.path()).unwrap_err();
    let source = std::error::Error::source(&err)
        .map(|s| s.to_string())
        .unwrap_or_default();
    let msg = format!("{err} {source}");
    assert!(msg.contains(message), "expected '{message}' in: {msg}");
}
