//! Domain types for the mirror configuration.
//!
//! Everything here is plain data: the engine in `mirror-sync` interprets it.
//! All types deserialize from the YAML config via serde + serde_yaml, and can
//! also be built programmatically (see the `with_*` builders).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::Domain;
use crate::error::ConfigError;

/// Field names the mirror writes itself; a field spec may not claim them.
pub const RESERVED_FIELDS: [&str; 4] = ["id", "id_odoo", "lang", "write_date"];

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a model on the remote side, e.g. `blog.post`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteModel(pub String);

impl fmt::Display for RemoteModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RemoteModel {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RemoteModel {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Name of the local node type a remote model materializes into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalType(pub String);

impl fmt::Display for LocalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for LocalType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LocalType {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// Remote field types the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Char,
    Text,
    Html,
    Selection,
    Date,
    Datetime,
    Integer,
    Float,
    Monetary,
    Many2many,
    One2many,
    Many2one,
}

/// Normalization family of a [`FieldType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Numeric,
    ManyRelation,
    OneRelation,
}

impl FieldType {
    /// Parse the `type` attribute reported by the remote `fields_get`.
    ///
    /// Returns `None` for types the mirror does not support.
    pub fn from_remote(name: &str) -> Option<Self> {
        let ty = match name {
            "char" => FieldType::Char,
            "text" => FieldType::Text,
            "html" => FieldType::Html,
            "selection" => FieldType::Selection,
            "date" => FieldType::Date,
            "datetime" => FieldType::Datetime,
            "integer" => FieldType::Integer,
            "float" => FieldType::Float,
            "monetary" => FieldType::Monetary,
            "many2many" => FieldType::Many2many,
            "one2many" => FieldType::One2many,
            "many2one" => FieldType::Many2one,
            _ => return None,
        };
        Some(ty)
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldType::Char | FieldType::Text | FieldType::Html | FieldType::Selection => {
                FieldKind::Text
            }
            FieldType::Date | FieldType::Datetime => FieldKind::Date,
            FieldType::Integer | FieldType::Float | FieldType::Monetary => FieldKind::Numeric,
            FieldType::Many2many | FieldType::One2many => FieldKind::ManyRelation,
            FieldType::Many2one => FieldKind::OneRelation,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind(), FieldKind::ManyRelation | FieldKind::OneRelation)
    }
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// Declarative value rewrite applied after defaults.
///
/// Rules only touch string values; anything else passes through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "TransformRepr")]
pub enum TransformRule {
    Trim,
    Lowercase,
    Uppercase,
    Replace { from: String, to: String },
    Prefix(String),
    Suffix(String),
}

impl TransformRule {
    pub fn apply(&self, value: Value) -> Value {
        let Value::String(s) = value else {
            return value;
        };
        let out = match self {
            TransformRule::Trim => s.trim().to_owned(),
            TransformRule::Lowercase => s.to_lowercase(),
            TransformRule::Uppercase => s.to_uppercase(),
            TransformRule::Replace { from, to } => s.replace(from.as_str(), to),
            TransformRule::Prefix(p) => format!("{p}{s}"),
            TransformRule::Suffix(p) => format!("{s}{p}"),
        };
        Value::String(out)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum NamedTransform {
    Trim,
    Lowercase,
    Uppercase,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TransformRepr {
    Named(NamedTransform),
    Replace { replace: (String, String) },
    Prefix { prefix: String },
    Suffix { suffix: String },
}

impl From<TransformRepr> for TransformRule {
    fn from(repr: TransformRepr) -> Self {
        match repr {
            TransformRepr::Named(NamedTransform::Trim) => TransformRule::Trim,
            TransformRepr::Named(NamedTransform::Lowercase) => TransformRule::Lowercase,
            TransformRepr::Named(NamedTransform::Uppercase) => TransformRule::Uppercase,
            TransformRepr::Replace { replace: (from, to) } => TransformRule::Replace { from, to },
            TransformRepr::Prefix { prefix } => TransformRule::Prefix(prefix),
            TransformRepr::Suffix { suffix } => TransformRule::Suffix(suffix),
        }
    }
}

/// A pure `Value -> Value` function injected by the embedding program.
pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Value rewrite strategy for a field.
#[derive(Clone)]
pub enum Transform {
    Rule(TransformRule),
    Custom(TransformFn),
}

impl Transform {
    pub fn custom(f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        Transform::Custom(Arc::new(f))
    }

    pub fn apply(&self, value: Value) -> Value {
        match self {
            Transform::Rule(rule) => rule.apply(value),
            Transform::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Rule(rule) => f.debug_tuple("Rule").field(rule).finish(),
            Transform::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Transform::Rule(a), Transform::Rule(b)) => a == b,
            (Transform::Custom(a), Transform::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<'de> Deserialize<'de> for Transform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        TransformRule::deserialize(deserializer).map(Transform::Rule)
    }
}

// ---------------------------------------------------------------------------
// Mappings
// ---------------------------------------------------------------------------

/// Local representation of one remote field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FieldSpec {
    /// Overrides the type reported by the remote `fields_get`.
    #[serde(default, rename = "type")]
    pub field_type: Option<FieldType>,
    /// Substituted when the normalized value is falsy.
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub transform: Option<Transform>,
}

impl FieldSpec {
    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Binds a remote model to a local node type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelMapping {
    pub remote: RemoteModel,
    pub local: LocalType,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
    /// Restricts which remote records are in scope.
    #[serde(default)]
    pub domain: Domain,
}

impl ModelMapping {
    pub fn new(remote: impl Into<RemoteModel>, local: impl Into<LocalType>) -> Self {
        Self {
            remote: remote.into(),
            local: local.into(),
            fields: BTreeMap::new(),
            domain: Domain::all(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }
}

/// One remote endpoint and the models mirrored from it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Name of an environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    pub models: Vec<ModelMapping>,
    /// Model whose records announce deletions of other models' records.
    #[serde(default)]
    pub garbage_model: Option<ModelMapping>,
}

impl ConnectionConfig {
    pub fn new(
        url: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            username: username.into(),
            password: Some(password.into()),
            password_env: None,
            models: Vec::new(),
            garbage_model: None,
        }
    }

    pub fn with_model(mut self, model: ModelMapping) -> Self {
        self.models.push(model);
        self
    }

    pub fn with_garbage_model(mut self, model: ModelMapping) -> Self {
        self.garbage_model = Some(model);
        self
    }

    /// `username@database (url)`; used in logs and error messages.
    pub fn label(&self) -> String {
        format!("{}@{} ({})", self.username, self.database, self.url)
    }

    /// Regular models first, then the garbage model.
    pub fn all_models(&self) -> impl Iterator<Item = &ModelMapping> {
        self.models.iter().chain(self.garbage_model.iter())
    }

    /// Find a mapping (garbage model included) by remote model name.
    pub fn find_model(&self, remote: &str) -> Option<&ModelMapping> {
        self.all_models().find(|m| m.remote.0 == remote)
    }

    pub fn is_garbage(&self, mapping: &ModelMapping) -> bool {
        self.garbage_model
            .as_ref()
            .is_some_and(|g| g.remote == mapping.remote)
    }

    /// Resolve the password, reading `password_env` when set.
    pub fn password(&self) -> Result<String, ConfigError> {
        if let Some(var) = &self.password_env {
            return std::env::var(var).map_err(|_| ConfigError::MissingPasswordEnv {
                var: var.clone(),
                connection: self.label(),
            });
        }
        self.password
            .clone()
            .ok_or_else(|| ConfigError::MissingPassword {
                connection: self.label(),
            })
    }
}

/// Root of the YAML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
