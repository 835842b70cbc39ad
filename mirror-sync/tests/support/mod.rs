//! A scripted in-memory Odoo for engine tests.
//!
//! Understands `fields_get`, `search` (prefix domains, order by write_date,
//! offset/limit), `search_read` (per-locale translations), and the
//! `res.lang` locale lookup. Every call is logged; calls can be made to fail.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Map, Value};

use mirror_core::{Config, ConnectionConfig, Domain, FieldSpec, ModelMapping, Operator};
use mirror_sync::{Credentials, RpcClient, RpcConnector, RpcError};

pub const PASSWORD: &str = "secret";

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub model: String,
    pub method: String,
    pub args: Value,
    pub kwargs: Value,
}

#[derive(Default)]
struct FakeModel {
    fields: Map<String, Value>,
    records: BTreeMap<i64, Map<String, Value>>,
    translations: BTreeMap<(i64, String), Map<String, Value>>,
}

#[derive(Default)]
struct State {
    models: BTreeMap<String, FakeModel>,
    locales: Vec<String>,
    calls: Vec<Call>,
    failing: Vec<(String, String)>,
    failing_reads: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct FakeOdoo {
    state: Arc<Mutex<State>>,
}

impl FakeOdoo {
    pub fn new(locales: &[&str]) -> Self {
        // Engine logs show up with `RUST_LOG=debug cargo test -- --nocapture`.
        let _ = env_logger::builder().is_test(true).try_init();
        let state = State {
            locales: locales.iter().map(|l| l.to_string()).collect(),
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake state")
    }

    fn model<'a>(state: &'a mut State, model: &str) -> &'a mut FakeModel {
        state.models.entry(model.to_string()).or_insert_with(|| {
            let mut fake = FakeModel::default();
            fake.fields.insert("id".into(), json!({"type": "integer", "string": "ID"}));
            fake.fields.insert(
                "write_date".into(),
                json!({"type": "datetime", "string": "Last Updated on"}),
            );
            fake
        })
    }

    pub fn field(&self, model: &str, name: &str, field_type: &str) -> &Self {
        let mut state = self.state();
        Self::model(&mut state, model)
            .fields
            .insert(name.into(), json!({"type": field_type, "string": name}));
        self
    }

    pub fn relation(&self, model: &str, name: &str, field_type: &str, target: &str) -> &Self {
        let mut state = self.state();
        Self::model(&mut state, model).fields.insert(
            name.into(),
            json!({"type": field_type, "relation": target, "string": name}),
        );
        self
    }

    /// Create or overwrite a record.
    pub fn put(&self, model: &str, id: i64, write_date: &str, values: Value) {
        let mut record = values.as_object().cloned().expect("record values");
        record.insert("id".into(), json!(id));
        record.insert("write_date".into(), json!(write_date));
        let mut state = self.state();
        Self::model(&mut state, model).records.insert(id, record);
    }

    /// Override values of a record in one locale.
    pub fn translate(&self, model: &str, id: i64, locale: &str, values: Value) {
        let values = values.as_object().cloned().expect("translated values");
        let mut state = self.state();
        Self::model(&mut state, model)
            .translations
            .insert((id, locale.to_string()), values);
    }

    pub fn remove(&self, model: &str, id: i64) {
        let mut state = self.state();
        Self::model(&mut state, model).records.remove(&id);
    }

    /// Make every `model.method` call fail with a server error.
    pub fn fail(&self, model: &str, method: &str) {
        self.state()
            .failing
            .push((model.to_string(), method.to_string()));
    }

    /// Make `model.search_read` fail in one locale only.
    pub fn fail_read_in(&self, model: &str, locale: &str) {
        self.state()
            .failing_reads
            .push((model.to_string(), locale.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn calls_to(&self, model: &str, method: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.model == model && c.method == method)
            .collect()
    }
}

impl RpcConnector for FakeOdoo {
    fn login(&self, credentials: &Credentials) -> Result<Box<dyn RpcClient>, RpcError> {
        if credentials.password != PASSWORD {
            return Err(RpcError::LoginRejected {
                username: credentials.username.clone(),
            });
        }
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<State>>,
}

impl RpcClient for FakeSession {
    fn call(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, RpcError> {
        let mut state = self.state.lock().expect("fake state");
        state.calls.push(Call {
            model: model.into(),
            method: method.into(),
            args: args.clone(),
            kwargs: kwargs.clone(),
        });
        if state
            .failing
            .iter()
            .any(|(m, me)| m == model && me == method)
        {
            return Err(RpcError::Server {
                message: format!("{model}.{method} exploded"),
                detail: None,
            });
        }

        if model == "res.lang" && method == "search_read" {
            let langs = state
                .locales
                .iter()
                .enumerate()
                .map(|(i, code)| json!({"id": i + 1, "code": code}))
                .collect();
            return Ok(Value::Array(langs));
        }

        let Some(fake) = state.models.get(model) else {
            return Err(RpcError::Server {
                message: format!("Object {model} doesn't exist"),
                detail: None,
            });
        };
        match method {
            "fields_get" => Ok(fields_get(fake, &args[0])),
            "search" => Ok(search(fake, &args[0], &kwargs)),
            "search_read" => {
                let lang = kwargs["context"]["lang"].as_str().unwrap_or("en_US");
                if state.failing_reads.iter().any(|(m, l)| m == model && l == lang) {
                    return Err(RpcError::Transport(format!("connection reset reading {model}")));
                }
                Ok(search_read(fake, &args[0], &args[1], lang))
            }
            other => Err(RpcError::Server {
                message: format!("unsupported method {other}"),
                detail: None,
            }),
        }
    }
}

fn fields_get(fake: &FakeModel, requested: &Value) -> Value {
    let mut out = Map::new();
    for name in requested.as_array().into_iter().flatten().filter_map(Value::as_str) {
        if let Some(meta) = fake.fields.get(name) {
            out.insert(name.into(), meta.clone());
        }
    }
    Value::Object(out)
}

fn matching<'a>(fake: &'a FakeModel, domain: &Value) -> Vec<&'a Map<String, Value>> {
    let tokens = domain.as_array().cloned().unwrap_or_default();
    fake.records
        .values()
        .filter(|record| matches(&tokens, record))
        .collect()
}

fn search(fake: &FakeModel, domain: &Value, kwargs: &Value) -> Value {
    let mut records = matching(fake, domain);
    records.sort_by(|a, b| {
        let ka = (a["write_date"].as_str(), a["id"].as_i64());
        let kb = (b["write_date"].as_str(), b["id"].as_i64());
        ka.cmp(&kb)
    });
    let offset = kwargs["offset"].as_u64().unwrap_or(0) as usize;
    let limit = kwargs["limit"].as_u64().map(|l| l as usize).unwrap_or(usize::MAX);
    let ids = records
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|r| r["id"].clone())
        .collect();
    Value::Array(ids)
}

fn search_read(fake: &FakeModel, domain: &Value, fields: &Value, lang: &str) -> Value {
    let fields: Vec<&str> = fields
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    let rows = matching(fake, domain)
        .into_iter()
        .map(|record| {
            let id = record["id"].as_i64().unwrap_or_default();
            let translated = fake.translations.get(&(id, lang.to_string()));
            let mut row = Map::new();
            row.insert("id".into(), json!(id));
            for field in &fields {
                let value = translated
                    .and_then(|t| t.get(*field))
                    .or_else(|| record.get(*field))
                    .cloned()
                    .unwrap_or(Value::Bool(false));
                row.insert((*field).into(), value);
            }
            Value::Object(row)
        })
        .collect();
    Value::Array(rows)
}

fn matches(tokens: &[Value], record: &Map<String, Value>) -> bool {
    let mut pos = 0;
    let mut all = true;
    while pos < tokens.len() {
        all &= term(tokens, &mut pos, record);
    }
    all
}

fn term(tokens: &[Value], pos: &mut usize, record: &Map<String, Value>) -> bool {
    let token = &tokens[*pos];
    *pos += 1;
    match token {
        Value::String(op) if op == "&" => {
            let a = term(tokens, pos, record);
            let b = term(tokens, pos, record);
            a && b
        }
        Value::String(op) if op == "|" => {
            let a = term(tokens, pos, record);
            let b = term(tokens, pos, record);
            a || b
        }
        Value::String(op) if op == "!" => !term(tokens, pos, record),
        Value::Array(leaf) => leaf_matches(leaf, record),
        other => panic!("bad domain token {other}"),
    }
}

fn leaf_matches(leaf: &[Value], record: &Map<String, Value>) -> bool {
    let [field, op, value] = leaf else {
        panic!("bad domain leaf {leaf:?}");
    };
    // TRUE_LEAF / FALSE_LEAF
    if let Some(n) = field.as_i64() {
        return Some(n) == value.as_i64();
    }
    let field = field.as_str().expect("leaf field");
    let actual = record.get(field).cloned().unwrap_or(Value::Bool(false));
    let op = op.as_str().expect("leaf operator");
    match op {
        "=" => actual == *value,
        "!=" => actual != *value,
        "in" => value.as_array().is_some_and(|vs| vs.contains(&actual)),
        "not in" => !value.as_array().is_some_and(|vs| vs.contains(&actual)),
        ">=" => matches!(compare(&actual, value), Some(Ordering::Greater | Ordering::Equal)),
        ">" => compare(&actual, value) == Some(Ordering::Greater),
        "<=" => matches!(compare(&actual, value), Some(Ordering::Less | Ordering::Equal)),
        "<" => compare(&actual, value) == Some(Ordering::Less),
        other => panic!("operator {other} not supported by the fake"),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Blog fixture
// ---------------------------------------------------------------------------

/// A fake with posts, tags, partners, and a garbage model.
pub fn blog_odoo(locales: &[&str]) -> FakeOdoo {
    let odoo = FakeOdoo::new(locales);
    odoo.field("blog.post", "name", "char")
        .field("blog.post", "website_published", "boolean")
        .relation("blog.post", "tag_ids", "many2many", "blog.tag")
        .relation("blog.post", "author_id", "many2one", "res.partner")
        .field("blog.tag", "name", "char")
        .field("res.partner", "name", "char")
        .field("x.garbage", "model_id", "integer")
        .field("x.garbage", "model_name", "char");
    odoo
}

pub fn post_mapping() -> ModelMapping {
    ModelMapping::new("blog.post", "OdooBlogPost")
        .with_field("name", FieldSpec::default())
        .with_field("tag_ids", FieldSpec::default())
        .with_field("author_id", FieldSpec::default())
        .with_domain(Domain::leaf("website_published", Operator::Eq, true))
}

pub fn blog_connection() -> ConnectionConfig {
    ConnectionConfig::new("https://erp.example.com", "prod", "site-bot", PASSWORD)
        .with_model(post_mapping())
        .with_model(
            ModelMapping::new("blog.tag", "OdooBlogTag").with_field("name", FieldSpec::default()),
        )
        .with_model(
            ModelMapping::new("res.partner", "OdooPartner")
                .with_field("name", FieldSpec::default()),
        )
        .with_garbage_model(
            ModelMapping::new("x.garbage", "OdooGarbage")
                .with_field("model_id", FieldSpec::default())
                .with_field("model_name", FieldSpec::default()),
        )
}

pub fn blog_config() -> Config {
    Config {
        connections: vec![blog_connection()],
    }
}
