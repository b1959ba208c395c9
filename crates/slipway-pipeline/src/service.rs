//! Service spec normalization.
//!
//! Every `*.json` file under `resources/services` is a service spec. Each one
//! is templated, prefixed, overridden, annotated with the markers of its
//! function script and finally fanned out into one file per HTTP verb.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::error::{PushError, PushWarning};
use crate::json::{load_document, store_json};
use crate::marker::{self, StorePolicy};
use crate::overrides::{apply_rules, OverrideRule};
use crate::template::{transform_in_place, Bindings};

/// Folder holding service specs, relative to the api folder.
pub const SERVICES_FOLDER: &str = "resources/services";
/// Folder function scripts are resolved against, relative to the api folder.
pub const RESOURCES_FOLDER: &str = "resources";
/// Verb used when a service declares none.
pub const DEFAULT_VERB: &str = "get";

/// The `verb` field of a service spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Single(String),
    Multiple(Vec<String>),
}

impl Verb {
    /// Read the verb field. Missing, null or empty lists mean `get`.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(v)) if !v.trim().is_empty() => Verb::Single(v.trim().to_lowercase()),
            Some(Value::Array(items)) => {
                let mut verbs: Vec<String> = Vec::new();
                for verb in items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|v| v.trim().to_lowercase())
                    .filter(|v| !v.is_empty())
                {
                    if !verbs.contains(&verb) {
                        verbs.push(verb);
                    }
                }
                if verbs.is_empty() {
                    Verb::Single(DEFAULT_VERB.to_string())
                } else {
                    Verb::Multiple(verbs)
                }
            }
            _ => Verb::Single(DEFAULT_VERB.to_string()),
        }
    }
}

/// File name prefix used when a service is fanned out for `verb`.
pub fn action_prefix(verb: &str) -> String {
    match verb {
        "get" => "Get".to_string(),
        "post" => "Create".to_string(),
        "put" => "Update".to_string(),
        "delete" => "Delete".to_string(),
        "patch" => "Patch".to_string(),
        "head" => "Echo".to_string(),
        "options" => "Info".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

/// One service definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    doc: Map<String, Value>,
}

impl ServiceSpec {
    pub fn from_map(doc: Map<String, Value>) -> Self {
        Self { doc }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.doc
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.doc.get("endpoint").and_then(Value::as_str)
    }

    /// Prepend `prefix` to the endpoint, avoiding a doubled `/`.
    pub fn prefix_endpoint(&mut self, prefix: &str) {
        let Some(endpoint) = self.endpoint() else {
            return;
        };
        let joined = if prefix.ends_with('/') && endpoint.starts_with('/') {
            format!("{}{}", prefix.trim_end_matches('/'), endpoint)
        } else {
            format!("{}{}", prefix, endpoint)
        };
        self.doc.insert("endpoint".to_string(), Value::String(joined));
    }

    pub fn verb(&self) -> Verb {
        Verb::from_value(self.doc.get("verb"))
    }

    /// Function script, relative to `resources/`. Accepts the legacy `runtime.script`.
    pub fn function(&self) -> Option<&str> {
        let runtime = self.doc.get("runtime")?.as_object()?;
        runtime
            .get("function")
            .or_else(|| runtime.get("script"))
            .and_then(Value::as_str)
            .filter(|f| !f.is_empty())
    }

    fn with_verb(&self, verb: &str) -> Map<String, Value> {
        let mut doc = self.doc.clone();
        doc.insert("verb".to_string(), Value::String(verb.to_string()));
        doc
    }
}

/// Inputs shared by every service of one api.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub bindings: &'a Bindings,
    pub prefix: Option<&'a str>,
    pub rules: &'a [OverrideRule],
    pub store_policy: StorePolicy,
}

/// Outcome of a normalization pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    /// Service files written, in processing order.
    pub written: Vec<PathBuf>,
    /// Service files removed by verb fan-out.
    pub removed: Vec<PathBuf>,
    /// Total markers extracted.
    pub markers: usize,
    pub warnings: Vec<PushWarning>,
}

/// Normalize every service spec under `services_root`.
pub fn normalize(
    api_folder: &Path,
    services_root: &Path,
    ctx: &TransformContext<'_>,
) -> Result<NormalizeReport, PushError> {
    let mut report = NormalizeReport::default();
    if !services_root.is_dir() {
        tracing::debug!(folder = %services_root.display(), "No services folder");
        return Ok(report);
    }

    let files: Vec<PathBuf> = WalkDir::new(services_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();

    for file in files {
        normalize_file(api_folder, &file, ctx, &mut report)?;
    }

    tracing::info!(
        services = report.written.len(),
        markers = report.markers,
        warnings = report.warnings.len(),
        "Normalized service specs"
    );
    Ok(report)
}

fn normalize_file(
    api_folder: &Path,
    file: &Path,
    ctx: &TransformContext<'_>,
    report: &mut NormalizeReport,
) -> Result<(), PushError> {
    let original = match load_document(file) {
        Ok(Value::Object(doc)) => doc,
        Ok(_) => {
            report
                .warnings
                .push(PushWarning::service_parse(file, "not a JSON object"));
            return Ok(());
        }
        Err(e) => {
            tracing::warn!(file = %file.display(), error = %e, "Skipping service spec");
            report.warnings.push(PushWarning::service_parse(file, e));
            return Ok(());
        }
    };

    let mut value = Value::Object(original.clone());
    transform_in_place(&mut value, ctx.bindings);
    let Value::Object(mut doc) = value else {
        return Ok(());
    };
    prefix_and_override(&mut doc, ctx);
    let mut service = ServiceSpec::from_map(doc);

    let mut found = 0;
    if let Some(function) = service.function().map(str::to_string) {
        let script = api_folder.join(RESOURCES_FOLDER).join(&function);
        if script.is_file() {
            found = marker::extract(&mut service.doc, &script)?;
            report.markers += found;
        } else {
            tracing::warn!(
                service = %file.display(),
                function = %script.display(),
                "Function file not found"
            );
            report
                .warnings
                .push(PushWarning::missing_function_file(file, &script));
        }
    }

    match service.verb() {
        Verb::Single(verb) => {
            let doc = service.with_verb(&verb);
            if doc != original || ctx.store_policy.should_store(found) {
                store_json(&Value::Object(doc), file)?;
                report.written.push(file.to_path_buf());
            }
        }
        Verb::Multiple(verbs) => {
            let dir = file.parent().unwrap_or(api_folder);
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let targets: Vec<(String, PathBuf)> = verbs
                .into_iter()
                .map(|verb| {
                    let target = dir.join(format!("{}{}", action_prefix(&verb), name));
                    (verb, target)
                })
                .collect();
            let collision = targets
                .iter()
                .find(|(_, target)| target.as_path() != file && target.exists());
            if let Some((_, taken)) = collision {
                return Err(PushError::ServiceCollision {
                    service: file.to_path_buf(),
                    target: taken.clone(),
                });
            }
            for (verb, target) in targets {
                store_json(&Value::Object(service.with_verb(&verb)), &target)?;
                report.written.push(target);
            }
            std::fs::remove_file(file).map_err(|e| PushError::io_at(file, e))?;
            report.removed.push(file.to_path_buf());
        }
    }
    Ok(())
}

fn prefix_and_override(doc: &mut Map<String, Value>, ctx: &TransformContext<'_>) {
    if let Some(prefix) = ctx.prefix {
        let mut service = ServiceSpec::from_map(std::mem::take(doc));
        service.prefix_endpoint(prefix);
        *doc = service.doc;
    }
    apply_rules(doc, ctx.rules);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            std::fs::create_dir_all(temp.path().join(SERVICES_FOLDER)).unwrap();
            Self { temp }
        }

        fn api(&self) -> &Path {
            self.temp.path()
        }

        fn services(&self) -> PathBuf {
            self.temp.path().join(SERVICES_FOLDER)
        }

        fn service(&self, rel: &str, value: Value) {
            let path = self.services().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
        }

        fn resource(&self, rel: &str, content: &str) {
            let path = self.api().join(RESOURCES_FOLDER).join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        fn read(&self, rel: &str) -> Value {
            let content = std::fs::read_to_string(self.services().join(rel)).unwrap();
            serde_json::from_str(&content).unwrap()
        }

        fn run(&self, ctx: &TransformContext<'_>) -> NormalizeReport {
            normalize(self.api(), &self.services(), ctx).unwrap()
        }
    }

    fn plain(bindings: &Bindings) -> TransformContext<'_> {
        TransformContext {
            bindings,
            prefix: None,
            rules: &[],
            store_policy: StorePolicy::WhenFound,
        }
    }

    #[test]
    fn verb_parsing() {
        assert_eq!(Verb::from_value(None), Verb::Single("get".into()));
        assert_eq!(Verb::from_value(Some(&json!("POST"))), Verb::Single("post".into()));
        assert_eq!(Verb::from_value(Some(&json!([]))), Verb::Single("get".into()));
        assert_eq!(
            Verb::from_value(Some(&json!(["GET", "Post"]))),
            Verb::Multiple(vec!["get".into(), "post".into()])
        );
        assert_eq!(
            Verb::from_value(Some(&json!(["get", "GET", " post", "get"]))),
            Verb::Multiple(vec!["get".into(), "post".into()])
        );
    }

    #[test]
    fn duplicate_verbs_write_one_file_each() {
        let fx = Fixture::new();
        fx.service("Orders.json", json!({"endpoint": "/orders", "verb": ["get", "GET"]}));

        let bindings = Bindings::new();
        let report = fx.run(&plain(&bindings));

        let on_disk: Vec<_> = std::fs::read_dir(fx.services()).unwrap().collect();
        assert_eq!(report.written, vec![fx.services().join("GetOrders.json")]);
        assert_eq!(on_disk.len(), 1);
    }

    #[test]
    fn fan_out_refuses_to_overwrite_sibling() {
        let fx = Fixture::new();
        let sibling = json!({"endpoint": "/orders/{id}", "id": "single"});
        fx.service("GetOrders.json", sibling.clone());
        fx.service("Orders.json", json!({"endpoint": "/orders", "verb": ["get", "post"]}));

        let bindings = Bindings::new();
        let err = normalize(fx.api(), &fx.services(), &plain(&bindings)).unwrap_err();

        assert!(matches!(
            err,
            PushError::ServiceCollision { ref target, .. } if *target == fx.services().join("GetOrders.json")
        ));
        assert!(err.to_string().starts_with("E2032"));
        assert_eq!(fx.read("GetOrders.json"), sibling);
        assert!(fx.services().join("Orders.json").exists());
        assert!(!fx.services().join("CreateOrders.json").exists());
    }

    #[test]
    fn action_table() {
        let actions: Vec<String> = ["get", "post", "put", "delete", "patch", "head", "options", "purge"]
            .iter()
            .map(|v| action_prefix(v))
            .collect();
        assert_eq!(
            actions,
            vec!["Get", "Create", "Update", "Delete", "Patch", "Echo", "Info", "Purge"]
        );
    }

    #[test]
    fn single_verb_is_saved_in_place() {
        let fx = Fixture::new();
        fx.service("orders.json", json!({"endpoint": "/orders", "verb": "get"}));

        let bindings = Bindings::new();
        let report = fx.run(&plain(&bindings));

        assert_eq!(fx.read("orders.json"), json!({"endpoint": "/orders", "verb": "get"}));
        assert!(report.removed.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn missing_verb_defaults_to_get() {
        let fx = Fixture::new();
        fx.service("orders.json", json!({"endpoint": "/orders"}));

        let bindings = Bindings::new();
        let report = fx.run(&plain(&bindings));

        assert_eq!(fx.read("orders.json"), json!({"endpoint": "/orders", "verb": "get"}));
        assert_eq!(report.written.len(), 1);
    }

    #[test]
    fn fan_out_writes_one_file_per_verb() {
        let fx = Fixture::new();
        fx.service("nested/Orders.json", json!({"endpoint": "/orders", "verb": ["get", "POST"]}));

        let bindings = Bindings::new();
        let report = fx.run(&plain(&bindings));

        let dir = fx.services().join("nested");
        let mut names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["CreateOrders.json", "GetOrders.json"]);
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.removed, vec![dir.join("Orders.json")]);
        assert_eq!(fx.read("nested/CreateOrders.json")["verb"], json!("post"));
    }

    #[test]
    fn templates_prefix_and_rules_apply() {
        let fx = Fixture::new();
        fx.service(
            "orders.json",
            json!({"endpoint": "/orders", "verb": "get", "timeout": "{% Recipe.timeout %}"}),
        );
        fx.service("users.json", json!({"endpoint": "/users", "verb": "get"}));

        let bindings = Bindings::new().with("Recipe", json!({"timeout": 30}));
        let rules = vec![OverrideRule::from_value(
            &json!({"matches": "/v1/orders*", "apply": {"secure": true}}),
        )
        .unwrap()];
        let ctx = TransformContext {
            bindings: &bindings,
            prefix: Some("/v1"),
            rules: &rules,
            store_policy: StorePolicy::WhenFound,
        };
        fx.run(&ctx);

        assert_eq!(
            fx.read("orders.json"),
            json!({"endpoint": "/v1/orders", "verb": "get", "timeout": 30, "secure": true})
        );
        assert_eq!(fx.read("users.json"), json!({"endpoint": "/v1/users", "verb": "get"}));
    }

    #[test]
    fn markers_are_extracted_from_function() {
        let fx = Fixture::new();
        fx.service(
            "orders.json",
            json!({"endpoint": "/orders", "verb": "get", "runtime": {"function": "orders/get.js"}}),
        );
        fx.resource("orders/get.js", "//@ <Param> id | required\n//@ order id/\nreturn 1;\n");

        let bindings = Bindings::new();
        let report = fx.run(&plain(&bindings));

        assert_eq!(report.markers, 1);
        assert_eq!(
            fx.read("orders.json")["markers"],
            json!([{"line": "1", "type": "param", "id": true, "required": true, "comment": "order id"}])
        );
    }

    #[test]
    fn legacy_script_key_is_accepted() {
        let fx = Fixture::new();
        fx.service("a.json", json!({"verb": "get", "runtime": {"script": "a.js"}}));
        fx.resource("a.js", "//@ <todo>\n");

        let bindings = Bindings::new();
        let report = fx.run(&plain(&bindings));
        assert_eq!(report.markers, 1);
    }

    #[test]
    fn missing_function_warns_and_continues() {
        let fx = Fixture::new();
        fx.service(
            "Items.json",
            json!({"endpoint": "/items", "verb": ["get", "put"], "runtime": {"function": "missing.js"}}),
        );
        fx.service("b.json", json!({"endpoint": "/b"}));

        let bindings = Bindings::new();
        let report = fx.run(&plain(&bindings));

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].code, "W2030");
        assert!(fx.services().join("GetItems.json").exists());
        assert!(fx.services().join("UpdateItems.json").exists());
        assert!(!fx.services().join("Items.json").exists());
        assert_eq!(fx.read("b.json")["verb"], json!("get"));
    }

    #[test]
    fn unreadable_specs_and_hidden_entries_are_skipped() {
        let fx = Fixture::new();
        std::fs::write(fx.services().join("broken.json"), "{oops").unwrap();
        fx.service(".hidden/x.json", json!({"verb": ["get", "post"]}));
        fx.service("ok.json", json!({"endpoint": "/ok", "verb": "get"}));
        std::fs::write(fx.services().join("README.md"), "docs").unwrap();

        let bindings = Bindings::new();
        let report = fx.run(&plain(&bindings));

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].code, "W2031");
        assert!(fx.services().join(".hidden/x.json").exists());
        assert!(fx.services().join("broken.json").exists());
    }

    #[test]
    fn unchanged_service_is_not_rewritten_without_markers() {
        let fx = Fixture::new();
        fx.service("a.json", json!({"endpoint": "/a", "verb": "get"}));

        let bindings = Bindings::new();
        assert!(fx.run(&plain(&bindings)).written.is_empty());

        let ctx = TransformContext {
            store_policy: StorePolicy::Always,
            ..plain(&bindings)
        };
        assert_eq!(fx.run(&ctx).written.len(), 1);
    }

    #[test]
    fn missing_services_folder_is_empty_report() {
        let temp = TempDir::new().unwrap();
        let bindings = Bindings::new();
        let report = normalize(temp.path(), &temp.path().join("nope"), &plain(&bindings)).unwrap();
        assert_eq!(report, NormalizeReport::default());
    }
}
