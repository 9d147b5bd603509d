use authz::{PermissionSnapshot, ProjectId};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, RouteError};

/// Route parameter used as the project id when a scoped route does not name one.
pub const DEFAULT_PROJECT_PARAM: &str = "projectId";

/// Permissions a route demands, decided once when the table is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequiredPermissions {
    /// Any one of these names, checked globally.
    Flat(Vec<String>),
    /// Any one of these names, scoped to the project named by a route parameter.
    #[serde(rename_all = "camelCase")]
    AnyOfScoped {
        any_of: Vec<String>,
        project_param: String,
    },
}

impl RequiredPermissions {
    pub fn flat<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequiredPermissions::Flat(names.into_iter().map(Into::into).collect())
    }

    pub fn any_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequiredPermissions::AnyOfScoped {
            any_of: names.into_iter().map(Into::into).collect(),
            project_param: DEFAULT_PROJECT_PARAM.to_string(),
        }
    }

    pub fn names(&self) -> &[String] {
        match self {
            RequiredPermissions::Flat(names) => names,
            RequiredPermissions::AnyOfScoped { any_of, .. } => any_of,
        }
    }

    /// Evaluates the requirement. An empty name list never grants access.
    ///
    /// A scoped requirement uses the matched route parameter as the project
    /// id; without that parameter it is checked globally.
    pub fn is_satisfied_by(
        &self,
        snapshot: &PermissionSnapshot,
        params: &BTreeMap<String, String>,
    ) -> bool {
        match self {
            RequiredPermissions::Flat(names) => snapshot.has_any_permission(names, None),
            RequiredPermissions::AnyOfScoped {
                any_of,
                project_param,
            } => {
                let project = params
                    .get(project_param)
                    .map(|value| ProjectId::from(value.as_str()));
                snapshot.has_any_permission(any_of, project.as_ref())
            }
        }
    }

    /// Reads `requiredPermissions` metadata: a list of names, or
    /// `{ anyOf: [...], projectParam?: name }`.
    fn from_value(route: &str, value: Value) -> Result<Self> {
        let invalid = |message: String| RouteError::InvalidMeta {
            route: route.to_string(),
            message,
        };

        match value {
            Value::Sequence(items) => Ok(RequiredPermissions::Flat(string_list(items).ok_or_else(
                || invalid("requiredPermissions list must contain only strings".to_string()),
            )?)),
            Value::Mapping(map) => {
                let mut any_of = None;
                let mut project_param = None;
                for (key, value) in map {
                    match (key.as_str(), value) {
                        (Some("anyOf"), Value::Sequence(items)) => {
                            any_of = Some(string_list(items).ok_or_else(|| {
                                invalid("anyOf must contain only strings".to_string())
                            })?);
                        }
                        (Some("projectParam"), Value::String(param)) if !param.is_empty() => {
                            project_param = Some(param);
                        }
                        (Some(key), _) => {
                            return Err(invalid(format!("unexpected or malformed key '{}'", key)));
                        }
                        (None, _) => return Err(invalid("non-string key".to_string())),
                    }
                }
                let any_of = any_of.ok_or_else(|| invalid("missing anyOf".to_string()))?;
                Ok(RequiredPermissions::AnyOfScoped {
                    any_of,
                    project_param: project_param
                        .unwrap_or_else(|| DEFAULT_PROJECT_PARAM.to_string()),
                })
            }
            other => Err(invalid(format!(
                "expected a list of permission names or {{ anyOf: [...] }}, got {:?}",
                other
            ))),
        }
    }
}

fn string_list(items: Vec<Value>) -> Option<Vec<String>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::String(name) => Some(name),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    pub requires_auth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_permissions: Option<RequiredPermissions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDef {
    pub name: String,
    pub path: String,
    pub meta: RouteMeta,
}

impl RouteDef {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            meta: RouteMeta::default(),
        }
    }

    pub fn with_auth(mut self) -> Self {
        self.meta.requires_auth = true;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.meta.title = Some(title.into());
        self
    }

    pub fn with_permissions(mut self, required: RequiredPermissions) -> Self {
        self.meta.required_permissions = Some(required);
        self
    }
}

// On-disk shapes. Metadata stays loosely typed here and is checked in
// `RequiredPermissions::from_value`.

#[derive(Deserialize)]
struct RouteFile {
    routes: Vec<RawRoute>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRoute {
    name: String,
    path: String,
    #[serde(default)]
    meta: RawMeta,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawMeta {
    #[serde(default)]
    requires_auth: bool,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    required_permissions: Option<Value>,
}

impl RawRoute {
    fn into_def(self) -> Result<RouteDef> {
        let required_permissions = match self.meta.required_permissions {
            Some(value) => Some(RequiredPermissions::from_value(&self.name, value)?),
            None => None,
        };
        Ok(RouteDef {
            name: self.name,
            path: self.path,
            meta: RouteMeta {
                requires_auth: self.meta.requires_auth,
                title: self.meta.title,
                required_permissions,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    CatchAll,
}

#[derive(Debug, Clone)]
struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    fn parse(path: &str) -> Result<Self> {
        let invalid = |message: &str| RouteError::InvalidPath {
            path: path.to_string(),
            message: message.to_string(),
        };

        if !path.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let raw: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (i, segment) in raw.iter().enumerate() {
            if *segment == "*" {
                if i + 1 != raw.len() {
                    return Err(invalid("'*' is only allowed as the last segment"));
                }
                segments.push(Segment::CatchAll);
            } else if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(invalid("empty parameter name"));
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Static(segment.to_string()));
            }
        }
        Ok(Self { segments })
    }

    fn is_catch_all(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::CatchAll))
    }

    fn matches(&self, parts: &[&str]) -> Option<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::CatchAll => return Some(params),
                Segment::Static(expected) => {
                    if parts.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.insert(name.clone(), (*value).to_string());
                }
            }
        }
        (parts.len() == self.segments.len()).then_some(params)
    }
}

/// A resolved navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route: Arc<RouteDef>,
    pub params: BTreeMap<String, String>,
}

impl RouteMatch {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

struct Entry {
    def: Arc<RouteDef>,
    pattern: PathPattern,
}

/// The application's routes, validated up front.
pub struct RouteTable {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
}

impl RouteTable {
    /// Parses a YAML (or JSON) document with a top-level `routes` list.
    pub fn from_yaml(source: &str) -> Result<Self> {
        let file: RouteFile = serde_yaml::from_str(source)?;
        let defs = file
            .routes
            .into_iter()
            .map(RawRoute::into_def)
            .collect::<Result<Vec<_>>>()?;
        let table = Self::from_defs(defs)?;
        info!("Loaded {} routes", table.len());
        Ok(table)
    }

    pub fn from_defs(defs: Vec<RouteDef>) -> Result<Self> {
        let mut entries = Vec::with_capacity(defs.len());
        let mut by_name = HashMap::new();

        for def in defs {
            if by_name.contains_key(&def.name) {
                return Err(RouteError::DuplicateName(def.name));
            }
            let pattern = PathPattern::parse(&def.path)?;
            by_name.insert(def.name.clone(), entries.len());
            entries.push(Entry {
                def: Arc::new(def),
                pattern,
            });
        }

        Ok(Self { entries, by_name })
    }

    /// Finds the route for a location. Query string and fragment are ignored.
    ///
    /// Routes are tried in declaration order; catch-all routes only after
    /// every other route has failed to match.
    pub fn resolve(&self, location: &str) -> Option<RouteMatch> {
        let path = location
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default();
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let specific = self.entries.iter().filter(|e| !e.pattern.is_catch_all());
        let catch_all = self.entries.iter().filter(|e| e.pattern.is_catch_all());

        let found = specific.chain(catch_all).find_map(|entry| {
            entry.pattern.matches(&parts).map(|params| RouteMatch {
                route: entry.def.clone(),
                params,
            })
        });

        match &found {
            Some(m) => debug!(location, route = %m.route.name, "Resolved route"),
            None => debug!(location, "No route matches"),
        }
        found
    }

    pub fn get(&self, name: &str) -> Option<Arc<RouteDef>> {
        self.by_name
            .get(name)
            .map(|&index| self.entries[index].def.clone())
    }

    pub fn routes(&self) -> impl Iterator<Item = &RouteDef> {
        self.entries.iter().map(|entry| entry.def.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authz::{Permission, ProjectGrant, Role};
    use rstest::rstest;

    const TABLE: &str = r#"
routes:
  - name: login
    path: /login
  - name: system-config
    path: /system-config
    meta:
      requiresAuth: true
      title: System Configuration
      requiredPermissions: [system_config_company.view]
  - name: project-detail
    path: /projects/:projectId
    meta:
      requiresAuth: true
      requiredPermissions:
        anyOf: [project.view_member_any, project.view_member_own]
  - name: project-settings
    path: /p/:id/settings
    meta:
      requiredPermissions: { anyOf: [project.update_project], projectParam: id }
  - name: not-found
    path: /*
"#;

    #[test]
    fn test_parse_both_permission_shapes() {
        let table = RouteTable::from_yaml(TABLE).unwrap();
        assert_eq!(table.len(), 5);

        let system = table.get("system-config").unwrap();
        assert!(system.meta.requires_auth);
        assert_eq!(system.meta.title.as_deref(), Some("System Configuration"));
        assert_eq!(
            system.meta.required_permissions,
            Some(RequiredPermissions::flat(["system_config_company.view"]))
        );

        let detail = table.get("project-detail").unwrap();
        assert_eq!(
            detail.meta.required_permissions,
            Some(RequiredPermissions::any_of([
                "project.view_member_any",
                "project.view_member_own"
            ]))
        );

        let settings = table.get("project-settings").unwrap();
        assert!(matches!(
            &settings.meta.required_permissions,
            Some(RequiredPermissions::AnyOfScoped { project_param, .. }) if project_param == "id"
        ));
    }

    #[rstest]
    #[case::number("requiredPermissions: 5")]
    #[case::plain_string("requiredPermissions: project.view")]
    #[case::non_string_item("requiredPermissions: [project.view, 3]")]
    #[case::missing_any_of("requiredPermissions: { projectParam: id }")]
    #[case::unknown_key("requiredPermissions: { anyOf: [a], allOf: [b] }")]
    #[case::any_of_not_list("requiredPermissions: { anyOf: a }")]
    fn test_malformed_metadata_is_rejected(#[case] meta: &str) {
        let source = format!(
            "routes:\n  - name: broken\n    path: /broken\n    meta:\n      {}\n",
            meta
        );
        let err = RouteTable::from_yaml(&source).err().unwrap();
        assert!(
            matches!(&err, RouteError::InvalidMeta { route, .. } if route == "broken"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = RouteTable::from_defs(vec![
            RouteDef::new("home", "/"),
            RouteDef::new("home", "/home"),
        ])
        .err()
        .unwrap();
        assert!(matches!(err, RouteError::DuplicateName(name) if name == "home"));
    }

    #[rstest]
    #[case("relative")]
    #[case("/a/*/b")]
    #[case("/projects/:")]
    fn test_invalid_paths_rejected(#[case] path: &str) {
        let err = RouteTable::from_defs(vec![RouteDef::new("r", path)]).err().unwrap();
        assert!(matches!(err, RouteError::InvalidPath { .. }));
    }

    #[rstest]
    #[case("/login", "login")]
    #[case("/login?next=/projects", "login")]
    #[case("/system-config/", "system-config")]
    #[case("/projects/42", "project-detail")]
    #[case("/p/7/settings#members", "project-settings")]
    #[case("/projects", "not-found")]
    #[case("/projects/42/extra", "not-found")]
    #[case("/", "not-found")]
    fn test_resolve(#[case] location: &str, #[case] expected: &str) {
        let table = RouteTable::from_yaml(TABLE).unwrap();
        let matched = table.resolve(location).unwrap();
        assert_eq!(matched.route.name, expected);
    }

    #[test]
    fn test_resolve_captures_params() {
        let table = RouteTable::from_yaml(TABLE).unwrap();
        let matched = table.resolve("/projects/42").unwrap();
        assert_eq!(matched.param("projectId"), Some("42"));
    }

    #[test]
    fn test_catch_all_declared_first_does_not_shadow() {
        let table = RouteTable::from_defs(vec![
            RouteDef::new("not-found", "/*"),
            RouteDef::new("home", "/"),
        ])
        .unwrap();
        assert_eq!(table.resolve("/").unwrap().route.name, "home");
        assert_eq!(table.resolve("/nope").unwrap().route.name, "not-found");
    }

    #[test]
    fn test_no_match_without_catch_all() {
        let table = RouteTable::from_defs(vec![RouteDef::new("home", "/")]).unwrap();
        assert!(table.resolve("/elsewhere").is_none());
    }

    fn snapshot() -> PermissionSnapshot {
        PermissionSnapshot::new(
            vec![Role::new(1, "Auditor", vec![Permission::new(1, "report.view")])],
            vec![ProjectGrant::new(42, ["project.view_member_own"], vec![])],
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_flat_requirement_is_global_any_of() {
        let params = BTreeMap::new();
        let snapshot = snapshot();
        assert!(RequiredPermissions::flat(["x", "report.view"]).is_satisfied_by(&snapshot, &params));
        // project-only grants still count through the union of names
        assert!(RequiredPermissions::flat(["project.view_member_own"]).is_satisfied_by(&snapshot, &params));
        assert!(!RequiredPermissions::flat(["x"]).is_satisfied_by(&snapshot, &params));
    }

    #[test]
    fn test_empty_flat_list_never_grants() {
        let required = RequiredPermissions::Flat(vec![]);
        assert!(!required.is_satisfied_by(&snapshot(), &BTreeMap::new()));
    }

    #[test]
    fn test_scoped_requirement_uses_route_param() {
        let required = RequiredPermissions::any_of(["project.view_member_own"]);
        let snapshot = snapshot();

        let in_42 = BTreeMap::from([("projectId".to_string(), "42".to_string())]);
        let in_7 = BTreeMap::from([("projectId".to_string(), "7".to_string())]);

        assert!(required.is_satisfied_by(&snapshot, &in_42));
        assert!(!required.is_satisfied_by(&snapshot, &in_7));
        // no param: checked globally
        assert!(required.is_satisfied_by(&snapshot, &BTreeMap::new()));
    }

    #[test]
    fn test_serializes_back_to_metadata_shape() {
        let value = serde_json::to_value(RequiredPermissions::any_of(["a"])).unwrap();
        assert_eq!(value, serde_json::json!({ "anyOf": ["a"], "projectParam": "projectId" }));

        let value = serde_json::to_value(RequiredPermissions::flat(["a", "b"])).unwrap();
        assert_eq!(value, serde_json::json!(["a", "b"]));
    }
}
