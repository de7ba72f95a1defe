//! Declarative route table loaded from YAML

use http::Method;
use log::{info, warn};
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("failed to read route file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse route file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("route '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Credential a route requires before the proxy hop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    None,
    #[serde(rename = "oauth")]
    OAuth,
    #[serde(rename = "oauth_application")]
    OAuthApplication,
}

/// One route entry
#[derive(Debug, Clone, Deserialize)]
pub struct Route {
    pub name: String,
    /// Path prefix, matched on segment boundaries
    pub path: String,
    /// Base URL requests are forwarded to
    pub upstream: String,
    #[serde(default)]
    pub auth: AuthMode,
    /// Space-delimited scopes, all of which the bearer token must carry
    #[serde(default)]
    pub scope: Option<String>,
    /// Allowed methods; any method when absent
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    /// Drop the matched prefix before forwarding
    #[serde(default)]
    pub strip_prefix: bool,
}

impl Route {
    fn validate(&mut self) -> Result<(), RouteError> {
        let invalid = |reason: String| RouteError::Invalid {
            name: self.name.clone(),
            reason,
        };
        if !self.path.starts_with('/') {
            return Err(invalid(format!("path '{}' must start with '/'", self.path)));
        }
        if let Err(e) = Url::parse(&self.upstream) {
            return Err(invalid(format!("invalid upstream '{}': {e}", self.upstream)));
        }
        if let Some(methods) = &self.methods {
            for method in methods {
                if Method::from_bytes(method.to_uppercase().as_bytes()).is_err() {
                    return Err(invalid(format!("invalid method '{method}'")));
                }
            }
        }
        if self.path.len() > 1 {
            self.path = self.path.trim_end_matches('/').to_string();
        }
        Ok(())
    }

    /// Whether `path` equals the route path or continues it with a new segment
    fn matches_path(&self, path: &str) -> bool {
        if self.path == "/" {
            return true;
        }
        match path.strip_prefix(self.path.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    fn allows(&self, method: &Method) -> bool {
        match &self.methods {
            Some(methods) => methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(method.as_str())),
            None => true,
        }
    }

    /// Upstream URL for a request path and optional query
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        let forwarded = if self.strip_prefix && self.path != "/" {
            path.strip_prefix(self.path.as_str()).unwrap_or(path)
        } else {
            path
        };
        let mut url = format!(
            "{}/{}",
            self.upstream.trim_end_matches('/'),
            forwarded.trim_start_matches('/')
        );
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

/// Whether `path` has a `.` or `..` segment, literal or percent-encoded.
///
/// The upstream URL parser resolves these segments, so a path carrying one could match one
/// route here and reach the upstream as another.
pub fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

#[derive(Debug, Deserialize)]
struct RouteFile {
    #[serde(default)]
    routes: Vec<Route>,
}

/// Route table, immutable once loaded
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Result<Self, RouteError> {
        let routes = routes
            .into_iter()
            .map(|mut route| route.validate().map(|_| Arc::new(route)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, RouteError> {
        let file: RouteFile = serde_yaml::from_str(contents)?;
        Self::new(file.routes)
    }

    /// Loads the route file. A missing file yields an empty table; an unreadable or invalid
    /// one is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RouteError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Route file {} not found, no routes will be proxied",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| RouteError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_yaml(&contents)?;
        info!(
            "Loaded {} route(s) from {}",
            table.routes.len(),
            path.display()
        );
        Ok(table)
    }

    /// Longest route path that matches `path` and allows `method`
    pub fn find(&self, method: &Method, path: &str) -> Option<Arc<Route>> {
        self.routes
            .iter()
            .filter(|route| route.matches_path(path) && route.allows(method))
            .max_by_key(|route| route.path.len())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
