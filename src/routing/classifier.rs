//! API vs. asset classification.
//!
//! # Design Decisions
//! - Plain prefix match on the path, case-sensitive
//! - No regex, no state: same input always gives the same answer
//! - The query string plays no part

/// Where a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Handled by the local application router.
    Local,
    /// Forwarded to the asset dev server.
    Proxy,
}

/// Classify `path` against `api_prefix`.
pub fn classify(path: &str, api_prefix: &str) -> Route {
    if path.starts_with(api_prefix) {
        Route::Local
    } else {
        Route::Proxy
    }
}

/// [`classify`] bound to a configured prefix.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    api_prefix: String,
}

impl PathClassifier {
    pub fn new(api_prefix: impl Into<String>) -> Self {
        Self {
            api_prefix: api_prefix.into(),
        }
    }

    pub fn classify(&self, path: &str) -> Route {
        classify(path, &self.api_prefix)
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_paths_stay_local() {
        let classifier = PathClassifier::new("/api");
        assert_eq!(classifier.classify("/api"), Route::Local);
        assert_eq!(classifier.classify("/api/users/1"), Route::Local);
    }

    #[test]
    fn test_everything_else_is_proxied() {
        let classifier = PathClassifier::new("/api");
        assert_eq!(classifier.classify("/"), Route::Proxy);
        assert_eq!(classifier.classify("/assets/app.js"), Route::Proxy);
        assert_eq!(classifier.classify("/@vite/client"), Route::Proxy);
        assert_eq!(classifier.classify("/ws"), Route::Proxy);
    }

    #[test]
    fn test_match_is_case_sensitive() {
        assert_eq!(classify("/API/users", "/api"), Route::Proxy);
    }

    #[test]
    fn test_prefix_is_literal() {
        // Prefix semantics, not path-segment semantics.
        assert_eq!(classify("/apidocs", "/api"), Route::Local);
        assert_eq!(classify("/apidocs", "/api/"), Route::Proxy);
    }
}
