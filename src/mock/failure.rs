//! Failure injection for the mock service
//!
//! Supports configurable failure injection for testing error paths.

use std::collections::HashMap;

/// Request kinds the mock service distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockRoute {
    Analyze,
    Classify,
    BuildClassifier,
    GetOperation,
    ListClassifiers,
    GetClassifier,
    ContainerExists,
    CreateContainer,
    PutBlob,
    ListBlobs,
}

impl MockRoute {
    /// Routes served by the storage side (XML errors)
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            MockRoute::ContainerExists
                | MockRoute::CreateContainer
                | MockRoute::PutBlob
                | MockRoute::ListBlobs
        )
    }
}

/// Failure configuration for a route
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// HTTP status to answer with
    pub status: u16,
    /// Service error code
    pub error_code: String,
    /// Service error message
    pub error_message: String,
    /// Inner error code and message
    pub inner: Option<(String, String)>,
    /// Fail at the transport level instead of answering
    pub transport: bool,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Answer with an HTTP error
    pub fn error(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_code: code.into(),
            error_message: message.into(),
            inner: None,
            transport: false,
            fail_count: None,
        }
    }

    /// Drop the connection
    pub fn transport() -> Self {
        Self {
            transport: true,
            ..Self::error(0, "", "")
        }
    }

    /// Attach an inner error
    pub fn with_inner(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.inner = Some((code.into(), message.into()));
        self
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Failure injector for the mock service
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<MockRoute, FailureConfig>,
    call_counts: HashMap<MockRoute, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for a route
    pub fn inject(&mut self, route: MockRoute, config: FailureConfig) {
        self.configs.insert(route, config);
        self.call_counts.insert(route, 0);
    }

    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    pub fn clear_route(&mut self, route: MockRoute) {
        self.configs.remove(&route);
        self.call_counts.remove(&route);
    }

    /// The failure to apply to this call of `route`, if any
    pub fn check(&mut self, route: MockRoute) -> Option<FailureConfig> {
        let config = self.configs.get(&route)?;
        let count = self.call_counts.entry(route).or_insert(0);
        *count += 1;

        if let Some(limit) = config.fail_count {
            if *count > limit {
                return None;
            }
        }
        Some(config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injector_basic() {
        let mut injector = FailureInjector::new();
        assert!(injector.check(MockRoute::Analyze).is_none());

        injector.inject(MockRoute::Analyze, FailureConfig::error(400, "InvalidRequest", "bad"));

        let config = injector.check(MockRoute::Analyze).unwrap();
        assert_eq!(config.status, 400);
        assert_eq!(config.error_code, "InvalidRequest");
        assert!(injector.check(MockRoute::Classify).is_none());
    }

    #[test]
    fn test_injector_fail_count() {
        let mut injector = FailureInjector::new();
        injector.inject(MockRoute::GetOperation, FailureConfig::transport().with_fail_count(2));

        assert!(injector.check(MockRoute::GetOperation).unwrap().transport);
        assert!(injector.check(MockRoute::GetOperation).is_some());
        assert!(injector.check(MockRoute::GetOperation).is_none());
    }

    #[test]
    fn test_injector_clear_route() {
        let mut injector = FailureInjector::new();
        injector.inject(MockRoute::PutBlob, FailureConfig::error(500, "InternalError", "x"));
        injector.clear_route(MockRoute::PutBlob);
        assert!(injector.check(MockRoute::PutBlob).is_none());
    }

    #[test]
    fn test_storage_routes() {
        assert!(MockRoute::PutBlob.is_storage());
        assert!(!MockRoute::BuildClassifier.is_storage());
    }
}
