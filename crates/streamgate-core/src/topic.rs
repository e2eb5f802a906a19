//! Topic identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a target topic on the broker.
///
/// Used as the handle cache key; equality and hashing cover all three parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicKey {
    tenant: String,
    namespace: String,
    topic: String,
}

impl TopicKey {
    pub fn new(
        tenant: impl Into<String>,
        namespace: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            namespace: namespace.into(),
            topic: topic.into(),
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Same tenant and namespace, topic name suffixed with `_{index}`.
    pub fn with_partition_suffix(&self, index: u64) -> Self {
        Self {
            tenant: self.tenant.clone(),
            namespace: self.namespace.clone(),
            topic: format!("{}_{}", self.topic, index),
        }
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant, self.namespace, self.topic)
    }
}
