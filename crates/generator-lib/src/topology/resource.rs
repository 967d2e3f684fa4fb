use super::pickable::{default_weight, is_default_weight, Pickable};
use super::tags::{insert_tags, TagMap};
use crate::error::ConfigError;
use crate::flags::FlagGate;
use crate::kubernetes::KubernetesConfig;
use crate::models::Attributes;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Weighted group of resource attributes, optionally backed by a simulated
/// Kubernetes deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAttributeSet {
    #[serde(default = "default_weight", skip_serializing_if = "is_default_weight")]
    pub weight: f64,

    #[serde(default, skip_serializing_if = "TagMap::is_empty")]
    pub resource_attrs: TagMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesConfig>,

    #[serde(flatten)]
    pub gate: FlagGate,

    /// Key of this set's pod pool, assigned at load
    #[serde(skip)]
    pub(crate) pool_key: String,
}

impl Default for ResourceAttributeSet {
    fn default() -> Self {
        Self {
            weight: default_weight(),
            resource_attrs: TagMap::new(),
            kubernetes: None,
            gate: FlagGate::default(),
            pool_key: String::new(),
        }
    }
}

impl ResourceAttributeSet {
    pub(crate) fn load(&mut self, pool_key: &str) -> Result<(), ConfigError> {
        self.pool_key = pool_key.to_string();
        if let Some(kubernetes) = &mut self.kubernetes {
            kubernetes.load(pool_key)?;
        }
        Ok(())
    }

    /// Identifies the pod pool created for this set, if it has one
    pub fn pool_key(&self) -> Option<&str> {
        self.kubernetes.as_ref().map(|_| self.pool_key.as_str())
    }

    /// Configured attributes, without any pod identity
    pub fn attributes<R: Rng + ?Sized>(&self, rng: &mut R) -> Attributes {
        let mut attrs = Attributes::new();
        insert_tags(&self.resource_attrs, &mut attrs, rng);
        attrs
    }
}

impl Pickable for ResourceAttributeSet {
    fn weight(&self) -> f64 {
        self.weight
    }

    fn gate(&self) -> &FlagGate {
        &self.gate
    }
}
