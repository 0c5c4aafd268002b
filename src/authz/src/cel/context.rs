//! Evaluation context for CEL expressions

use crate::types::{Attributes, Principal, Resource};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Context containing all variables available during CEL evaluation
///
/// Variables and their aliases:
///
/// | variable    | alias        | contents                             |
/// |-------------|--------------|--------------------------------------|
/// | `principal` | `P`          | `id`, `roles`, `attributes` (`attr`) |
/// | `resource`  | `R`          | `kind`, `id`, `attributes` (`attr`)  |
/// | `auxData`   | `A`, `aux`   | per-request auxiliary data           |
/// | `request`   |              | `{principal, resource, auxData}`     |
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalContext {
    /// Principal object
    pub principal: Map<String, Value>,

    /// Resource object
    pub resource: Map<String, Value>,

    /// Auxiliary request data
    pub aux_data: Map<String, Value>,
}

impl EvalContext {
    /// Create a new evaluation context
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the context for one check request
    pub fn for_request(
        principal: &Principal,
        resource: &Resource,
        aux_data: Option<&Attributes>,
    ) -> Self {
        let mut principal_map = Map::new();
        principal_map.insert("id".to_string(), json!(principal.id));
        principal_map.insert("roles".to_string(), json!(principal.roles));
        principal_map.insert("attributes".to_string(), to_object(&principal.attributes));

        let mut resource_map = Map::new();
        resource_map.insert("kind".to_string(), json!(resource.kind));
        resource_map.insert("id".to_string(), json!(resource.id));
        resource_map.insert("attributes".to_string(), to_object(&resource.attributes));

        let aux_map = aux_data
            .map(|aux| aux.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Self {
            principal: principal_map,
            resource: resource_map,
            aux_data: aux_map,
        }
    }

    /// Create context with principal attributes
    pub fn with_principal(mut self, principal: HashMap<String, Value>) -> Self {
        self.principal = principal.into_iter().collect();
        self
    }

    /// Create context with resource attributes
    pub fn with_resource(mut self, resource: HashMap<String, Value>) -> Self {
        self.resource = resource.into_iter().collect();
        self
    }

    /// Create context with auxiliary data
    pub fn with_aux_data(mut self, aux_data: HashMap<String, Value>) -> Self {
        self.aux_data = aux_data.into_iter().collect();
        self
    }

    /// Get all variables, aliases included, for CEL evaluation
    pub fn to_variables(&self) -> HashMap<String, Value> {
        let principal = Value::Object(with_attr_alias(&self.principal));
        let resource = Value::Object(with_attr_alias(&self.resource));
        let aux_data = Value::Object(self.aux_data.clone());

        let request = json!({
            "principal": principal,
            "resource": resource,
            "auxData": aux_data,
        });

        let mut vars = HashMap::with_capacity(8);
        vars.insert("P".to_string(), principal.clone());
        vars.insert("principal".to_string(), principal);
        vars.insert("R".to_string(), resource.clone());
        vars.insert("resource".to_string(), resource);
        vars.insert("A".to_string(), aux_data.clone());
        vars.insert("aux".to_string(), aux_data.clone());
        vars.insert("auxData".to_string(), aux_data);
        vars.insert("request".to_string(), request);
        vars
    }
}

/// `attr` is accepted as shorthand for `attributes`
fn with_attr_alias(object: &Map<String, Value>) -> Map<String, Value> {
    let mut object = object.clone();
    if let Some(attributes) = object.get("attributes").cloned() {
        object.entry("attr").or_insert(attributes);
    }
    object
}

fn to_object(attributes: &Attributes) -> Value {
    Value::Object(
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}
