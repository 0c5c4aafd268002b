//! Custom CEL functions for authorization
//!
//! The helpers work on JSON values so they can be reused outside CEL;
//! [`register`] binds them into a `cel_interpreter::Context`. String and
//! list methods (`contains`, `startsWith`, `endsWith`, `matches`, `size`)
//! and `has()` come with the interpreter's default context.

use cel_interpreter::objects::Value as CelValue;
use cel_interpreter::{Context, ExecutionError, FunctionContext};
use serde_json::Value;

use crate::cel::convert::cel_to_json;
use crate::cel::error::{CelError, Result};

/// Register `hasRole`, `isOwner` and `inList`
pub fn register(context: &mut Context) {
    context.add_function("hasRole", cel_has_role);
    context.add_function("isOwner", cel_is_owner);
    context.add_function("inList", cel_in_list);
}

fn cel_has_role(
    ftx: &FunctionContext,
    principal: CelValue,
    role: CelValue,
) -> std::result::Result<CelValue, ExecutionError> {
    has_role(&cel_to_json(&principal), &cel_to_json(&role))
        .map(CelValue::Bool)
        .map_err(|e| ftx.error(e.to_string()))
}

fn cel_is_owner(
    ftx: &FunctionContext,
    principal: CelValue,
    resource: CelValue,
) -> std::result::Result<CelValue, ExecutionError> {
    is_owner(&cel_to_json(&principal), &cel_to_json(&resource))
        .map(CelValue::Bool)
        .map_err(|e| ftx.error(e.to_string()))
}

fn cel_in_list(
    ftx: &FunctionContext,
    value: CelValue,
    list: CelValue,
) -> std::result::Result<CelValue, ExecutionError> {
    in_list(&cel_to_json(&value), &cel_to_json(&list))
        .map(CelValue::Bool)
        .map_err(|e| ftx.error(e.to_string()))
}

/// Check if a principal has a specific role
///
/// # Example
/// ```cel
/// hasRole(principal, "admin")
/// hasRole(P, "editor")
/// ```
pub fn has_role(principal: &Value, role: &Value) -> Result<bool> {
    let principal_obj = principal
        .as_object()
        .ok_or_else(|| CelError::TypeConversionError("principal must be an object".to_string()))?;

    let role_str = role
        .as_str()
        .ok_or_else(|| CelError::TypeConversionError("role must be a string".to_string()))?;

    Ok(principal_obj
        .get("roles")
        .and_then(Value::as_array)
        .map(|roles| roles.iter().any(|r| r.as_str() == Some(role_str)))
        .unwrap_or(false))
}

/// Check if a principal owns a resource (`resource.attributes.ownerId`)
///
/// # Example
/// ```cel
/// isOwner(principal, resource)
/// isOwner(P, R)
/// ```
pub fn is_owner(principal: &Value, resource: &Value) -> Result<bool> {
    let principal_obj = principal
        .as_object()
        .ok_or_else(|| CelError::TypeConversionError("principal must be an object".to_string()))?;

    let resource_obj = resource
        .as_object()
        .ok_or_else(|| CelError::TypeConversionError("resource must be an object".to_string()))?;

    let principal_id = principal_obj
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| CelError::FunctionError("principal.id not found or not a string".to_string()))?;

    let owner_id = ["attributes", "attr"]
        .iter()
        .filter_map(|key| resource_obj.get(*key))
        .filter_map(|attrs| attrs.get("ownerId"))
        .find_map(Value::as_str);

    Ok(owner_id == Some(principal_id))
}

/// Check if a value is in a list
///
/// # Example
/// ```cel
/// inList(resource.attributes.department, principal.attributes.departments)
/// ```
pub fn in_list(value: &Value, list: &Value) -> Result<bool> {
    let list_arr = list
        .as_array()
        .ok_or_else(|| CelError::TypeConversionError("list must be an array".to_string()))?;

    Ok(list_arr.iter().any(|item| item == value))
}
