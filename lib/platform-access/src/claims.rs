//! Mapping from raw provider claims to the internal [`UserProfile`].
//!
//! The mapper is total over everything except the subject: a missing or
//! empty `sub` aborts, every other claim degrades to an empty string or
//! empty sequence when absent or of the wrong shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;
use crate::user::{OrgMembership, RbacRole, UserOrg, UserProfile};

/// Raw identity claims as returned by the provider's userinfo endpoint.
///
/// The array-valued claims are kept as raw JSON so that an unexpected
/// shape degrades to an empty sequence instead of a deserialization
/// failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub nhsid_nrbac_roles: Option<Value>,
    #[serde(default)]
    pub nhsid_org_memberships: Option<Value>,
    #[serde(default)]
    pub nhsid_user_orgs: Option<Value>,
}

/// Maps raw provider claims into the internal profile.
///
/// # Errors
///
/// Returns `SchemaError` if the subject claim is absent or the mapped
/// profile fails validation. No other claim shape can fail.
pub fn map_profile(claims: &ProviderClaims) -> Result<UserProfile, SchemaError> {
    let uid = claims
        .sub
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(SchemaError::MissingSubject)?
        .to_string();

    let rbac_roles = map_roles(&claims.nhsid_nrbac_roles);
    let selected_role_id = rbac_roles
        .first()
        .map(|role| role.person_role_id.clone())
        .unwrap_or_default();

    let profile = UserProfile {
        uid,
        selected_role_id,
        display_name: display_name(claims),
        rbac_roles,
        org_memberships: map_org_memberships(&claims.nhsid_org_memberships),
        user_orgs: map_user_orgs(&claims.nhsid_user_orgs),
    };
    profile.validate()?;
    Ok(profile)
}

fn map_roles(value: &Option<Value>) -> Vec<RbacRole> {
    array_items(value)
        .iter()
        .map(|role| RbacRole {
            person_org_id: str_field(role, "person_orgid"),
            person_role_id: str_field(role, "person_roleid"),
            org_code: str_field(role, "org_code"),
            role_name: str_field(role, "role_name"),
        })
        .collect()
}

fn map_org_memberships(value: &Option<Value>) -> Vec<OrgMembership> {
    array_items(value)
        .iter()
        .map(|org| OrgMembership {
            person_org_id: str_field(org, "person_orgid"),
            org_name: str_field(org, "org_name"),
            org_code: str_field(org, "org_code"),
        })
        .collect()
}

fn map_user_orgs(value: &Option<Value>) -> Vec<UserOrg> {
    array_items(value)
        .iter()
        .map(|org| UserOrg {
            org_code: str_field(org, "org_code"),
            org_name: str_field(org, "org_name"),
        })
        .collect()
}

/// Display name, by preference: the `name` claim when non-empty, then
/// `given_name family_name` trimmed, then empty.
fn display_name(claims: &ProviderClaims) -> String {
    if let Some(name) = claims.name.as_deref() {
        if !name.is_empty() {
            return name.to_string();
        }
    }
    let given = claims.given_name.as_deref().unwrap_or_default();
    let family = claims.family_name.as_deref().unwrap_or_default();
    format!("{given} {family}").trim().to_string()
}

fn array_items(value: &Option<Value>) -> &[Value] {
    value
        .as_ref()
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn str_field(object: &Value, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims_from(value: Value) -> ProviderClaims {
        serde_json::from_value(value).expect("deserialize claims")
    }

    #[test]
    fn maps_full_claims() {
        let claims = claims_from(json!({
            "sub": "user-123",
            "name": "Test User",
            "email": "test@example.com",
            "given_name": "Test",
            "family_name": "User",
            "nhsid_nrbac_roles": [
                {
                    "person_orgid": "org-1",
                    "person_roleid": "role-1",
                    "org_code": "ORG001",
                    "role_name": "Admin",
                }
            ],
            "nhsid_org_memberships": [
                {
                    "person_orgid": "org-1",
                    "org_name": "Test Organisation",
                    "org_code": "ORG001",
                }
            ],
            "nhsid_user_orgs": [
                { "org_code": "ORG001", "org_name": "Test Organisation" }
            ],
        }));

        let profile = map_profile(&claims).expect("map");

        assert_eq!(profile.uid, "user-123");
        assert_eq!(profile.selected_role_id, "role-1");
        assert_eq!(profile.display_name, "Test User");
        assert_eq!(profile.rbac_roles.len(), 1);
        assert_eq!(profile.rbac_roles[0].org_code, "ORG001");
        assert_eq!(profile.org_memberships.len(), 1);
        assert_eq!(profile.org_memberships[0].org_name, "Test Organisation");
        assert_eq!(profile.user_orgs.len(), 1);
    }

    #[test]
    fn missing_subject_is_a_schema_violation() {
        let claims = claims_from(json!({ "name": "No Subject" }));
        assert_eq!(map_profile(&claims), Err(SchemaError::MissingSubject));

        let empty = claims_from(json!({ "sub": "" }));
        assert_eq!(map_profile(&empty), Err(SchemaError::MissingSubject));
    }

    #[test]
    fn absent_arrays_yield_empty_sequences() {
        let claims = claims_from(json!({ "sub": "user-123" }));
        let profile = map_profile(&claims).expect("map");

        assert!(profile.rbac_roles.is_empty());
        assert!(profile.org_memberships.is_empty());
        assert!(profile.user_orgs.is_empty());
        assert_eq!(profile.selected_role_id, "");
        assert_eq!(profile.display_name, "");
    }

    #[test]
    fn non_array_role_claim_yields_empty_sequence() {
        let claims = claims_from(json!({
            "sub": "user-123",
            "nhsid_nrbac_roles": "not-an-array",
            "nhsid_org_memberships": 42,
            "nhsid_user_orgs": { "org_code": "ORG001" },
        }));
        let profile = map_profile(&claims).expect("map");

        assert!(profile.rbac_roles.is_empty());
        assert!(profile.org_memberships.is_empty());
        assert!(profile.user_orgs.is_empty());
    }

    #[test]
    fn role_fields_default_to_empty_strings() {
        let claims = claims_from(json!({
            "sub": "user-123",
            "nhsid_nrbac_roles": [{ "person_roleid": "role-1" }, {}],
        }));
        let profile = map_profile(&claims).expect("map");

        assert_eq!(profile.rbac_roles.len(), 2);
        assert_eq!(profile.rbac_roles[0].person_role_id, "role-1");
        assert_eq!(profile.rbac_roles[0].person_org_id, "");
        assert_eq!(profile.rbac_roles[1].person_role_id, "");
        assert_eq!(profile.selected_role_id, "role-1");
    }

    #[test]
    fn first_role_selects_the_role_id() {
        let claims = claims_from(json!({
            "sub": "user-123",
            "nhsid_nrbac_roles": [
                { "person_roleid": "role-1" },
                { "person_roleid": "role-2" },
            ],
        }));
        let profile = map_profile(&claims).expect("map");

        assert_eq!(profile.selected_role_id, "role-1");
        assert_eq!(profile.rbac_roles.len(), 2);
        assert_eq!(profile.rbac_roles[1].person_role_id, "role-2");
    }

    #[test]
    fn display_name_falls_back_to_given_and_family() {
        let claims = claims_from(json!({
            "sub": "user-123",
            "name": "",
            "given_name": "John",
            "family_name": "Doe",
        }));
        assert_eq!(map_profile(&claims).expect("map").display_name, "John Doe");
    }

    #[test]
    fn display_name_uses_name_when_present() {
        let claims = claims_from(json!({ "sub": "user-123", "name": "Jane" }));
        assert_eq!(map_profile(&claims).expect("map").display_name, "Jane");
    }

    #[test]
    fn display_name_handles_partial_names() {
        let given_only = claims_from(json!({ "sub": "user-123", "given_name": "John" }));
        assert_eq!(map_profile(&given_only).expect("map").display_name, "John");

        let family_only = claims_from(json!({ "sub": "user-123", "family_name": "Doe" }));
        assert_eq!(map_profile(&family_only).expect("map").display_name, "Doe");
    }

    #[test]
    fn display_name_empty_when_all_absent() {
        let claims = claims_from(json!({ "sub": "user-123" }));
        assert_eq!(map_profile(&claims).expect("map").display_name, "");
    }
}
