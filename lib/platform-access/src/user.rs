//! Internal user profile mapped from provider identity claims.
//!
//! The profile is the authorization-facing view of an authenticated user:
//! a stable `uid`, a display name, and the role/organisation bindings used
//! for downstream access decisions. It is produced exclusively by the
//! claims mapper and validated before being attached to a session record.

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// A role-organisation binding used for downstream authorisation decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RbacRole {
    #[serde(rename = "personOrgID")]
    pub person_org_id: String,
    #[serde(rename = "personRoleID")]
    pub person_role_id: String,
    pub org_code: String,
    pub role_name: String,
}

/// An organisation the user is a member of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgMembership {
    #[serde(rename = "personOrgID")]
    pub person_org_id: String,
    pub org_name: String,
    pub org_code: String,
}

/// An organisation the user can act on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOrg {
    pub org_code: String,
    pub org_name: String,
}

/// Internal profile of an authenticated user.
///
/// A session record owns at most one profile, attached exactly once by a
/// successful callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// The provider's subject claim.
    pub uid: String,
    /// The role selected at login time. First role by provider order,
    /// empty when the user has no roles.
    #[serde(rename = "selectedRoleID")]
    pub selected_role_id: String,
    pub display_name: String,
    /// Role bindings, unique by `person_role_id`.
    pub rbac_roles: Vec<RbacRole>,
    pub org_memberships: Vec<OrgMembership>,
    pub user_orgs: Vec<UserOrg>,
}

impl UserProfile {
    /// Validates the profile against the internal schema.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::InvalidProfile` if the `uid` is empty.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.uid.is_empty() {
            return Err(SchemaError::InvalidProfile {
                reason: "uid is empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> UserProfile {
        UserProfile {
            uid: "user-123".to_string(),
            selected_role_id: "role-1".to_string(),
            display_name: "Test User".to_string(),
            rbac_roles: vec![RbacRole {
                person_org_id: "org-1".to_string(),
                person_role_id: "role-1".to_string(),
                org_code: "ORG001".to_string(),
                role_name: "Admin".to_string(),
            }],
            org_memberships: vec![OrgMembership {
                person_org_id: "org-1".to_string(),
                org_name: "Test Organisation".to_string(),
                org_code: "ORG001".to_string(),
            }],
            user_orgs: vec![UserOrg {
                org_code: "ORG001".to_string(),
                org_name: "Test Organisation".to_string(),
            }],
        }
    }

    #[test]
    fn valid_profile_passes_validation() {
        assert!(sample_profile().validate().is_ok());
    }

    #[test]
    fn empty_uid_fails_validation() {
        let mut profile = sample_profile();
        profile.uid = String::new();
        assert!(matches!(
            profile.validate(),
            Err(SchemaError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn profile_serializes_with_wire_field_names() {
        let json = serde_json::to_value(sample_profile()).expect("serialize");

        assert_eq!(json["uid"], "user-123");
        assert_eq!(json["selectedRoleID"], "role-1");
        assert_eq!(json["displayName"], "Test User");
        assert_eq!(json["rbacRoles"][0]["personOrgID"], "org-1");
        assert_eq!(json["rbacRoles"][0]["personRoleID"], "role-1");
        assert_eq!(json["rbacRoles"][0]["orgCode"], "ORG001");
        assert_eq!(json["rbacRoles"][0]["roleName"], "Admin");
        assert_eq!(json["orgMemberships"][0]["orgName"], "Test Organisation");
        assert_eq!(json["userOrgs"][0]["orgCode"], "ORG001");
    }

    #[test]
    fn profile_serialization_roundtrip() {
        let profile = sample_profile();
        let json = serde_json::to_string(&profile).expect("serialize");
        let parsed: UserProfile = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(profile, parsed);
    }
}
