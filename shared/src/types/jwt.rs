use std::fmt;

use serde::{Deserialize, Serialize};

/// Role carried in the session token.
///
/// Anything the issuer sends that is not `admin` or `student` is kept
/// verbatim in `Other` so the decision engine can tell "wrong role" apart
/// from "no role it understands".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Student,
    Other(String),
}

impl Default for Role {
    fn default() -> Self {
        Role::Other(String::new())
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "admin" => Role::Admin,
            "student" => Role::Student,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => "admin".to_string(),
            Role::Student => "student".to_string(),
            Role::Other(s) => s,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Student => write!(f, "student"),
            Role::Other(s) if s.is_empty() => write!(f, "<none>"),
            Role::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Claims embedded in every session token.
///
/// The token is issued by the external authentication API at login or OTP
/// verification. Only the fields below are read; unknown fields are ignored.
///
/// # Identifier and flag spellings
/// Issuers send the user id as `userId`, `user_id` or `id`, often more than
/// one at once, and the master flag as `isMaster` or `is_master`. Any
/// combination decodes; when several are present the camel-case key wins.
/// Tokens are always written camel-case.
///
/// # Expiry
/// `exp` is epoch seconds. A token is expired when `exp < now`; a token whose
/// `exp` equals the current second is still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ClaimsWire")]
pub struct Claims {
    /// Issuer-side user identifier.
    #[serde(rename = "userId")]
    pub user_id: String,

    /// `admin` or `student`; absent decodes to an empty `Other`.
    pub role: Role,

    /// Super-admin flag. Only meaningful for admins.
    #[serde(rename = "isMaster")]
    pub is_master: bool,

    /// Standard JWT expiry (Unix timestamp, seconds).
    pub exp: i64,

    /// Issued-at (Unix timestamp, seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// User ids arrive as strings or bare numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl From<WireId> for String {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Text(s) => s,
            WireId::Number(n) => n.to_string(),
        }
    }
}

/// Every accepted spelling in its own slot, so no two keys collide.
#[derive(Deserialize)]
struct ClaimsWire {
    #[serde(rename = "userId", default)]
    user_id_camel: Option<WireId>,
    #[serde(default)]
    user_id: Option<WireId>,
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default)]
    role: Role,
    #[serde(rename = "isMaster", default)]
    is_master_camel: Option<bool>,
    #[serde(default)]
    is_master: Option<bool>,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
}

impl From<ClaimsWire> for Claims {
    fn from(wire: ClaimsWire) -> Self {
        Self {
            user_id: wire
                .user_id_camel
                .or(wire.user_id)
                .or(wire.id)
                .map(String::from)
                .unwrap_or_default(),
            role: wire.role,
            is_master: wire.is_master_camel.or(wire.is_master).unwrap_or(false),
            exp: wire.exp,
            iat: wire.iat,
        }
    }
}

impl Claims {
    pub fn new(user_id: impl Into<String>, role: Role, exp: i64) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            is_master: false,
            exp,
            iat: None,
        }
    }

    pub fn with_master(mut self, is_master: bool) -> Self {
        self.is_master = is_master;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_known_values() {
        assert_eq!(Role::from("admin".to_string()), Role::Admin);
        assert_eq!(Role::from("student".to_string()), Role::Student);
        assert_eq!(
            Role::from("tutor".to_string()),
            Role::Other("tutor".to_string())
        );
    }

    #[test]
    fn claims_accept_snake_case_aliases() {
        let json = r#"{"user_id":"a1","role":"admin","is_master":true,"exp":10}"#;
        let c: Claims = serde_json::from_str(json).unwrap();
        assert_eq!(c.user_id, "a1");
        assert!(c.is_master);
        assert!(c.is_admin());
    }

    #[test]
    fn missing_role_decodes_to_empty_other() {
        let c: Claims = serde_json::from_str(r#"{"id":"x","exp":10}"#).unwrap();
        assert_eq!(c.role, Role::Other(String::new()));
        assert!(!c.is_master);
    }

    #[test]
    fn every_id_spelling_at_once_decodes() {
        let json = r#"{"id":"a7","userId":"a7","user_id":"a7","role":"admin","isMaster":true,"is_master":true,"exp":10}"#;
        let c: Claims = serde_json::from_str(json).unwrap();
        assert_eq!(c.user_id, "a7");
        assert!(c.is_master);
    }

    #[test]
    fn camel_case_id_wins_over_others() {
        let c: Claims =
            serde_json::from_str(r#"{"id":"legacy","user_id":"snake","userId":"camel","exp":10}"#)
                .unwrap();
        assert_eq!(c.user_id, "camel");
        let c: Claims = serde_json::from_str(r#"{"id":"legacy","user_id":"snake","exp":10}"#).unwrap();
        assert_eq!(c.user_id, "snake");
    }

    #[test]
    fn numeric_ids_become_strings() {
        let c: Claims = serde_json::from_str(r#"{"id":42,"role":"student","exp":10}"#).unwrap();
        assert_eq!(c.user_id, "42");
    }

    #[test]
    fn missing_exp_is_rejected() {
        assert!(serde_json::from_str::<Claims>(r#"{"userId":"x"}"#).is_err());
    }

    #[test]
    fn claims_serialize_camel_case() {
        let c = Claims::new("u9", Role::Student, 99);
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["userId"], "u9");
        assert_eq!(v["role"], "student");
        assert_eq!(v["isMaster"], false);
        assert!(v.get("iat").is_none());
    }
}
