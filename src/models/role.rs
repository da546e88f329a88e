use serde::{Deserialize, Serialize};

/// The three account roles. `Pelanggan` is the default every fallback
/// path degrades to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Petugas,
    Pelanggan,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Petugas => "petugas",
            Role::Pelanggan => "pelanggan",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "petugas" => Ok(Role::Petugas),
            "pelanggan" => Ok(Role::Pelanggan),
            _ => Err(anyhow::anyhow!("Unknown role: {s}")),
        }
    }
}

/// Row from the `user` role table, as far as role resolution cares.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleRow {
    pub role: String,
    pub username: Option<String>,
}

/// Role resolution chain: role-table row, then the role claim embedded
/// in the session, then the literal default. Never fails.
pub fn resolve_role(lookup: Option<&RoleRow>, claim: Option<Role>) -> Role {
    lookup
        .and_then(|row| row.role.parse().ok())
        .or(claim)
        .unwrap_or(Role::Pelanggan)
}

/// Where each role lands when it is turned away from a route.
pub fn role_home(role: Role) -> &'static str {
    match role {
        Role::Admin => "/dashboard",
        Role::Petugas => "/dashboard/petugas",
        Role::Pelanggan => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_row_wins_over_claim() {
        let row = RoleRow {
            role: "petugas".into(),
            username: None,
        };
        assert_eq!(resolve_role(Some(&row), Some(Role::Admin)), Role::Petugas);
    }

    #[test]
    fn claim_wins_when_row_absent_or_garbage() {
        assert_eq!(resolve_role(None, Some(Role::Admin)), Role::Admin);
        let garbage = RoleRow {
            role: "superuser".into(),
            username: None,
        };
        assert_eq!(resolve_role(Some(&garbage), Some(Role::Petugas)), Role::Petugas);
    }

    #[test]
    fn default_is_pelanggan() {
        assert_eq!(resolve_role(None, None), Role::Pelanggan);
    }

    #[test]
    fn role_homes() {
        assert_eq!(role_home(Role::Admin), "/dashboard");
        assert_eq!(role_home(Role::Petugas), "/dashboard/petugas");
        assert_eq!(role_home(Role::Pelanggan), "/");
    }
}
