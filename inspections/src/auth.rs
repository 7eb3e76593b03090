//! Header credentials and the roles they resolve to.

use crate::config::AuthConfig;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

pub const USER_HEADER: &str = "x-user";
pub const PASSWORD_HEADER: &str = "x-pass";
pub const PASSCODE_HEADER: &str = "x-passcode";

const UNKNOWN_USER: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Input,
    Viewer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    Read,
    /// Creating records and saving templates.
    Write,
    /// Deleting records or templates and repairing documents.
    Delete,
    Diagnose,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Input => "input",
            Role::Viewer => "viewer",
        }
    }

    pub fn allows(self, permission: Permission) -> bool {
        match permission {
            Permission::Read => true,
            Permission::Write => matches!(self, Role::Admin | Role::Input),
            Permission::Delete => self == Role::Admin,
            Permission::Diagnose => matches!(self, Role::Admin | Role::Viewer),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
    pub passcode: Option<String>,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Credentials {
            user: read(USER_HEADER),
            password: read(PASSWORD_HEADER),
            passcode: read(PASSCODE_HEADER),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Identity {
    pub user: String,
    pub role: Role,
}

/// Resolves credentials to an identity; the first matching rule wins.
///
/// 1. a configured account with the same user and password
/// 2. a listed input user with the input password or the passcode
/// 3. a listed viewer user with the viewer password or the passcode
/// 4. the passcode alone, as an input user
pub fn authenticate(config: &AuthConfig, credentials: &Credentials) -> Option<Identity> {
    let user = credentials.user.as_deref();
    let secret = credentials
        .password
        .as_deref()
        .or(credentials.passcode.as_deref());
    let passcode = config.passcode.as_deref();

    let identity = |user: &str, role| {
        Some(Identity {
            user: user.to_string(),
            role,
        })
    };

    if let (Some(user), Some(password)) = (user, credentials.password.as_deref())
        && let Some(account) = config
            .accounts
            .iter()
            .find(|a| a.user == user && a.password == password)
    {
        return identity(user, account.role);
    }

    if let Some(user) = user {
        let listed = |users: &[String]| users.iter().any(|u| u == user);

        if listed(&config.input_users)
            && (same_secret(secret, config.input_password.as_deref())
                || same_secret(secret, passcode))
        {
            return identity(user, Role::Input);
        }
        if listed(&config.viewer_users)
            && (same_secret(secret, config.viewer_password.as_deref())
                || same_secret(secret, passcode))
        {
            return identity(user, Role::Viewer);
        }
    }

    if same_secret(secret, passcode) || same_secret(credentials.passcode.as_deref(), passcode) {
        return identity(user.unwrap_or(UNKNOWN_USER), Role::Input);
    }

    None
}

// unset or empty secrets never match
fn same_secret(given: Option<&str>, expected: Option<&str>) -> bool {
    match (given, expected) {
        (Some(given), Some(expected)) => !expected.is_empty() && given == expected,
        _ => false,
    }
}
