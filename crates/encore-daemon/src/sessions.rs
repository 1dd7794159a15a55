//! Resolution of request tokens to caller identities.

use std::collections::HashMap;

use encore_core::Role;
use tracing::debug;

use crate::config::TokenConfig;

/// Identity of the caller of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub role: Role,
    pub nickname: String,
}

impl Session {
    pub fn guest() -> Self {
        Self { role: Role::Guest, nickname: Role::Guest.to_string() }
    }
}

#[derive(Debug, Default)]
pub struct Sessions {
    tokens: HashMap<String, Session>,
}

impl Sessions {
    pub fn new(tokens: &[TokenConfig]) -> Self {
        let tokens = tokens
            .iter()
            .map(|t| {
                let nickname = t.nickname.clone().unwrap_or_else(|| t.role.to_string());
                (t.token.clone(), Session { role: t.role, nickname })
            })
            .collect();
        Self { tokens }
    }

    /// Resolve a request's token. Missing or unknown tokens are guests.
    pub fn resolve(&self, token: Option<&str>) -> Session {
        match token {
            None => Session::guest(),
            Some(token) => self.tokens.get(token).cloned().unwrap_or_else(|| {
                debug!("Unknown session token, treating caller as guest");
                Session::guest()
            }),
        }
    }
}
