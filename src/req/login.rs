//! Parameter sets for the authentication actions.

use crate::req::Params;

/// Legacy two-step `action=login`.
pub struct Login {
    pub name: String,
    pub password: String,
    pub token: String,
}

impl Login {
    pub fn build(self) -> Params {
        let mut params = Params::new();
        params.insert("action", "login");
        params.insert("lgname", self.name);
        params.insert("lgpassword", self.password);
        params.insert("lgtoken", self.token);
        params
    }
}

/// Modern `action=clientlogin` (MW 1.27+).
pub struct ClientLogin {
    pub username: String,
    pub password: String,
    pub token: String,
    /// Required by the AuthManager flow; the endpoint origin works.
    pub return_url: String,
}

impl ClientLogin {
    pub fn build(self) -> Params {
        let mut params = Params::new();
        params.insert("action", "clientlogin");
        params.insert("username", self.username);
        params.insert("password", self.password);
        params.insert("logintoken", self.token);
        params.insert("loginreturnurl", self.return_url);
        params
    }
}

pub fn logout(token: String) -> Params {
    let mut params = Params::new();
    params.insert("action", "logout");
    params.insert("token", token);
    params
}
