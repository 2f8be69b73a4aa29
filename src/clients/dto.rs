use serde::{Deserialize, Serialize};

use super::repo_types::User;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeletionCodeRequest {
    pub code: String,
}

/// Token plus the account it was issued for.
#[derive(Debug, Serialize)]
pub struct ClientAuth {
    pub token: String,
    pub user: User,
}
