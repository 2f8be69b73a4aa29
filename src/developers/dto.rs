use serde::{Deserialize, Serialize};

use super::repo_types::Developer;

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyAdminRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeveloperRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub payment_details: Option<String>,
}

/// Either a developer session or a note that the admin code was mailed.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SigninOutcome {
    Developer { token: String, developer: Developer },
    #[serde(rename_all = "camelCase")]
    AdminVerificationRequired { requires_verification: bool, email: String },
}
