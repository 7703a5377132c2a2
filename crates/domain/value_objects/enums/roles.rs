use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Student,
    Counsellor,
    Admin,
}

impl Role {
    pub fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "counsellor" => Role::Counsellor,
            "admin" => Role::Admin,
            _ => Role::Student,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let role = match self {
            Role::Student => "student",
            Role::Counsellor => "counsellor",
            Role::Admin => "admin",
        };
        write!(f, "{}", role)
    }
}
