use uuid::Uuid;

use super::enums::roles::Role;

/// Authenticated caller as handed over by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Counsellor-owned resources may be changed by that counsellor or an admin.
    pub fn can_manage_counsellor(&self, counsellor_id: Uuid) -> bool {
        self.is_admin() || (self.role == Role::Counsellor && self.id == counsellor_id)
    }
}
