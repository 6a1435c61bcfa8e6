use super::UserId;

/// Account data owned by the identity collaborator; treated as immutable for
/// the duration of a bid.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub active: bool,
}
