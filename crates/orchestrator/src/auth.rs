//! Authorization seam.
//!
//! Identity is computed by the host; the orchestrator only asks whether a
//! given actor may perform an action on a booking.

use std::str::FromStr;

use common::{ClientId, UserId};
use domain::Booking;
use serde::{Deserialize, Serialize};

/// A role granted by the host's identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Builder,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Builder => "builder",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "builder" => Ok(Role::Builder),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Who is making a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<UserId>,
    pub roles: Vec<Role>,
}

impl Actor {
    /// An unauthenticated visitor.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn client(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(UserId::new(user_id)),
            roles: vec![Role::Client],
        }
    }

    pub fn builder(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(UserId::new(user_id)),
            roles: vec![Role::Builder],
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(UserId::new(user_id)),
            roles: vec![Role::Admin],
        }
    }

    /// The actor used by host-side jobs such as the expiry sweeper.
    pub fn system() -> Self {
        Self::admin("system")
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    /// Returns the actor's client identity, if they act as a client.
    pub fn client_id(&self) -> Option<ClientId> {
        if !self.has_role(Role::Client) {
            return None;
        }
        self.user_id.as_ref().map(ClientId::from)
    }
}

/// What an actor is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    /// Selection and checkout steps of the booking flow.
    Update,
    Claim,
    Cancel,
    Complete,
    Expire,
    IssueRecoveryToken,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Claim => "claim",
            Action::Cancel => "cancel",
            Action::Complete => "complete",
            Action::Expire => "expire",
            Action::IssueRecoveryToken => "issue_recovery_token",
        }
    }
}

/// Decides whether an actor may perform an action.
///
/// `booking` is `None` only for `Create`.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, actor: &Actor, action: Action, booking: Option<&Booking>) -> bool;
}

/// Default ownership rules.
///
/// - Admins may do everything.
/// - Anyone may create a booking.
/// - Anyone may drive an unclaimed booking through the flow; claiming it
///   requires a signed-in client.
/// - A client may act on the bookings they own, except completing them.
/// - A builder may read, cancel, and complete their own bookings.
/// - Only admins expire bookings.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipPolicy;

impl Authorizer for OwnershipPolicy {
    fn authorize(&self, actor: &Actor, action: Action, booking: Option<&Booking>) -> bool {
        if actor.has_role(Role::Admin) {
            return true;
        }
        if action == Action::Create {
            return true;
        }
        let Some(booking) = booking else {
            return false;
        };

        let client_actions = matches!(
            action,
            Action::Read | Action::Update | Action::Cancel | Action::IssueRecoveryToken
        );

        if let Some(user_id) = &actor.user_id {
            if actor.has_role(Role::Builder)
                && user_id.is_builder(booking.builder_id())
                && matches!(action, Action::Read | Action::Cancel | Action::Complete)
            {
                return true;
            }
            if actor.has_role(Role::Client)
                && let Some(owner) = booking.client_id()
                && user_id.is_client(owner)
            {
                return client_actions || action == Action::Claim;
            }
        }

        if booking.is_anonymous() {
            return client_actions || (action == Action::Claim && actor.client_id().is_some());
        }

        false
    }
}
