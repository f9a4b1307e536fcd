//! Security plugin CRDs
//!
//! Users, roles and user-role bindings are cluster-scoped; tenants and
//! action groups live in the namespace of their cluster.

pub mod action_group;
pub mod role;
pub mod tenant;
pub mod user;
pub mod user_role_binding;

pub use action_group::*;
pub use role::*;
pub use tenant::*;
pub use user::*;
pub use user_role_binding::*;
