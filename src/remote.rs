//! The HTTP side of persistence: a [`FileApi`](crate::persistence::FileApi) client and the
//! document server it talks to.

mod client;
mod server;

pub use client::HttpFileApi;
pub use server::{AdminEntry, DocumentStore, Identity, ServerError, router, serve};

/// Header carrying the user a request is made for.
pub const USER_HEADER: &str = "x-mapnote-user";
/// Header carrying the role of the user.
pub const ROLE_HEADER: &str = "x-mapnote-role";

/// Roles that may read the documents of every user.
pub const ADMIN_ROLES: [&str; 2] = ["teacher", "admin"];
