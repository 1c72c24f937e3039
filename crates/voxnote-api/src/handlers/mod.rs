//! HTTP handlers for the remote CRUD surface.

pub mod audio;
pub mod categories;
pub mod entries;
