//! Collaborators at the edge of the crate: data provider, chat completion,
//! and the on-disk catalog cache.

pub mod cache;
pub mod llm;
pub mod uex;
