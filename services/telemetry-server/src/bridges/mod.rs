//! External collaborators the core only talks to through a narrow
//! contract (spec.md §4.7/§4.8): the numeric breath-analysis engine and
//! the third-party chat completion API. Neither is implemented here beyond
//! the plumbing the session loop needs — the numeric method and the chat
//! model are explicitly out of scope (spec.md §1).

pub mod analysis;
pub mod chat;
