// Commands module - project creation, work logging and note sync

pub mod common;
pub mod events;
pub mod manager;
pub mod sync;
