pub mod check;
pub mod completions;
pub mod create;
pub mod delete;
pub mod list;
pub mod update;
