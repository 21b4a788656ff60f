// Discord side of verification: the join hook and `/reverify`.

pub mod commands;
pub mod join_handler;
