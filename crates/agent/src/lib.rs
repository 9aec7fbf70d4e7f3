//! Grid worker agent: HTTP transport and configuration over `agent_lib`

pub mod api;
pub mod config;
