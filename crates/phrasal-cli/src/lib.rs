pub mod commands;
pub mod loaders;
pub mod output;
pub mod trace_init;
