pub mod app;
pub mod cnv;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod sheet;
pub mod store;
