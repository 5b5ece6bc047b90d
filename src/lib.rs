#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod batch;
pub mod cli;
pub mod config;
pub mod declaration;
pub mod error;
pub mod init;
pub mod logging;
pub mod paths;
pub mod provision;
pub mod report;
pub mod resolve;
pub mod stage;
