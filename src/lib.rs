//! Per-project ngrok tunnels for workspace projects.
//!
//! Each project that opts in gets an ngrok agent container that forwards a
//! public URL to the project's internal host. The [`controller`] exposes the
//! user commands and host lifecycle hooks; the [`tunnel`] module drives the
//! container through [`docker::ContainerRuntime`].

pub mod cli;
pub mod config;
pub mod controller;
pub mod docker;
pub mod error;
pub mod hooks;
pub mod project;
pub mod prompts;
pub mod settings;
pub mod testing;
pub mod tunnel;
