//! docker-pull CLI - pull registry images as `docker load` tarballs.

pub mod commands;
pub mod output;
pub mod progress;
