pub mod args;
pub mod config;
pub mod error;
pub mod metadata;
pub mod oauth;
pub mod processor;
pub mod publish;
pub mod render;
pub mod state;
pub mod template;
