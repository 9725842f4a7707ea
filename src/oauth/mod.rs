//! OAuth flows (C5): Anthropic PKCE and GitHub device-flow for Copilot.

pub mod anthropic;
pub mod copilot;
