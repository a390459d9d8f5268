//! Stratgate - request guard for the strategy dashboard
//!
//! This crate implements a sliding-window rate limiter keyed by endpoint tag
//! and client identity, a table of named limit presets, and a static API key
//! guard, together with an axum adapter that exposes them over HTTP.
//!
//! Limits are enforced per process; instances do not share state.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
