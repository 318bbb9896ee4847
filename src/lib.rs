//! analytics-dispatch: pluggable analytics event dispatch
//!
//! A library for sending one backend-agnostic [`Event`](event::Event) to
//! several analytics and CRM backends (Google Analytics, Plausible,
//! Mixpanel, HubSpot, ActiveCampaign, Orbit, Reo.Dev and ClickHouse) over a
//! shared HTTP invocation layer.
//!
//! # Layers
//!
//! - [`invoker`]: content-type-driven request encoding and response parsing
//! - [`adapter`]: the [`Adapter`](adapter::Adapter) contract and one adapter per backend
//! - [`dispatch`]: fan-out of an event to every configured backend
//! - [`config`]: TOML configuration for the dispatcher

pub mod adapter;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod invoker;
pub mod logging;
pub mod time;

#[cfg(test)]
mod testing;
