#![doc = "visio-convert-core: lifecycle logic for submitted Visio conversions."]

//! This crate holds everything that decides *what happens* to a submitted file:
//! the pre-flight validation gate, the wire contract and transport trait, the
//! per-file session model, the status poller and the lifecycle controller that
//! ties them together. Actual HTTP transport lives in the `visio-convert` crate.
//!
//! # Usage
//! Construct a [`controller::LifecycleController`] with any
//! [`contract::ConversionBackend`] implementation and drive it from an async runtime.

pub mod config;
pub mod contract;
pub mod controller;
pub mod notify;
pub mod poller;
pub mod session;
pub mod validation;
