//! Domain models - core business types
//!
//! This module contains the canonical data types used throughout the system:
//! - `FeedbackEvent` - decoded track sensor feedback
//! - `SystemState` / `BusStatus` - command station status notifications
//! - `FeedbackStatistics` - per-channel trigger statistics
//! - `Journey` / `Station` - scripted train routes advanced by feedback
//! - `Workflow` / `Action` - configurable action trees executed at stations

pub mod journey;
pub mod types;
pub mod workflow;
