// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure
//!
//! Adapters behind the application layer: token verification, the policy
//! snapshot store, the event bus, audit delivery and metrics.

pub mod audit;
pub mod event_bus;
pub mod jwt_verifier;
pub mod policy_store;
pub mod telemetry;
