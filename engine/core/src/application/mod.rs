// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Use cases of the decision engine: resolve claims, evaluate, record,
//! monitor SLOs, reload policy.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates domain objects and infrastructure adapters

pub mod authorization;
pub mod claims_resolver;
pub mod evaluator;
pub mod recorder;
pub mod slo_monitor;
