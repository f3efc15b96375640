// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the decision engine CLI

pub mod config;
pub mod policy;

pub use self::config::ConfigCommand;
pub use self::policy::PolicyCommand;
