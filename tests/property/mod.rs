// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! Properties of option normalization and secret wiping that must hold
//! for every input.

mod options_normalization;
mod secret_wiping;
