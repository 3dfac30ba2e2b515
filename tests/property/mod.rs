// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module

mod cascade_completeness;
mod identifier_codec;
mod subnet_allocation;
