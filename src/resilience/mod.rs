// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience: remote health gating and startup retry.

pub mod health;
pub mod retry;
