// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod cfg;
pub mod client;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod mux;
pub mod rooms;
pub mod scope;
pub mod transport;
pub mod wire;
