// SPDX-License-Identifier: AGPL-3.0-only

//! Silicon model for Habana Labs accelerators (Goya, Gaudi, Gaudi2).
//!
//! This crate has **no dependencies** and **no hardware access**. It is a pure
//! model of what the kernel driver and the management library report about
//! the silicon: PCI identifiers, clock domains, PCIe link encoding and the
//! device status strings published by the habanalabs driver.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`pcie`] | Vendor/device ids, chip variants, link-speed parsing |
//! | [`clock`] | Clock domains (SOC, IC, MME, TPC) and their sysfs names |
//! | [`status`] | Device status strings (`Operational`, `In reset`, ...) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod pcie;
pub mod status;
