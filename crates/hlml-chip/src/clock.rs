// SPDX-License-Identifier: AGPL-3.0-only

//! Clock domains.
//!
//! The SOC clock is the chip-wide PLL; IC, MME and TPC are the interconnect,
//! matrix-multiplication engine and tensor-processor-core domains.

/// A clock domain that can be queried for its current and maximum frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockDomain {
    /// System-on-chip clock.
    Soc,
    /// Interconnect clock.
    Ic,
    /// Matrix-multiplication engine clock.
    Mme,
    /// Tensor processor core clock.
    Tpc,
}

impl ClockDomain {
    /// All domains, in reporting order.
    pub const ALL: [Self; 4] = [Self::Soc, Self::Ic, Self::Mme, Self::Tpc];

    /// Short lowercase name used in logs and sysfs attribute prefixes.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Soc => "soc",
            Self::Ic => "ic",
            Self::Mme => "mme",
            Self::Tpc => "tpc",
        }
    }
}

impl std::fmt::Display for ClockDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
