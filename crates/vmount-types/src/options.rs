//! Mount options.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// A flag controlling how a mount is materialized.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MountOption {
    /// Materialize an independent physical copy instead of working in place.
    Copy,
}

impl MountOption {
    fn bit(self) -> u8 {
        match self {
            MountOption::Copy => 1 << 0,
        }
    }
}

/// Set of [`MountOption`]s. Empty means the backend's in-place strategy.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<MountOption>", into = "Vec<MountOption>")]
pub struct MountOptions(u8);

impl MountOptions {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Shorthand for `{COPY}`.
    pub fn copy() -> Self {
        MountOption::Copy.into()
    }

    pub fn contains(self, option: MountOption) -> bool {
        self.0 & option.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, option: MountOption) {
        self.0 |= option.bit();
    }

    pub fn remove(&mut self, option: MountOption) {
        self.0 &= !option.bit();
    }

    /// Builder form of [`MountOptions::remove`].
    pub fn without(mut self, option: MountOption) -> Self {
        self.remove(option);
        self
    }

    pub fn iter(self) -> impl Iterator<Item = MountOption> {
        MountOption::iter().filter(move |option| self.contains(*option))
    }
}

impl From<MountOption> for MountOptions {
    fn from(option: MountOption) -> Self {
        Self(option.bit())
    }
}

impl FromIterator<MountOption> for MountOptions {
    fn from_iter<I: IntoIterator<Item = MountOption>>(iter: I) -> Self {
        let mut options = Self::empty();
        for option in iter {
            options.insert(option);
        }
        options
    }
}

impl From<Vec<MountOption>> for MountOptions {
    fn from(options: Vec<MountOption>) -> Self {
        options.into_iter().collect()
    }
}

impl From<MountOptions> for Vec<MountOption> {
    fn from(options: MountOptions) -> Self {
        options.iter().collect()
    }
}

impl fmt::Debug for MountOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
