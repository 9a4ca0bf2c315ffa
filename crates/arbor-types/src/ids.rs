use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! integer_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(value: u32) -> Self {
                Self(value)
            }

            pub const fn get(&self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

integer_id!(
    /// Stable identity of a tracked file.
    ///
    /// Allocated once when the file is created and never reused. The same
    /// `FileId` names the file on every branch regardless of where it lives
    /// or what it is called there.
    FileId,
    "FileId"
);

integer_id!(
    /// Stable identity of a directory, analogous to [`FileId`].
    DirectoryId,
    "DirectoryId"
);

integer_id!(
    /// Identity of a branch within a project. The trunk is [`BranchId::TRUNK`].
    BranchId,
    "BranchId"
);

impl BranchId {
    pub const TRUNK: BranchId = BranchId(1);

    pub fn is_trunk(&self) -> bool {
        *self == Self::TRUNK
    }
}
