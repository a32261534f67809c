use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Capability flags a manager is initialized with.
///
/// Flags are fixed at `init` and every later operation is checked against
/// them. A valid set always contains at least one of [`BlobFlags::READABLE`]
/// or [`BlobFlags::WRITABLE`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlobFlags(u32);

impl BlobFlags {
    /// No capabilities.
    pub const NONE: Self = Self(0);
    /// Blobs may be opened and read.
    pub const READABLE: Self = Self(1);
    /// Blobs may be added.
    pub const WRITABLE: Self = Self(2);
    /// Shorthand for `READABLE | WRITABLE`.
    pub const READ_WRITE: Self = Self(1 | 2);
    /// Open an existing backing store instead of creating a new one.
    pub const OPEN_EXISTING: Self = Self(4);
    /// Open an existing backing store, or create it if missing.
    pub const OPEN_EXISTING_OR_CREATE_NEW: Self = Self(8);

    const ALL: u32 = 1 | 2 | 4 | 8;

    /// Build from raw bits, discarding unknown ones.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    /// The raw bit pattern.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any bit of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// This set with the bits of `other` cleared.
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_readable(self) -> bool {
        self.intersects(Self::READABLE)
    }

    pub const fn is_writable(self) -> bool {
        self.intersects(Self::WRITABLE)
    }

    /// Readable and not writable.
    pub const fn is_read_only(self) -> bool {
        self.0 & Self::READ_WRITE.0 == Self::READABLE.0
    }

    /// Writable and not readable.
    pub const fn is_write_only(self) -> bool {
        self.0 & Self::READ_WRITE.0 == Self::WRITABLE.0
    }

    /// The minimum every manager requires at `init`.
    pub const fn has_access(self) -> bool {
        self.intersects(Self::READ_WRITE)
    }
}

impl BitOr for BlobFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BlobFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for BlobFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(BlobFlags, &str); 4] = [
            (BlobFlags::READABLE, "readable"),
            (BlobFlags::WRITABLE, "writable"),
            (BlobFlags::OPEN_EXISTING, "open-existing"),
            (BlobFlags::OPEN_EXISTING_OR_CREATE_NEW, "open-or-create"),
        ];
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BlobFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobFlags({self})")
    }
}
