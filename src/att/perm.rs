use bitflags::bitflags;

bitflags! {
    /// Attribute access permissions ([Vol 3] Part F, Section 3.2.5).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
    #[repr(transparent)]
    pub struct Perm: u8 {
        /// Attribute value may be read.
        const READ = 1 << 0;
        /// Attribute value may be written.
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl Perm {
    /// Returns the error code reported when an operation requiring `self` is
    /// attempted on an attribute with permissions `have`, or [`None`] if the
    /// operation is permitted.
    #[inline]
    #[must_use]
    pub fn check(self, have: Self) -> Option<super::ErrorCode> {
        use super::ErrorCode::*;
        if have.contains(self) {
            None
        } else if self.contains(Self::WRITE) {
            Some(WriteNotPermitted)
        } else {
            Some(ReadNotPermitted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::ErrorCode;
    use super::*;

    #[test]
    fn check() {
        assert_eq!(Perm::READ.check(Perm::READ_WRITE), None);
        assert_eq!(Perm::READ.check(Perm::WRITE), Some(ErrorCode::ReadNotPermitted));
        assert_eq!(Perm::WRITE.check(Perm::READ), Some(ErrorCode::WriteNotPermitted));
    }
}
