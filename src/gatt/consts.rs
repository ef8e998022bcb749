use bitflags::bitflags;

use crate::att::Perm;

bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
    #[repr(transparent)]
    pub struct Prop: u8 {
        /// Permits broadcasts of the Characteristic Value.
        const BROADCAST = 0x01;
        /// Permits reads of the Characteristic Value.
        const READ = 0x02;
        /// Permit writes of the Characteristic Value without response.
        const WRITE_WITHOUT_RESPONSE = 0x04;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x08;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment.
        const NOTIFY = 0x10;
        /// Permits indications of a Characteristic Value with acknowledgment.
        const INDICATE = 0x20;
        /// Permits signed writes to the Characteristic Value.
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        /// Additional characteristic properties are defined in the
        /// Characteristic Extended Properties Descriptor.
        const EXTENDED_PROPERTIES = 0x80;
    }
}

bitflags! {
    /// Characteristic definition flags. The low byte matches [`Prop`]; the
    /// high byte holds extended properties that are only advertised through
    /// the `EXTENDED_PROPERTIES` bit.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
    #[repr(transparent)]
    pub struct CharFlags: u16 {
        const BROADCAST = 0x0001;
        const READ = 0x0002;
        const WRITE_WITHOUT_RESPONSE = 0x0004;
        const WRITE = 0x0008;
        const NOTIFY = 0x0010;
        const INDICATE = 0x0020;
        const AUTHENTICATED_SIGNED_WRITES = 0x0040;
        /// Reliable writes ([Vol 3] Part G, Section 3.3.3.1).
        const RELIABLE_WRITE = 0x0100;
        /// Writable auxiliaries ([Vol 3] Part G, Section 3.3.3.1).
        const WRITABLE_AUXILIARIES = 0x0200;
    }
}

impl CharFlags {
    /// Returns the properties byte of the characteristic declaration.
    #[must_use]
    pub const fn props(self) -> Prop {
        #[allow(clippy::cast_possible_truncation)]
        let mut p = Prop::from_bits_truncate(self.bits() as u8);
        if self.intersects(Self::RELIABLE_WRITE.union(Self::WRITABLE_AUXILIARIES)) {
            p = p.union(Prop::EXTENDED_PROPERTIES);
        }
        p
    }

    /// Returns the permissions of the characteristic value attribute.
    #[must_use]
    pub const fn value_perm(self) -> Perm {
        let mut p = Perm::empty();
        if self.contains(Self::READ) {
            p = p.union(Perm::READ);
        }
        if self.intersects(
            Self::WRITE
                .union(Self::WRITE_WITHOUT_RESPONSE)
                .union(Self::AUTHENTICATED_SIGNED_WRITES)
                .union(Self::RELIABLE_WRITE),
        ) {
            p = p.union(Perm::WRITE);
        }
        p
    }

    /// Returns whether a client can subscribe to value updates.
    #[inline]
    #[must_use]
    pub const fn is_configurable(self) -> bool {
        self.intersects(Self::NOTIFY.union(Self::INDICATE))
    }
}

bitflags! {
    /// Client Characteristic Configuration descriptor value
    /// ([Vol 3] Part G, Section 3.3.3.3).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
    #[repr(transparent)]
    pub struct Cccd: u16 {
        /// The Characteristic Value shall be notified.
        const NOTIFY = 1 << 0;
        /// The Characteristic Value shall be indicated.
        const INDICATE = 1 << 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_flags() {
        let f = CharFlags::READ | CharFlags::NOTIFY;
        assert_eq!(f.props(), Prop::READ | Prop::NOTIFY);
        assert_eq!(f.value_perm(), Perm::READ);
        assert!(f.is_configurable());

        let f = CharFlags::WRITE | CharFlags::RELIABLE_WRITE;
        assert_eq!(f.props(), Prop::WRITE | Prop::EXTENDED_PROPERTIES);
        assert_eq!(f.value_perm(), Perm::WRITE);
        assert!(!f.is_configurable());
        assert_eq!(CharFlags::WRITABLE_AUXILIARIES.props().bits(), 0x80);
    }
}
