//! Service, characteristic, and descriptor definitions supplied at startup.

use smallvec::SmallVec;

use bleat_const::{Declaration, Uuid};

use crate::att::Perm;

use super::*;

/// Service type ([Vol 3] Part G, Section 3.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ServiceType {
    Primary,
    Secondary,
}

impl ServiceType {
    /// Returns the declaration attribute type.
    #[inline]
    #[must_use]
    pub const fn declaration(self) -> Declaration {
        match self {
            Self::Primary => Declaration::PrimaryService,
            Self::Secondary => Declaration::SecondaryService,
        }
    }
}

/// Service definition. Included services are referenced by their index in
/// the [`Registry`].
#[derive(Clone, Debug)]
pub struct ServiceDef {
    pub typ: ServiceType,
    pub uuid: Uuid,
    pub includes: SmallVec<[usize; 2]>,
    pub chars: Vec<CharDef>,
}

impl ServiceDef {
    /// Creates a primary service definition.
    #[inline]
    #[must_use]
    pub fn primary(uuid: impl Into<Uuid>) -> Self {
        Self::new(ServiceType::Primary, uuid)
    }

    /// Creates a secondary service definition.
    #[inline]
    #[must_use]
    pub fn secondary(uuid: impl Into<Uuid>) -> Self {
        Self::new(ServiceType::Secondary, uuid)
    }

    #[inline]
    fn new(typ: ServiceType, uuid: impl Into<Uuid>) -> Self {
        Self {
            typ,
            uuid: uuid.into(),
            includes: SmallVec::new(),
            chars: Vec::new(),
        }
    }

    /// Adds a reference to the service at registry index `svc`.
    #[inline]
    #[must_use]
    pub fn include(mut self, svc: usize) -> Self {
        self.includes.push(svc);
        self
    }

    /// Adds a characteristic.
    #[inline]
    #[must_use]
    pub fn characteristic(mut self, c: CharDef) -> Self {
        self.chars.push(c);
        self
    }

    /// Checks that every characteristic and descriptor has an access
    /// behavior.
    pub(super) fn validate(&self) -> Result<()> {
        for c in &self.chars {
            if c.io.is_none() {
                return Err(Error::InvalidArgument("characteristic without access behavior"));
            }
            if c.descs.iter().any(|d| d.io.is_none()) {
                return Err(Error::InvalidArgument("descriptor without access behavior"));
            }
        }
        Ok(())
    }
}

/// Characteristic definition ([Vol 3] Part G, Section 3.3).
#[derive(Clone, Debug)]
pub struct CharDef {
    pub uuid: Uuid,
    pub flags: CharFlags,
    pub io: Option<Io>,
    pub descs: Vec<DescDef>,
}

impl CharDef {
    /// Creates a characteristic definition without an access behavior.
    #[inline]
    #[must_use]
    pub fn new(uuid: impl Into<Uuid>, flags: CharFlags) -> Self {
        Self {
            uuid: uuid.into(),
            flags,
            io: None,
            descs: Vec::new(),
        }
    }

    /// Sets the value access behavior.
    #[inline]
    #[must_use]
    pub fn io(mut self, io: impl Into<Io>) -> Self {
        self.io = Some(io.into());
        self
    }

    /// Adds a descriptor.
    #[inline]
    #[must_use]
    pub fn descriptor(mut self, d: DescDef) -> Self {
        self.descs.push(d);
        self
    }
}

/// Characteristic descriptor definition ([Vol 3] Part G, Section 3.3.3).
#[derive(Clone, Debug)]
pub struct DescDef {
    pub uuid: Uuid,
    pub perm: Perm,
    pub io: Option<Io>,
}

impl DescDef {
    /// Creates a descriptor definition without an access behavior.
    #[inline]
    #[must_use]
    pub fn new(uuid: impl Into<Uuid>, perm: Perm) -> Self {
        Self {
            uuid: uuid.into(),
            perm,
            io: None,
        }
    }

    /// Sets the access behavior.
    #[inline]
    #[must_use]
    pub fn io(mut self, io: impl Into<Io>) -> Self {
        self.io = Some(io.into());
        self
    }
}
