use bleat_const::Uuid;

use super::*;

/// Attribute table entry ([Vol 3] Part F, Section 3.2).
#[derive(Clone, Debug)]
pub struct Entry<A> {
    hdl: Handle,
    typ: Uuid,
    perm: Perm,
    access: A,
}

impl<A> Entry<A> {
    /// Returns the attribute handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the attribute type.
    #[inline(always)]
    #[must_use]
    pub const fn typ(&self) -> Uuid {
        self.typ
    }

    /// Returns the attribute permissions.
    #[inline(always)]
    #[must_use]
    pub const fn perm(&self) -> Perm {
        self.perm
    }

    /// Returns the access behavior bound to the attribute.
    #[inline(always)]
    #[must_use]
    pub const fn access(&self) -> &A {
        &self.access
    }
}

/// Attribute table with handles assigned in strictly increasing order,
/// starting at 0x0001. Entries are never removed.
#[derive(Clone, Debug)]
pub struct Table<A> {
    v: Vec<Entry<A>>,
    cap: usize,
}

impl<A> Table<A> {
    /// Creates an empty table that can hold up to `cap` attributes.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            v: Vec::new(),
            cap: cap.min(usize::from(u16::MAX)),
        }
    }

    /// Adds an attribute and returns its handle.
    pub fn register(&mut self, typ: impl Into<Uuid>, perm: Perm, access: A) -> Result<Handle> {
        if self.v.len() >= self.cap {
            return Err(Error::OutOfMemory);
        }
        let hdl = self.prev_handle().map_or(Some(Handle::MIN), Handle::next);
        let hdl = hdl.ok_or(Error::OutOfMemory)?;
        self.v.push(Entry {
            hdl,
            typ: typ.into(),
            perm,
            access,
        });
        Ok(hdl)
    }

    /// Returns the most recently assigned handle or [`None`] if the table is
    /// empty.
    #[inline]
    #[must_use]
    pub fn prev_handle(&self) -> Option<Handle> {
        self.v.last().map(|e| e.hdl)
    }

    /// Returns the entry for handle `hdl`.
    #[inline]
    #[must_use]
    pub fn get(&self, hdl: Handle) -> Option<&Entry<A>> {
        self.v.get(usize::from(hdl.get()) - 1)
    }

    /// Returns the first entry of type `typ` with a handle greater than
    /// `after`, or the first such entry in the table if `after` is [`None`].
    #[must_use]
    pub fn find_by_uuid(&self, typ: impl Into<Uuid>, after: Option<Handle>) -> Option<&Entry<A>> {
        let typ = typ.into();
        let i = after.map_or(0, |h| usize::from(h.get()));
        self.v.get(i..)?.iter().find(|e| e.typ == typ)
    }

    /// Returns an iterator over all entries in handle order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Entry<A>> {
        self.v.iter()
    }

    /// Returns the number of attributes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.v.len()
    }

    /// Returns whether the table is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use bleat_const::Declaration;

    use super::*;

    #[test]
    fn register() {
        let mut t = Table::new(3);
        assert_eq!(t.prev_handle(), None);
        let a = t.register(Declaration::PrimaryService, Perm::READ, 'a').unwrap();
        let b = t.register(Declaration::Characteristic, Perm::READ, 'b').unwrap();
        let c = t.register(Declaration::Characteristic, Perm::READ, 'c').unwrap();
        assert_eq!((a.get(), b.get(), c.get()), (1, 2, 3));
        assert_eq!(t.prev_handle(), Some(c));
        assert_matches!(t.register(Declaration::Include, Perm::READ, 'd'), Err(Error::OutOfMemory));
        assert_eq!(*t.get(b).unwrap().access(), 'b');
        assert!(t.get(Handle::new(4).unwrap()).is_none());
    }

    #[test]
    fn find_by_uuid() {
        let mut t = Table::new(8);
        for typ in [
            Declaration::PrimaryService,
            Declaration::Characteristic,
            Declaration::PrimaryService,
            Declaration::Characteristic,
        ] {
            t.register(typ, Perm::READ, ()).unwrap();
        }
        let mut found = Vec::new();
        let mut cur = None;
        while let Some(e) = t.find_by_uuid(Declaration::Characteristic, cur) {
            found.push(e.handle().get());
            cur = Some(e.handle());
        }
        assert_eq!(found, [2, 4]);
        assert!(t.find_by_uuid(Declaration::Include, None).is_none());
    }
}
