use std::fmt::{Debug, Formatter};

use tracing::{debug, error, trace};

use bleat_const::{Declaration, Uuid};

use crate::att::{Handle, Perm, Table};
use crate::host::Config;
use crate::util::name_of;

use super::*;

/// Registration event reported once per registered element.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum RegEvent {
    Service { idx: usize, uuid: Uuid, hdl: Handle },
    Characteristic { uuid: Uuid, decl: Handle, val: Handle },
    Descriptor { uuid: Uuid, hdl: Handle },
}

type RegFn = Box<dyn FnMut(&RegEvent) + Send>;

/// Registry of local service definitions. Services are added during startup
/// and then registered all at once, which resolves include dependencies and
/// assigns attribute handles.
pub struct Registry {
    svcs: Vec<ServiceDef>,
    max_svcs: usize,
    max_attrs: usize,
    max_cfgs: usize,
    on_reg: Option<RegFn>,
}

impl Registry {
    /// Creates an empty registry with limits from `cfg`.
    #[must_use]
    pub fn new(cfg: &Config) -> Self {
        Self {
            svcs: Vec::new(),
            max_svcs: cfg.max_services,
            max_attrs: cfg.max_attrs,
            max_cfgs: cfg.max_client_cfgs,
            on_reg: None,
        }
    }

    /// Sets a callback that is invoked for each registered service,
    /// characteristic, and descriptor.
    pub fn on_register(&mut self, f: impl FnMut(&RegEvent) + Send + 'static) -> &mut Self {
        self.on_reg = Some(Box::new(f));
        self
    }

    /// Adds a service definition and returns its index, which other services
    /// use to include it.
    pub fn add(&mut self, def: ServiceDef) -> Result<usize> {
        if self.svcs.len() >= self.max_svcs {
            return Err(Error::InvalidArgument("too many services"));
        }
        def.validate()?;
        self.svcs.push(def);
        Ok(self.svcs.len() - 1)
    }

    /// Returns the number of added services.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.svcs.len()
    }

    /// Returns whether no services were added.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.svcs.is_empty()
    }

    /// Registers all services and returns the resulting server.
    ///
    /// Registration runs in rounds. Each round registers every service whose
    /// includes are already registered, in definition order. A round that
    /// registers nothing while services remain indicates a dependency cycle.
    #[allow(clippy::needless_range_loop)]
    pub fn register(mut self) -> Result<Server> {
        let n = self.svcs.len();
        if (self.svcs.iter()).any(|s| s.includes.iter().any(|&i| i >= n)) {
            return Err(Error::InvalidArgument("include of an undeclared service"));
        }
        let mut reg = vec![ServiceEntry::default(); n];
        let mut db = Table::new(self.max_attrs);
        let mut pending = n;
        let mut round = 0;
        while pending > 0 {
            round += 1;
            let mut done = 0;
            for i in 0..n {
                if reg[i].hdl.is_some() {
                    continue;
                }
                let def = &self.svcs[i];
                if !def.includes.iter().all(|&j| reg[j].hdl.is_some()) {
                    trace!("Service {i} ({}) deferred in round {round}", def.uuid);
                    continue;
                }
                let hdl = register_svc(i, def, &mut db, &mut self.on_reg)?;
                reg[i] = ServiceEntry {
                    hdl: Some(hdl),
                    end: db.prev_handle(),
                };
                debug!("Registered service {i} ({}) at {:?}", def.uuid, reg[i]);
                done += 1;
            }
            if done == 0 {
                error!("Circular include dependency among {pending} service(s)");
                return Err(Error::CircularDependency {
                    unregistered: pending,
                });
            }
            pending -= done;
        }
        Ok(Server::new(self.svcs, reg, db, self.max_cfgs))
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(name_of!(Registry))
            .field("svcs", &self.svcs)
            .field("max_svcs", &self.max_svcs)
            .field("max_attrs", &self.max_attrs)
            .finish_non_exhaustive()
    }
}

/// Reports a registration event.
#[inline]
fn emit(cb: &mut Option<RegFn>, ev: RegEvent) {
    if let Some(cb) = cb.as_mut() {
        cb(&ev);
    }
}

/// Registers the attributes of service `idx` in handle order: the service
/// declaration, its includes, and then each characteristic declaration,
/// value, and descriptors.
fn register_svc(
    idx: usize,
    def: &ServiceDef,
    db: &mut Table<Attr>,
    cb: &mut Option<RegFn>,
) -> Result<Handle> {
    let hdl = db.register(def.typ.declaration(), Perm::READ, Attr::Service { svc: idx })?;
    emit(
        cb,
        RegEvent::Service {
            idx,
            uuid: def.uuid,
            hdl,
        },
    );
    for &inc in &def.includes {
        db.register(Declaration::Include, Perm::READ, Attr::Include { inc })?;
    }
    for (ci, c) in def.chars.iter().enumerate() {
        let decl = db.register(
            Declaration::Characteristic,
            Perm::READ,
            Attr::ChrDecl { svc: idx, chr: ci },
        )?;
        let val = db.register(c.uuid, c.flags.value_perm(), Attr::ChrVal { svc: idx, chr: ci })?;
        debug_assert_eq!(decl.next(), Some(val));
        trace!("Characteristic {} at {decl} (value {val})", c.uuid);
        emit(
            cb,
            RegEvent::Characteristic {
                uuid: c.uuid,
                decl,
                val,
            },
        );
        for (di, d) in c.descs.iter().enumerate() {
            let dsc = Attr::Dsc {
                svc: idx,
                chr: ci,
                dsc: di,
            };
            let hdl = db.register(d.uuid, d.perm, dsc)?;
            trace!("Descriptor {} at {hdl}", d.uuid);
            emit(cb, RegEvent::Descriptor { uuid: d.uuid, hdl });
        }
    }
    Ok(hdl)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use matches::assert_matches;

    use bleat_const::{Characteristic, Descriptor, Service};

    use super::*;

    fn noop() -> Io {
        Io::new(|_| Ok(()))
    }

    fn battery() -> ServiceDef {
        ServiceDef::primary(Service::Battery).characteristic(
            CharDef::new(Characteristic::BatteryLevel, CharFlags::READ | CharFlags::NOTIFY)
                .io(noop())
                .descriptor(
                    DescDef::new(Descriptor::ClientCharacteristicConfiguration, Perm::READ_WRITE)
                        .io(noop()),
                ),
        )
    }

    #[test]
    fn include_order() {
        let mut r = Registry::new(&Config::default());
        let b = r.add(ServiceDef::primary(Service::HeartRate).include(1)).unwrap();
        let a = r.add(battery()).unwrap();
        let srv = r.register().unwrap();
        let (ra, rb) = (srv.service(a).unwrap(), srv.service(b).unwrap());
        assert!(ra.start() < rb.start());
        assert_eq!((ra.start().get(), ra.end().get()), (1, 4));
        assert_eq!((rb.start().get(), rb.end().get()), (5, 6));
        assert_eq!(srv.attrs().get(rb.end()).map(|e| e.typ()), Some(Declaration::Include.uuid()));
    }

    #[test]
    fn circular() {
        let mut r = Registry::new(&Config::default());
        r.add(ServiceDef::primary(Service::Battery).include(1)).unwrap();
        r.add(ServiceDef::primary(Service::HeartRate).include(0)).unwrap();
        r.add(ServiceDef::secondary(Service::TxPower)).unwrap();
        assert_matches!(r.register(), Err(Error::CircularDependency { unregistered: 2 }));

        let mut r = Registry::new(&Config::default());
        r.add(ServiceDef::primary(Service::Battery).include(0)).unwrap();
        assert_matches!(r.register(), Err(Error::CircularDependency { unregistered: 1 }));
    }

    #[test]
    fn invalid_definitions() {
        let mut r = Registry::new(&Config::default());
        let no_io = ServiceDef::primary(Service::Battery)
            .characteristic(CharDef::new(Characteristic::BatteryLevel, CharFlags::READ));
        assert_matches!(r.add(no_io), Err(Error::InvalidArgument(_)));
        let no_dsc_io = ServiceDef::primary(Service::Battery).characteristic(
            CharDef::new(Characteristic::BatteryLevel, CharFlags::READ)
                .io(noop())
                .descriptor(DescDef::new(Descriptor::CharacteristicUserDescription, Perm::READ)),
        );
        assert_matches!(r.add(no_dsc_io), Err(Error::InvalidArgument(_)));
        assert!(r.is_empty());

        r.add(ServiceDef::primary(Service::Battery).include(5)).unwrap();
        assert_matches!(r.register(), Err(Error::InvalidArgument(_)));
    }

    #[test]
    fn limits() {
        let cfg = Config {
            max_services: 1,
            max_attrs: 3,
            ..Config::default()
        };
        let mut r = Registry::new(&cfg);
        r.add(battery()).unwrap();
        assert_matches!(r.add(battery()), Err(Error::InvalidArgument(_)));
        assert_matches!(r.register(), Err(Error::Att(crate::att::Error::OutOfMemory)));
    }

    #[test]
    fn events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut r = Registry::new(&Config::default());
        let l = Arc::clone(&log);
        r.on_register(move |ev| l.lock().unwrap().push(*ev));
        r.add(battery()).unwrap();
        r.register().unwrap();
        let h = |v| Handle::new(v).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            [
                RegEvent::Service {
                    idx: 0,
                    uuid: Service::Battery.uuid(),
                    hdl: h(1)
                },
                RegEvent::Characteristic {
                    uuid: Characteristic::BatteryLevel.uuid(),
                    decl: h(2),
                    val: h(3)
                },
                RegEvent::Descriptor {
                    uuid: Descriptor::ClientCharacteristicConfiguration.uuid(),
                    hdl: h(4)
                },
            ]
        );
    }
}
