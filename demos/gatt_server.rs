//! Registers a battery service, advertises it, and discovers it from a second
//! host over an in-process loopback link.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tracing::info;

use bleat::att::{self, ErrorCode, ErrorRsp, Events, GroupAttr, Handle, Perm, DEFAULT_MTU};
use bleat::gap::{AdFields, AdvDataMut, AdvFlag};
use bleat::gatt::{CharDef, CharFlags, DescDef, Io, IoReq, Registry, ServiceDef};
use bleat::host::{Chan, Cid, Config, ConnHandle, Host, Transport, TxBuf};
use bleat_const::{Characteristic, Declaration, Descriptor, Service};

const SERVER: ConnHandle = ConnHandle(0x0001);
const CLIENT: ConnHandle = ConnHandle(0x0002);

/// One direction of the loopback link.
#[derive(Debug, Default)]
struct Loopback {
    queue: Mutex<VecDeque<Vec<u8>>>,
    peer_mtu: Mutex<Option<u16>>,
}

impl Transport for Loopback {
    fn find_channel(&self, cn: ConnHandle, cid: Cid) -> Option<Chan> {
        Some(Chan { cn, cid })
    }

    fn transmit(&self, _: Chan, buf: TxBuf) -> bleat::host::Result<()> {
        self.queue.lock().push_back(buf.as_ref().to_vec());
        Ok(())
    }

    fn channel_mtu(&self, _: Chan) -> u16 {
        self.peer_mtu.lock().map_or(DEFAULT_MTU, |m| m.min(247))
    }

    fn set_peer_mtu(&self, _: Chan, mtu: u16) {
        *self.peer_mtu.lock() = Some(mtu);
    }
}

impl Loopback {
    fn pop(&self) -> Option<Vec<u8>> {
        self.queue.lock().pop_front()
    }
}

/// Logs discovery results.
#[derive(Debug, Default)]
struct Discovery;

impl Events for Discovery {
    fn mtu_negotiated(&self, cn: ConnHandle, mtu: u16) {
        info!("{cn}: MTU {mtu}");
    }

    fn find_info_complete(&self, cn: ConnHandle, status: att::Result<()>, last: Option<Handle>) {
        info!("{cn}: find information complete ({status:?}, last {last:?})");
    }

    fn group_attr(&self, cn: ConnHandle, attr: &GroupAttr<'_>) {
        info!("{cn}: service {}..={} {:02X?}", attr.hdl, attr.end, attr.val);
    }

    fn read_rsp(&self, cn: ConnHandle, val: &[u8]) {
        info!("{cn}: read {val:02X?}");
    }

    fn error_rsp(&self, cn: ConnHandle, rsp: ErrorRsp) {
        info!("{cn}: {rsp}");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cfg = Config::default();

    let level = Arc::new(AtomicU8::new(87));
    let mut reg = Registry::new(&cfg);
    reg.on_register(|ev| info!("Registered {ev:?}"));
    let lvl = Arc::clone(&level);
    let flags = CharFlags::READ | CharFlags::WRITE | CharFlags::NOTIFY;
    reg.add(
        ServiceDef::primary(Service::Battery).characteristic(
            CharDef::new(Characteristic::BatteryLevel, flags)
                .io(Io::new(move |req| match req {
                    IoReq::Read(r) => r.complete([lvl.load(Ordering::Relaxed)]),
                    IoReq::Write(w) => {
                        let &[v] = w.value() else {
                            return Err(ErrorCode::InvalidAttributeValueLength);
                        };
                        lvl.store(v, Ordering::Relaxed);
                        Ok(())
                    }
                }))
                .descriptor(
                    DescDef::new(Descriptor::CharacteristicUserDescription, Perm::READ)
                        .io(Io::new(|req| match req {
                            IoReq::Read(r) => r.complete("Battery"),
                            IoReq::Write(_) => Err(ErrorCode::WriteNotPermitted),
                        })),
                ),
        ),
    )?;
    let srv = Arc::new(reg.register()?);
    let rng = srv.service(0).ok_or_else(|| anyhow!("battery service not registered"))?;

    let mut adv = AdvDataMut::new();
    (adv.flags(AdvFlag::LE_GENERAL | AdvFlag::NO_BREDR)?)
        .local_name(true, "bleat")?
        .tx_power(0)?;
    let f = AdFields::parse(adv.as_ref())?;
    info!("Advertising {:?} ({} bytes)", f.name_str(), adv.len());

    // Each host transmits into its own queue, which is delivered to the peer
    let (a_tr, b_tr) = (Arc::new(Loopback::default()), Arc::new(Loopback::default()));
    let a = Host::new(cfg.clone(), Arc::clone(&a_tr), Arc::new(Discovery), srv);
    let empty = Arc::new(Registry::new(&cfg).register()?);
    let b = Host::new(cfg.clone(), Arc::clone(&b_tr), Arc::new(Discovery), empty);
    let (a_conn, b_conn) = (a.connect(SERVER)?, b.connect(CLIENT)?);

    let c = b_conn.client();
    b_conn.exchange_mtu()?;
    c.read_by_group_type(1, u16::MAX, Declaration::PrimaryService)?;
    c.find_information(rng.start().get(), rng.end().get())?;
    c.write(3, &[42])?;
    c.read(3)?;
    c.read(0x00FF)?;
    loop {
        match (b_tr.pop(), a_tr.pop()) {
            (None, None) => break,
            (req, rsp) => {
                if let Some(pdu) = req {
                    a_conn.recv(&pdu)?;
                }
                if let Some(pdu) = rsp {
                    b_conn.recv(&pdu)?;
                }
            }
        }
    }
    let lvl = level.load(Ordering::Relaxed);
    info!("Discovered {} attribute(s), level is {lvl}", c.cache().len());
    b_conn.disconnect();
    a_conn.disconnect();
    Ok(())
}
