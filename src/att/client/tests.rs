use matches::assert_matches;

use bleat_const::{Declaration, Descriptor, Service, Uuid16};

use crate::host::MockTransport;

use super::*;

const CN: ConnHandle = ConnHandle(0x0040);

#[derive(Debug, Default)]
struct Recorder {
    mtu: SyncMutex<Vec<u16>>,
    find_info: SyncMutex<Vec<(bool, Option<Handle>)>>,
    groups: SyncMutex<Vec<(u16, u16, Vec<u8>)>>,
    reads: SyncMutex<Vec<Vec<u8>>>,
    errors: SyncMutex<Vec<ErrorRsp>>,
}

impl Events for Recorder {
    fn mtu_negotiated(&self, cn: ConnHandle, mtu: u16) {
        assert_eq!(cn, CN);
        self.mtu.lock().push(mtu);
    }

    fn find_info_complete(&self, _: ConnHandle, status: Result<()>, last: Option<Handle>) {
        self.find_info.lock().push((status.is_ok(), last));
    }

    fn group_attr(&self, _: ConnHandle, attr: &GroupAttr<'_>) {
        (self.groups.lock()).push((attr.hdl.get(), attr.end.get(), attr.val.to_vec()));
    }

    fn read_rsp(&self, _: ConnHandle, val: &[u8]) {
        self.reads.lock().push(val.to_vec());
    }

    fn error_rsp(&self, _: ConnHandle, rsp: ErrorRsp) {
        self.errors.lock().push(rsp);
    }
}

struct Fixture {
    tr: Arc<MockTransport>,
    bufs: Arc<BufPool>,
    entries: Arc<Pool>,
    client: Client<MockTransport>,
}

fn fixture(n_bufs: usize, n_entries: usize) -> Fixture {
    let tr = Arc::new(MockTransport::new(CN));
    let bufs = Arc::new(BufPool::new(n_bufs, 64));
    let entries = Pool::new("entry", n_entries);
    let client = Client::new(CN, Arc::clone(&tr), Arc::clone(&bufs), Arc::clone(&entries));
    Fixture {
        tr,
        bufs,
        entries,
        client,
    }
}

fn hdl(h: u16) -> Handle {
    Handle::new(h).unwrap()
}

#[test]
fn cache_order() {
    let mut c = Cache::new(Pool::new("entry", 8));
    let uuids = [
        (7, Service::Battery.uuid()),
        (2, Declaration::PrimaryService.uuid()),
        (5, Descriptor::ClientCharacteristicConfiguration.uuid()),
        (3, Declaration::Characteristic.uuid()),
    ];
    for (h, u) in uuids {
        c.insert(hdl(h), u).unwrap();
    }
    let v: Vec<_> = c.iter().map(|(h, _)| h.get()).collect();
    assert_eq!(v, [2, 3, 5, 7]);
    for (h, u) in uuids {
        assert_eq!(c.find_by_uuid(u), Some(hdl(h)));
    }
    assert_eq!(c.find_by_uuid(Uuid16::new(0x2803).unwrap()), Some(hdl(3)));
    assert_eq!(c.find_by_uuid(Service::HeartRate), None);
}

#[test]
fn cache_duplicate() {
    let mut c = Cache::new(Pool::new("entry", 8));
    c.insert(hdl(1), Service::Battery).unwrap();
    assert_matches!(
        c.insert(hdl(1), Service::HeartRate),
        Err(Error::AlreadyExists(h)) if h == hdl(1)
    );
    assert_eq!(c.len(), 1);
    assert_eq!(c.get(hdl(1)), Some(Service::Battery.uuid()));
}

#[test]
fn cache_pool() {
    let pool = Pool::new("entry", 2);
    let mut c = Cache::new(Arc::clone(&pool));
    c.insert(hdl(1), Service::Battery).unwrap();
    c.insert(hdl(2), Service::Battery).unwrap();
    assert_matches!(c.insert(hdl(3), Service::Battery), Err(Error::OutOfMemory));
    assert_eq!(pool.in_use(), 2);
    c.clear();
    assert!(c.is_empty());
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn send_requests() {
    let f = fixture(4, 8);
    f.client.exchange_mtu(185).unwrap();
    f.client.find_information(1, 0xFFFF).unwrap();
    f.client.read(3).unwrap();
    (f.client.read_by_group_type(1, 0xFFFF, Declaration::PrimaryService)).unwrap();
    assert_eq!(
        f.tr.take(),
        [
            vec![0x02, 0xB9, 0x00],
            vec![0x04, 0x01, 0x00, 0xFF, 0xFF],
            vec![0x0A, 0x03, 0x00],
            vec![0x10, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28],
        ]
    );
    assert_eq!(f.bufs.available(), 4);
}

#[test]
fn send_invalid() {
    let f = fixture(4, 8);
    assert_matches!(f.client.exchange_mtu(22), Err(Error::InvalidArgument(_)));
    assert_matches!(f.client.find_information(0, 5), Err(Error::InvalidArgument(_)));
    assert_matches!(f.client.find_information(6, 5), Err(Error::InvalidArgument(_)));
    assert_matches!(f.client.read(0), Err(Error::InvalidArgument(_)));
    assert_matches!(
        f.client.read_by_group_type(9, 1, Declaration::PrimaryService),
        Err(Error::InvalidArgument(_))
    );
    assert!(f.tr.take().is_empty());
}

#[test]
fn send_no_leak() {
    let f = fixture(1, 8);
    let held = f.bufs.acquire(23).unwrap();
    assert_matches!(f.client.read(1), Err(Error::OutOfMemory));
    drop(held);

    f.tr.fail();
    assert_matches!(f.client.read(1), Err(Error::Transport(_)));
    assert_eq!(f.bufs.available(), 1);

    f.tr.disconnect(CN);
    assert_matches!(f.client.read(1), Err(Error::NotConnected(CN)));
    assert_eq!(f.bufs.available(), 1);
}

#[test]
fn recv_mtu() {
    let f = fixture(1, 8);
    let ev = Recorder::default();
    f.client.recv(&[0x03, 0x00, 0x02], &ev).unwrap();
    assert_eq!(f.tr.peer_mtu(), Some(512));
    assert_eq!(*ev.mtu.lock(), [crate::host::MOCK_LOCAL_MTU]);
    assert_matches!(f.client.recv(&[0x03, 0x17], &ev), Err(Error::BadLength { .. }));
}

#[test]
fn recv_find_info() {
    let f = fixture(1, 8);
    let ev = Recorder::default();
    let mut pdu = vec![0x05, 0x01];
    for h in [3_u16, 1, 2] {
        pdu.extend_from_slice(&h.to_le_bytes());
        pdu.extend_from_slice(&(0x2900 + h).to_le_bytes());
    }
    f.client.recv(&pdu, &ev).unwrap();
    let cache = f.client.cache();
    let v: Vec<_> = cache.iter().map(|(h, u)| (h.get(), u.as_u16())).collect();
    assert_eq!(v, [(1, Some(0x2901)), (2, Some(0x2902)), (3, Some(0x2903))]);
    drop(cache);
    assert_eq!(*ev.find_info.lock(), [(true, Some(hdl(2)))]);
    assert_eq!(f.entries.in_use(), 3);
}

#[test]
fn recv_mtu_below_default() {
    let f = fixture(1, 8);
    let ev = Recorder::default();
    f.client.recv(&[0x03, 0x10, 0x00], &ev).unwrap();
    assert_eq!(f.tr.peer_mtu(), Some(DEFAULT_MTU));
    assert_eq!(*ev.mtu.lock(), [DEFAULT_MTU]);
}

#[test]
fn recv_find_info_uuid128() {
    const CUSTOM: u128 = 0x6E40_0003_B5A3_F393_E0A9_E50E_24DC_CA9E;
    let f = fixture(1, 8);
    let ev = Recorder::default();
    let mut pdu = vec![0x05, 0x02, 0x07, 0x00];
    pdu.extend_from_slice(&CUSTOM.to_le_bytes());
    f.client.recv(&pdu, &ev).unwrap();
    let custom = Uuid::new(CUSTOM).unwrap();
    assert_eq!(f.client.cache().find_by_uuid(custom), Some(hdl(7)));
    assert_eq!(f.client.cache().get(hdl(7)), Some(custom));
    assert_eq!(f.client.cache().find_by_uuid(Declaration::Characteristic), None);
    assert_eq!(*ev.find_info.lock(), [(true, Some(hdl(7)))]);
}

#[test]
fn recv_find_info_truncated() {
    let f = fixture(1, 8);
    let ev = Recorder::default();
    let pdu = [0x05, 0x01, 0x01, 0x00, 0x00, 0x28, 0x02, 0x00, 0x03];
    assert_matches!(f.client.recv(&pdu, &ev), Err(Error::BadData));
    assert_eq!(f.client.cache().len(), 1);
    assert_eq!(*ev.find_info.lock(), [(false, Some(hdl(1)))]);
}

#[test]
fn recv_find_info_duplicate() {
    let f = fixture(1, 8);
    let ev = Recorder::default();
    let pdu = [0x05, 0x01, 0x01, 0x00, 0x00, 0x28, 0x01, 0x00, 0x03, 0x28];
    assert_matches!(f.client.recv(&pdu, &ev), Err(Error::AlreadyExists(_)));
    assert_eq!(*ev.find_info.lock(), [(false, Some(hdl(1)))]);

    // Header failure is still reported
    assert_matches!(f.client.recv(&[0x05, 0x07], &ev), Err(Error::BadData));
    assert_eq!(ev.find_info.lock().last(), Some(&(false, None)));
}

#[test]
fn recv_group_type() {
    let f = fixture(1, 8);
    let ev = Recorder::default();
    let pdu = [
        0x11, 0x06, 0x01, 0x00, 0x05, 0x00, 0x00, 0x18, 0x06, 0x00, 0x09, 0x00, 0x0F,
    ];
    assert_matches!(f.client.recv(&pdu, &ev), Err(Error::BadLength { have: 5, need: 6 }));
    assert_eq!(*ev.groups.lock(), [(1, 5, vec![0x00, 0x18])]);
}

#[test]
fn recv_read_and_error() {
    let f = fixture(1, 8);
    let ev = Recorder::default();
    f.client.recv(&[0x0B, 1, 2, 3], &ev).unwrap();
    f.client.recv(&[0x01, 0x0A, 0x03, 0x00, 0x02], &ev).unwrap();
    assert_eq!(*ev.reads.lock(), [vec![1, 2, 3]]);
    assert_eq!(
        *ev.errors.lock(),
        [ErrorRsp::new(Opcode::ReadReq, Some(hdl(3)), ErrorCode::ReadNotPermitted)]
    );
    assert_matches!(f.client.recv(&[0x0A, 0x01, 0x00], &ev), Err(Error::BadData));
    assert_matches!(f.client.recv(&[], &ev), Err(Error::BadLength { have: 0, .. }));
}
