//! The local CANopen node handle (spec section 3: "the CANopen node handle
//! is created each time the supervisor enters BUS_UP_NETWORK_UP and
//! destroyed on any downgrade; all TPDO timers are owned by the node handle
//! and die with it").
//!
//! [`CanOpenNode`] composes the [`OdStore`], [`SdoDispatcher`], [`EmcyProducer`],
//! NMT state, and SYNC counter behind a single lock-owning [`Shared`] so the
//! receive loop, the SYNC handler, and every timed-TPDO [`TimerLoop`] can run
//! as independent tokio tasks (spec section 5's "single writer-owner per
//! mutable structure").

use std::sync::Arc;
use std::time::Duration;

use can_socket::tokio::CanSocket;
use can_socket::{CanFrame, CanId};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::dictionary::OdStore;
use crate::emcy::{EmcyCode, EmcyProducer};
use crate::id::CanBaseIdExt;
use crate::nmt::{self, NmtCommand, NmtState};
use crate::pdo::{PdoEngine, PdoError};
use crate::sdo::{ReadCallback, SdoDispatcher, WriteCallback};
use crate::sync::{self, SyncCounter};
use crate::timer::TimerLoop;

struct Shared {
    node_id: u8,
    socket: CanSocket,
    od: Mutex<OdStore>,
    sdo: Mutex<SdoDispatcher>,
    emcy: EmcyProducer,
    state: std::sync::Mutex<NmtState>,
    sync_counter: Mutex<SyncCounter>,
    reset_requested: std::sync::Mutex<Option<NmtCommand>>,
}

/// A running CANopen node: a bound transport plus the Object Dictionary,
/// SDO server, EMCY producer, and NMT/heartbeat/SYNC/TPDO machinery layered
/// on top of it.
pub struct CanOpenNode {
    shared: Arc<Shared>,
    stop: Arc<Notify>,
    heartbeat: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
    tpdo_timers: Vec<TimerLoop>,
}

impl std::fmt::Debug for CanOpenNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanOpenNode")
            .field("node_id", &self.shared.node_id)
            .field("state", &self.state())
            .field("tpdo_timers", &self.tpdo_timers.len())
            .finish()
    }
}

impl CanOpenNode {
    pub fn new(socket: CanSocket, od: OdStore) -> Self {
        let node_id = od.node_id();
        let shared = Arc::new(Shared {
            node_id,
            socket,
            od: Mutex::new(od),
            sdo: Mutex::new(SdoDispatcher::new()),
            emcy: EmcyProducer::new(node_id),
            state: std::sync::Mutex::new(NmtState::BootUp),
            sync_counter: Mutex::new(SyncCounter::new()),
            reset_requested: std::sync::Mutex::new(None),
        });
        Self { shared, stop: Arc::new(Notify::new()), heartbeat: None, receiver: None, tpdo_timers: Vec::new() }
    }

    pub fn node_id(&self) -> u8 {
        self.shared.node_id
    }

    pub fn state(&self) -> NmtState {
        *self.shared.state.lock().unwrap()
    }

    /// Borrow the Object Dictionary for resource-level reads/writes (spec
    /// section 5: OD mutations are serialized by this same lock).
    pub fn od(&self) -> &Mutex<OdStore> {
        &self.shared.od
    }

    pub async fn register_sdo_read(&self, name: &str, sub_name: Option<&str>, callback: ReadCallback) {
        let od = self.shared.od.lock().await;
        self.shared.sdo.lock().await.register_read(&od, name, sub_name, callback);
    }

    pub async fn register_sdo_write(&self, name: &str, sub_name: Option<&str>, callback: WriteCallback) {
        let od = self.shared.od.lock().await;
        self.shared.sdo.lock().await.register_write(&od, name, sub_name, callback);
    }

    /// A reset command (NMT `ResetNode`/`ResetCommunication`) received since
    /// the last call, if any. The supervisor polls this to decide whether to
    /// tear the node down and bring up a fresh one.
    pub fn take_reset_request(&self) -> Option<NmtCommand> {
        self.shared.reset_requested.lock().unwrap().take()
    }

    /// `send_tpdo(n, raise_on_network_down)` (spec section 4.2). Within a
    /// live node the network is always present by construction, so
    /// `raise_on_network_down` only matters to callers that hold a stale
    /// handle past a network downgrade.
    pub async fn send_tpdo(&self, n: u8, raise_on_network_down: bool) -> Result<(), PdoError> {
        send_tpdo(&self.shared, n, raise_on_network_down).await
    }

    /// `send_rpdo(n, raise_on_network_down)`: symmetric to `send_tpdo` using
    /// 0x1400/0x1600 — requests the RPDO's producer to transmit via an RTR
    /// frame on the slot's configured COB-ID.
    pub async fn send_rpdo(&self, n: u8, raise_on_network_down: bool) -> Result<(), PdoError> {
        send_rpdo(&self.shared, n, raise_on_network_down).await
    }

    /// `send_emcy` (spec section 4.4).
    pub async fn send_emcy(&self, code: EmcyCode, manufacturer_data: &[u8], raise_on_network_down: bool) -> Result<(), crate::emcy::EmcyError> {
        let mut od = self.shared.od.lock().await;
        self.shared.emcy.send_emcy(&self.shared.socket, &mut od, code, manufacturer_data, true, raise_on_network_down).await
    }

    /// Bring the node to OPERATIONAL: start the heartbeat (period from
    /// `OD[0x1017]`), spawn one [`TimerLoop`] per timed TPDO slot, subscribe
    /// the SYNC handler, and start the frame-receive loop. Mirrors spec
    /// section 4.5's DOWN -> UP_NET_DOWN -> UP_NET_UP transitions.
    pub async fn start(&mut self) {
        *self.shared.state.lock().unwrap() = NmtState::Operational;
        self.spawn_heartbeat().await;
        self.spawn_timed_tpdos().await;
        self.spawn_receiver();
    }

    /// Tear the node down: stop the receiver, heartbeat, and every TPDO
    /// timer. All TPDO timers die with the node (spec section 3).
    pub async fn stop(&mut self) {
        self.stop.notify_waiters();
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
        if let Some(handle) = self.receiver.take() {
            handle.abort();
        }
        for mut timer in self.tpdo_timers.drain(..) {
            timer.stop();
        }
        *self.shared.state.lock().unwrap() = NmtState::Stopped;
    }

    async fn spawn_heartbeat(&mut self) {
        let period_ms = {
            let mut od = self.shared.od.lock().await;
            od.raw_bytes(0x1017, None).ok().map(|b| bytes_to_u16_le(&b)).unwrap_or(0)
        };
        if period_ms == 0 {
            return;
        }
        let shared = self.shared.clone();
        let stop = self.stop.clone();
        self.heartbeat = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms as u64));
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stop.notified() => break,
                }
                let state = *shared.state.lock().unwrap();
                match nmt::heartbeat_frame(shared.node_id, state) {
                    Ok(frame) => {
                        if let Err(e) = shared.socket.send(&frame).await {
                            log::warn!("failed to send heartbeat: {e}");
                        }
                    }
                    Err(e) => log::warn!("failed to build heartbeat frame: {e}"),
                }
            }
        }));
    }

    async fn spawn_timed_tpdos(&mut self) {
        let slots: Vec<(u8, crate::pdo::TpdoParams)> = {
            let mut od = self.shared.od.lock().await;
            (1..=16u8).filter_map(|n| PdoEngine::read_tpdo_params(&mut od, n).ok().map(|p| (n, p))).collect()
        };
        for (n, params) in slots {
            let is_timed = matches!(params.transmission.to_u8(), 0xFE | 0xFF);
            if !is_timed || params.event_timer_ms == 0 {
                continue;
            }
            let shared = self.shared.clone();
            let period_ms = params.event_timer_ms as u64;
            let start_delay =
                (params.inhibit_time_100us > 0).then(|| Duration::from_micros(params.inhibit_time_100us as u64 * 100));

            let mut timer = TimerLoop::new(format!("tpdo{n}"));
            timer.start(
                move || Duration::from_millis(period_ms),
                start_delay,
                Box::new(move || {
                    let shared = shared.clone();
                    Box::pin(async move { send_tpdo(&shared, n, false).await.map_err(|e| e.to_string()) })
                }),
            );
            self.tpdo_timers.push(timer);
        }
    }

    fn spawn_receiver(&mut self) {
        let shared = self.shared.clone();
        let stop = self.stop.clone();
        self.receiver = Some(tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    frame = shared.socket.recv() => frame,
                    _ = stop.notified() => break,
                };
                match frame {
                    Ok(frame) => handle_frame(&shared, &frame).await,
                    Err(e) => log::warn!("CAN receive error: {e}"),
                }
            }
        }));
    }
}

impl Drop for CanOpenNode {
    fn drop(&mut self) {
        self.stop.notify_waiters();
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
        if let Some(handle) = self.receiver.take() {
            handle.abort();
        }
    }
}

async fn handle_frame(shared: &Shared, frame: &CanFrame) {
    let id = frame.id().as_u32();

    if id == sync::SYNC_COB_ID as u32 && !frame.is_rtr() {
        handle_sync(shared).await;
        return;
    }

    if id == nmt::NMT_COB_ID as u32 && !frame.is_rtr() {
        if let Some(command) = nmt::decode_nmt_frame(frame, shared.node_id) {
            match command.target_state() {
                Some(state) => *shared.state.lock().unwrap() = state,
                None => *shared.reset_requested.lock().unwrap() = Some(command),
            }
        }
        return;
    }

    // SDO requests always land on 0x600 + node ID; skip the dispatcher (and its
    // lock pair) entirely for anything else on the bus.
    let is_sdo_request = matches!(frame.id(), CanId::Standard(id) if id.function_code() == 0x600 && id.node_id() == shared.node_id);
    if is_sdo_request {
        let sdo_response = {
            let mut sdo = shared.sdo.lock().await;
            let mut od = shared.od.lock().await;
            sdo.handle_frame(&mut od, frame)
        };
        if let Some(response) = sdo_response {
            if let Err(e) = shared.socket.send(&response).await {
                log::warn!("failed to send SDO response: {e}");
            }
        }
        return;
    }

    for n in 1..=16u8 {
        let matches = {
            let mut od = shared.od.lock().await;
            PdoEngine::read_rpdo_params(&mut od, n).ok().filter(|p| p.enabled && p.cob_id as u32 == id).is_some()
        };
        if matches {
            let mut sdo = shared.sdo.lock().await;
            let mut od = shared.od.lock().await;
            if let Err(e) = PdoEngine::apply_rpdo_frame(&mut od, &mut sdo, n, frame) {
                log::warn!("RPDO{n} ingestion failed: {e}");
            }
            return;
        }
    }
}

/// SYNC dispatch: slots are walked 0..15 in order, so send order to the wire
/// mirrors slot order (spec section 5).
async fn handle_sync(shared: &Shared) {
    let counter = {
        let mut counter = shared.sync_counter.lock().await;
        counter.tick()
    };
    let transmission_types: Vec<u8> = {
        let mut od = shared.od.lock().await;
        (1..=16u8)
            .map(|n| PdoEngine::read_tpdo_params(&mut od, n).map(|p| p.transmission.to_u8()).unwrap_or(0))
            .collect()
    };
    for slot in sync::due_slots(counter, &transmission_types) {
        if let Err(e) = send_tpdo(shared, slot, false).await {
            log::warn!("SYNC-triggered TPDO{slot} failed: {e}");
        }
    }
}

async fn send_tpdo(shared: &Shared, n: u8, raise_on_network_down: bool) -> Result<(), PdoError> {
    let _ = raise_on_network_down; // the network is always present while this handle is alive
    if !(1..=16).contains(&n) {
        return Err(PdoError::InvalidSlot(n));
    }
    if *shared.state.lock().unwrap() != NmtState::Operational {
        return Ok(());
    }

    let built = {
        let mut sdo = shared.sdo.lock().await;
        let mut od = shared.od.lock().await;
        PdoEngine::build_tpdo_frame(&mut od, &mut sdo, n)
    };
    let frame = match built {
        Ok(frame) => frame,
        Err(PdoError::Disabled) | Err(PdoError::NotConfigured(_)) => return Ok(()),
        Err(PdoError::LengthExceeded(bits)) => {
            let mut od = shared.od.lock().await;
            let _ = shared.emcy.send_emcy(&shared.socket, &mut od, EmcyCode::PROTOCOL_PDO_LEN_EXCEEDED, &[], true, false).await;
            return Err(PdoError::LengthExceeded(bits));
        }
        Err(e) => return Err(e),
    };

    if let Err(e) = shared.socket.send(&frame).await {
        log::warn!("failed to send TPDO{n}: {e}");
    }
    Ok(())
}

async fn send_rpdo(shared: &Shared, n: u8, raise_on_network_down: bool) -> Result<(), PdoError> {
    let _ = raise_on_network_down;
    let params = {
        let mut od = shared.od.lock().await;
        PdoEngine::read_rpdo_params(&mut od, n)?
    };
    if *shared.state.lock().unwrap() != NmtState::Operational || !params.enabled {
        return Ok(());
    }
    let bit_total: u32 = params.mappings.iter().map(|m| m.bit_length as u32).sum();
    let data_len = bit_total.div_ceil(8) as u8;
    let frame = CanFrame::new_rtr(params.cob_id, data_len).map_err(|e| PdoError::Frame(e.to_string()))?;
    if let Err(e) = shared.socket.send(&frame).await {
        log::warn!("failed to send RPDO{n} RTR request: {e}");
    }
    Ok(())
}

fn bytes_to_u16_le(raw: &[u8]) -> u16 {
    let mut buf = [0u8; 2];
    let len = raw.len().min(2);
    buf[..len].copy_from_slice(&raw[..len]);
    u16::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::OdStore;

    fn eds_with_tpdo1(node_id: u8) -> String {
        format!(
            "[2000]\nParameterName=Value\nObjectType=0x7\nDataType=0x6\nAcessType=rw\nDefaultValue=0x1234\nPDOMapping=1\n\n\
             [1800]\nParameterName=TPDO1 comm\nObjectType=0x9\n\n\
             [1800sub1]\nParameterName=COB-ID\nObjectType=0x7\nDataType=0x7\nAcessType=rw\nDefaultValue=$NODEID+0x180\n\n\
             [1800sub2]\nParameterName=Transmission type\nObjectType=0x7\nDataType=0x5\nAcessType=rw\nDefaultValue=3\n\n\
             [1A00]\nParameterName=TPDO1 mapping\nObjectType=0x9\n\n\
             [1A00sub0]\nParameterName=count\nObjectType=0x7\nDataType=0x5\nAcessType=ro\nDefaultValue=1\n\n\
             [1A00sub1]\nParameterName=map1\nObjectType=0x7\nDataType=0x7\nAcessType=ro\nDefaultValue={m1}\n",
            m1 = crate::pdo::PdoMapping { object: crate::ObjectIndex::new(0x2000, 0), bit_length: 16 }.to_u32(),
        )
        .replace("$NODEID", &node_id.to_string())
    }

    #[tokio::test]
    async fn invalid_tpdo_slots_are_rejected() {
        let socket = CanSocket::bind_all().unwrap();
        let od = OdStore::load(0x10, &eds_with_tpdo1(0x10)).unwrap();
        let node = CanOpenNode::new(socket, od);
        assert_eq!(node.send_tpdo(0, false).await, Err(PdoError::InvalidSlot(0)));
        assert_eq!(node.send_tpdo(17, false).await, Err(PdoError::InvalidSlot(17)));
    }

    #[tokio::test]
    async fn tpdo_send_is_silent_before_operational() {
        let socket = CanSocket::bind_all().unwrap();
        let od = OdStore::load(0x10, &eds_with_tpdo1(0x10)).unwrap();
        let node = CanOpenNode::new(socket, od);
        // Node starts in BootUp, not Operational: send_tpdo must return Ok(())
        // without attempting to transmit (no bound vcan interface is needed).
        assert_eq!(node.send_tpdo(1, false).await, Ok(()));
    }
}
