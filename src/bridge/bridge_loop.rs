//! Single-task loop between the telemetry socket and the virtual devices

use crate::config::LoopConfig;
use crate::device::{EventWriter, VirtualDeviceSink};
use crate::feedback::{FeedbackSource, ForceFeedbackBridge};
use crate::protocol::{decode_telemetry, encode_command, OutboundCommand};
use chrono::{DateTime, Local};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Counters since the last stats line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub packets: u64,
    pub discarded: u64,
    pub write_failures: u64,
    pub commands_sent: u64,
    pub commands_dropped: u64,
}

pub struct BridgeLoop<G, M> {
    socket: UdpSocket,
    sink: VirtualDeviceSink<G, M>,
    feedback: ForceFeedbackBridge,
    buffer: Vec<u8>,
    tick_interval: Duration,
    /// Feedback goes to whoever sent the latest telemetry
    last_sender: Option<SocketAddr>,
    stats: BridgeStats,
    last_log_time: DateTime<Local>,
}

impl<G, M> BridgeLoop<G, M>
where
    G: EventWriter + FeedbackSource,
    M: EventWriter,
{
    pub async fn bind(
        addr: SocketAddr,
        sink: VirtualDeviceSink<G, M>,
        config: &LoopConfig,
    ) -> Result<Self, BridgeError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| BridgeError::Bind { addr, source })?;
        info!("Listening for telemetry on {}", addr);
        Ok(Self::from_socket(socket, sink, config))
    }

    pub fn from_socket(socket: UdpSocket, sink: VirtualDeviceSink<G, M>, config: &LoopConfig) -> Self {
        Self {
            socket,
            sink,
            feedback: ForceFeedbackBridge::new(),
            buffer: vec![0; config.receive_buffer_len],
            tick_interval: config.tick_interval(),
            last_sender: None,
            stats: BridgeStats::default(),
            last_log_time: Local::now(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Ticks until `shutdown` resolves
    pub async fn run_until<F: Future>(mut self, shutdown: F) {
        info!(
            "Starting bridge loop with a {}ms tick",
            self.tick_interval.as_millis()
        );
        tokio::pin!(shutdown);

        loop {
            self.tick();
            self.log_stats();

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Bridge loop stopped");
                    return;
                }
                _ = tokio::time::sleep(self.tick_interval) => {}
            }
        }
    }

    /// One iteration: receive, decode, update devices, then relay feedback
    pub fn tick(&mut self) {
        self.receive();
        self.relay_feedback();
    }

    fn receive(&mut self) {
        let (len, sender) = match self.socket.try_recv_from(&mut self.buffer) {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!("UDP receive failed: {}", e);
                return;
            }
        };

        if self.last_sender != Some(sender) {
            info!("Controller now sending from {}", sender);
            self.last_sender = Some(sender);
        }

        match decode_telemetry(&self.buffer[..len]) {
            Ok(packet) => {
                self.stats.packets += 1;
                let failed = self.sink.update(&packet);
                self.stats.write_failures += failed as u64;
            }
            Err(e) => {
                self.stats.discarded += 1;
                debug!("Discarding datagram from {}: {}", sender, e);
            }
        }
    }

    fn relay_feedback(&mut self) {
        let commands = match self.sink.gamepad_mut().drain_feedback(&mut self.feedback) {
            Ok(commands) => commands,
            Err(e) => {
                error!("Failed to read force feedback requests: {}", e);
                return;
            }
        };

        for command in commands {
            self.send(command);
        }
    }

    fn send(&mut self, command: OutboundCommand) {
        let Some(target) = self.last_sender else {
            debug!("No controller address yet, dropping {:?}", command);
            self.stats.commands_dropped += 1;
            return;
        };

        match self.socket.try_send_to(&encode_command(command), target) {
            Ok(_) => {
                debug!("Sent {:?} to {}", command, target);
                self.stats.commands_sent += 1;
            }
            Err(e) => {
                warn!("Failed to send {:?} to {}: {}", command, target, e);
                self.stats.commands_dropped += 1;
            }
        }
    }

    fn log_stats(&mut self) {
        let log_interval = chrono::Duration::seconds(10);
        let now = Local::now();
        if now - self.last_log_time > log_interval {
            let stats = std::mem::take(&mut self.stats);
            info!(
                "Bridge stats: {} packets ({:.1}/sec), {} discarded, {} write failures, {} commands sent, {} dropped",
                stats.packets,
                stats.packets as f64 / log_interval.num_seconds() as f64,
                stats.discarded,
                stats.write_failures,
                stats.commands_sent,
                stats.commands_dropped
            );
            self.last_log_time = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mapping::STICK_RADIUS;
    use crate::device::sink::tests::RecordingWriter;
    use crate::feedback::{EffectState, FeedbackAction, FeedbackRequest};
    use crate::protocol::{StickPosition, TelemetryPacket, COMMAND_LEN, TELEMETRY_PACKET_LEN};
    use evdev::{AbsoluteAxisCode, EventType, InputEvent, KeyCode};
    use std::collections::VecDeque;

    /// Recording gamepad with a scripted force feedback queue
    #[derive(Default)]
    struct ScriptedGamepad {
        writer: RecordingWriter,
        queue: VecDeque<FeedbackRequest>,
    }

    impl EventWriter for ScriptedGamepad {
        fn write_event(&mut self, event: InputEvent) -> io::Result<()> {
            self.writer.write_event(event)
        }
    }

    impl FeedbackSource for ScriptedGamepad {
        fn drain_feedback(
            &mut self,
            bridge: &mut ForceFeedbackBridge,
        ) -> io::Result<Vec<OutboundCommand>> {
            let mut commands = Vec::new();
            while let Some(request) = self.queue.pop_front() {
                if let FeedbackAction::Send(command) = bridge.handle(request) {
                    commands.push(command);
                }
            }
            Ok(commands)
        }
    }

    type TestLoop = BridgeLoop<ScriptedGamepad, RecordingWriter>;

    async fn bridge_and_controller() -> (TestLoop, UdpSocket) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sink = VirtualDeviceSink::new(ScriptedGamepad::default(), RecordingWriter::default());
        let bridge = BridgeLoop::from_socket(socket, sink, &LoopConfig::default());
        let controller = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (bridge, controller)
    }

    async fn deliver(bridge: &mut TestLoop, controller: &UdpSocket, datagram: &[u8]) {
        let target = bridge.local_addr().unwrap();
        controller.send_to(datagram, target).await.unwrap();
        bridge.socket.readable().await.unwrap();
        bridge.tick();
    }

    fn pressed_sync_packet() -> TelemetryPacket {
        TelemetryPacket {
            buttons: 0x01,
            left_stick: StickPosition { x: 1.0, y: 0.0 },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn datagram_reaches_both_devices() {
        let (mut bridge, controller) = bridge_and_controller().await;
        deliver(&mut bridge, &controller, &pressed_sync_packet().encode()).await;

        let gamepad = &bridge.sink.gamepad_mut().writer;
        assert_eq!(
            gamepad.of_type(EventType::KEY),
            vec![(KeyCode::BTN_TRIGGER_HAPPY1.code(), 1)]
        );
        assert!(gamepad
            .of_type(EventType::ABSOLUTE)
            .contains(&(AbsoluteAxisCode::ABS_X.0, STICK_RADIUS)));
        assert_eq!(gamepad.of_type(EventType::SYNCHRONIZATION).len(), 1);

        let motion = &bridge.sink.motion_mut();
        assert!(motion.of_type(EventType::ABSOLUTE).iter().all(|&(_, value)| value == 0));
        assert_eq!(bridge.stats().packets, 1);
        assert_eq!(bridge.last_sender, Some(controller.local_addr().unwrap()));
    }

    #[tokio::test]
    async fn truncated_datagram_is_discarded() {
        let (mut bridge, controller) = bridge_and_controller().await;
        let packet = pressed_sync_packet().encode();
        deliver(&mut bridge, &controller, &packet[..TELEMETRY_PACKET_LEN - 1]).await;

        assert!(bridge.sink.gamepad_mut().writer.events.is_empty());
        assert!(bridge.sink.motion_mut().events.is_empty());
        assert_eq!(bridge.stats().discarded, 1);
        assert_eq!(bridge.stats().packets, 0);
    }

    #[tokio::test]
    async fn idle_socket_is_not_an_error() {
        let (mut bridge, _controller) = bridge_and_controller().await;
        bridge.tick();
        assert_eq!(bridge.stats(), BridgeStats::default());
    }

    #[tokio::test]
    async fn played_effect_goes_back_to_the_sender() {
        let (mut bridge, controller) = bridge_and_controller().await;
        deliver(&mut bridge, &controller, &TelemetryPacket::default().encode()).await;

        bridge.sink.gamepad_mut().queue.extend([
            FeedbackRequest::Upload(EffectState {
                duration_ms: 500,
                magnitude: u16::MAX,
            }),
            FeedbackRequest::Play {
                effect_id: 0,
                intensity: 1,
            },
        ]);
        bridge.socket.writable().await.unwrap();
        bridge.tick();

        let mut reply = [0u8; 16];
        let (len, from) = controller.recv_from(&mut reply).await.unwrap();
        assert_eq!(from, bridge.local_addr().unwrap());
        assert_eq!(len, COMMAND_LEN);
        assert_eq!(&reply[..len], &[1, 255, 0xF4, 0x01]);
        assert_eq!(bridge.stats().commands_sent, 1);
    }

    #[tokio::test]
    async fn feedback_without_sender_is_dropped() {
        let (mut bridge, _controller) = bridge_and_controller().await;
        bridge.sink.gamepad_mut().queue.push_back(FeedbackRequest::Play {
            effect_id: 0,
            intensity: 0,
        });
        bridge.tick();
        assert_eq!(bridge.stats().commands_dropped, 1);
        assert_eq!(bridge.stats().commands_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_the_loop() {
        let (bridge, _controller) = bridge_and_controller().await;
        tokio::time::timeout(
            Duration::from_secs(1),
            bridge.run_until(tokio::time::sleep(Duration::from_millis(55))),
        )
        .await
        .unwrap();
    }
}
