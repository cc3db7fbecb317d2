use crate::event::{CongestionEvent, CongestionReport};
use crate::proto::p4runtime::{stream_message_response, StreamMessageResponse};
use crate::report::Reporter;
use crate::util::queue::EventQueue;
use crate::util::Shutdown;
use log::{debug, info, warn};
use rusty_p4_ecn_packet::{Ethernet, MalformedTelemetry, Telemetry, ETHERNET_HEADER_LEN};
use serde::Serialize;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub const DEFAULT_TELEMETRY_ETHER_TYPE: u16 = 0x2333;

#[derive(Debug, Eq, PartialEq)]
pub enum Classified {
    Telemetry(CongestionEvent),
    /// Not a packet-in, or not carrying the telemetry ethertype.
    Discarded,
    Malformed(MalformedTelemetry),
}

pub fn classify(message: &StreamMessageResponse, ether_type: u16) -> Classified {
    let packet = match &message.update {
        Some(stream_message_response::Update::Packet(packet)) => packet,
        _ => return Classified::Discarded,
    };
    match Ethernet::<()>::peek_ether_type(&packet.payload) {
        Some(t) if t == ether_type => {}
        _ => return Classified::Discarded,
    }
    match Telemetry::decode(&packet.payload[ETHERNET_HEADER_LEN..]) {
        Ok(record) => Classified::Telemetry(record.into()),
        Err(e) => Classified::Malformed(e),
    }
}

/// Counters of one duty cycle, returned when it ends.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct MonitorStats {
    pub switch: String,
    pub received: u64,
    pub discarded: u64,
    pub reported: u64,
    pub malformed: u64,
    /// Messages the event queue displaced before they were read.
    pub dropped: u64,
    /// The event queue closed under the monitor rather than shutdown ending it.
    pub stream_ended: bool,
}

/// Drains one session's event queue, forwarding telemetry to the report writer.
pub struct Monitor {
    switch: String,
    events: Arc<EventQueue<StreamMessageResponse>>,
    ether_type: u16,
    reports: UnboundedSender<CongestionReport>,
}

impl Monitor {
    pub fn new(
        switch: &str,
        events: Arc<EventQueue<StreamMessageResponse>>,
        ether_type: u16,
        reports: UnboundedSender<CongestionReport>,
    ) -> Monitor {
        Monitor {
            switch: switch.to_owned(),
            events,
            ether_type,
            reports,
        }
    }

    /// Runs until `shutdown` fires or the queue is closed and drained. The
    /// latter is flagged in the returned stats.
    pub async fn run(self, shutdown: Shutdown) -> MonitorStats {
        let mut stats = MonitorStats {
            switch: self.switch.clone(),
            ..Default::default()
        };
        info!(target: "monitor", "monitoring {}", self.switch);
        loop {
            let message = select! {
                _ = shutdown.wait() => break,
                message = self.events.recv() => match message {
                    Some(message) => message,
                    None => {
                        stats.stream_ended = true;
                        break;
                    }
                },
            };
            stats.received += 1;
            match classify(&message, self.ether_type) {
                Classified::Telemetry(event) => {
                    let report = CongestionReport {
                        switch: self.switch.clone(),
                        event,
                    };
                    if self.reports.send(report).is_err() {
                        warn!(target: "monitor", "{}: report writer is gone", self.switch);
                        break;
                    }
                    stats.reported += 1;
                }
                Classified::Discarded => {
                    debug!(target: "monitor", "{}: discarded {:?}", self.switch, message.update);
                    stats.discarded += 1;
                }
                Classified::Malformed(e) => {
                    warn!(target: "monitor", "{}: dropping telemetry, {}", self.switch, e);
                    stats.malformed += 1;
                }
            }
        }
        stats.dropped = self.events.dropped();
        if stats.dropped > 0 {
            warn!(
                target: "monitor",
                "{}: event queue overflowed, {} message(s) lost",
                self.switch, stats.dropped
            );
        }
        info!(target: "monitor", "{} done: {:?}", self.switch, stats);
        stats
    }
}

/// The single consumer of every monitor's reports. Returns the reporter once
/// all senders are gone.
pub async fn write_reports<R: Reporter>(
    mut reporter: R,
    mut reports: UnboundedReceiver<CongestionReport>,
) -> R {
    while let Some(report) = reports.recv().await {
        reporter.report(report);
    }
    reporter.flush();
    reporter
}
