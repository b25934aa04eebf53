//! Inbound frame dispatcher
//!
//! One task per link consumes the transport's inbound stream. Each frame is
//! decoded, applied to the session, matched against the pending command and
//! turned into events. When the stream ends the link is reported closed.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use navibelt_core::{
    BeltEvent, ConnectionEffect, ConnectionEvent, ConnectionState, DeviceMessage, InboundItem, InboundStream,
    MalformedFrame, ModeChangeCause, OperatingMode, RawFrame, Request,
};

use crate::session::{MessageEffects, Session};

/// Error text reported when the link ends without a reason
const CONNECTION_LOST: &str = "connection lost";

/// Spawn the dispatcher of the link generation `epoch`
pub(crate) fn spawn_dispatcher(session: Arc<Mutex<Session>>, epoch: u64, inbound: InboundStream) -> JoinHandle<()> {
    tokio::spawn(run_dispatcher(session, epoch, inbound))
}

async fn run_dispatcher(session: Arc<Mutex<Session>>, epoch: u64, mut inbound: InboundStream) {
    debug!("Dispatcher for link {} started", epoch);
    let reason = loop {
        match inbound.next().await {
            Some(InboundItem::Frame(frame)) => handle_frame(&session, epoch, frame).await,
            Some(InboundItem::Malformed(malformed)) => report_malformed(&session, epoch, malformed).await,
            Some(InboundItem::Failed(error)) => break Some(error.to_string()),
            None => break None,
        }
    };
    finish_link(&session, epoch, reason).await;
    debug!("Dispatcher for link {} finished", epoch);
}

async fn handle_frame(session: &Arc<Mutex<Session>>, epoch: u64, frame: RawFrame) {
    trace!("Received {}", frame);
    let (effects, closing, transport) = {
        let mut session = session.lock().await;
        if session.epoch() != epoch {
            return;
        }
        let acknowledged = session.matches_pending(&frame).cloned();
        let effects = match DeviceMessage::decode(&frame) {
            Ok(message) => session.apply_message(&message, acknowledged.as_ref()),
            Err(error) => {
                if acknowledged.is_none() {
                    warn!("Undecodable frame {}: {}", frame, error);
                    session.emit(BeltEvent::MalformedFrame(MalformedFrame::new(
                        Some(frame.characteristic),
                        frame.payload.clone(),
                        error.to_string(),
                    )));
                }
                MessageEffects::default()
            }
        };
        session.resolve_with(&frame);

        let mut closing = false;
        if effects.powered_off && session.state() == ConnectionState::Connected {
            info!("Belt is switching off, closing the link");
            match session.apply(ConnectionEvent::DisconnectRequested) {
                Ok(_) => {
                    session.emit(BeltEvent::ConnectionStateChanged {
                        state: ConnectionState::Disconnecting,
                        error: None,
                    });
                    closing = true;
                }
                Err(error) => debug!("Power-off ignored: {}", error),
            }
        }
        (effects, closing, session.transport())
    };

    let Some(transport) = transport else {
        return;
    };
    if closing {
        if let Err(error) = transport.close().await {
            debug!("Closing link after power-off: {}", error);
        }
    } else if effects.reply_keep_alive {
        if let Err(error) = transport.send(Request::KeepAliveResponse.encode()).await {
            warn!("Failed to answer keep-alive: {}", error);
        }
    }
}

async fn report_malformed(session: &Arc<Mutex<Session>>, epoch: u64, malformed: MalformedFrame) {
    warn!("Malformed data on link: {}", malformed);
    let session = session.lock().await;
    if session.epoch() == epoch {
        session.emit(BeltEvent::MalformedFrame(malformed));
    }
}

/// Report the end of link `epoch` to the session
///
/// Used by the dispatcher when the inbound stream ends, and by the controller
/// when a link does not close in time.
pub(crate) async fn finish_link(session: &Arc<Mutex<Session>>, epoch: u64, reason: Option<String>) {
    let transport = {
        let mut session = session.lock().await;
        if session.epoch() != epoch {
            return;
        }
        let left_app_mode = session.mode() == Some(OperatingMode::AppMode);
        let transition = match session.apply(ConnectionEvent::LinkClosed { reason: reason.clone() }) {
            Ok(transition) => transition,
            Err(error) => {
                debug!("Link {} closed after session ended: {}", epoch, error);
                return;
            }
        };

        let error = if transition.unsolicited {
            let reason = reason.unwrap_or_else(|| CONNECTION_LOST.to_string());
            warn!("Link to belt lost: {}", reason);
            // The belt falls back to wait mode when the app link drops
            if left_app_mode {
                session.emit(BeltEvent::ModeChanged {
                    mode: OperatingMode::Wait,
                    cause: ModeChangeCause::Implicit,
                });
            }
            Some(reason)
        } else {
            info!("Disconnected from belt");
            None
        };
        session.emit(BeltEvent::ConnectionStateChanged {
            state: ConnectionState::Disconnected,
            error,
        });

        let transport = session.detach();
        transport.filter(|_| transition.effects.contains(&ConnectionEffect::CloseLink))
    };

    if let Some(transport) = transport {
        if let Err(error) = transport.close().await {
            debug!("Closing lost link: {}", error);
        }
    }
}
