//! Outbound commands and the transport seam.
//!
//! Commands are framed as the platform's `data_services` request:
//!
//! ```text
//! { "refid": "<uuid>", "service": "registration", "method": "register",
//!   "args": { "register_as": "driver", "car_id": 1, "car_class_id": 2, "session_id": 3 } }
//! ```
//!
//! The socket itself belongs to whoever owns the connection; this crate only
//! hands framed requests across [`Transport`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::info;

use crate::error::TransportError;

/// Socket event name every framed request is emitted under.
pub const DATA_SERVICES_EVENT: &str = "data_services";

/// Arguments of a register command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCommand {
    pub season_name: String,
    pub car_id: i64,
    pub car_class_id: i64,
    pub session_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsession_id: Option<i64>,
}

/// An outbound command, before framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum OutboundCommand {
    Withdraw,
    Register(RegisterCommand),
    /// Starts the popular-sessions push feed.
    SubscribePopularSessions,
}

/// A framed `data_services` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataServicesRequest {
    pub refid: String,
    pub service: String,
    pub method: String,
    pub args: Value,
}

impl OutboundCommand {
    /// Frame with a fresh `refid`.
    pub fn frame(&self) -> DataServicesRequest {
        self.frame_with_refid(uuid::Uuid::new_v4().to_string())
    }

    pub fn frame_with_refid(&self, refid: String) -> DataServicesRequest {
        let (service, method, args) = match self {
            OutboundCommand::Withdraw => ("registration", "withdraw", json!({})),
            OutboundCommand::Register(cmd) => {
                let mut args = json!({
                    "register_as": "driver",
                    "car_id": cmd.car_id,
                    "car_class_id": cmd.car_class_id,
                    "session_id": cmd.session_id,
                });
                if let Some(subsession_id) = cmd.subsession_id.filter(|id| *id > 0) {
                    args["subsession_id"] = json!(subsession_id);
                }
                ("registration", "register", args)
            }
            OutboundCommand::SubscribePopularSessions => (
                "season",
                "popular_sessions",
                json!({ "include_empty_practice": false, "subscribe": true }),
            ),
        };
        DataServicesRequest {
            refid,
            service: service.to_string(),
            method: method.to_string(),
            args,
        }
    }
}

/// Where outbound commands go.
///
/// Fire-and-forget: an `Ok` means the command was handed off, not that the
/// platform accepted it.
pub trait Transport: Send + Sync {
    fn send(&self, command: OutboundCommand) -> Result<(), TransportError>;

    fn withdraw(&self) -> Result<(), TransportError> {
        info!("withdrawing from current session");
        self.send(OutboundCommand::Withdraw)
    }

    fn register(&self, command: RegisterCommand) -> Result<(), TransportError> {
        info!(session_id = command.session_id, "registering for {}", command.season_name);
        self.send(OutboundCommand::Register(command))
    }
}

/// Forwards framed requests to the connection owner over a channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<DataServicesRequest>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<DataServicesRequest>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DataServicesRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, command: OutboundCommand) -> Result<(), TransportError> {
        self.tx
            .send(command.frame())
            .map_err(|_| TransportError::Closed)
    }
}

/// Joins a live session. Implemented by whatever drives the client UI.
pub trait JoinControl: Send + Sync {
    fn join(&self, subsession_id: i64) -> Result<(), TransportError>;
}

/// Forwards join requests over a channel.
#[derive(Debug, Clone)]
pub struct ChannelJoinControl {
    tx: mpsc::UnboundedSender<i64>,
}

impl ChannelJoinControl {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<i64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl JoinControl for ChannelJoinControl {
    fn join(&self, subsession_id: i64) -> Result<(), TransportError> {
        self.tx.send(subsession_id).map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(subsession_id: Option<i64>) -> OutboundCommand {
        OutboundCommand::Register(RegisterCommand {
            season_name: "SeasonX".to_string(),
            car_id: 1,
            car_class_id: 2,
            session_id: 9001,
            subsession_id,
        })
    }

    #[test]
    fn withdraw_frames_empty_args() {
        let req = OutboundCommand::Withdraw.frame_with_refid("r1".to_string());
        assert_eq!(req.service, "registration");
        assert_eq!(req.method, "withdraw");
        assert_eq!(req.args, json!({}));
        assert_eq!(req.refid, "r1");
    }

    #[test]
    fn register_omits_unknown_subsession() {
        let req = register(None).frame();
        assert_eq!(req.method, "register");
        assert_eq!(
            req.args,
            json!({ "register_as": "driver", "car_id": 1, "car_class_id": 2, "session_id": 9001 })
        );
    }

    #[test]
    fn register_omits_zero_subsession() {
        let req = register(Some(0)).frame();
        assert!(req.args.get("subsession_id").is_none());
        assert_eq!(req.args["session_id"], 9001);
    }

    #[test]
    fn register_includes_known_subsession() {
        let req = register(Some(55)).frame();
        assert_eq!(req.args["subsession_id"], 55);
    }

    #[test]
    fn subscribe_requests_popular_sessions() {
        let req = OutboundCommand::SubscribePopularSessions.frame();
        assert_eq!(req.service, "season");
        assert_eq!(req.method, "popular_sessions");
        assert_eq!(req.args["subscribe"], true);
        assert_eq!(req.args["include_empty_practice"], false);
    }

    #[test]
    fn every_frame_gets_a_fresh_refid() {
        let a = OutboundCommand::Withdraw.frame();
        let b = OutboundCommand::Withdraw.frame();
        assert_ne!(a.refid, b.refid);
    }

    #[test]
    fn channel_transport_reports_closed_receiver() {
        let (transport, rx) = ChannelTransport::channel();
        drop(rx);
        assert_eq!(transport.withdraw(), Err(TransportError::Closed));
    }
}
