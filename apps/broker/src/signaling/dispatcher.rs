//! Per-frame routing: join/leave rooms, relay to one target, fan out to a
//! room, or emit a machine-readable error back to the sender.
//!
//! The dispatcher never writes to a transport. It enqueues onto per-client
//! outbound queues; one peer's misbehavior or slowness therefore cannot
//! stall another's session.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::signaling::frames::{self, reason, InboundFrame, Parsed, ServerFrame};
use crate::signaling::registry::{ClientHandle, ClientRegistry};
use crate::signaling::rooms::{JoinOutcome, RoomIndex};

pub struct Dispatcher {
    registry: Arc<ClientRegistry>,
    rooms: Arc<RoomIndex>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ClientRegistry>, rooms: Arc<RoomIndex>) -> Self {
        Self { registry, rooms }
    }

    /// Handle one inbound text frame from `sender`.
    pub fn dispatch(&self, sender: &Arc<ClientHandle>, text: &str) {
        if !sender.bucket.lock().try_consume() {
            sender.send_frame(&ServerFrame::Error {
                message: reason::RATE_LIMIT,
                to: None,
            });
            return;
        }

        match frames::parse(text) {
            Parsed::Frame(frame) => self.dispatch_frame(sender, frame),
            Parsed::NonJson => self.fan_out_text(sender, text.to_string()),
            Parsed::Invalid => sender.send_frame(&ServerFrame::Error {
                message: reason::INVALID_MESSAGE,
                to: None,
            }),
        }
    }

    /// Handle a non-UTF-8 binary frame: roomed senders have the bytes fanned
    /// out verbatim, roomless senders are dropped.
    pub fn dispatch_binary(&self, sender: &Arc<ClientHandle>, bytes: Vec<u8>) {
        if !sender.bucket.lock().try_consume() {
            sender.send_frame(&ServerFrame::Error {
                message: reason::RATE_LIMIT,
                to: None,
            });
            return;
        }
        let Some(room) = sender.room() else { return };
        self.for_each_peer(&room, &sender.id, |peer| peer.send_binary(bytes.clone()));
    }

    fn dispatch_frame(&self, sender: &Arc<ClientHandle>, frame: InboundFrame) {
        match frame.kind.as_str() {
            "join-room" => self.join_room(sender, &frame),
            "leave-room" => self.leave_room(sender),
            _ => match frame.to {
                Some(target_id) => self.relay(sender, target_id, frame.fields),
                None => self.fan_out_frame(sender, frame.fields),
            },
        }
    }

    fn join_room(&self, sender: &Arc<ClientHandle>, frame: &InboundFrame) {
        let name = match frame.fields.get("room") {
            Some(Value::String(s)) => s.clone(),
            _ => {
                sender.send_frame(&ServerFrame::Error {
                    message: reason::INVALID_ROOM_NAME,
                    to: None,
                });
                return;
            }
        };

        match self.rooms.join(sender, &name) {
            JoinOutcome::InvalidName => sender.send_frame(&ServerFrame::Error {
                message: reason::INVALID_ROOM_NAME,
                to: None,
            }),
            JoinOutcome::RoomFull => sender.send_frame(&ServerFrame::Error {
                message: reason::ROOM_FULL,
                to: None,
            }),
            JoinOutcome::Rejoined { peers } => {
                sender.send_frame(&ServerFrame::RoomJoined { room: name });
                sender.send_frame(&ServerFrame::RoomPeers { peers });
            }
            JoinOutcome::Joined { peers, left } => {
                if let Some((old, remaining)) = left {
                    tracing::debug!(client_id = %sender.id, room = %old, "left room");
                    self.announce_leave(&remaining, &sender.id);
                }
                tracing::debug!(client_id = %sender.id, room = %name, "joined room");

                sender.send_frame(&ServerFrame::RoomJoined { room: name });
                let joined = ServerFrame::PeerJoined {
                    peer_id: sender.id.clone(),
                }
                .to_json();
                for id in &peers {
                    if let Some(peer) = self.registry.lookup(id) {
                        peer.send_text(joined.clone());
                    }
                }
                sender.send_frame(&ServerFrame::RoomPeers { peers });
            }
        }
    }

    fn leave_room(&self, sender: &Arc<ClientHandle>) {
        // Silent no-op when not in a room.
        if let Some((room, remaining)) = self.rooms.leave(sender) {
            tracing::debug!(client_id = %sender.id, room = %room, "left room");
            self.announce_leave(&remaining, &sender.id);
            sender.send_frame(&ServerFrame::RoomLeft { room });
        }
    }

    fn relay(&self, sender: &Arc<ClientHandle>, target_id: String, fields: Map<String, Value>) {
        match self
            .rooms
            .resolve_same_room(sender, &target_id, &self.registry)
        {
            Some(target) => target.send_text(frames::relay_json(fields, &sender.id)),
            None => sender.send_frame(&ServerFrame::Error {
                message: reason::TARGET_UNAVAILABLE,
                to: Some(target_id),
            }),
        }
    }

    fn fan_out_frame(&self, sender: &Arc<ClientHandle>, fields: Map<String, Value>) {
        let Some(room) = sender.room() else { return };
        let json = frames::relay_json(fields, &sender.id);
        self.for_each_peer(&room, &sender.id, |peer| peer.send_text(json.clone()));
    }

    fn fan_out_text(&self, sender: &Arc<ClientHandle>, text: String) {
        // Raw passthrough is forwarded unmodified; a byte-level broadcast
        // cannot carry an injected sender id.
        let Some(room) = sender.room() else { return };
        self.for_each_peer(&room, &sender.id, |peer| peer.send_text(text.clone()));
    }

    /// Announce a departure to a room's remaining members. Shared by
    /// explicit leave, room switch, disconnect, and heartbeat eviction.
    fn announce_leave(&self, remaining: &[String], peer_id: &str) {
        let frame = ServerFrame::PeerLeft {
            peer_id: peer_id.to_string(),
        }
        .to_json();
        for id in remaining {
            if let Some(peer) = self.registry.lookup(id) {
                peer.send_text(frame.clone());
            }
        }
    }

    fn for_each_peer(&self, room: &str, sender_id: &str, mut send: impl FnMut(&ClientHandle)) {
        for id in self.rooms.peers(room) {
            if id == sender_id {
                continue;
            }
            if let Some(peer) = self.registry.lookup(&id) {
                send(&peer);
            }
        }
    }

    /// Cooperative teardown for a closed or evicted connection: leave the
    /// room (announcing `peer-left`), then free the registry slot. The gone
    /// client gets no `room-left`.
    pub fn disconnect(&self, client: &Arc<ClientHandle>) {
        if let Some((_room, remaining)) = self.rooms.leave(client) {
            self.announce_leave(&remaining, &client.id);
        }
        self.registry.remove(&client.id);
    }
}
