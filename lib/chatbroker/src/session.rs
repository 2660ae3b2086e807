//! The per-session worker: owns one client's TCP endpoint, bootstraps it
//! against the central task, then multiplexes the socket and the
//! "from-central" channel for the rest of the connection's life.

use crate::registry::{SessionId, ToCentral};
use crate::wire::{read_message, write_message};
use netcore::StreamEndpoint;
use sbcp::frame::MessageType;
use sbcp::Message;
use slog::Logger;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

/// Shared context handed to every accepted connection by the connection
/// server (the `Ctx` type parameter of `netcore::ConnectionServer`).
pub struct ChatServerContext {
    to_central: Sender<ToCentral>,
    next_session_id: AtomicU64,
    logger: Logger,
}

impl ChatServerContext {
    pub fn new(to_central: Sender<ToCentral>, logger: Logger) -> ChatServerContext {
        ChatServerContext {
            to_central,
            next_session_id: AtomicU64::new(1),
            logger,
        }
    }

    fn next_id(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// The connection handler registered with `ConnectionServer`. Matches the
/// `StreamHandler<Ctx>` blanket `Fn` impl so it can be passed straight to
/// `add_handler`.
pub fn handle_connection(endpoint: StreamEndpoint, ctx: Arc<ChatServerContext>) {
    let session_id = ctx.next_id();
    run_session(endpoint, session_id, ctx.to_central.clone(), ctx.logger.clone());
}

fn run_session(mut endpoint: StreamEndpoint, session_id: SessionId, to_central: Sender<ToCentral>, logger: Logger) {
    let join = match read_message(&mut endpoint) {
        Ok(msg) if msg.message_type == MessageType::Join => msg,
        Ok(other) => {
            slog::warn!(logger, "first message was not JOIN"; "type" => format!("{:?}", other.message_type));
            return;
        }
        Err(err) => {
            slog::debug!(logger, "failed reading JOIN"; "error" => format!("{}", err));
            return;
        }
    };

    let username = match join.username() {
        Some(name) => name.to_string(),
        None => return,
    };

    let (outbound_tx, outbound_rx) = mpsc::channel::<Message>();
    if to_central
        .send(ToCentral::Join {
            session_id,
            username: username.clone(),
            outbound: outbound_tx,
        })
        .is_err()
    {
        return;
    }

    let first_reply = match outbound_rx.recv() {
        Ok(msg) => msg,
        Err(_) => return,
    };
    let accepted = first_reply.message_type == MessageType::Ack;
    if write_message(&mut endpoint, &first_reply).is_err() {
        return;
    }
    if !accepted {
        slog::info!(logger, "join rejected"; "username" => username.as_str());
        return;
    }

    let mut writer_endpoint = match endpoint.try_clone() {
        Ok(e) => e,
        Err(err) => {
            slog::warn!(logger, "failed cloning endpoint for writer"; "error" => format!("{}", err));
            return;
        }
    };
    let writer = thread::spawn(move || {
        while let Ok(msg) = outbound_rx.recv() {
            if write_message(&mut writer_endpoint, &msg).is_err() {
                break;
            }
        }
    });

    loop {
        match read_message(&mut endpoint) {
            Ok(msg) => match msg.message_type {
                MessageType::Send => {
                    let text = msg.text().unwrap_or("").to_string();
                    if to_central.send(ToCentral::Send { session_id, text }).is_err() {
                        break;
                    }
                }
                MessageType::Idle => {
                    if to_central.send(ToCentral::Idle { session_id }).is_err() {
                        break;
                    }
                }
                other => {
                    slog::warn!(logger, "unexpected message from client"; "type" => format!("{:?}", other));
                    break;
                }
            },
            Err(_) => break,
        }
    }

    let _ = to_central.send(ToCentral::Disconnect { session_id });
    drop(endpoint);
    let _ = writer.join();
}
