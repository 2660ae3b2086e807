//! The central chat state task: the only place that touches the username
//! registry, modelled on the single-writer-owns-state shape the teacher's
//! connection server gives each accepted worker, but here one long-lived
//! task owns cross-session state instead of each worker owning its own.

use sbcp::Message;
use slog::Logger;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

pub type SessionId = u64;

/// Sent by a session worker to the central task.
pub enum ToCentral {
    Join {
        session_id: SessionId,
        username: String,
        outbound: Sender<Message>,
    },
    Send {
        session_id: SessionId,
        text: String,
    },
    Idle {
        session_id: SessionId,
    },
    Disconnect {
        session_id: SessionId,
    },
}

struct ActiveSession {
    username: String,
    outbound: Sender<Message>,
}

/// A running central task plus the handle sessions use to talk to it.
pub struct ChatBroker {
    sender: Sender<ToCentral>,
    handle: Option<JoinHandle<()>>,
}

impl ChatBroker {
    pub fn spawn(max_clients: usize, logger: Logger) -> ChatBroker {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || run_central(receiver, max_clients, logger));
        ChatBroker {
            sender,
            handle: Some(handle),
        }
    }

    /// Each session worker gets its own clone to send events from its own
    /// thread.
    pub fn sender(&self) -> Sender<ToCentral> {
        self.sender.clone()
    }

    /// Drops the broker's own sender (the last clone is dropped when every
    /// session worker has exited) and waits for the central task to notice
    /// the channel close and return.
    pub fn join(self) {
        let ChatBroker { sender, handle } = self;
        drop(sender);
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

fn run_central(receiver: Receiver<ToCentral>, max_clients: usize, logger: Logger) {
    let mut sessions: HashMap<SessionId, ActiveSession> = HashMap::new();

    while let Ok(event) = receiver.recv() {
        match event {
            ToCentral::Join {
                session_id,
                username,
                outbound,
            } => {
                if sessions.values().any(|s| s.username == username) {
                    slog::info!(logger, "rejecting duplicate username"; "username" => username.as_str());
                    let _ = outbound.send(Message::nak("Username already exists"));
                    continue;
                }
                if sessions.len() >= max_clients {
                    slog::info!(logger, "rejecting join, at capacity"; "max_clients" => max_clients);
                    let _ = outbound.send(Message::nak("Maximum clients limit"));
                    continue;
                }

                let existing: Vec<String> = sessions.values().map(|s| s.username.clone()).collect();
                if outbound.send(Message::ack(&existing)).is_err() {
                    continue;
                }

                for session in sessions.values() {
                    let _ = session.outbound.send(Message::online(&username));
                }

                slog::info!(logger, "session joined"; "username" => username.as_str(), "online" => sessions.len() + 1);
                sessions.insert(session_id, ActiveSession { username, outbound });
            }

            ToCentral::Send { session_id, text } => {
                let username = match sessions.get(&session_id) {
                    Some(session) => session.username.clone(),
                    None => continue,
                };
                let fwd = Message::fwd(&username, &text);
                for (id, session) in sessions.iter() {
                    if *id != session_id {
                        let _ = session.outbound.send(fwd.clone());
                    }
                }
            }

            ToCentral::Idle { session_id } => {
                let username = match sessions.get(&session_id) {
                    Some(session) => session.username.clone(),
                    None => continue,
                };
                let idle = Message::idle(Some(&username));
                for (id, session) in sessions.iter() {
                    if *id != session_id {
                        let _ = session.outbound.send(idle.clone());
                    }
                }
            }

            ToCentral::Disconnect { session_id } => {
                if let Some(session) = sessions.remove(&session_id) {
                    slog::info!(logger, "session left"; "username" => session.username.as_str());
                    for remaining in sessions.values() {
                        let _ = remaining.outbound.send(Message::offline(&session.username));
                    }
                }
            }
        }
    }

    slog::info!(logger, "central chat task exiting");
}
