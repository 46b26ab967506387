//! Optional TCP fan-out of outbound ward traffic.
//!
//! Length-prefixed frames of encoded [`WardMessage`]s; purely an adapter so
//! observers (or a thin relay) can tail the session without the core ever
//! blocking on a socket. Hosts with their own transport just drain the
//! [`Outbox`] themselves and never start this.

use std::io::{self, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use ward_proto::WardMessage;

use crate::sync::Outbox;

pub struct WardFeedServer {
    sender: Sender<Vec<u8>>,
    latest_frame: Arc<Mutex<Option<Vec<u8>>>>,
}

impl WardFeedServer {
    pub fn broadcast(&self, bytes: &[u8]) {
        {
            let mut guard = self
                .latest_frame
                .lock()
                .expect("latest ward frame mutex poisoned");
            *guard = Some(bytes.to_vec());
        }
        if let Err(err) = self.sender.send(bytes.to_vec()) {
            log::error!("Failed to queue ward frame: {}", err);
        }
    }
}

pub fn start_ward_feed_server(bind_addr: std::net::SocketAddr) -> Option<WardFeedServer> {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            log::warn!(
                "Ward feed bind failed at {}: {}. Broadcasting disabled.",
                bind_addr,
                err
            );
            return None;
        }
    };

    let (sender, receiver) = unbounded::<Vec<u8>>();
    if let Err(err) = listener.set_nonblocking(true) {
        log::warn!("set_nonblocking failed for ward feed listener: {}", err);
        return None;
    }
    let clients: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));
    let accept_clients = Arc::clone(&clients);
    let latest_frame: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
    let accept_latest = Arc::clone(&latest_frame);

    thread::spawn(move || loop {
        match listener.accept() {
            Ok((mut stream, addr)) => {
                log::info!("Ward feed client connected: {}", addr);
                if let Err(err) = stream.set_nodelay(true) {
                    log::warn!("Failed to set TCP_NODELAY: {}", err);
                }
                if let Err(err) = stream.set_nonblocking(false) {
                    log::warn!(
                        "Failed to set blocking mode for ward feed client {}: {}",
                        addr,
                        err
                    );
                }
                // replay the most recent frame so late joiners see state
                if let Some(frame) = accept_latest
                    .lock()
                    .expect("latest ward frame mutex poisoned")
                    .clone()
                {
                    if let Err(err) = write_frame(&mut stream, &frame) {
                        log::warn!("Failed to send initial frame to client {}: {}", addr, err);
                        continue;
                    }
                }
                accept_clients
                    .lock()
                    .expect("ward feed clients mutex poisoned")
                    .push(stream);
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(50));
            }
            Err(err) => {
                log::error!("Error accepting ward feed client: {}", err);
                thread::sleep(std::time::Duration::from_millis(200));
            }
        }

        while let Ok(frame) = receiver.try_recv() {
            broadcast_frame(&clients, &frame);
        }
    });

    Some(WardFeedServer {
        sender,
        latest_frame,
    })
}

/// Encodes and ships everything queued on the outbox. With no server the
/// queue is left untouched for the host transport to drain.
pub fn broadcast_outbox(server: Option<&WardFeedServer>, outbox: &mut Outbox) {
    let Some(server) = server else {
        return;
    };
    for message in outbox.drain() {
        match encode_frame(&message) {
            Ok(bytes) => server.broadcast(&bytes),
            Err(err) => log::error!("Failed to encode ward message: {}", err),
        }
    }
}

fn encode_frame(message: &WardMessage) -> bincode::Result<Vec<u8>> {
    ward_proto::encode_message(message)
}

fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> io::Result<()> {
    let len = frame.len() as u32;
    let mut buffer = Vec::with_capacity(4 + frame.len());
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(frame);
    stream.write_all(&buffer)
}

fn broadcast_frame(clients: &Arc<Mutex<Vec<TcpStream>>>, frame: &[u8]) {
    let mut guard = clients.lock().expect("ward feed clients mutex poisoned");
    guard.retain_mut(|stream| match write_frame(stream, frame) {
        Ok(_) => true,
        Err(err) => {
            log::warn!("Dropping ward feed client: {}", err);
            false
        }
    });
}
